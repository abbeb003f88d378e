//! Order manager: creation from an accepted quotation, status transitions
//! and payment updates. Every change appends to the order's timeline in the
//! same transaction.

pub mod state_machine;

use chrono::{DateTime, Utc};
use mpx_audit::{find_request, NewTimelineEntry, TimelineRecorder};
use mpx_notify::NotificationKind;
use mpx_schemas::{
    Actor, Order, OrderStatus, PaymentStatus, Quotation, Rfq, Role, TIMELINE_CREATED,
};
use mpx_store::Transaction;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{run_transaction, Workflow, WorkflowError};
use state_machine::{check_payment, check_transition, Party, Rejection};

/// Namespace for order ids derived from quotation ids.
const ORDER_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d70_785f_6f72_6465_725f_6e73_5f76_3031);

/// Deterministic order id for a quotation. Two orders for one quotation
/// would share an id, so the store's create precondition rejects the second.
pub fn order_id_for(quotation_id: &str) -> String {
    Uuid::new_v5(&ORDER_ID_NAMESPACE, quotation_id.as_bytes()).to_string()
}

/// Resolve `actor` to its party on `order`. Admins act as the system.
pub fn party_of(order: &Order, actor: &Actor) -> Result<Party, WorkflowError> {
    match actor.role {
        Role::Shipowner if actor.id == order.shipowner_id => Ok(Party::Shipowner),
        Role::Supplier if actor.id == order.supplier_id => Ok(Party::Supplier),
        Role::Admin => Ok(Party::System),
        Role::Shipowner | Role::Supplier => Err(WorkflowError::Authorization),
    }
}

/// The system party only closes orders (`target` is `Some(Completed)`);
/// every other request from it is refused before the order's state is
/// looked at. `None` stands for a payment update.
fn admit_system(party: Party, target: Option<OrderStatus>) -> Result<(), WorkflowError> {
    match (party, target) {
        (Party::System, Some(OrderStatus::Completed)) => Ok(()),
        (Party::System, _) => Err(WorkflowError::Authorization),
        (Party::Shipowner | Party::Supplier, _) => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub order_id: String,
    pub target: OrderStatus,
    pub description: Option<String>,
    /// Replaying a request id already on the timeline is a no-op.
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order_id: String,
    pub target: PaymentStatus,
    pub description: Option<String>,
    pub request_id: Option<String>,
}

/// Result of a change request: the order after the call, and whether this
/// call changed it (false on idempotent replay).
struct Applied {
    order: Order,
    changed: bool,
}

pub struct OrderManager<'a> {
    wf: &'a Workflow,
}

impl<'a> OrderManager<'a> {
    pub(crate) fn new(wf: &'a Workflow) -> Self {
        Self { wf }
    }

    /// Move an order to `req.target` on behalf of `actor`.
    pub async fn transition(
        &self,
        req: &TransitionRequest,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Order, WorkflowError> {
        let request_id = checked_request_id(req.request_id.as_deref())?;
        let description = req
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Order status changed to {}", req.target));
        let order_id = req.order_id.as_str();
        let target = req.target;

        let applied = run_transaction(&self.wf.store, &self.wf.retry, "order.transition", |mut tx| {
            let description = description.clone();
            async move {
                let mut order = load_order(&mut tx, order_id).await?;
                let party = party_of(&order, actor)?;
                admit_system(party, Some(target))?;
                if let Some(rid) = request_id {
                    if find_request(&order.timeline, rid).is_some() {
                        return Ok((tx, Applied { order, changed: false }));
                    }
                }
                check_transition(order.status, target, party, order.payment_status)
                    .map_err(|r| refused(&order, order.status, r))?;

                order.status = target;
                order.updated_at = now;
                TimelineRecorder::new(&mut order.timeline).append(NewTimelineEntry {
                    status: target.as_str().to_string(),
                    description,
                    updated_by: actor.id.clone(),
                    timestamp: now,
                    request_id: request_id.map(str::to_string),
                })?;
                tx.update(&order)?;
                Ok((tx, Applied { order, changed: true }))
            }
        })
        .await?;

        let Applied { order, changed } = applied;
        if !changed {
            debug!(order_id, request_id, "transition replayed; no change");
            return Ok(order);
        }
        info!(order_id, status = %order.status, actor_id = %actor.id, "order transitioned");
        self.notify_parties(
            &order,
            actor,
            NotificationKind::OrderStatusChanged,
            json!({ "orderId": order.order_id, "status": order.status }),
        );
        Ok(order)
    }

    /// Advance the payment axis on behalf of `actor`.
    pub async fn update_payment(
        &self,
        req: &PaymentRequest,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Order, WorkflowError> {
        let request_id = checked_request_id(req.request_id.as_deref())?;
        let description = req
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Payment status changed to {}", req.target));
        let order_id = req.order_id.as_str();
        let target = req.target;

        let applied = run_transaction(&self.wf.store, &self.wf.retry, "order.update_payment", |mut tx| {
            let description = description.clone();
            async move {
                let mut order = load_order(&mut tx, order_id).await?;
                let party = party_of(&order, actor)?;
                admit_system(party, None)?;
                if let Some(rid) = request_id {
                    if find_request(&order.timeline, rid).is_some() {
                        return Ok((tx, Applied { order, changed: false }));
                    }
                }
                check_payment(order.status, order.payment_status, target, party)
                    .map_err(|r| refused(&order, order.payment_status, r))?;

                order.payment_status = target;
                order.updated_at = now;
                TimelineRecorder::new(&mut order.timeline).append(NewTimelineEntry {
                    status: target.as_str().to_string(),
                    description,
                    updated_by: actor.id.clone(),
                    timestamp: now,
                    request_id: request_id.map(str::to_string),
                })?;
                tx.update(&order)?;
                Ok((tx, Applied { order, changed: true }))
            }
        })
        .await?;

        let Applied { order, changed } = applied;
        if !changed {
            debug!(order_id, request_id, "payment update replayed; no change");
            return Ok(order);
        }
        info!(order_id, payment_status = %order.payment_status, actor_id = %actor.id, "order payment updated");
        self.notify_parties(
            &order,
            actor,
            NotificationKind::PaymentUpdated,
            json!({ "orderId": order.order_id, "paymentStatus": order.payment_status }),
        );
        Ok(order)
    }

    pub async fn get(&self, order_id: &str) -> Result<Order, WorkflowError> {
        debug!(order_id, "order get");
        let mut tx = self.wf.reader();
        load_order(&mut tx, order_id).await
    }

    /// Orders where `user_id` is either party, oldest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, WorkflowError> {
        debug!(user_id, "order list");
        let mut tx = self.wf.reader();
        let mut orders = tx.query::<Order>("shipownerId", user_id).await?;
        for o in tx.query::<Order>("supplierId", user_id).await? {
            if !orders.iter().any(|x| x.order_id == o.order_id) {
                orders.push(o);
            }
        }
        orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        Ok(orders)
    }

    /// Counterparty of the actor; both parties when the system acted.
    fn notify_parties(
        &self,
        order: &Order,
        actor: &Actor,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) {
        match order.counterparty_of(&actor.id) {
            Some(other) => self.wf.notifier.notify(other, kind, payload),
            None => {
                self.wf
                    .notifier
                    .notify(&order.shipowner_id, kind, payload.clone());
                self.wf.notifier.notify(&order.supplier_id, kind, payload);
            }
        }
    }
}

fn checked_request_id(request_id: Option<&str>) -> Result<Option<&str>, WorkflowError> {
    match request_id {
        Some(rid) if rid.trim().is_empty() => {
            Err(WorkflowError::validation("requestId must not be blank"))
        }
        other => Ok(other),
    }
}

fn refused(order: &Order, current: impl ToString, rejection: Rejection) -> WorkflowError {
    match rejection {
        Rejection::RoleNotPermitted => WorkflowError::Authorization,
        other => WorkflowError::invalid_state::<Order>(&order.order_id, current, other.describe()),
    }
}

pub(crate) async fn load_order(tx: &mut Transaction, order_id: &str) -> Result<Order, WorkflowError> {
    tx.get::<Order>(order_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found::<Order>(order_id))
}

/// Build the order for an accepted quotation, with its `created` timeline
/// entry.
pub(crate) fn new_order_from_acceptance(
    quotation: &Quotation,
    rfq: &Rfq,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Order, WorkflowError> {
    let mut order = Order {
        order_id: order_id_for(&quotation.quotation_id),
        quotation_id: quotation.quotation_id.clone(),
        rfq_id: rfq.rfq_id.clone(),
        shipowner_id: rfq.owner_id.clone(),
        supplier_id: quotation.supplier_id.clone(),
        amount_micros: quotation.price_micros,
        currency: quotation.currency.clone(),
        status: OrderStatus::PendingSupplierApproval,
        payment_status: PaymentStatus::Pending,
        timeline: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    TimelineRecorder::new(&mut order.timeline).append(NewTimelineEntry {
        status: TIMELINE_CREATED.to_string(),
        description: format!("Order created from quotation {}", quotation.quotation_id),
        updated_by: actor.id.clone(),
        timestamp: now,
        request_id: None,
    })?;
    Ok(order)
}
