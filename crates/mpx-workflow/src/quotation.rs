//! Quotation manager: bids against an RFQ, acceptance (award) and rejection.

use chrono::{DateTime, Utc};
use mpx_notify::NotificationKind;
use mpx_schemas::{Actor, Order, Quotation, QuotationStatus, Rfq, RfqStatus, Role};
use mpx_store::Transaction;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::order::{new_order_from_acceptance, order_id_for};
use crate::rfq::{increment_quotation_count, load_rfq, mark_awarded};
use crate::{run_transaction, Workflow, WorkflowError};

/// A supplier's bid.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub price_micros: i64,
    pub currency: String,
    #[serde(default)]
    pub delivery_estimate: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Bid {
    /// Check and normalize the bid; the currency comes back upper-cased.
    fn validated(&self) -> Result<Bid, WorkflowError> {
        if self.price_micros <= 0 {
            return Err(WorkflowError::validation("price must be positive"));
        }
        let currency = self.currency.trim();
        if currency.is_empty() {
            return Err(WorkflowError::validation("currency is required"));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(WorkflowError::validation(
                "currency must be a 3-letter ISO 4217 code",
            ));
        }
        Ok(Bid {
            price_micros: self.price_micros,
            currency: currency.to_ascii_uppercase(),
            delivery_estimate: non_blank(self.delivery_estimate.as_deref()),
            notes: non_blank(self.notes.as_deref()),
        })
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

pub struct QuotationManager<'a> {
    wf: &'a Workflow,
}

impl<'a> QuotationManager<'a> {
    pub(crate) fn new(wf: &'a Workflow) -> Self {
        Self { wf }
    }

    /// Submit a bid against an open RFQ.
    ///
    /// The quotation and the RFQ's `quotationCount` increment commit
    /// together or not at all.
    pub async fn submit(
        &self,
        rfq_id: &str,
        actor: &Actor,
        bid: &Bid,
        now: DateTime<Utc>,
    ) -> Result<Quotation, WorkflowError> {
        match actor.role {
            Role::Supplier => {}
            Role::Shipowner | Role::Admin => return Err(WorkflowError::Authorization),
        }
        let bid = bid.validated()?;
        let quotation_id = Uuid::new_v4().to_string();

        let (quotation, owner_id) =
            run_transaction(&self.wf.store, &self.wf.retry, "quotation.submit", |mut tx| {
                let bid = bid.clone();
                let quotation_id = quotation_id.clone();
                async move {
                    let mut rfq = load_rfq(&mut tx, rfq_id).await?;
                    if rfq.owner_id == actor.id {
                        return Err(WorkflowError::Authorization);
                    }
                    if rfq.status != RfqStatus::Open {
                        return Err(WorkflowError::invalid_state::<Rfq>(
                            rfq_id,
                            rfq.status,
                            "rfq is not open for quotations",
                        ));
                    }
                    if rfq.deadline_passed(now) {
                        return Err(WorkflowError::invalid_state::<Rfq>(
                            rfq_id,
                            rfq.status,
                            "rfq deadline has passed",
                        ));
                    }

                    let quotation = Quotation {
                        quotation_id,
                        rfq_id: rfq.rfq_id.clone(),
                        supplier_id: actor.id.clone(),
                        price_micros: bid.price_micros,
                        currency: bid.currency,
                        delivery_estimate: bid.delivery_estimate,
                        notes: bid.notes,
                        status: QuotationStatus::Pending,
                        rejection_reason: None,
                        created_at: now,
                        decided_at: None,
                    };
                    tx.create(&quotation)?;
                    increment_quotation_count(&mut tx, &mut rfq, now)?;
                    Ok((tx, (quotation, rfq.owner_id)))
                }
            })
            .await?;

        info!(
            quotation_id = %quotation.quotation_id,
            rfq_id = %quotation.rfq_id,
            supplier_id = %quotation.supplier_id,
            price_micros = quotation.price_micros,
            "quotation submitted"
        );
        self.wf.notifier.notify(
            &owner_id,
            NotificationKind::QuotationReceived,
            json!({
                "rfqId": quotation.rfq_id,
                "quotationId": quotation.quotation_id,
                "supplierId": quotation.supplier_id,
            }),
        );
        Ok(quotation)
    }

    /// Accept a pending quotation: award its RFQ and create the order, in
    /// one transaction.
    pub async fn accept(
        &self,
        quotation_id: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Order, WorkflowError> {
        let order = run_transaction(&self.wf.store, &self.wf.retry, "quotation.accept", |mut tx| async move {
            let mut quotation = load_quotation(&mut tx, quotation_id).await?;
            let mut rfq = load_rfq(&mut tx, &quotation.rfq_id).await?;
            if actor.id != rfq.owner_id {
                return Err(WorkflowError::Authorization);
            }
            if quotation.status != QuotationStatus::Pending {
                return Err(WorkflowError::invalid_state::<Quotation>(
                    quotation_id,
                    quotation.status,
                    "only a pending quotation can be accepted",
                ));
            }
            if rfq.status != RfqStatus::Open {
                return Err(WorkflowError::invalid_state::<Rfq>(
                    &rfq.rfq_id,
                    rfq.status,
                    "rfq is not open for award",
                ));
            }
            let order_id = order_id_for(quotation_id);
            if tx.get::<Order>(&order_id).await?.is_some() {
                return Err(WorkflowError::invalid_state::<Quotation>(
                    quotation_id,
                    quotation.status,
                    "an order already exists for this quotation",
                ));
            }

            quotation.status = QuotationStatus::Accepted;
            quotation.decided_at = Some(now);
            tx.update(&quotation)?;
            mark_awarded(&mut tx, &mut rfq, quotation_id, now)?;
            let order = new_order_from_acceptance(&quotation, &rfq, actor, now)?;
            tx.create(&order)?;
            Ok((tx, order))
        })
        .await?;

        info!(
            quotation_id,
            rfq_id = %order.rfq_id,
            order_id = %order.order_id,
            "quotation accepted; order created"
        );
        self.wf.notifier.notify(
            &order.supplier_id,
            NotificationKind::QuotationAccepted,
            json!({
                "rfqId": order.rfq_id,
                "quotationId": order.quotation_id,
                "orderId": order.order_id,
            }),
        );
        Ok(order)
    }

    /// Reject one pending quotation. The RFQ is untouched.
    pub async fn reject(
        &self,
        quotation_id: &str,
        actor: &Actor,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Quotation, WorkflowError> {
        let reason = non_blank(reason);
        let quotation = run_transaction(&self.wf.store, &self.wf.retry, "quotation.reject", |mut tx| {
            let reason = reason.clone();
            async move {
                let mut quotation = load_quotation(&mut tx, quotation_id).await?;
                let rfq = load_rfq(&mut tx, &quotation.rfq_id).await?;
                if actor.id != rfq.owner_id {
                    return Err(WorkflowError::Authorization);
                }
                if quotation.status != QuotationStatus::Pending {
                    return Err(WorkflowError::invalid_state::<Quotation>(
                        quotation_id,
                        quotation.status,
                        "only a pending quotation can be rejected",
                    ));
                }
                reject_in_place(&mut quotation, reason, now);
                tx.update(&quotation)?;
                Ok((tx, quotation))
            }
        })
        .await?;

        info!(quotation_id, rfq_id = %quotation.rfq_id, "quotation rejected");
        self.notify_rejected(&quotation);
        Ok(quotation)
    }

    /// Reject every still-pending quotation of an RFQ that no longer takes
    /// bids (awarded, closed or cancelled). Returns the rejected quotations.
    pub async fn reject_remaining(
        &self,
        rfq_id: &str,
        actor: &Actor,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Quotation>, WorkflowError> {
        let reason = non_blank(reason);
        let rejected = run_transaction(
            &self.wf.store,
            &self.wf.retry,
            "quotation.reject_remaining",
            |mut tx| {
                let reason = reason.clone();
                async move {
                    let rfq = load_rfq(&mut tx, rfq_id).await?;
                    if actor.id != rfq.owner_id {
                        return Err(WorkflowError::Authorization);
                    }
                    if rfq.status == RfqStatus::Open {
                        return Err(WorkflowError::invalid_state::<Rfq>(
                            rfq_id,
                            rfq.status,
                            "rfq is still open; close, cancel or award it first",
                        ));
                    }
                    let mut rejected = Vec::new();
                    for mut q in tx.query::<Quotation>("rfqId", rfq_id).await? {
                        if q.status != QuotationStatus::Pending {
                            continue;
                        }
                        reject_in_place(&mut q, reason.clone(), now);
                        tx.update(&q)?;
                        rejected.push(q);
                    }
                    Ok((tx, rejected))
                }
            },
        )
        .await?;

        info!(rfq_id, rejected = rejected.len(), "remaining quotations rejected");
        for q in &rejected {
            self.notify_rejected(q);
        }
        Ok(rejected)
    }

    pub async fn get(&self, quotation_id: &str) -> Result<Quotation, WorkflowError> {
        debug!(quotation_id, "quotation get");
        let mut tx = self.wf.reader();
        load_quotation(&mut tx, quotation_id).await
    }

    /// Quotations of an RFQ in submission order.
    pub async fn list_for_rfq(&self, rfq_id: &str) -> Result<Vec<Quotation>, WorkflowError> {
        debug!(rfq_id, "quotation list");
        let mut tx = self.wf.reader();
        load_rfq(&mut tx, rfq_id).await?;
        let mut quotations = tx.query::<Quotation>("rfqId", rfq_id).await?;
        quotations.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.quotation_id.cmp(&b.quotation_id))
        });
        Ok(quotations)
    }

    fn notify_rejected(&self, q: &Quotation) {
        self.wf.notifier.notify(
            &q.supplier_id,
            NotificationKind::QuotationRejected,
            json!({
                "rfqId": q.rfq_id,
                "quotationId": q.quotation_id,
                "reason": q.rejection_reason,
            }),
        );
    }
}

fn reject_in_place(q: &mut Quotation, reason: Option<String>, now: DateTime<Utc>) {
    q.status = QuotationStatus::Rejected;
    q.rejection_reason = reason;
    q.decided_at = Some(now);
}

pub(crate) async fn load_quotation(
    tx: &mut Transaction,
    quotation_id: &str,
) -> Result<Quotation, WorkflowError> {
    tx.get::<Quotation>(quotation_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found::<Quotation>(quotation_id))
}
