//! Order state machines.
//!
//! Two axes live on every order and are checked here without any IO:
//!
//! ```text
//! status:
//!   pending_supplier_approval --supplier--> pending_payment
//!   pending_payment --shipowner--> pending_shipowner_confirmation   (payment >= awaiting)
//!   pending_shipowner_confirmation --shipowner--> in_progress       (payment == paid)
//!   in_progress --supplier--> shipped
//!   shipped --either party--> delivered
//!   delivered --shipowner | system--> completed                     (terminal)
//!   any non-terminal --either party--> cancelled                    (terminal)
//!
//! payment:
//!   pending --shipowner--> payment_awaiting_confirmation --supplier--> paid
//!   (only while status is pending_payment or pending_shipowner_confirmation)
//! ```
//!
//! Graph legality is checked before role: an illegal edge is reported as
//! such no matter who asked.

use mpx_schemas::{OrderStatus, PaymentStatus};

/// Who is acting on an order, relative to that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    Shipowner,
    Supplier,
    /// Platform operator or automated process.
    System,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Party::Shipowner => "shipowner",
            Party::Supplier => "supplier",
            Party::System => "system",
        }
    }
}

/// Why a requested change was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Current state is terminal; nothing may change.
    Terminal,
    /// Target is not a successor of the current state.
    NotASuccessor,
    /// The edge exists but this party may not take it.
    RoleNotPermitted,
    /// The edge needs the payment axis to be at least `required`.
    PaymentNotSettled { required: PaymentStatus },
    /// Payment may not change while the order is in this status.
    PaymentLocked,
}

impl Rejection {
    pub fn describe(&self) -> String {
        match self {
            Rejection::Terminal => "state is terminal".to_string(),
            Rejection::NotASuccessor => "not a legal successor".to_string(),
            Rejection::RoleNotPermitted => "role not permitted".to_string(),
            Rejection::PaymentNotSettled { required } => {
                format!("requires payment status {required}")
            }
            Rejection::PaymentLocked => "payment cannot change in this order status".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Status axis
// ---------------------------------------------------------------------------

/// Forward successor in the fulfilment chain, if any.
fn next_in_chain(from: OrderStatus) -> Option<OrderStatus> {
    match from {
        OrderStatus::PendingSupplierApproval => Some(OrderStatus::PendingPayment),
        OrderStatus::PendingPayment => Some(OrderStatus::PendingShipownerConfirmation),
        OrderStatus::PendingShipownerConfirmation => Some(OrderStatus::InProgress),
        OrderStatus::InProgress => Some(OrderStatus::Shipped),
        OrderStatus::Shipped => Some(OrderStatus::Delivered),
        OrderStatus::Delivered => Some(OrderStatus::Completed),
        OrderStatus::Completed | OrderStatus::Cancelled => None,
    }
}

pub fn is_legal_successor(from: OrderStatus, to: OrderStatus) -> bool {
    if from.is_terminal() {
        return false;
    }
    to == OrderStatus::Cancelled || next_in_chain(from) == Some(to)
}

/// Parties allowed to take the edge `from -> to` (assumed legal).
fn permitted(from: OrderStatus, to: OrderStatus, party: Party) -> bool {
    use OrderStatus::*;
    match (from, to, party) {
        (_, Cancelled, Party::Shipowner | Party::Supplier) => true,
        (_, Cancelled, Party::System) => false,
        (PendingSupplierApproval, PendingPayment, p) => p == Party::Supplier,
        (PendingPayment, PendingShipownerConfirmation, p) => p == Party::Shipowner,
        (PendingShipownerConfirmation, InProgress, p) => p == Party::Shipowner,
        (InProgress, Shipped, p) => p == Party::Supplier,
        (Shipped, Delivered, p) => matches!(p, Party::Shipowner | Party::Supplier),
        (Delivered, Completed, p) => matches!(p, Party::Shipowner | Party::System),
        _ => false,
    }
}

/// Payment level an edge requires, if any.
fn payment_required(to: OrderStatus) -> Option<PaymentStatus> {
    match to {
        OrderStatus::PendingShipownerConfirmation => Some(PaymentStatus::PaymentAwaitingConfirmation),
        OrderStatus::InProgress => Some(PaymentStatus::Paid),
        _ => None,
    }
}

/// Decide whether `party` may move an order from `from` to `to` given its
/// current payment status.
pub fn check_transition(
    from: OrderStatus,
    to: OrderStatus,
    party: Party,
    payment: PaymentStatus,
) -> Result<(), Rejection> {
    if from.is_terminal() {
        return Err(Rejection::Terminal);
    }
    if !is_legal_successor(from, to) {
        return Err(Rejection::NotASuccessor);
    }
    if !permitted(from, to, party) {
        return Err(Rejection::RoleNotPermitted);
    }
    if let Some(required) = payment_required(to) {
        if payment < required {
            return Err(Rejection::PaymentNotSettled { required });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Payment axis
// ---------------------------------------------------------------------------

pub fn is_legal_payment_step(from: PaymentStatus, to: PaymentStatus) -> bool {
    matches!(
        (from, to),
        (PaymentStatus::Pending, PaymentStatus::PaymentAwaitingConfirmation)
            | (PaymentStatus::PaymentAwaitingConfirmation, PaymentStatus::Paid)
    )
}

/// Decide whether `party` may move payment from `from` to `to` while the
/// order is in `status`.
pub fn check_payment(
    status: OrderStatus,
    from: PaymentStatus,
    to: PaymentStatus,
    party: Party,
) -> Result<(), Rejection> {
    if status.is_terminal() {
        return Err(Rejection::Terminal);
    }
    if !matches!(
        status,
        OrderStatus::PendingPayment | OrderStatus::PendingShipownerConfirmation
    ) {
        return Err(Rejection::PaymentLocked);
    }
    if !is_legal_payment_step(from, to) {
        return Err(Rejection::NotASuccessor);
    }
    let allowed = match to {
        // payer reports the payment as sent
        PaymentStatus::PaymentAwaitingConfirmation => party == Party::Shipowner,
        // payee confirms receipt
        PaymentStatus::Paid => party == Party::Supplier,
        PaymentStatus::Pending => false,
    };
    if !allowed {
        return Err(Rejection::RoleNotPermitted);
    }
    Ok(())
}
