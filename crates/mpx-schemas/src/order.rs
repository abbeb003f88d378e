use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseStatusError;

/// `timeline[].status` of the first event written when an order is created.
pub const TIMELINE_CREATED: &str = "created";

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Fulfilment lifecycle of an order.
///
/// ```text
/// pending_supplier_approval → pending_payment → pending_shipowner_confirmation
///   → in_progress → shipped → delivered → completed
/// (any non-terminal) → cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingSupplierApproval,
    PendingPayment,
    PendingShipownerConfirmation,
    InProgress,
    Shipped,
    Delivered,
    /// **Terminal.**
    Completed,
    /// **Terminal.**
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::PendingSupplierApproval,
        OrderStatus::PendingPayment,
        OrderStatus::PendingShipownerConfirmation,
        OrderStatus::InProgress,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingSupplierApproval => "pending_supplier_approval",
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::PendingShipownerConfirmation => "pending_shipowner_confirmation",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// PaymentStatus
// ---------------------------------------------------------------------------

/// Payment axis of an order. Declaration order is the only legal direction,
/// so `Ord` doubles as the "at least" comparison used by status gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    /// Payer (shipowner) reported the payment as sent.
    PaymentAwaitingConfirmation,
    /// Payee (supplier) confirmed receipt. **Terminal.**
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::PaymentAwaitingConfirmation => "payment_awaiting_confirmation",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "payment_awaiting_confirmation" => Ok(PaymentStatus::PaymentAwaitingConfirmation),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(ParseStatusError {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TimelineEvent
// ---------------------------------------------------------------------------

/// One entry of an order's append-only timeline.
///
/// `status` is free-form on purpose: it holds an [`OrderStatus`] string for
/// status transitions, a [`PaymentStatus`] string for payment changes, and
/// [`TIMELINE_CREATED`] for the first entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    /// Zero-based position in the timeline.
    pub seq: u64,
    pub status: String,
    pub description: String,
    pub updated_by: String,
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied idempotency key of the request that appended this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub hash_prev: Option<String>,
    #[serde(default)]
    pub hash_self: Option<String>,
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// The contract instantiated from an accepted quotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub quotation_id: String,
    pub rfq_id: String,
    pub shipowner_id: String,
    pub supplier_id: String,
    pub amount_micros: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The other party on the order, if `user_id` is one of the two parties.
    pub fn counterparty_of(&self, user_id: &str) -> Option<&str> {
        if user_id == self.shipowner_id {
            Some(&self.supplier_id)
        } else if user_id == self.supplier_id {
            Some(&self.shipowner_id)
        } else {
            None
        }
    }
}
