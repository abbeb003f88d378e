//! Request and response types for all mpx-daemon HTTP endpoints.
//!
//! Prices cross the wire as decimal numbers and are converted to micros
//! here; everything past this module works in micros.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mpx_schemas::{
    micros_to_price, price_to_micros, Order, OrderStatus, PaymentStatus, Quotation, Rfq,
};
use mpx_workflow::{Bid, PaymentRequest, TransitionRequest, WorkflowError};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub notifications: DispatchCounters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchCounters {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<String>,
}

// ---------------------------------------------------------------------------
// RFQs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqResponse {
    #[serde(flatten)]
    pub rfq: Rfq,
    pub deadline_passed: bool,
}

impl RfqResponse {
    pub fn new(rfq: Rfq, now: DateTime<Utc>) -> Self {
        let deadline_passed = rfq.deadline_passed(now);
        Self {
            rfq,
            deadline_passed,
        }
    }
}

// ---------------------------------------------------------------------------
// Quotations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuotationRequest {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub delivery_estimate: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SubmitQuotationRequest {
    pub fn into_bid(self) -> Result<Bid, WorkflowError> {
        let price = self
            .price
            .ok_or_else(|| WorkflowError::validation("price is required"))?;
        let price_micros =
            price_to_micros(price).map_err(|e| WorkflowError::validation(format!("price: {e}")))?;
        Ok(Bid {
            price_micros,
            currency: self.currency,
            delivery_estimate: self.delivery_estimate,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationResponse {
    #[serde(flatten)]
    pub quotation: Quotation,
    pub price: f64,
}

impl From<Quotation> for QuotationResponse {
    fn from(quotation: Quotation) -> Self {
        let price = micros_to_price(quotation.price_micros);
        Self { quotation, price }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub amount: f64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let amount = micros_to_price(order.amount_micros);
        Self { order, amount }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionBody {
    pub status: OrderStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl TransitionBody {
    pub fn into_request(self, order_id: String) -> TransitionRequest {
        TransitionRequest {
            order_id,
            target: self.status,
            description: self.description,
            request_id: self.request_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBody {
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl PaymentBody {
    pub fn into_request(self, order_id: String) -> PaymentRequest {
        PaymentRequest {
            order_id,
            target: self.payment_status,
            description: self.description,
            request_id: self.request_id,
        }
    }
}
