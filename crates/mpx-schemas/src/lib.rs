//! mpx-schemas
//!
//! Persisted document shapes for the RFQ → Quotation → Order workflow.
//!
//! Field names on the wire are camelCase and must stay compatible with
//! records already written by the marketplace (`rfqId`, `quotationId`,
//! `orderId`, `status`, `paymentStatus`, `timeline[].status`,
//! `timeline[].timestamp`, `timeline[].updatedBy`). Everything in this crate
//! is plain data: no IO, no clock, no authorization.

mod actor;
mod money;
mod order;
mod quotation;
mod rfq;

pub use actor::{Actor, Role};
pub use money::{micros_to_price, price_to_micros, PricingError, MICROS_PER_UNIT};
pub use order::{Order, OrderStatus, PaymentStatus, TimelineEvent, TIMELINE_CREATED};
pub use quotation::{Quotation, QuotationStatus};
pub use rfq::{Rfq, RfqStatus, VesselInfo};

use serde::{de::DeserializeOwned, Serialize};

/// A document stored under a fixed collection name, keyed by its own id.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Collection the document lives in (e.g. `"rfqs"`).
    const COLLECTION: &'static str;

    /// Human-readable entity name used in error messages.
    const ENTITY: &'static str;

    fn id(&self) -> &str;
}

impl Document for Rfq {
    const COLLECTION: &'static str = "rfqs";
    const ENTITY: &'static str = "rfq";

    fn id(&self) -> &str {
        &self.rfq_id
    }
}

impl Document for Quotation {
    const COLLECTION: &'static str = "quotations";
    const ENTITY: &'static str = "quotation";

    fn id(&self) -> &str {
        &self.quotation_id
    }
}

impl Document for Order {
    const COLLECTION: &'static str = "orders";
    const ENTITY: &'static str = "order";

    fn id(&self) -> &str {
        &self.order_id
    }
}

/// Error returned when a status string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}
