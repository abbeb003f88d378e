//! mpx-workflow
//!
//! The RFQ → Quotation → Order workflow engine.
//!
//! [`Workflow`] owns the collaborators (entity store, notifier, retry
//! policy) and hands out one manager per entity:
//!
//! - [`RfqManager`]: create, close, cancel, read.
//! - [`QuotationManager`]: submit, accept (award + order creation), reject,
//!   reject remaining, read, list.
//! - [`OrderManager`]: status transitions, payment updates, read, list.
//!
//! Every state change is one optimistic transaction run through
//! [`run_transaction`]; notifications go out only after it commits.
//! Operations take the caller's `now`; nothing here reads the clock.

mod error;
pub mod order;
mod quotation;
mod rfq;
mod txn;

pub use error::WorkflowError;
pub use order::state_machine::{self, Party};
pub use order::{order_id_for, party_of, OrderManager, PaymentRequest, TransitionRequest};
pub use quotation::{Bid, QuotationManager};
pub use rfq::{NewRfq, RfqManager};
pub use txn::{run_transaction, RetryPolicy};

use std::sync::Arc;

use mpx_notify::Notifier;
use mpx_store::{EntityStore, Transaction};

#[derive(Clone)]
pub struct Workflow {
    store: Arc<dyn EntityStore>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl Workflow {
    pub fn new(store: Arc<dyn EntityStore>, notifier: Arc<dyn Notifier>, retry: RetryPolicy) -> Self {
        Self {
            store,
            notifier,
            retry,
        }
    }

    pub fn rfqs(&self) -> RfqManager<'_> {
        RfqManager::new(self)
    }

    pub fn quotations(&self) -> QuotationManager<'_> {
        QuotationManager::new(self)
    }

    pub fn orders(&self) -> OrderManager<'_> {
        OrderManager::new(self)
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Transaction used only for reads; never committed.
    fn reader(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.store))
    }
}
