use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use mpx_schemas::{Actor, Order, Quotation, Rfq};
use mpx_store::{EntityStore, MemoryStore};
use mpx_workflow::{Bid, NewRfq, RetryPolicy, Workflow};

use crate::{FaultyStore, RecordingNotifier};

/// Fixed scenario clock origin.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// RFQ fields with a deadline `days` after [`t0`].
pub fn new_rfq(title: &str, days: i64) -> NewRfq {
    NewRfq {
        title: title.to_string(),
        description: format!("{title} for MV Nordic Star"),
        category: "spare_parts".to_string(),
        subcategory: None,
        vessel_info: None,
        deadline: t0() + Duration::days(days),
    }
}

/// Bid of `units` whole currency units.
pub fn bid(units: i64, currency: &str) -> Bid {
    Bid {
        price_micros: units * mpx_schemas::MICROS_PER_UNIT,
        currency: currency.to_string(),
        delivery_estimate: Some("7 days".to_string()),
        notes: None,
    }
}

/// A workflow over an in-memory store wrapped in a [`FaultyStore`], with a
/// recording notifier.
pub struct Harness {
    pub workflow: Workflow,
    pub faults: Arc<FaultyStore>,
    pub memory: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    clock: AtomicI64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_retry(RetryPolicy::new(64, 0, 2))
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        let memory = Arc::new(MemoryStore::new());
        let faults = Arc::new(FaultyStore::new(memory.clone()));
        let notifier = Arc::new(RecordingNotifier::new());
        let workflow = Workflow::new(faults.clone(), notifier.clone(), retry);
        Self {
            workflow,
            faults,
            memory,
            notifier,
            clock: AtomicI64::new(0),
        }
    }

    /// Strictly increasing scenario time, one minute per call, starting one
    /// hour after [`t0`].
    pub fn tick(&self) -> DateTime<Utc> {
        let n = self.clock.fetch_add(1, Ordering::SeqCst);
        t0() + Duration::hours(1) + Duration::minutes(n)
    }

    pub fn store(&self) -> Arc<dyn EntityStore> {
        self.memory.clone()
    }

    pub async fn rfq(&self, owner: &Actor, title: &str) -> anyhow::Result<Rfq> {
        Ok(self.workflow.rfqs().create(owner, new_rfq(title, 3), t0()).await?)
    }

    pub async fn quote(&self, rfq: &Rfq, supplier: &Actor, units: i64) -> anyhow::Result<Quotation> {
        Ok(self
            .workflow
            .quotations()
            .submit(&rfq.rfq_id, supplier, &bid(units, "USD"), self.tick())
            .await?)
    }

    /// Create an RFQ, one quotation and accept it.
    pub async fn order(&self, owner: &Actor, supplier: &Actor) -> anyhow::Result<Order> {
        let rfq = self.rfq(owner, "Main engine spares").await?;
        let q = self.quote(&rfq, supplier, 12_500).await?;
        Ok(self
            .workflow
            .quotations()
            .accept(&q.quotation_id, owner, self.tick())
            .await?)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
