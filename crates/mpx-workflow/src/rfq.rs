//! RFQ manager.

use chrono::{DateTime, Utc};
use mpx_schemas::{Actor, Rfq, RfqStatus, Role, VesselInfo};
use mpx_store::Transaction;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{run_transaction, Workflow, WorkflowError};

/// Caller-supplied fields of a new RFQ.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRfq {
    // absent text fields decode as empty and fail as "<field> is required"
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub vessel_info: Option<VesselInfo>,
    pub deadline: DateTime<Utc>,
}

pub struct RfqManager<'a> {
    wf: &'a Workflow,
}

impl<'a> RfqManager<'a> {
    pub(crate) fn new(wf: &'a Workflow) -> Self {
        Self { wf }
    }

    /// Open a new RFQ owned by `actor`.
    pub async fn create(
        &self,
        actor: &Actor,
        fields: NewRfq,
        now: DateTime<Utc>,
    ) -> Result<Rfq, WorkflowError> {
        match actor.role {
            Role::Shipowner => {}
            Role::Supplier | Role::Admin => return Err(WorkflowError::Authorization),
        }
        let rfq = build_rfq(actor, fields, now)?;

        let created = run_transaction(&self.wf.store, &self.wf.retry, "rfq.create", |mut tx| {
            let rfq = rfq.clone();
            async move {
                tx.create(&rfq)?;
                Ok((tx, rfq))
            }
        })
        .await?;

        info!(rfq_id = %created.rfq_id, owner_id = %created.owner_id, deadline = %created.deadline, "rfq created");
        Ok(created)
    }

    /// Close an open RFQ without awarding it.
    pub async fn close(
        &self,
        rfq_id: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Rfq, WorkflowError> {
        self.finish(rfq_id, actor, RfqStatus::Closed, now).await
    }

    /// Withdraw an open RFQ.
    pub async fn cancel(
        &self,
        rfq_id: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Rfq, WorkflowError> {
        self.finish(rfq_id, actor, RfqStatus::Cancelled, now).await
    }

    async fn finish(
        &self,
        rfq_id: &str,
        actor: &Actor,
        target: RfqStatus,
        now: DateTime<Utc>,
    ) -> Result<Rfq, WorkflowError> {
        let op = match target {
            RfqStatus::Closed => "rfq.close",
            _ => "rfq.cancel",
        };
        let rfq = run_transaction(&self.wf.store, &self.wf.retry, op, |mut tx| async move {
            let mut rfq = load_rfq(&mut tx, rfq_id).await?;
            if actor.id != rfq.owner_id {
                return Err(WorkflowError::Authorization);
            }
            if rfq.status != RfqStatus::Open {
                return Err(WorkflowError::invalid_state::<Rfq>(
                    rfq_id,
                    rfq.status,
                    format!("only an open rfq can be {target}"),
                ));
            }
            rfq.status = target;
            rfq.updated_at = now;
            tx.update(&rfq)?;
            Ok((tx, rfq))
        })
        .await?;

        info!(rfq_id, status = %rfq.status, "rfq finished");
        Ok(rfq)
    }

    pub async fn get(&self, rfq_id: &str) -> Result<Rfq, WorkflowError> {
        debug!(rfq_id, "rfq get");
        let mut tx = self.wf.reader();
        load_rfq(&mut tx, rfq_id).await
    }
}

fn build_rfq(actor: &Actor, fields: NewRfq, now: DateTime<Utc>) -> Result<Rfq, WorkflowError> {
    let title = required("title", &fields.title)?;
    let description = required("description", &fields.description)?;
    let category = required("category", &fields.category)?;
    if fields.deadline <= now {
        return Err(WorkflowError::validation("deadline must be in the future"));
    }
    let subcategory = fields
        .subcategory
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if let Some(v) = &fields.vessel_info {
        if v.name.trim().is_empty() {
            return Err(WorkflowError::validation("vesselInfo.name is required"));
        }
    }

    Ok(Rfq {
        rfq_id: Uuid::new_v4().to_string(),
        owner_id: actor.id.clone(),
        title,
        description,
        category,
        subcategory,
        vessel_info: fields.vessel_info,
        deadline: fields.deadline,
        status: RfqStatus::Open,
        quotation_count: 0,
        awarded_quotation_id: None,
        created_at: now,
        updated_at: now,
    })
}

fn required(field: &str, value: &str) -> Result<String, WorkflowError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(WorkflowError::validation(format!("{field} is required")));
    }
    Ok(v.to_string())
}

pub(crate) async fn load_rfq(tx: &mut Transaction, rfq_id: &str) -> Result<Rfq, WorkflowError> {
    tx.get::<Rfq>(rfq_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found::<Rfq>(rfq_id))
}

/// Count one more quotation against `rfq` and stage the update. Must run in
/// the transaction that creates the quotation.
pub(crate) fn increment_quotation_count(
    tx: &mut Transaction,
    rfq: &mut Rfq,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    rfq.quotation_count += 1;
    rfq.updated_at = now;
    tx.update(&*rfq)?;
    Ok(())
}

/// Award `rfq` to `quotation_id` and stage the update. Must run in the
/// transaction that accepts the quotation.
pub(crate) fn mark_awarded(
    tx: &mut Transaction,
    rfq: &mut Rfq,
    quotation_id: &str,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    if rfq.status != RfqStatus::Open || rfq.awarded_quotation_id.is_some() {
        return Err(WorkflowError::invalid_state::<Rfq>(
            &rfq.rfq_id,
            rfq.status,
            "rfq is no longer open for award",
        ));
    }
    rfq.status = RfqStatus::Awarded;
    rfq.awarded_quotation_id = Some(quotation_id.to_string());
    rfq.updated_at = now;
    tx.update(&*rfq)?;
    Ok(())
}
