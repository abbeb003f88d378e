//! Conflicting requests racing on one document: the loser either applies
//! on top of the winner or sees the winner's state, and the audit chain
//! stays intact either way.

use mpx_audit::verify_timeline;
use mpx_schemas::{Actor, OrderStatus, QuotationStatus, RfqStatus};
use mpx_testkit::Harness;
use mpx_workflow::{order_id_for, TransitionRequest, WorkflowError};

const ROUNDS: usize = 16;

fn request(order_id: &str, target: OrderStatus) -> TransitionRequest {
    TransitionRequest {
        order_id: order_id.to_string(),
        target,
        description: None,
        request_id: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn approve_racing_cancel_keeps_one_consistent_timeline() -> anyhow::Result<()> {
    let owner = Actor::shipowner("so-1");
    let supplier = Actor::supplier("sup-1");

    for _ in 0..ROUNDS {
        let h = Harness::new();
        let order = h.order(&owner, &supplier).await?;
        let (approve_at, cancel_at) = (h.tick(), h.tick());

        let approve = {
            let wf = h.workflow.clone();
            let supplier = supplier.clone();
            let req = request(&order.order_id, OrderStatus::PendingPayment);
            tokio::spawn(async move { wf.orders().transition(&req, &supplier, approve_at).await })
        };
        let cancel = {
            let wf = h.workflow.clone();
            let owner = owner.clone();
            let req = request(&order.order_id, OrderStatus::Cancelled);
            tokio::spawn(async move { wf.orders().transition(&req, &owner, cancel_at).await })
        };

        // cancelling is legal from both pending states, so it always lands
        cancel.await??;
        let mut successes = 1;
        match approve.await? {
            Ok(_) => successes += 1,
            Err(WorkflowError::InvalidState { current, .. }) => assert_eq!(current, "cancelled"),
            Err(other) => panic!("unexpected error: {other:?}"),
        }

        let stored = h.workflow.orders().get(&order.order_id).await?;
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(stored.timeline.len(), 1 + successes);
        assert!(verify_timeline(&stored.timeline)?.is_valid());

        let statuses: Vec<_> = stored.timeline.iter().map(|e| e.status.as_str()).collect();
        let expected = if successes == 2 {
            vec!["created", "pending_payment", "cancelled"]
        } else {
            vec!["created", "cancelled"]
        };
        assert_eq!(statuses, expected);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn accept_racing_reject_on_one_quotation() -> anyhow::Result<()> {
    let owner = Actor::shipowner("so-1");
    let supplier = Actor::supplier("sup-1");

    for _ in 0..ROUNDS {
        let h = Harness::new();
        let rfq = h.rfq(&owner, "Anchor chain 3 shackles").await?;
        let q = h.quote(&rfq, &supplier, 8_400).await?;
        let (accept_at, reject_at) = (h.tick(), h.tick());

        let accept = {
            let wf = h.workflow.clone();
            let owner = owner.clone();
            let qid = q.quotation_id.clone();
            tokio::spawn(async move { wf.quotations().accept(&qid, &owner, accept_at).await })
        };
        let reject = {
            let wf = h.workflow.clone();
            let owner = owner.clone();
            let qid = q.quotation_id.clone();
            tokio::spawn(async move {
                wf.quotations().reject(&qid, &owner, Some("price too high"), reject_at).await
            })
        };

        let accepted = match accept.await? {
            Ok(_) => true,
            Err(WorkflowError::InvalidState { .. }) => false,
            Err(other) => panic!("unexpected accept error: {other:?}"),
        };
        let rejected = match reject.await? {
            Ok(_) => true,
            Err(WorkflowError::InvalidState { .. }) => false,
            Err(other) => panic!("unexpected reject error: {other:?}"),
        };
        assert!(accepted ^ rejected, "exactly one of accept and reject must win");

        let stored = h.workflow.quotations().get(&q.quotation_id).await?;
        let rfq = h.workflow.rfqs().get(&rfq.rfq_id).await?;
        if accepted {
            assert_eq!(stored.status, QuotationStatus::Accepted);
            let order = h.workflow.orders().get(&order_id_for(&q.quotation_id)).await?;
            assert_eq!(order.quotation_id, q.quotation_id);
            assert_eq!(rfq.status, RfqStatus::Awarded);
            assert_eq!(rfq.awarded_quotation_id.as_deref(), Some(q.quotation_id.as_str()));
        } else {
            assert_eq!(stored.status, QuotationStatus::Rejected);
            assert_eq!(stored.rejection_reason.as_deref(), Some("price too high"));
            assert_eq!(h.memory.count("orders").await, 0);
            assert_eq!(rfq.status, RfqStatus::Open);
        }
    }
    Ok(())
}
