//! Two suppliers bid on one RFQ; the owner accepts the first bid.
//!
//! Expected end state:
//! - R1 awarded to Q1, quotationCount = 2
//! - Q1 accepted, Q2 still pending until explicitly rejected
//! - O1 derived from Q1 in pending_supplier_approval / payment pending,
//!   timeline = [created by owner]

use chrono::Duration;
use mpx_notify::NotificationKind;
use mpx_schemas::{
    Actor, OrderStatus, PaymentStatus, Quotation, QuotationStatus, Rfq, RfqStatus,
    TIMELINE_CREATED,
};
use mpx_store::EntityStore;
use mpx_testkit::{t0, Harness};
use mpx_workflow::{order_id_for, WorkflowError};

#[tokio::test]
async fn accepting_q1_awards_r1_and_creates_o1() -> anyhow::Result<()> {
    let h = Harness::new();
    let owner = Actor::shipowner("so-athena");
    let sup_a = Actor::supplier("sup-a");
    let sup_b = Actor::supplier("sup-b");

    let r1 = h.rfq(&owner, "Lube oil 20kl").await?;
    let q1 = h.quote(&r1, &sup_a, 9_800).await?;
    let q2 = h.quote(&r1, &sup_b, 10_150).await?;

    let o1 = h
        .workflow
        .quotations()
        .accept(&q1.quotation_id, &owner, t0() + Duration::hours(3))
        .await?;

    assert_eq!(o1.order_id, order_id_for(&q1.quotation_id));
    assert_eq!(o1.quotation_id, q1.quotation_id);
    assert_eq!(o1.rfq_id, r1.rfq_id);
    assert_eq!(o1.shipowner_id, "so-athena");
    assert_eq!(o1.supplier_id, "sup-a");
    assert_eq!(o1.amount_micros, q1.price_micros);
    assert_eq!(o1.currency, "USD");
    assert_eq!(o1.status, OrderStatus::PendingSupplierApproval);
    assert_eq!(o1.payment_status, PaymentStatus::Pending);
    assert_eq!(o1.timeline.len(), 1);
    assert_eq!(o1.timeline[0].status, TIMELINE_CREATED);
    assert_eq!(o1.timeline[0].updated_by, "so-athena");

    let r1 = h.workflow.rfqs().get(&r1.rfq_id).await?;
    assert_eq!(r1.status, RfqStatus::Awarded);
    assert_eq!(r1.awarded_quotation_id.as_deref(), Some(q1.quotation_id.as_str()));
    assert_eq!(r1.quotation_count, 2);

    let q1 = h.workflow.quotations().get(&q1.quotation_id).await?;
    let q2_now = h.workflow.quotations().get(&q2.quotation_id).await?;
    assert_eq!(q1.status, QuotationStatus::Accepted);
    assert_eq!(q2_now.status, QuotationStatus::Pending);

    // the persisted order matches what accept returned
    let stored = h.workflow.orders().get(&o1.order_id).await?;
    assert_eq!(stored, o1);

    assert_eq!(h.notifier.recipients(NotificationKind::QuotationReceived), vec!["so-athena", "so-athena"]);
    assert_eq!(h.notifier.recipients(NotificationKind::QuotationAccepted), vec!["sup-a"]);
    Ok(())
}

#[tokio::test]
async fn second_accept_on_awarded_rfq_is_invalid_state() -> anyhow::Result<()> {
    let h = Harness::new();
    let owner = Actor::shipowner("so-athena");
    let r1 = h.rfq(&owner, "Lube oil 20kl").await?;
    let q1 = h.quote(&r1, &Actor::supplier("sup-a"), 9_800).await?;
    let q2 = h.quote(&r1, &Actor::supplier("sup-b"), 10_150).await?;

    h.workflow.quotations().accept(&q1.quotation_id, &owner, t0() + Duration::hours(3)).await?;
    let err = h
        .workflow
        .quotations()
        .accept(&q2.quotation_id, &owner, t0() + Duration::hours(4))
        .await
        .unwrap_err();

    match err {
        WorkflowError::InvalidState { entity, current, .. } => {
            assert_eq!(entity, "rfq");
            assert_eq!(current, "awarded");
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
    assert_eq!(h.memory.count("orders").await, 1);
    Ok(())
}

#[tokio::test]
async fn reject_remaining_rejects_only_pending_after_award() -> anyhow::Result<()> {
    let h = Harness::new();
    let owner = Actor::shipowner("so-athena");
    let r1 = h.rfq(&owner, "Lube oil 20kl").await?;
    let q1 = h.quote(&r1, &Actor::supplier("sup-a"), 9_800).await?;
    let q2 = h.quote(&r1, &Actor::supplier("sup-b"), 10_150).await?;
    let q3 = h.quote(&r1, &Actor::supplier("sup-c"), 11_000).await?;

    // not while the rfq is still open
    let err = h
        .workflow
        .quotations()
        .reject_remaining(&r1.rfq_id, &owner, None, t0() + Duration::hours(2))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState { .. }));

    h.workflow
        .quotations()
        .reject(&q3.quotation_id, &owner, Some("too slow"), t0() + Duration::hours(2))
        .await?;
    h.workflow.quotations().accept(&q1.quotation_id, &owner, t0() + Duration::hours(3)).await?;
    h.notifier.clear();

    // only the owner may sweep
    let err = h
        .workflow
        .quotations()
        .reject_remaining(&r1.rfq_id, &Actor::supplier("sup-b"), None, t0() + Duration::hours(4))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization));

    let rejected = h
        .workflow
        .quotations()
        .reject_remaining(&r1.rfq_id, &owner, Some("awarded elsewhere"), t0() + Duration::hours(4))
        .await?;
    let ids: Vec<&str> = rejected.iter().map(|q| q.quotation_id.as_str()).collect();
    assert_eq!(ids, vec![q2.quotation_id.as_str()]);

    let listed = h.workflow.quotations().list_for_rfq(&r1.rfq_id).await?;
    let statuses: Vec<QuotationStatus> = listed.iter().map(|q| q.status).collect();
    assert_eq!(
        statuses,
        vec![QuotationStatus::Accepted, QuotationStatus::Rejected, QuotationStatus::Rejected]
    );
    assert_eq!(listed[1].rejection_reason.as_deref(), Some("awarded elsewhere"));
    assert_eq!(listed[2].rejection_reason.as_deref(), Some("too slow"));
    assert_eq!(h.notifier.recipients(NotificationKind::QuotationRejected), vec!["sup-b"]);

    // a second sweep finds nothing left
    let again = h
        .workflow
        .quotations()
        .reject_remaining(&r1.rfq_id, &owner, None, t0() + Duration::hours(5))
        .await?;
    assert!(again.is_empty());
    Ok(())
}

#[tokio::test]
async fn accept_and_reject_are_owner_only_and_pending_only() -> anyhow::Result<()> {
    let h = Harness::new();
    let owner = Actor::shipowner("so-athena");
    let r1 = h.rfq(&owner, "Lube oil 20kl").await?;
    let q1 = h.quote(&r1, &Actor::supplier("sup-a"), 9_800).await?;

    let stranger = Actor::shipowner("so-other");
    let err = h.workflow.quotations().accept(&q1.quotation_id, &stranger, t0()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Authorization));
    let err = h
        .workflow
        .quotations()
        .reject(&q1.quotation_id, &stranger, None, t0())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "unauthorized");

    h.workflow.quotations().reject(&q1.quotation_id, &owner, None, t0()).await?;
    let err = h.workflow.quotations().accept(&q1.quotation_id, &owner, t0()).await.unwrap_err();
    assert_eq!(err.current_state(), Some("rejected"));

    // rejection never touches the rfq
    let doc = h.store().get(<Rfq as mpx_schemas::Document>::COLLECTION, &r1.rfq_id).await?;
    let rfq: Rfq = serde_json::from_value(doc.expect("rfq exists").body)?;
    assert_eq!(rfq.status, RfqStatus::Open);
    assert_eq!(rfq.quotation_count, 1);

    let err = h.workflow.quotations().get("missing").await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { entity: "quotation", .. }));
    let _: Vec<Quotation> = h.workflow.quotations().list_for_rfq(&r1.rfq_id).await?;
    Ok(())
}
