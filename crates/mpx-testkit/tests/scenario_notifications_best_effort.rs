//! Notifications leave through the async dispatcher after commit; delivery
//! failures are counted and logged, never surfaced to the workflow.

use std::sync::Arc;
use std::time::Duration;

use mpx_notify::{NotificationDispatcher, NotificationKind};
use mpx_schemas::{Actor, OrderStatus};
use mpx_store::{EntityStore, MemoryStore};
use mpx_testkit::{bid, new_rfq, t0, FailingSink, RecordingSink};
use mpx_workflow::{RetryPolicy, TransitionRequest, Workflow};

#[tokio::test]
async fn failing_sink_does_not_roll_back_workflow() -> anyhow::Result<()> {
    let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
    let (dispatcher, worker) = NotificationDispatcher::spawn(Arc::new(FailingSink), 16);
    let stats = dispatcher.stats();
    let wf = Workflow::new(store, Arc::new(dispatcher), RetryPolicy::default());

    let owner = Actor::shipowner("so-1");
    let supplier = Actor::supplier("sup-1");
    let rfq = wf.rfqs().create(&owner, new_rfq("Paint 400l", 2), t0()).await?;
    let q = wf
        .quotations()
        .submit(&rfq.rfq_id, &supplier, &bid(3_200, "SGD"), t0() + chrono::Duration::hours(1))
        .await?;
    let order = wf
        .quotations()
        .accept(&q.quotation_id, &owner, t0() + chrono::Duration::hours(2))
        .await?;

    assert_eq!(wf.orders().get(&order.order_id).await?.order_id, order.order_id);
    assert_eq!(q.currency, "SGD");

    // dropping the workflow drops the last dispatcher handle; the worker
    // drains the queue and exits
    drop(wf);
    tokio::time::timeout(Duration::from_secs(5), worker).await??;
    assert_eq!(stats.failed(), 2);
    assert_eq!(stats.delivered(), 0);
    Ok(())
}

#[tokio::test]
async fn recording_sink_sees_counterparty_events() -> anyhow::Result<()> {
    let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::new());
    let (dispatcher, _worker) = NotificationDispatcher::spawn(sink.clone(), 16);
    let wf = Workflow::new(store, Arc::new(dispatcher), RetryPolicy::default());

    let owner = Actor::shipowner("so-1");
    let supplier = Actor::supplier("sup-1");
    let rfq = wf.rfqs().create(&owner, new_rfq("Paint 400l", 2), t0()).await?;
    let q = wf
        .quotations()
        .submit(&rfq.rfq_id, &supplier, &bid(3_200, "USD"), t0() + chrono::Duration::hours(1))
        .await?;
    let order = wf
        .quotations()
        .accept(&q.quotation_id, &owner, t0() + chrono::Duration::hours(2))
        .await?;
    wf.orders()
        .transition(
            &TransitionRequest {
                order_id: order.order_id.clone(),
                target: OrderStatus::PendingPayment,
                description: None,
                request_id: None,
            },
            &supplier,
            t0() + chrono::Duration::hours(3),
        )
        .await?;

    let got = sink.wait_for(3, Duration::from_secs(5)).await;
    let seen: Vec<(&str, NotificationKind)> = got
        .iter()
        .map(|n| (n.user_id.as_str(), n.kind))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("so-1", NotificationKind::QuotationReceived),
            ("sup-1", NotificationKind::QuotationAccepted),
            ("so-1", NotificationKind::OrderStatusChanged),
        ]
    );
    assert_eq!(got[1].payload["orderId"], order.order_id.as_str());
    Ok(())
}
