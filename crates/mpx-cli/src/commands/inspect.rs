//! Read-only views of stored workflow documents.

use anyhow::{bail, Result};
use mpx_audit::{verify_timeline, VerifyResult};
use mpx_schemas::{micros_to_price, Order, Quotation, Rfq};
use mpx_workflow::Workflow;

fn opt<T: std::fmt::Display>(v: &Option<T>) -> String {
    v.as_ref().map(|x| x.to_string()).unwrap_or_else(|| "NULL".to_string())
}

fn rfq_lines(rfq: &Rfq) -> Vec<String> {
    vec![
        format!("rfq_id={}", rfq.rfq_id),
        format!("owner_id={}", rfq.owner_id),
        format!("title={}", rfq.title),
        format!("category={}", rfq.category),
        format!("status={}", rfq.status),
        format!("deadline={}", rfq.deadline.to_rfc3339()),
        format!("quotation_count={}", rfq.quotation_count),
        format!("awarded_quotation_id={}", opt(&rfq.awarded_quotation_id)),
    ]
}

fn quotation_line(q: &Quotation) -> String {
    format!(
        "quotation quotation_id={} supplier_id={} price={:.2} currency={} status={} created_at={}",
        q.quotation_id,
        q.supplier_id,
        micros_to_price(q.price_micros),
        q.currency,
        q.status,
        q.created_at.to_rfc3339()
    )
}

fn order_lines(order: &Order) -> Vec<String> {
    let mut out = vec![
        format!("order_id={}", order.order_id),
        format!("quotation_id={}", order.quotation_id),
        format!("rfq_id={}", order.rfq_id),
        format!("shipowner_id={}", order.shipowner_id),
        format!("supplier_id={}", order.supplier_id),
        format!("amount={:.2} {}", micros_to_price(order.amount_micros), order.currency),
        format!("status={}", order.status),
        format!("payment_status={}", order.payment_status),
    ];
    for e in &order.timeline {
        out.push(format!(
            "timeline seq={} status={} by={} at={} description={:?}",
            e.seq,
            e.status,
            e.updated_by,
            e.timestamp.to_rfc3339(),
            e.description
        ));
    }
    out
}

pub async fn show_rfq(wf: &Workflow, rfq_id: &str) -> Result<Vec<String>> {
    let rfq = wf.rfqs().get(rfq_id).await?;
    let mut out = rfq_lines(&rfq);
    for q in wf.quotations().list_for_rfq(rfq_id).await? {
        out.push(quotation_line(&q));
    }
    Ok(out)
}

pub async fn show_order(wf: &Workflow, order_id: &str) -> Result<Vec<String>> {
    let order = wf.orders().get(order_id).await?;
    Ok(order_lines(&order))
}

pub async fn list_orders(wf: &Workflow, user_id: &str) -> Result<Vec<String>> {
    let orders = wf.orders().list_for_user(user_id).await?;
    let mut out = vec![format!("user_id={} orders={}", user_id, orders.len())];
    for o in orders {
        out.push(format!(
            "order order_id={} status={} payment_status={} counterparty={}",
            o.order_id,
            o.status,
            o.payment_status,
            o.counterparty_of(user_id).unwrap_or("NULL")
        ));
    }
    Ok(out)
}

/// Fails when the chain is broken, so scripts can rely on the exit code.
pub async fn verify_order_timeline(wf: &Workflow, order_id: &str) -> Result<String> {
    let order = wf.orders().get(order_id).await?;
    match verify_timeline(&order.timeline)? {
        VerifyResult::Valid { events } => {
            Ok(format!("timeline_valid=true order_id={order_id} events={events}"))
        }
        VerifyResult::Broken { index, reason } => {
            bail!("TIMELINE_BROKEN order_id={order_id} index={index} reason={reason}")
        }
    }
}
