/*!
 * # Metrics Module
 *
 * Business counters exported in Prometheus text format at `/metrics`.
 */

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref ORDERS_PLACED: IntCounter =
        IntCounter::new("orders_placed_total", "Total number of orders placed")
            .expect("metric can be created");
    pub static ref ORDERS_CANCELLED: IntCounter =
        IntCounter::new("orders_cancelled_total", "Total number of orders cancelled")
            .expect("metric can be created");
    pub static ref STOCK_CONFLICTS: IntCounter = IntCounter::new(
        "order_stock_conflicts_total",
        "Checkouts rejected because a book ran out of stock"
    )
    .expect("metric can be created");
    pub static ref SHIPMENTS_CREATED: IntCounter = IntCounter::new(
        "shipments_created_total",
        "Parcels created with the shipping provider"
    )
    .expect("metric can be created");
    pub static ref SHIPMENT_FAILURES: IntCounter = IntCounter::new(
        "shipment_failures_total",
        "Parcel creation attempts rejected by the shipping provider"
    )
    .expect("metric can be created");
    pub static ref SHIPPING_WEBHOOK_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "shipping_webhook_events_total",
            "Carrier webhook events by processing outcome"
        ),
        &["outcome"]
    )
    .expect("metric can be created");
}

/// Register every collector with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ORDERS_PLACED.clone()),
        Box::new(ORDERS_CANCELLED.clone()),
        Box::new(STOCK_CONFLICTS.clone()),
        Box::new(SHIPMENTS_CREATED.clone()),
        Box::new(SHIPMENT_FAILURES.clone()),
        Box::new(SHIPPING_WEBHOOK_EVENTS.clone()),
    ];
    for collector in collectors {
        // AlreadyReg on repeated calls is expected
        let _ = REGISTRY.register(collector);
    }
}

pub fn record_webhook_outcome(outcome: &str) {
    SHIPPING_WEBHOOK_EVENTS.with_label_values(&[outcome]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    register_metrics();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    match render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
