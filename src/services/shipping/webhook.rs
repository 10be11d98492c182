use super::status_mapping::map_carrier_status;
use crate::{
    entities::shipping_event,
    errors::ServiceError,
    metrics,
    services::orders::{CarrierUpdate, OrderService},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-yalidine-signature";
const STATUS_UPDATED: &str = "parcel_status_updated";
/// Outcome stored while an event is being applied
const OUTCOME_PENDING: &str = "pending";

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub occurred_at: Option<String>,
    #[serde(default)]
    pub data: WebhookEventData,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEventData {
    pub tracking: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Stale,
    Duplicate,
    IgnoredType,
    UnknownStatus,
    UnknownTracking,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Applied => "applied",
            EventOutcome::Stale => "stale",
            EventOutcome::Duplicate => "duplicate",
            EventOutcome::IgnoredType => "ignored_type",
            EventOutcome::UnknownStatus => "unknown_status",
            EventOutcome::UnknownTracking => "unknown_tracking",
        }
    }
}

/// Per-outcome counts for one delivery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WebhookSummary {
    pub received: usize,
    pub applied: usize,
    pub stale: usize,
    pub duplicates: usize,
    pub ignored: usize,
    pub unknown_status: usize,
    pub unknown_tracking: usize,
}

impl WebhookSummary {
    fn record(&mut self, outcome: EventOutcome) {
        self.received += 1;
        match outcome {
            EventOutcome::Applied => self.applied += 1,
            EventOutcome::Stale => self.stale += 1,
            EventOutcome::Duplicate => self.duplicates += 1,
            EventOutcome::IgnoredType => self.ignored += 1,
            EventOutcome::UnknownStatus => self.unknown_status += 1,
            EventOutcome::UnknownTracking => self.unknown_tracking += 1,
        }
    }
}

/// Yalidine accepts either RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC)
fn parse_occurred_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Receives carrier status pushes and moves orders forward
#[derive(Clone)]
pub struct ShippingWebhookService {
    db: Arc<DatabaseConnection>,
    orders: Arc<OrderService>,
    secret: Option<String>,
}

impl ShippingWebhookService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: Arc<OrderService>,
        secret: Option<String>,
    ) -> Self {
        Self {
            db,
            orders,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Hex HMAC-SHA256 of the raw body. Skipped when no secret is configured.
    pub fn verify_signature(&self, body: &[u8], signature: Option<&str>) -> Result<(), ServiceError> {
        let Some(secret) = self.secret.as_deref() else {
            return Ok(());
        };
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("missing webhook signature".into()))?;
        let expected = hex::decode(signature)
            .map_err(|_| ServiceError::Unauthorized("malformed webhook signature".into()))?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("HMAC key: {}", e)))?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| ServiceError::Unauthorized("invalid webhook signature".into()))
    }

    #[instrument(skip_all, fields(bytes = body.len()))]
    pub async fn handle(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookSummary, ServiceError> {
        self.verify_signature(body, signature)?;
        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| ServiceError::InvalidInput(format!("malformed webhook payload: {}", e)))?;

        let mut summary = WebhookSummary::default();
        for event in payload.events {
            let outcome = self.process_event(&payload.event_type, event).await?;
            metrics::record_webhook_outcome(outcome.as_str());
            summary.record(outcome);
        }
        info!(?summary, event_type = %payload.event_type, "shipping webhook processed");
        Ok(summary)
    }

    async fn process_event(
        &self,
        event_type: &str,
        event: WebhookEvent,
    ) -> Result<EventOutcome, ServiceError> {
        let event_id = event.event_id.trim();
        if event_id.is_empty() {
            return Err(ServiceError::InvalidInput("webhook event without event_id".into()));
        }

        let tracking = event
            .data
            .tracking
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let status_label = event.data.status.as_deref();

        // Claim the event id first; the unique key makes concurrent redeliveries lose here
        let claim = shipping_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            event_id: Set(event_id.to_string()),
            event_type: Set(event_type.to_string()),
            tracking_number: Set(tracking.map(str::to_string)),
            carrier_status: Set(event.data.status.clone()),
            order_id: Set(None),
            outcome: Set(OUTCOME_PENDING.to_string()),
            occurred_at: Set(event.occurred_at.as_deref().and_then(parse_occurred_at)),
            received_at: Set(Utc::now()),
        };
        let inserted = shipping_event::Entity::insert(claim)
            .on_conflict(
                OnConflict::column(shipping_event::Column::EventId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        if inserted == 0 {
            debug!(event_id, "duplicate webhook event");
            return Ok(EventOutcome::Duplicate);
        }

        match self.apply_event(event_id, event_type, tracking, status_label).await {
            Ok((outcome, order_id)) => {
                shipping_event::Entity::update_many()
                    .col_expr(shipping_event::Column::Outcome, Expr::value(outcome.as_str()))
                    .col_expr(shipping_event::Column::OrderId, Expr::value(order_id))
                    .filter(shipping_event::Column::EventId.eq(event_id))
                    .exec(&*self.db)
                    .await?;
                Ok(outcome)
            }
            Err(e) => {
                // Release the claim so the carrier's retry is applied
                if let Err(cleanup) = shipping_event::Entity::delete_many()
                    .filter(shipping_event::Column::EventId.eq(event_id))
                    .exec(&*self.db)
                    .await
                {
                    warn!(event_id, error = %cleanup, "webhook event claim not released");
                }
                Err(e)
            }
        }
    }

    async fn apply_event(
        &self,
        event_id: &str,
        event_type: &str,
        tracking: Option<&str>,
        status_label: Option<&str>,
    ) -> Result<(EventOutcome, Option<Uuid>), ServiceError> {
        Ok(if event_type != STATUS_UPDATED {
            (EventOutcome::IgnoredType, None)
        } else {
            match (tracking, status_label.and_then(map_carrier_status)) {
                (_, None) => {
                    warn!(event_id, status = ?status_label, "unmapped carrier status");
                    (EventOutcome::UnknownStatus, None)
                }
                (None, Some(_)) => (EventOutcome::UnknownTracking, None),
                (Some(tracking), Some(reported)) => {
                    match self.orders.apply_carrier_status(tracking, reported).await? {
                        CarrierUpdate::Applied { order_id, .. } => {
                            (EventOutcome::Applied, Some(order_id))
                        }
                        CarrierUpdate::Stale { order_id, current } => {
                            debug!(event_id, %current, %reported, "carrier status does not advance order");
                            (EventOutcome::Stale, Some(order_id))
                        }
                        CarrierUpdate::UnknownTracking => {
                            warn!(event_id, tracking, "no order for tracking number");
                            (EventOutcome::UnknownTracking, None)
                        }
                    }
                }
            }
        })
    }
}

/// Hex HMAC-SHA256 signature, as the carrier computes it
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("HMAC key: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn occurred_at_formats() {
        let rfc = parse_occurred_at("2024-05-02T08:15:00+01:00").unwrap();
        assert_eq!(rfc.hour(), 7);
        let plain = parse_occurred_at("2024-05-02 08:15:00").unwrap();
        assert_eq!((plain.day(), plain.hour()), (2, 8));
        assert!(parse_occurred_at("yesterday").is_none());
    }

    #[test]
    fn summary_counts_each_outcome() {
        let mut summary = WebhookSummary::default();
        summary.record(EventOutcome::Applied);
        summary.record(EventOutcome::Duplicate);
        summary.record(EventOutcome::Duplicate);
        assert_eq!(summary.received, 3);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.duplicates, 2);
    }

    #[test]
    fn payload_ignores_extra_fields() {
        let raw = r#"{"type":"parcel_status_updated","events":[{"event_id":"e1","occurred_at":"2024-05-02 08:15:00","data":{"tracking":"yal-123","status":"Livré","commune_name":"Kouba"}}]}"#;
        let payload: WebhookPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.events.len(), 1);
        assert_eq!(payload.events[0].data.tracking.as_deref(), Some("yal-123"));
    }

    #[test]
    fn signature_matches_hex_hmac() {
        let signature = sign_payload("s3cret", b"{}").unwrap();
        assert_eq!(signature.len(), 64);
        assert_eq!(sign_payload("s3cret", b"{}").unwrap(), signature);
        assert_ne!(sign_payload("other", b"{}").unwrap(), signature);
    }
}
