//! Carrier integration: delivery quotes, parcel creation and status webhooks.

pub mod flat_rate;
pub mod status_mapping;
pub mod webhook;
pub mod yalidine;

use crate::{
    config::AppConfig,
    entities::{
        order::{self, ShippingMethod, ShippingProviderKind},
        order_item,
    },
    errors::ServiceError,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

pub use flat_rate::FlatRateProvider;
pub use status_mapping::map_carrier_status;
pub use webhook::{ShippingWebhookService, WebhookSummary};
pub use yalidine::YalidineProvider;

/// Parcel registered with a carrier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Parcel {
    /// `None` when the carrier does not hand out tracking numbers
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
}

#[async_trait]
pub trait ShippingProvider: Send + Sync {
    fn kind(&self) -> ShippingProviderKind;

    fn name(&self) -> &'static str;

    /// Delivery fee for a destination wilaya
    async fn quote(&self, wilaya: &str, method: ShippingMethod) -> Result<Decimal, ServiceError>;

    async fn create_parcel(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<Parcel, ServiceError>;

    async fn cancel_parcel(&self, tracking_number: &str) -> Result<(), ServiceError>;
}

/// Yalidine when credentials are configured, flat rates otherwise
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn ShippingProvider>, ServiceError> {
    match config.yalidine_credentials() {
        Some((api_id, api_token)) => {
            info!(base_url = %config.yalidine_base_url, "using Yalidine shipping provider");
            Ok(Arc::new(YalidineProvider::new(
                &config.yalidine_base_url,
                api_id,
                api_token,
                &config.shipping_origin_wilaya,
            )?))
        }
        None => {
            info!("Yalidine credentials absent; using flat-rate shipping");
            Ok(Arc::new(FlatRateProvider::new(
                config.flat_home_delivery_fee,
                config.flat_stopdesk_delivery_fee,
            )))
        }
    }
}
