use super::{status_mapping::normalize_label, Parcel, ShippingProvider};
use crate::{
    entities::{
        order::{self, ShippingMethod, ShippingProviderKind},
        order_item,
    },
    errors::ServiceError,
};
use async_trait::async_trait;
use reqwest::{header::HeaderMap, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Yalidine REST client
#[derive(Debug, Clone)]
pub struct YalidineProvider {
    client: reqwest::Client,
    base_url: Url,
    origin_wilaya: String,
}

#[derive(Debug, Deserialize)]
struct FeesResponse {
    #[serde(default)]
    data: Vec<WilayaFees>,
}

#[derive(Debug, Deserialize)]
struct WilayaFees {
    wilaya_name: String,
    home_fee: Decimal,
    desk_fee: Decimal,
}

#[derive(Debug, Serialize)]
struct NewParcel<'a> {
    order_id: &'a str,
    from_wilaya_name: &'a str,
    firstname: &'a str,
    familyname: &'a str,
    contact_phone: &'a str,
    address: &'a str,
    to_commune_name: &'a str,
    to_wilaya_name: &'a str,
    product_list: String,
    price: Decimal,
    do_insurance: bool,
    declared_value: Decimal,
    freeshipping: bool,
    is_stopdesk: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stopdesk_id: Option<&'a str>,
    has_exchange: bool,
}

#[derive(Debug, Deserialize)]
struct ParcelResult {
    success: bool,
    tracking: Option<String>,
    label: Option<String>,
    message: Option<String>,
}

impl YalidineProvider {
    pub fn new(
        base_url: &str,
        api_id: &str,
        api_token: &str,
        origin_wilaya: &str,
    ) -> Result<Self, ServiceError> {
        // Url::join drops the last segment unless the base ends with '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| ServiceError::InvalidInput(format!("Invalid Yalidine base URL: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-API-ID",
            api_id
                .parse()
                .map_err(|_| ServiceError::InvalidInput("Invalid Yalidine API id".into()))?,
        );
        headers.insert(
            "X-API-TOKEN",
            api_token
                .parse()
                .map_err(|_| ServiceError::InvalidInput("Invalid Yalidine API token".into()))?,
        );

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            origin_wilaya: origin_wilaya.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path)
            .map_err(|e| ServiceError::InternalError(format!("Invalid Yalidine path: {}", e)))
    }

    async fn check_status(
        response: reqwest::Response,
        action: &str,
    ) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(%status, action, body = %body, "Yalidine request failed");
        Err(ServiceError::ExternalServiceError(format!(
            "Yalidine {} failed with status {}",
            action, status
        )))
    }
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    ServiceError::ExternalServiceError(format!("Yalidine unreachable: {}", e))
}

/// Split "First Last Name" into Yalidine's first name / family name pair
fn split_name(full_name: &str) -> (&str, &str) {
    let trimmed = full_name.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) if !rest.trim().is_empty() => (first, rest.trim()),
        _ => (trimmed, trimmed),
    }
}

fn product_list(items: &[order_item::Model]) -> String {
    items
        .iter()
        .map(|item| format!("{} x{}", item.title, item.quantity))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl ShippingProvider for YalidineProvider {
    fn kind(&self) -> ShippingProviderKind {
        ShippingProviderKind::Yalidine
    }

    fn name(&self) -> &'static str {
        "yalidine"
    }

    #[instrument(skip(self))]
    async fn quote(&self, wilaya: &str, method: ShippingMethod) -> Result<Decimal, ServiceError> {
        let mut url = self.endpoint("deliveryfees/")?;
        url.query_pairs_mut().append_pair("wilaya_name", wilaya.trim());

        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let fees: FeesResponse = Self::check_status(response, "fee lookup")
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        let wanted = normalize_label(wilaya);
        let entry = fees
            .data
            .iter()
            .find(|f| normalize_label(&f.wilaya_name) == wanted)
            .ok_or_else(|| ServiceError::ValidationError(format!("Unknown wilaya '{}'", wilaya)))?;

        Ok(match method {
            ShippingMethod::HomeDelivery => entry.home_fee,
            ShippingMethod::Stopdesk => entry.desk_fee,
        })
    }

    #[instrument(skip(self, order, items), fields(order = %order.unique_id))]
    async fn create_parcel(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<Parcel, ServiceError> {
        let (firstname, familyname) = split_name(&order.full_name);
        let is_stopdesk = order.shipping_method == ShippingMethod::Stopdesk;
        let body = vec![NewParcel {
            order_id: &order.unique_id,
            from_wilaya_name: &self.origin_wilaya,
            firstname,
            familyname,
            contact_phone: &order.phone,
            address: &order.street_address,
            to_commune_name: &order.city,
            to_wilaya_name: &order.wilaya,
            product_list: product_list(items),
            price: order.total_amount,
            do_insurance: false,
            declared_value: order.subtotal,
            freeshipping: order.delivery_fee.is_zero(),
            is_stopdesk,
            stopdesk_id: order.stopdesk_id.as_deref().filter(|_| is_stopdesk),
            has_exchange: false,
        }];

        let response = self
            .client
            .post(self.endpoint("parcels/")?)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let mut results: HashMap<String, ParcelResult> =
            Self::check_status(response, "parcel creation")
                .await?
                .json()
                .await
                .map_err(transport_error)?;

        let result = results.remove(&order.unique_id).ok_or_else(|| {
            ServiceError::ExternalServiceError(format!(
                "Yalidine response did not mention order {}",
                order.unique_id
            ))
        })?;

        if !result.success {
            let message = result.message.unwrap_or_else(|| "rejected".to_string());
            warn!(order = %order.unique_id, %message, "Yalidine rejected parcel");
            return Err(ServiceError::ExternalServiceError(format!(
                "Yalidine rejected parcel: {}",
                message
            )));
        }

        let tracking = result.tracking.filter(|t| !t.is_empty()).ok_or_else(|| {
            ServiceError::ExternalServiceError("Yalidine returned no tracking number".into())
        })?;
        info!(order = %order.unique_id, %tracking, "Yalidine parcel created");

        Ok(Parcel {
            tracking_number: Some(tracking),
            label_url: result.label,
        })
    }

    #[instrument(skip(self))]
    async fn cancel_parcel(&self, tracking_number: &str) -> Result<(), ServiceError> {
        let url = self.endpoint(&format!("parcels/{}", tracking_number))?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!(tracking_number, "parcel already gone at Yalidine");
            return Ok(());
        }
        Self::check_status(response, "parcel deletion").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_split_on_first_space() {
        assert_eq!(split_name("Amina Ben Ali"), ("Amina", "Ben Ali"));
        assert_eq!(split_name("Madjid"), ("Madjid", "Madjid"));
        assert_eq!(split_name("  Kamel   Daoud "), ("Kamel", "Daoud"));
    }

    #[test]
    fn base_url_without_trailing_slash_keeps_version_segment() {
        let provider =
            YalidineProvider::new("https://api.yalidine.app/v1", "id", "token", "Alger").unwrap();
        assert_eq!(
            provider.endpoint("parcels/").unwrap().as_str(),
            "https://api.yalidine.app/v1/parcels/"
        );
    }
}
