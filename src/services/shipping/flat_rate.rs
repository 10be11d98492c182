use super::{Parcel, ShippingProvider};
use crate::{
    entities::{
        order::{self, ShippingMethod, ShippingProviderKind},
        order_item,
    },
    errors::ServiceError,
};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Fixed fees per delivery method; parcels are handed to a courier by hand
#[derive(Debug, Clone)]
pub struct FlatRateProvider {
    home_fee: Decimal,
    stopdesk_fee: Decimal,
}

impl FlatRateProvider {
    pub fn new(home_fee: Decimal, stopdesk_fee: Decimal) -> Self {
        Self {
            home_fee,
            stopdesk_fee,
        }
    }
}

#[async_trait]
impl ShippingProvider for FlatRateProvider {
    fn kind(&self) -> ShippingProviderKind {
        ShippingProviderKind::Manual
    }

    fn name(&self) -> &'static str {
        "manual"
    }

    async fn quote(&self, wilaya: &str, method: ShippingMethod) -> Result<Decimal, ServiceError> {
        if wilaya.trim().is_empty() {
            return Err(ServiceError::ValidationError("wilaya is required".into()));
        }
        Ok(match method {
            ShippingMethod::HomeDelivery => self.home_fee,
            ShippingMethod::Stopdesk => self.stopdesk_fee,
        })
    }

    async fn create_parcel(
        &self,
        _order: &order::Model,
        _items: &[order_item::Model],
    ) -> Result<Parcel, ServiceError> {
        Ok(Parcel {
            tracking_number: None,
            label_url: None,
        })
    }

    async fn cancel_parcel(&self, _tracking_number: &str) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn quotes_by_method() {
        let provider = FlatRateProvider::new(dec!(600), dec!(400));
        assert_eq!(
            provider.quote("Oran", ShippingMethod::HomeDelivery).await.unwrap(),
            dec!(600)
        );
        assert_eq!(
            provider.quote("Oran", ShippingMethod::Stopdesk).await.unwrap(),
            dec!(400)
        );
        assert!(provider.quote(" ", ShippingMethod::Stopdesk).await.is_err());
    }
}
