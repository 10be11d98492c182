use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Customer order, placed by a registered user or a guest
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = Order)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub unique_id: String,
    pub user_id: Option<Uuid>,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub wilaya: String,
    pub city: String,
    pub street_address: String,
    pub shipping_method: ShippingMethod,
    pub stopdesk_id: Option<String>,
    pub shipping_provider: ShippingProviderKind,
    pub tracking_number: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub delivery_fee: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum OrderStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "CONFIRMED")]
    Confirmed,
    #[sea_orm(string_value = "SHIPPED")]
    Shipped,
    #[sea_orm(string_value = "DELIVERED")]
    Delivered,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
    #[sea_orm(string_value = "RETURNED")]
    Returned,
}

impl OrderStatus {
    /// Position along the fulfilment path. Delivered and returned share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::Shipped => 2,
            OrderStatus::Delivered | OrderStatus::Returned => 3,
            OrderStatus::Cancelled => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Returned
        )
    }

    /// Transitions an administrator may apply by hand
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Shipped)
                | (Confirmed, Cancelled)
                | (Shipped, Delivered)
                | (Shipped, Returned)
        )
    }

    /// Whether a carrier-reported status should replace the current one
    pub fn advanced_by(&self, reported: OrderStatus) -> bool {
        !self.is_terminal()
            && reported != OrderStatus::Cancelled
            && reported.rank() > self.rank()
    }

    /// Statuses whose orders still count as sales
    pub fn counts_as_sale(&self) -> bool {
        !matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingMethod {
    #[sea_orm(string_value = "HOME_DELIVERY")]
    HomeDelivery,
    #[sea_orm(string_value = "STOPDESK")]
    Stopdesk,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingProviderKind {
    #[sea_orm(string_value = "YALIDINE")]
    Yalidine,
    #[sea_orm(string_value = "MANUAL")]
    Manual,
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;
    use test_case::test_case;

    #[test_case(Pending, Confirmed, true)]
    #[test_case(Pending, Cancelled, true)]
    #[test_case(Pending, Shipped, false)]
    #[test_case(Confirmed, Shipped, true)]
    #[test_case(Confirmed, Cancelled, true)]
    #[test_case(Shipped, Delivered, true)]
    #[test_case(Shipped, Returned, true)]
    #[test_case(Shipped, Cancelled, false)]
    #[test_case(Delivered, Returned, false)]
    #[test_case(Cancelled, Pending, false)]
    #[test_case(Returned, Shipped, false)]
    fn manual_transitions(from: OrderStatus, to: OrderStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test_case(Pending, Shipped, true)]
    #[test_case(Confirmed, Delivered, true)]
    #[test_case(Shipped, Confirmed, false)]
    #[test_case(Shipped, Shipped, false)]
    #[test_case(Shipped, Returned, true)]
    #[test_case(Delivered, Returned, false)]
    #[test_case(Returned, Delivered, false)]
    #[test_case(Cancelled, Shipped, false)]
    fn carrier_updates_only_move_forward(current: OrderStatus, reported: OrderStatus, applies: bool) {
        assert_eq!(current.advanced_by(reported), applies);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), Shipped);
        assert_eq!(Cancelled.to_string(), "CANCELLED");
    }
}
