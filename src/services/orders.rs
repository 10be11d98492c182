use crate::{
    auth::{consts, AuthUser},
    db::supports_row_locks,
    entities::{
        book, book_pack,
        order::{self, OrderStatus, ShippingMethod, ShippingProviderKind},
        order_item::{self, OrderItemType},
    },
    errors::ServiceError,
    events::{Event, EventSender, StatusSource},
    metrics,
    services::{
        book_packs::pack_book_ids, ilike, optional_text, page_offset, required_text,
        shipping::ShippingProvider,
    },
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

lazy_static! {
    /// Algerian mobile (05/06/07 + 8 digits) or landline numbers, local or international form
    static ref PHONE_REGEX: Regex =
        Regex::new(r"^(?:\+213|00213|0)(?:[5-7]\d{8}|[2-4]\d{7})$").expect("valid regex");
}

const MAX_LINE_QUANTITY: i32 = 50;
const UNIQUE_ID_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderLineInput {
    pub book_id: Option<Uuid>,
    pub book_pack_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_order_shape"))]
pub struct PlaceOrderInput {
    #[validate(length(min = 1, max = 150))]
    pub full_name: String,
    #[validate(regex = "PHONE_REGEX")]
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub wilaya: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 500))]
    pub street_address: String,
    pub shipping_method: ShippingMethod,
    /// Carrier desk, required for `STOPDESK`
    pub stopdesk_id: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub items: Vec<OrderLineInput>,
}

fn validate_order_shape(input: &PlaceOrderInput) -> Result<(), ValidationError> {
    if input.shipping_method == ShippingMethod::Stopdesk
        && input
            .stopdesk_id
            .as_deref()
            .map_or(true, |s| s.trim().is_empty())
    {
        let mut err = ValidationError::new("stopdesk_id");
        err.message = Some("stopdesk_id is required for stopdesk delivery".into());
        return Err(err);
    }
    for line in &input.items {
        if line.book_id.is_some() == line.book_pack_id.is_some() {
            let mut err = ValidationError::new("order_line");
            err.message = Some("each line needs exactly one of book_id or book_pack_id".into());
            return Err(err);
        }
        if !(1..=MAX_LINE_QUANTITY).contains(&line.quantity) {
            let mut err = ValidationError::new("quantity");
            err.message = Some(format!("quantity must be between 1 and {}", MAX_LINE_QUANTITY).into());
            return Err(err);
        }
    }
    Ok(())
}

/// Strip the separators customers like to type
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Created at or after
    pub from: Option<DateTime<Utc>>,
    /// Created at or before
    pub to: Option<DateTime<Utc>>,
    /// Matches the order reference, phone or customer name
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusInput {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateShipmentInput {
    /// Tracking number of a parcel registered outside the API
    #[validate(length(min = 1, max = 100))]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShipmentDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub label_url: Option<String>,
}

/// Result of a carrier status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarrierUpdate {
    Applied {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    Stale {
        order_id: Uuid,
        current: OrderStatus,
    },
    UnknownTracking,
}

/// Who is asking for a status change, which decides what is allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionRule {
    Manual,
    Customer,
    Carrier,
}

impl TransitionRule {
    fn allows(self, current: OrderStatus, next: OrderStatus) -> bool {
        match self {
            TransitionRule::Manual => current.can_transition_to(next),
            TransitionRule::Customer => {
                current == OrderStatus::Pending && next == OrderStatus::Cancelled
            }
            TransitionRule::Carrier => current.advanced_by(next),
        }
    }

    fn source(self) -> StatusSource {
        match self {
            TransitionRule::Manual => StatusSource::Admin,
            TransitionRule::Customer => StatusSource::Customer,
            TransitionRule::Carrier => StatusSource::CarrierWebhook,
        }
    }
}

enum TransitionOutcome {
    Applied {
        order: order::Model,
        old_status: OrderStatus,
    },
    Rejected(order::Model),
}

/// Line resolved against the catalog inside the checkout transaction
struct PricedLine {
    item_type: OrderItemType,
    book_id: Option<Uuid>,
    book_pack_id: Option<Uuid>,
    title: String,
    quantity: i32,
    unit_price: Decimal,
}

/// Generates `EL-YYYYMMDD-XXXXXX` references
pub fn generate_unique_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("EL-{}-{}", now.format("%Y%m%d"), suffix)
}

/// Order placement and fulfilment
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    shipping: Arc<dyn ShippingProvider>,
    free_shipping_threshold: Option<Decimal>,
    low_stock_threshold: i32,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        shipping: Arc<dyn ShippingProvider>,
        free_shipping_threshold: Option<Decimal>,
        low_stock_threshold: i32,
    ) -> Self {
        Self {
            db,
            event_sender,
            shipping,
            free_shipping_threshold,
            low_stock_threshold,
        }
    }

    /// Checkout: quote delivery, then lock, check and decrement stock in one transaction
    #[instrument(skip(self, input, customer), fields(items = input.items.len()))]
    pub async fn place_order(
        &self,
        mut input: PlaceOrderInput,
        customer: Option<&AuthUser>,
    ) -> Result<OrderDetail, ServiceError> {
        input.phone = normalize_phone(&input.phone);
        input.validate()?;
        let full_name = required_text("full_name", &input.full_name)?;
        let wilaya = required_text("wilaya", &input.wilaya)?;
        let city = required_text("city", &input.city)?;
        let street_address = required_text("street_address", &input.street_address)?;
        let stopdesk_id = match input.shipping_method {
            ShippingMethod::Stopdesk => optional_text(input.stopdesk_id.clone()),
            ShippingMethod::HomeDelivery => None,
        };

        // Carrier call stays outside the transaction so no row lock waits on the network
        let quoted_fee = self.shipping.quote(&wilaya, input.shipping_method).await?;

        let txn = self.db.begin().await?;
        let lines = self.price_lines(&txn, &input.items).await?;
        let low_stock = self.reserve_stock(&txn, &lines).await?;

        let subtotal: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();
        let delivery_fee = match self.free_shipping_threshold {
            Some(threshold) if subtotal >= threshold => Decimal::ZERO,
            _ => quoted_fee,
        };

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let unique_id = self.fresh_unique_id(&txn, now).await?;
        let actor = customer
            .map(AuthUser::audit_name)
            .unwrap_or_else(|| "guest".to_string());

        let order = order::ActiveModel {
            id: Set(order_id),
            unique_id: Set(unique_id.clone()),
            user_id: Set(customer.map(|c| c.user_id)),
            full_name: Set(full_name),
            phone: Set(input.phone.clone()),
            email: Set(optional_text(input.email.clone())),
            wilaya: Set(wilaya),
            city: Set(city),
            street_address: Set(street_address),
            shipping_method: Set(input.shipping_method),
            stopdesk_id: Set(stopdesk_id),
            shipping_provider: Set(self.shipping.kind()),
            tracking_number: Set(None),
            delivery_fee: Set(delivery_fee),
            subtotal: Set(subtotal),
            total_amount: Set(subtotal + delivery_fee),
            status: Set(OrderStatus::Pending),
            active: Set(true),
            created_by: Set(Some(actor.clone())),
            created_at: Set(now),
            last_modified_by: Set(Some(actor)),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let items: Vec<order_item::ActiveModel> = lines
            .iter()
            .map(|line| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                item_type: Set(line.item_type),
                book_id: Set(line.book_id),
                book_pack_id: Set(line.book_pack_id),
                title: Set(line.title.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.unit_price * Decimal::from(line.quantity)),
            })
            .collect();
        order_item::Entity::insert_many(items)
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        metrics::ORDERS_PLACED.inc();
        info!(%order_id, %unique_id, total = %order.total_amount, "order placed");

        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id,
                unique_id,
                total_amount: order.total_amount,
            })
            .await;
        for book in low_stock {
            self.event_sender
                .send_or_log(Event::LowStock {
                    book_id: book.id,
                    title: book.title,
                    stock_quantity: book.stock_quantity,
                })
                .await;
        }

        self.load_detail(order).await
    }

    /// Resolve titles and prices; books snapshot their effective price, packs their own price
    async fn price_lines(
        &self,
        txn: &DatabaseTransaction,
        lines: &[OrderLineInput],
    ) -> Result<Vec<PricedLine>, ServiceError> {
        let book_ids: Vec<Uuid> = lines.iter().filter_map(|l| l.book_id).collect();
        let pack_ids: Vec<Uuid> = lines.iter().filter_map(|l| l.book_pack_id).collect();

        let books: HashMap<Uuid, book::Model> = if book_ids.is_empty() {
            HashMap::new()
        } else {
            book::Entity::find()
                .filter(book::Column::Id.is_in(book_ids))
                .filter(book::Column::Active.eq(true))
                .all(txn)
                .await?
                .into_iter()
                .map(|b| (b.id, b))
                .collect()
        };
        let packs: HashMap<Uuid, book_pack::Model> = if pack_ids.is_empty() {
            HashMap::new()
        } else {
            book_pack::Entity::find()
                .filter(book_pack::Column::Id.is_in(pack_ids))
                .filter(book_pack::Column::Active.eq(true))
                .all(txn)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };

        lines
            .iter()
            .map(|line| match (line.book_id, line.book_pack_id) {
                (Some(book_id), _) => {
                    let book = books.get(&book_id).ok_or_else(|| {
                        ServiceError::NotFound(format!("Book {} is not available", book_id))
                    })?;
                    Ok(PricedLine {
                        item_type: OrderItemType::Book,
                        book_id: Some(book_id),
                        book_pack_id: None,
                        title: book.title.clone(),
                        quantity: line.quantity,
                        unit_price: book.effective_price(),
                    })
                }
                (None, Some(pack_id)) => {
                    let pack = packs.get(&pack_id).ok_or_else(|| {
                        ServiceError::NotFound(format!("Book pack {} is not available", pack_id))
                    })?;
                    Ok(PricedLine {
                        item_type: OrderItemType::Pack,
                        book_id: None,
                        book_pack_id: Some(pack_id),
                        title: pack.title.clone(),
                        quantity: line.quantity,
                        unit_price: pack.price,
                    })
                }
                (None, None) => Err(ServiceError::ValidationError(
                    "order line without book or pack".into(),
                )),
            })
            .collect()
    }

    /// Lock every touched book, verify stock and decrement it. Returns books left under the threshold.
    async fn reserve_stock(
        &self,
        txn: &DatabaseTransaction,
        lines: &[PricedLine],
    ) -> Result<Vec<book::Model>, ServiceError> {
        let mut required: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in lines.iter().filter(|l| l.item_type == OrderItemType::Book) {
            if let Some(book_id) = line.book_id {
                *required.entry(book_id).or_default() += line.quantity;
            }
        }
        let pack_lines: Vec<&PricedLine> = lines
            .iter()
            .filter(|l| l.item_type == OrderItemType::Pack)
            .collect();
        let compositions =
            pack_book_ids(txn, pack_lines.iter().filter_map(|l| l.book_pack_id)).await?;
        for line in pack_lines {
            let Some(pack_id) = line.book_pack_id else {
                continue;
            };
            let book_ids = compositions.get(&pack_id).filter(|ids| !ids.is_empty()).ok_or_else(
                || ServiceError::ValidationError(format!("Book pack '{}' is empty", line.title)),
            )?;
            for book_id in book_ids {
                *required.entry(*book_id).or_default() += line.quantity;
            }
        }

        let locked = lock_books(txn, required.keys().copied()).await?;

        let mut low_stock = Vec::new();
        for (book_id, quantity) in &required {
            let book = locked
                .get(book_id)
                .filter(|b| b.active)
                .ok_or_else(|| ServiceError::NotFound(format!("Book {} is not available", book_id)))?;
            if book.stock_quantity < *quantity {
                metrics::STOCK_CONFLICTS.inc();
                warn!(
                    book_id = %book.id,
                    requested = quantity,
                    available = book.stock_quantity,
                    "checkout rejected for insufficient stock"
                );
                return Err(ServiceError::InsufficientStock(format!(
                    "only {} copies of '{}' left",
                    book.stock_quantity, book.title
                )));
            }

            let remaining = book.stock_quantity - quantity;
            let mut active: book::ActiveModel = book.clone().into();
            active.stock_quantity = Set(remaining);
            active.updated_at = Set(Utc::now());
            let updated = active.update(txn).await?;
            if remaining <= self.low_stock_threshold {
                low_stock.push(updated);
            }
        }
        Ok(low_stock)
    }

    async fn fresh_unique_id(
        &self,
        txn: &DatabaseTransaction,
        now: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        for _ in 0..UNIQUE_ID_ATTEMPTS {
            let candidate = generate_unique_id(now);
            let taken = order::Entity::find()
                .filter(order::Column::UniqueId.eq(candidate.as_str()))
                .count(txn)
                .await?
                > 0;
            if !taken {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "could not allocate an order reference".into(),
        ))
    }

    /// Owners see their own orders; staff with `orders:read` see every order
    #[instrument(skip(self, viewer), fields(viewer = %viewer.user_id))]
    pub async fn get_order(&self, id: Uuid, viewer: &AuthUser) -> Result<OrderDetail, ServiceError> {
        let staff = viewer.has_permission(consts::ORDERS_READ);
        let order = order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|o| staff || (o.active && o.user_id == Some(viewer.user_id)))
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;
        self.load_detail(order).await
    }

    /// Guest lookup by reference and the phone number used at checkout
    #[instrument(skip(self, phone))]
    pub async fn track_order(&self, unique_id: &str, phone: &str) -> Result<OrderDetail, ServiceError> {
        let phone = normalize_phone(phone);
        let order = order::Entity::find()
            .filter(order::Column::UniqueId.eq(unique_id.trim().to_uppercase()))
            .filter(order::Column::Active.eq(true))
            .one(&*self.db)
            .await?
            .filter(|o| o.phone == phone)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", unique_id)))?;
        self.load_detail(order).await
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: OrderFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderDetail>, u64), ServiceError> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(ServiceError::ValidationError(
                    "from must not be after to".into(),
                ));
            }
        }
        let query = Self::filter_query(&filter);
        self.paginate(query, page, per_page).await
    }

    fn filter_query(filter: &OrderFilter) -> Select<order::Entity> {
        let mut query = order::Entity::find().filter(order::Column::Active.eq(true));
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(from) = filter.from {
            query = query.filter(order::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(order::Column::CreatedAt.lte(to));
        }
        if let Some(term) = filter.search.as_deref().filter(|t| !t.trim().is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(ilike(order::Column::UniqueId, term))
                    .add(ilike(order::Column::Phone, &normalize_phone(term)))
                    .add(ilike(order::Column::FullName, term)),
            );
        }
        query
    }

    #[instrument(skip(self))]
    pub async fn list_user_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderDetail>, u64), ServiceError> {
        let query = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::Active.eq(true));
        self.paginate(query, page, per_page).await
    }

    async fn paginate(
        &self,
        query: Select<order::Entity>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderDetail>, u64), ServiceError> {
        let total = query.clone().count(&*self.db).await?;
        let orders = query
            .order_by_desc(order::Column::CreatedAt)
            .order_by_asc(order::Column::Id)
            .offset(page_offset(page, per_page))
            .limit(per_page)
            .all(&*self.db)
            .await?;
        Ok((self.attach_items(orders).await?, total))
    }

    /// Admin status change following the transition table
    #[instrument(skip(self, input, actor))]
    pub async fn update_status(
        &self,
        id: Uuid,
        input: UpdateOrderStatusInput,
        actor: &AuthUser,
    ) -> Result<OrderDetail, ServiceError> {
        match self
            .transition(id, input.status, &actor.audit_name(), TransitionRule::Manual)
            .await?
        {
            TransitionOutcome::Applied { order, .. } => self.load_detail(order).await,
            TransitionOutcome::Rejected(order) => Err(ServiceError::InvalidStatus(format!(
                "Order {} cannot move from {} to {}",
                order.unique_id, order.status, input.status
            ))),
        }
    }

    /// Customers cancel their own pending orders; staff may also cancel confirmed ones
    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn cancel_order(&self, id: Uuid, actor: &AuthUser) -> Result<OrderDetail, ServiceError> {
        let rule = if actor.has_permission(consts::ORDERS_UPDATE) {
            TransitionRule::Manual
        } else {
            let order = self.find_order(id).await?;
            if order.user_id != Some(actor.user_id)
                || !actor.has_permission(consts::ORDERS_CANCEL_OWN)
            {
                return Err(ServiceError::NotFound(format!("Order {} not found", id)));
            }
            TransitionRule::Customer
        };

        match self
            .transition(id, OrderStatus::Cancelled, &actor.audit_name(), rule)
            .await?
        {
            TransitionOutcome::Applied { order, .. } => self.load_detail(order).await,
            TransitionOutcome::Rejected(order) => Err(ServiceError::InvalidStatus(format!(
                "Order {} can no longer be cancelled ({})",
                order.unique_id, order.status
            ))),
        }
    }

    /// Status reported by the carrier for a tracking number; only forward moves apply
    #[instrument(skip(self))]
    pub async fn apply_carrier_status(
        &self,
        tracking_number: &str,
        reported: OrderStatus,
    ) -> Result<CarrierUpdate, ServiceError> {
        let Some(order) = order::Entity::find()
            .filter(order::Column::TrackingNumber.eq(tracking_number))
            .filter(order::Column::Active.eq(true))
            .one(&*self.db)
            .await?
        else {
            return Ok(CarrierUpdate::UnknownTracking);
        };

        let actor = self.shipping.name();
        Ok(
            match self
                .transition(order.id, reported, actor, TransitionRule::Carrier)
                .await?
            {
                TransitionOutcome::Applied { order, old_status } => CarrierUpdate::Applied {
                    order_id: order.id,
                    old_status,
                    new_status: order.status,
                },
                TransitionOutcome::Rejected(order) => CarrierUpdate::Stale {
                    order_id: order.id,
                    current: order.status,
                },
            },
        )
    }

    /// Lock the order row, check the rule, restock on cancel/return and persist
    async fn transition(
        &self,
        id: Uuid,
        next: OrderStatus,
        actor: &str,
        rule: TransitionRule,
    ) -> Result<TransitionOutcome, ServiceError> {
        let txn = self.db.begin().await?;
        let mut query = order::Entity::find_by_id(id);
        if supports_row_locks(&txn) {
            query = query.lock_exclusive();
        }
        let order = query
            .one(&txn)
            .await?
            .filter(|o| o.active)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let old_status = order.status;
        if !rule.allows(old_status, next) {
            return Ok(TransitionOutcome::Rejected(order));
        }

        let restored = if matches!(next, OrderStatus::Cancelled | OrderStatus::Returned) {
            restore_stock(&txn, order.id).await?
        } else {
            Vec::new()
        };

        let mut active: order::ActiveModel = order.into();
        active.status = Set(next);
        active.last_modified_by = Set(Some(actor.to_string()));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            order_id = %updated.id,
            from = %old_status,
            to = %next,
            source = ?rule.source(),
            "order status changed"
        );
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id: updated.id,
                old_status,
                new_status: next,
                source: rule.source(),
            })
            .await;
        for (book_id, quantity) in restored {
            self.event_sender
                .send_or_log(Event::StockRestored {
                    order_id: updated.id,
                    book_id,
                    quantity,
                })
                .await;
        }

        if next == OrderStatus::Cancelled {
            metrics::ORDERS_CANCELLED.inc();
            self.event_sender
                .send_or_log(Event::OrderCancelled(updated.id))
                .await;
            if let Some(tracking) = updated.tracking_number.as_deref() {
                if let Err(e) = self.shipping.cancel_parcel(tracking).await {
                    warn!(order_id = %updated.id, tracking, error = %e, "carrier parcel not cancelled");
                }
            }
        }

        Ok(TransitionOutcome::Applied {
            order: updated,
            old_status,
        })
    }

    /// Register a parcel for a confirmed order, or record a tracking number obtained by hand
    #[instrument(skip(self, input, actor))]
    pub async fn create_shipment(
        &self,
        id: Uuid,
        input: CreateShipmentInput,
        actor: &AuthUser,
    ) -> Result<ShipmentDetail, ServiceError> {
        input.validate()?;
        let order = self.find_order(id).await?;
        if order.status != OrderStatus::Confirmed {
            return Err(ServiceError::InvalidStatus(format!(
                "Only confirmed orders can be shipped; order {} is {}",
                order.unique_id, order.status
            )));
        }
        if order.tracking_number.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Order {} already has a shipment",
                order.unique_id
            )));
        }

        let (tracking_number, provider, label_url, issued) =
            match optional_text(input.tracking_number) {
                Some(manual) => (manual, ShippingProviderKind::Manual, None, false),
                None => {
                    let items = self.order_items(order.id).await?;
                    let parcel = self
                        .shipping
                        .create_parcel(&order, &items)
                        .await
                        .map_err(|e| {
                            metrics::SHIPMENT_FAILURES.inc();
                            error!(order_id = %order.id, error = %e, "parcel creation failed");
                            e
                        })?;
                    let tracking = parcel.tracking_number.ok_or_else(|| {
                        ServiceError::ValidationError(format!(
                            "{} shipping does not issue tracking numbers; provide one",
                            self.shipping.name()
                        ))
                    })?;
                    (tracking, self.shipping.kind(), parcel.label_url, true)
                }
            };

        // The carrier call runs outside any lock, so the order may have been
        // cancelled or shipped meanwhile; only a still-confirmed, untracked row takes the parcel
        let result = order::Entity::update_many()
            .col_expr(order::Column::TrackingNumber, Expr::value(tracking_number.clone()))
            .col_expr(order::Column::ShippingProvider, Expr::value(provider))
            .col_expr(order::Column::LastModifiedBy, Expr::value(actor.audit_name()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(OrderStatus::Confirmed))
            .filter(order::Column::TrackingNumber.is_null())
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            if issued {
                if let Err(e) = self.shipping.cancel_parcel(&tracking_number).await {
                    warn!(order_id = %order.id, %tracking_number, error = %e, "orphan parcel not cancelled");
                }
            }
            let current = self.find_order(order.id).await?;
            return Err(if current.status != OrderStatus::Confirmed {
                ServiceError::InvalidStatus(format!(
                    "Order {} changed to {} while the parcel was registered",
                    current.unique_id, current.status
                ))
            } else {
                ServiceError::Conflict(format!(
                    "Order {} already has a shipment",
                    current.unique_id
                ))
            });
        }

        metrics::SHIPMENTS_CREATED.inc();
        info!(order_id = %order.id, %tracking_number, "shipment created");
        self.event_sender
            .send_or_log(Event::ShipmentCreated {
                order_id: order.id,
                tracking_number,
            })
            .await;

        Ok(ShipmentDetail {
            order: self.find_order(order.id).await?,
            label_url,
        })
    }

    /// Soft delete
    #[instrument(skip(self, actor))]
    pub async fn delete_order(&self, id: Uuid, actor: &AuthUser) -> Result<(), ServiceError> {
        let mut active: order::ActiveModel = self.find_order(id).await?.into();
        active.active = Set(false);
        active.last_modified_by = Set(Some(actor.audit_name()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        info!(order_id = %id, "order deactivated");
        Ok(())
    }

    async fn find_order(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|o| o.active)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Title)
            .all(&*self.db)
            .await?)
    }

    async fn load_detail(&self, order: order::Model) -> Result<OrderDetail, ServiceError> {
        let items = self.order_items(order.id).await?;
        Ok(OrderDetail { order, items })
    }

    async fn attach_items(&self, orders: Vec<order::Model>) -> Result<Vec<OrderDetail>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        let mut items: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        for item in order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(orders.iter().map(|o| o.id)))
            .order_by_asc(order_item::Column::Title)
            .all(&*self.db)
            .await?
        {
            items.entry(item.order_id).or_default().push(item);
        }
        Ok(orders
            .into_iter()
            .map(|order| {
                let items = items.remove(&order.id).unwrap_or_default();
                OrderDetail { order, items }
            })
            .collect())
    }
}

/// `SELECT ... FOR UPDATE` in id order so concurrent checkouts cannot deadlock
async fn lock_books<C: ConnectionTrait>(
    conn: &C,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, book::Model>, ServiceError> {
    let ids: Vec<Uuid> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut query = book::Entity::find()
        .filter(book::Column::Id.is_in(ids))
        .order_by_asc(book::Column::Id);
    if supports_row_locks(conn) {
        query = query.lock_exclusive();
    }
    Ok(query
        .all(conn)
        .await?
        .into_iter()
        .map(|b| (b.id, b))
        .collect())
}

/// Put back every copy an order took. Packs are expanded with their current books.
async fn restore_stock(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> Result<Vec<(Uuid, i32)>, ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(txn)
        .await?;

    let mut quantities: BTreeMap<Uuid, i32> = BTreeMap::new();
    let compositions = pack_book_ids(txn, items.iter().filter_map(|i| i.book_pack_id)).await?;
    for item in &items {
        match (item.item_type, item.book_id, item.book_pack_id) {
            (OrderItemType::Book, Some(book_id), _) => {
                *quantities.entry(book_id).or_default() += item.quantity;
            }
            (OrderItemType::Pack, _, Some(pack_id)) => {
                for book_id in compositions.get(&pack_id).into_iter().flatten() {
                    *quantities.entry(*book_id).or_default() += item.quantity;
                }
            }
            _ => warn!(item_id = %item.id, "order item without catalog reference"),
        }
    }

    let locked = lock_books(txn, quantities.keys().copied()).await?;
    let mut restored = Vec::with_capacity(quantities.len());
    for (book_id, quantity) in quantities {
        let Some(book) = locked.get(&book_id) else {
            warn!(%book_id, "book vanished; stock not restored");
            continue;
        };
        let mut active: book::ActiveModel = book.clone().into();
        active.stock_quantity = Set(book.stock_quantity.saturating_add(quantity));
        active.updated_at = Set(Utc::now());
        active.update(txn).await?;
        restored.push((book_id, quantity));
    }
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn input() -> PlaceOrderInput {
        PlaceOrderInput {
            full_name: "Amina Bensalem".into(),
            phone: "0551234567".into(),
            email: None,
            wilaya: "Alger".into(),
            city: "Bab Ezzouar".into(),
            street_address: "Cité 5 Juillet, bt 12".into(),
            shipping_method: ShippingMethod::HomeDelivery,
            stopdesk_id: None,
            items: vec![OrderLineInput {
                book_id: Some(Uuid::new_v4()),
                book_pack_id: None,
                quantity: 1,
            }],
        }
    }

    #[test]
    fn unique_id_has_date_and_suffix() {
        let now = DateTime::parse_from_rfc3339("2024-03-09T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = generate_unique_id(now);
        assert!(id.starts_with("EL-20240309-"));
        let suffix = &id["EL-20240309-".len()..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn phone_numbers() {
        for ok in ["0551234567", "+213661234567", "00213771234567", "021234567"] {
            assert!(PHONE_REGEX.is_match(ok), "{ok}");
        }
        for bad in ["0851234567", "055123456", "+33612345678", "phone"] {
            assert!(!PHONE_REGEX.is_match(bad), "{bad}");
        }
        assert_eq!(normalize_phone("055 12-34.567"), "0551234567");
    }

    #[test]
    fn order_shape_rules() {
        assert!(input().validate().is_ok());

        let mut stopdesk = input();
        stopdesk.shipping_method = ShippingMethod::Stopdesk;
        assert!(stopdesk.validate().is_err());
        stopdesk.stopdesk_id = Some("160101".into());
        assert!(stopdesk.validate().is_ok());

        let mut both = input();
        both.items[0].book_pack_id = Some(Uuid::new_v4());
        assert!(both.validate().is_err());

        let mut too_many = input();
        too_many.items[0].quantity = 51;
        assert!(too_many.validate().is_err());

        let mut empty = input();
        empty.items.clear();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn customers_may_only_cancel_pending_orders() {
        assert!(TransitionRule::Customer.allows(OrderStatus::Pending, OrderStatus::Cancelled));
        assert!(!TransitionRule::Customer.allows(OrderStatus::Confirmed, OrderStatus::Cancelled));
        assert!(TransitionRule::Manual.allows(OrderStatus::Confirmed, OrderStatus::Cancelled));
        assert!(!TransitionRule::Carrier.allows(OrderStatus::Shipped, OrderStatus::Cancelled));
        assert_matches!(TransitionRule::Carrier.source(), StatusSource::CarrierWebhook);
    }
}
