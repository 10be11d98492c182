use crate::{
    entities::{
        book,
        order::{self, OrderStatus},
        order_item::{self, OrderItemType},
        user,
    },
    errors::ServiceError,
    services::books::BookService,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, Iterable,
    Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const DEFAULT_RANGE_DAYS: i64 = 30;
/// Upper bound on a requested range; daily sales allocate one bucket per day
pub const MAX_RANGE_DAYS: i64 = 366;
const DEFAULT_TOP_BOOKS: u64 = 10;
const MAX_TOP_BOOKS: u64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DateRangeQuery {
    /// Defaults to 30 days before `to`
    pub from: Option<DateTime<Utc>>,
    /// Defaults to now
    pub to: Option<DateTime<Utc>>,
}

impl DateRangeQuery {
    pub fn resolve(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
        let to = self.to.unwrap_or_else(Utc::now);
        let from = self
            .from
            .unwrap_or_else(|| to - Duration::days(DEFAULT_RANGE_DAYS));
        if from > to {
            return Err(ServiceError::ValidationError(
                "from must not be after to".into(),
            ));
        }
        if to - from > Duration::days(MAX_RANGE_DAYS) {
            return Err(ServiceError::ValidationError(format!(
                "range must not exceed {MAX_RANGE_DAYS} days"
            )));
        }
        Ok((from, to))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardSummary {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub order_count: u64,
    /// Sum of totals, cancelled and returned orders excluded
    pub revenue: Decimal,
    pub average_order_value: Decimal,
    pub orders_by_status: BTreeMap<String, u64>,
    pub new_users: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DailySales {
    pub date: NaiveDate,
    pub order_count: u64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopBook {
    pub book_id: Uuid,
    pub title: String,
    pub quantity_sold: i64,
    pub revenue: Decimal,
}

#[derive(Debug, FromQueryResult)]
struct StatusRow {
    status: OrderStatus,
    order_count: i64,
    revenue: Option<Decimal>,
}

#[derive(Debug, FromQueryResult)]
struct TopBookRow {
    book_id: Option<Uuid>,
    quantity_sold: i64,
    revenue: Option<Decimal>,
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Read-only aggregates for the back office
#[derive(Clone)]
pub struct DashboardService {
    db: Arc<DatabaseConnection>,
    books: Arc<BookService>,
}

impl DashboardService {
    pub fn new(db: Arc<DatabaseConnection>, books: Arc<BookService>) -> Self {
        Self { db, books }
    }

    /// Order volume, revenue and status split over a range
    #[instrument(skip(self))]
    pub async fn summary(&self, range: DateRangeQuery) -> Result<DashboardSummary, ServiceError> {
        let (from, to) = range.resolve()?;

        let rows = order::Entity::find()
            .select_only()
            .column(order::Column::Status)
            .column_as(Expr::col(order::Column::Id).count(), "order_count")
            .column_as(Expr::col(order::Column::TotalAmount).sum(), "revenue")
            .filter(order::Column::Active.eq(true))
            .filter(order::Column::CreatedAt.between(from, to))
            .group_by(order::Column::Status)
            .into_model::<StatusRow>()
            .all(&*self.db)
            .await?;

        let mut orders_by_status: BTreeMap<String, u64> =
            OrderStatus::iter().map(|s| (s.to_string(), 0)).collect();
        let mut order_count = 0u64;
        let mut sales_count = 0u64;
        let mut revenue = Decimal::ZERO;
        for row in rows {
            let count = row.order_count.max(0) as u64;
            order_count += count;
            orders_by_status.insert(row.status.to_string(), count);
            if row.status.counts_as_sale() {
                sales_count += count;
                revenue += row.revenue.unwrap_or_default();
            }
        }
        let average_order_value = if sales_count == 0 {
            Decimal::ZERO
        } else {
            round_money(revenue / Decimal::from(sales_count))
        };

        let new_users = user::Entity::find()
            .filter(user::Column::CreatedAt.between(from, to))
            .count(&*self.db)
            .await?;

        Ok(DashboardSummary {
            from,
            to,
            order_count,
            revenue: round_money(revenue),
            average_order_value,
            orders_by_status,
            new_users,
        })
    }

    /// One entry per calendar day (UTC) in the range, empty days included
    #[instrument(skip(self))]
    pub async fn sales_over_time(&self, range: DateRangeQuery) -> Result<Vec<DailySales>, ServiceError> {
        let (from, to) = range.resolve()?;

        // Day bucketing differs between Postgres and SQLite, so rows are grouped here
        let rows: Vec<(DateTime<Utc>, Decimal)> = order::Entity::find()
            .select_only()
            .column(order::Column::CreatedAt)
            .column(order::Column::TotalAmount)
            .filter(order::Column::Active.eq(true))
            .filter(order::Column::Status.is_not_in([OrderStatus::Cancelled, OrderStatus::Returned]))
            .filter(order::Column::CreatedAt.between(from, to))
            .into_tuple()
            .all(&*self.db)
            .await?;

        let mut days: BTreeMap<NaiveDate, (u64, Decimal)> = BTreeMap::new();
        let mut day = from.date_naive();
        while day <= to.date_naive() {
            days.insert(day, (0, Decimal::ZERO));
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        for (created_at, total) in rows {
            let entry = days.entry(created_at.date_naive()).or_default();
            entry.0 += 1;
            entry.1 += total;
        }

        Ok(days
            .into_iter()
            .map(|(date, (order_count, revenue))| DailySales {
                date,
                order_count,
                revenue: round_money(revenue),
            })
            .collect())
    }

    /// Best sellers by copies sold as single books
    #[instrument(skip(self))]
    pub async fn top_books(
        &self,
        limit: Option<u64>,
        range: DateRangeQuery,
    ) -> Result<Vec<TopBook>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_TOP_BOOKS);
        if !(1..=MAX_TOP_BOOKS).contains(&limit) {
            return Err(ServiceError::ValidationError(format!(
                "limit must be between 1 and {}",
                MAX_TOP_BOOKS
            )));
        }
        let (from, to) = range.resolve()?;

        let quantity_sum = Expr::col((order_item::Entity, order_item::Column::Quantity)).sum();
        let rows = order_item::Entity::find()
            .select_only()
            .column(order_item::Column::BookId)
            .column_as(quantity_sum.clone(), "quantity_sold")
            .column_as(
                Expr::col((order_item::Entity, order_item::Column::TotalPrice)).sum(),
                "revenue",
            )
            .inner_join(order::Entity)
            .filter(order_item::Column::ItemType.eq(OrderItemType::Book))
            .filter(order_item::Column::BookId.is_not_null())
            .filter(order::Column::Active.eq(true))
            .filter(order::Column::Status.is_not_in([OrderStatus::Cancelled, OrderStatus::Returned]))
            .filter(order::Column::CreatedAt.between(from, to))
            .group_by(order_item::Column::BookId)
            .order_by(quantity_sum, Order::Desc)
            .order_by_asc(order_item::Column::BookId)
            .limit(limit)
            .into_model::<TopBookRow>()
            .all(&*self.db)
            .await?;

        let ids: Vec<Uuid> = rows.iter().filter_map(|r| r.book_id).collect();
        let titles: HashMap<Uuid, String> = if ids.is_empty() {
            HashMap::new()
        } else {
            book::Entity::find()
                .filter(book::Column::Id.is_in(ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|b| (b.id, b.title))
                .collect()
        };

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let book_id = row.book_id?;
                Some(TopBook {
                    book_id,
                    title: titles.get(&book_id).cloned().unwrap_or_default(),
                    quantity_sold: row.quantity_sold,
                    revenue: round_money(row.revenue.unwrap_or_default()),
                })
            })
            .collect())
    }

    pub async fn low_stock(&self, threshold: Option<i32>) -> Result<Vec<book::Model>, ServiceError> {
        self.books.low_stock(threshold).await
    }
}
