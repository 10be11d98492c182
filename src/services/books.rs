use crate::{
    db::supports_row_locks,
    entities::{
        author,
        book::{self, BookLanguage},
        book_tag, tag,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{ilike, optional_text, page_offset, required_text},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func, Query, SimpleExpr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_create_prices"))]
pub struct CreateBookInput {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub author_id: Option<Uuid>,
    pub price: Decimal,
    pub on_sale_price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock_quantity: i32,
    #[validate(url)]
    pub cover_image_url: Option<String>,
    pub language: BookLanguage,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateBookInput {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub author_id: Option<Uuid>,
    pub price: Option<Decimal>,
    pub on_sale_price: Option<Decimal>,
    /// Drop the current sale price
    #[serde(default)]
    pub clear_on_sale_price: bool,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    #[validate(url)]
    pub cover_image_url: Option<String>,
    pub language: Option<BookLanguage>,
    /// Replaces every tag link when present
    pub tag_ids: Option<Vec<Uuid>>,
}

fn validate_create_prices(input: &CreateBookInput) -> Result<(), ValidationError> {
    check_prices(input.price, input.on_sale_price)
}

fn check_prices(price: Decimal, on_sale_price: Option<Decimal>) -> Result<(), ValidationError> {
    if price < Decimal::ZERO {
        let mut err = ValidationError::new("price_negative");
        err.message = Some("price cannot be negative".into());
        return Err(err);
    }
    if let Some(sale) = on_sale_price {
        if sale < Decimal::ZERO || sale >= price {
            let mut err = ValidationError::new("on_sale_price");
            err.message = Some("on_sale_price must be between 0 and price (exclusive)".into());
            return Err(err);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Title,
}

/// Criteria accepted by the catalog listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BookCriteria {
    /// Case-insensitive match on the title
    pub title: Option<String>,
    pub author_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
    pub language: Option<BookLanguage>,
    /// Lower bound on the effective price
    pub min_price: Option<Decimal>,
    /// Upper bound on the effective price
    pub max_price: Option<Decimal>,
    /// Only books with stock left
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub sort: BookSort,
    #[serde(skip)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookDetail {
    #[serde(flatten)]
    pub book: book::Model,
    pub effective_price: Decimal,
    pub author: Option<author::Model>,
    pub tags: Vec<tag::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AdjustStockInput {
    /// Signed change; the result may not drop below zero
    pub delta: i32,
    #[validate(length(max = 255))]
    pub reason: Option<String>,
}

fn effective_price_expr() -> SimpleExpr {
    Func::coalesce([
        SimpleExpr::from(Expr::col((book::Entity, book::Column::OnSalePrice))),
        SimpleExpr::from(Expr::col((book::Entity, book::Column::Price))),
    ])
    .into()
}

/// Book catalog service
#[derive(Clone)]
pub struct BookService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    low_stock_threshold: i32,
}

impl BookService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        low_stock_threshold: i32,
    ) -> Self {
        Self {
            db,
            event_sender,
            low_stock_threshold,
        }
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_book(
        &self,
        input: CreateBookInput,
        actor: &str,
    ) -> Result<BookDetail, ServiceError> {
        input.validate()?;
        let title = required_text("title", &input.title)?;
        if let Some(author_id) = input.author_id {
            self.ensure_author(author_id).await?;
        }
        let tag_ids = self.ensure_tags(&input.tag_ids).await?;

        let now = Utc::now();
        let book_id = Uuid::new_v4();
        let txn = self.db.begin().await?;

        book::ActiveModel {
            id: Set(book_id),
            title: Set(title),
            description: Set(optional_text(input.description)),
            author_id: Set(input.author_id),
            price: Set(input.price),
            on_sale_price: Set(input.on_sale_price),
            stock_quantity: Set(input.stock_quantity),
            cover_image_url: Set(optional_text(input.cover_image_url)),
            language: Set(input.language),
            active: Set(true),
            created_by: Set(Some(actor.to_string())),
            created_at: Set(now),
            last_modified_by: Set(Some(actor.to_string())),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        replace_tag_links(&txn, book_id, &tag_ids).await?;

        txn.commit().await?;
        info!(%book_id, "book created");

        self.get_book(book_id, true).await
    }

    #[instrument(skip(self, input))]
    pub async fn update_book(
        &self,
        id: Uuid,
        input: UpdateBookInput,
        actor: &str,
    ) -> Result<BookDetail, ServiceError> {
        input.validate()?;
        let existing = self.find_book(id, true).await?;

        let price = input.price.unwrap_or(existing.price);
        let on_sale_price = if input.clear_on_sale_price {
            None
        } else {
            input.on_sale_price.or(existing.on_sale_price)
        };
        check_prices(price, on_sale_price)
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        if let Some(author_id) = input.author_id {
            self.ensure_author(author_id).await?;
        }
        let tag_ids = match &input.tag_ids {
            Some(ids) => Some(self.ensure_tags(ids).await?),
            None => None,
        };

        let txn = self.db.begin().await?;
        let mut active: book::ActiveModel = existing.into();
        if let Some(title) = input.title {
            active.title = Set(required_text("title", &title)?);
        }
        if let Some(description) = input.description {
            active.description = Set(optional_text(Some(description)));
        }
        if let Some(author_id) = input.author_id {
            active.author_id = Set(Some(author_id));
        }
        active.price = Set(price);
        active.on_sale_price = Set(on_sale_price);
        if let Some(stock) = input.stock_quantity {
            active.stock_quantity = Set(stock);
        }
        if let Some(url) = input.cover_image_url {
            active.cover_image_url = Set(optional_text(Some(url)));
        }
        if let Some(language) = input.language {
            active.language = Set(language);
        }
        active.last_modified_by = Set(Some(actor.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        if let Some(tag_ids) = tag_ids {
            replace_tag_links(&txn, id, &tag_ids).await?;
        }
        txn.commit().await?;

        self.get_book(id, true).await
    }

    /// Book with its author and tags
    #[instrument(skip(self))]
    pub async fn get_book(&self, id: Uuid, include_inactive: bool) -> Result<BookDetail, ServiceError> {
        let book = self.find_book(id, include_inactive).await?;
        let mut details = self.hydrate(vec![book]).await?;
        details
            .pop()
            .ok_or_else(|| ServiceError::NotFound(format!("Book {} not found", id)))
    }

    pub async fn find_book(&self, id: Uuid, include_inactive: bool) -> Result<book::Model, ServiceError> {
        book::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|b| b.active || include_inactive)
            .ok_or_else(|| ServiceError::NotFound(format!("Book {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_books(
        &self,
        criteria: BookCriteria,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<BookDetail>, u64), ServiceError> {
        if let (Some(min), Some(max)) = (criteria.min_price, criteria.max_price) {
            if min > max {
                return Err(ServiceError::ValidationError(
                    "min_price cannot exceed max_price".into(),
                ));
            }
        }

        let query = Self::criteria_query(&criteria);
        let total = query.clone().count(&*self.db).await?;

        let query = match criteria.sort {
            BookSort::Newest => query.order_by_desc(book::Column::CreatedAt),
            BookSort::PriceAsc => query.order_by(effective_price_expr(), Order::Asc),
            BookSort::PriceDesc => query.order_by(effective_price_expr(), Order::Desc),
            BookSort::Title => query.order_by_asc(book::Column::Title),
        };
        let books = query
            .order_by_asc(book::Column::Id)
            .offset(page_offset(page, per_page))
            .limit(per_page)
            .all(&*self.db)
            .await?;

        Ok((self.hydrate(books).await?, total))
    }

    fn criteria_query(criteria: &BookCriteria) -> Select<book::Entity> {
        let mut query = book::Entity::find();
        if !criteria.include_inactive {
            query = query.filter(book::Column::Active.eq(true));
        }
        if let Some(title) = criteria.title.as_deref().filter(|t| !t.trim().is_empty()) {
            query = query.filter(ilike(book::Column::Title, title));
        }
        if let Some(author_id) = criteria.author_id {
            query = query.filter(book::Column::AuthorId.eq(author_id));
        }
        if let Some(tag_id) = criteria.tag_id {
            query = query.filter(
                book::Column::Id.in_subquery(
                    Query::select()
                        .column(book_tag::Column::BookId)
                        .from(book_tag::Entity)
                        .and_where(book_tag::Column::TagId.eq(tag_id))
                        .to_owned(),
                ),
            );
        }
        if let Some(language) = criteria.language {
            query = query.filter(book::Column::Language.eq(language));
        }
        if let Some(min) = criteria.min_price {
            query = query.filter(Expr::expr(effective_price_expr()).gte(min));
        }
        if let Some(max) = criteria.max_price {
            query = query.filter(Expr::expr(effective_price_expr()).lte(max));
        }
        if criteria.in_stock {
            query = query.filter(book::Column::StockQuantity.gt(0));
        }
        query
    }

    /// Soft delete
    #[instrument(skip(self))]
    pub async fn delete_book(&self, id: Uuid, actor: &str) -> Result<(), ServiceError> {
        let mut active: book::ActiveModel = self.find_book(id, false).await?.into();
        active.active = Set(false);
        active.last_modified_by = Set(Some(actor.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        info!(book_id = %id, "book deactivated");
        Ok(())
    }

    /// Restock or write off copies under a row lock
    #[instrument(skip(self, input))]
    pub async fn adjust_stock(
        &self,
        id: Uuid,
        input: AdjustStockInput,
        actor: &str,
    ) -> Result<book::Model, ServiceError> {
        input.validate()?;
        if input.delta == 0 {
            return Err(ServiceError::ValidationError("delta must not be zero".into()));
        }

        let txn = self.db.begin().await?;
        let mut query = book::Entity::find_by_id(id);
        if supports_row_locks(&txn) {
            query = query.lock_exclusive();
        }
        let book = query
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Book {} not found", id)))?;

        let new_quantity = book.stock_quantity.checked_add(input.delta).ok_or_else(|| {
            ServiceError::ValidationError("stock adjustment overflows".into())
        })?;
        if new_quantity < 0 {
            return Err(ServiceError::ValidationError(format!(
                "Cannot remove {} copies of '{}': only {} in stock",
                -input.delta, book.title, book.stock_quantity
            )));
        }

        let mut active: book::ActiveModel = book.into();
        active.stock_quantity = Set(new_quantity);
        active.last_modified_by = Set(Some(actor.to_string()));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            book_id = %id,
            delta = input.delta,
            stock = new_quantity,
            reason = input.reason.as_deref().unwrap_or(""),
            "stock adjusted"
        );
        if updated.active && new_quantity <= self.low_stock_threshold {
            self.event_sender
                .send_or_log(Event::LowStock {
                    book_id: updated.id,
                    title: updated.title.clone(),
                    stock_quantity: new_quantity,
                })
                .await;
        }
        Ok(updated)
    }

    /// Active books at or under the threshold, emptiest first
    #[instrument(skip(self))]
    pub async fn low_stock(&self, threshold: Option<i32>) -> Result<Vec<book::Model>, ServiceError> {
        let threshold = threshold.unwrap_or(self.low_stock_threshold);
        if threshold < 0 {
            return Err(ServiceError::ValidationError(
                "threshold cannot be negative".into(),
            ));
        }
        Ok(book::Entity::find()
            .filter(book::Column::Active.eq(true))
            .filter(book::Column::StockQuantity.lte(threshold))
            .order_by_asc(book::Column::StockQuantity)
            .order_by_asc(book::Column::Title)
            .all(&*self.db)
            .await?)
    }

    /// Attach authors and tags to a page of books
    async fn hydrate(&self, books: Vec<book::Model>) -> Result<Vec<BookDetail>, ServiceError> {
        if books.is_empty() {
            return Ok(Vec::new());
        }
        let book_ids: Vec<Uuid> = books.iter().map(|b| b.id).collect();
        let author_ids: Vec<Uuid> = books.iter().filter_map(|b| b.author_id).collect();

        let authors: HashMap<Uuid, author::Model> = if author_ids.is_empty() {
            HashMap::new()
        } else {
            author::Entity::find()
                .filter(author::Column::Id.is_in(author_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|a| (a.id, a))
                .collect()
        };

        let mut tags: HashMap<Uuid, Vec<tag::Model>> = HashMap::new();
        for (link, tag) in book_tag::Entity::find()
            .filter(book_tag::Column::BookId.is_in(book_ids))
            .find_also_related(tag::Entity)
            .all(&*self.db)
            .await?
        {
            if let Some(tag) = tag.filter(|t| t.active) {
                tags.entry(link.book_id).or_default().push(tag);
            }
        }

        Ok(books
            .into_iter()
            .map(|book| {
                let mut book_tags = tags.remove(&book.id).unwrap_or_default();
                book_tags.sort_by(|a, b| a.name_en.cmp(&b.name_en));
                BookDetail {
                    effective_price: book.effective_price(),
                    author: book.author_id.and_then(|id| authors.get(&id).cloned()),
                    tags: book_tags,
                    book,
                }
            })
            .collect())
    }

    async fn ensure_author(&self, author_id: Uuid) -> Result<(), ServiceError> {
        let exists = author::Entity::find_by_id(author_id)
            .filter(author::Column::Active.eq(true))
            .count(&*self.db)
            .await?
            > 0;
        if !exists {
            return Err(ServiceError::ValidationError(format!(
                "Author {} does not exist",
                author_id
            )));
        }
        Ok(())
    }

    async fn ensure_tags(&self, tag_ids: &[Uuid]) -> Result<Vec<Uuid>, ServiceError> {
        let unique: BTreeSet<Uuid> = tag_ids.iter().copied().collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }
        let found = tag::Entity::find()
            .filter(tag::Column::Id.is_in(unique.iter().copied()))
            .filter(tag::Column::Active.eq(true))
            .count(&*self.db)
            .await?;
        if found != unique.len() as u64 {
            warn!(requested = unique.len(), found, "unknown tag ids");
            return Err(ServiceError::ValidationError(
                "One or more tags do not exist".into(),
            ));
        }
        Ok(unique.into_iter().collect())
    }
}

async fn replace_tag_links<C: ConnectionTrait>(
    conn: &C,
    book_id: Uuid,
    tag_ids: &[Uuid],
) -> Result<(), ServiceError> {
    book_tag::Entity::delete_many()
        .filter(book_tag::Column::BookId.eq(book_id))
        .exec(conn)
        .await?;
    if tag_ids.is_empty() {
        return Ok(());
    }
    book_tag::Entity::insert_many(tag_ids.iter().map(|tag_id| book_tag::ActiveModel {
        book_id: Set(book_id),
        tag_id: Set(*tag_id),
    }))
    .exec_without_returning(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sale_price_must_undercut_price() {
        assert!(check_prices(dec!(1200), Some(dec!(900))).is_ok());
        assert!(check_prices(dec!(1200), Some(dec!(1200))).is_err());
        assert!(check_prices(dec!(1200), Some(dec!(-1))).is_err());
        assert!(check_prices(dec!(-5), None).is_err());
        assert!(check_prices(dec!(0), None).is_ok());
    }
}
