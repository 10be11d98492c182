use crate::{
    entities::{book, book_pack, book_pack_book},
    errors::ServiceError,
    services::{ilike, optional_text, page_offset, required_text},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateBookPackInput {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(url)]
    pub cover_image_url: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub book_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateBookPackInput {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub price: Option<Decimal>,
    #[validate(url)]
    pub cover_image_url: Option<String>,
    /// Replaces the pack contents when present
    #[validate(length(min = 1, max = 50))]
    pub book_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookPackDetail {
    #[serde(flatten)]
    pub pack: book_pack::Model,
    pub books: Vec<book::Model>,
    /// Packs that can still be sold: the smallest stock among the books
    pub available_quantity: i32,
    pub available: bool,
}

impl BookPackDetail {
    fn new(pack: book_pack::Model, books: Vec<book::Model>) -> Self {
        let available_quantity = pack_availability(&books);
        Self {
            pack,
            books,
            available_quantity,
            available: available_quantity > 0,
        }
    }
}

/// Minimum stock across the books; zero if any book is inactive or the pack is empty
pub fn pack_availability(books: &[book::Model]) -> i32 {
    if books.is_empty() || books.iter().any(|b| !b.active) {
        return 0;
    }
    books
        .iter()
        .map(|b| b.stock_quantity.max(0))
        .min()
        .unwrap_or(0)
}

/// Book ids for a set of packs
pub(crate) async fn pack_book_ids<C: ConnectionTrait>(
    conn: &C,
    pack_ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, Vec<Uuid>>, ServiceError> {
    let pack_ids: Vec<Uuid> = pack_ids.into_iter().collect();
    if pack_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for link in book_pack_book::Entity::find()
        .filter(book_pack_book::Column::BookPackId.is_in(pack_ids))
        .all(conn)
        .await?
    {
        map.entry(link.book_pack_id).or_default().push(link.book_id);
    }
    for ids in map.values_mut() {
        ids.sort();
    }
    Ok(map)
}

#[derive(Clone)]
pub struct BookPackService {
    db: Arc<DatabaseConnection>,
}

impl BookPackService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_pack(
        &self,
        input: CreateBookPackInput,
        actor: &str,
    ) -> Result<BookPackDetail, ServiceError> {
        input.validate()?;
        ensure_price(input.price)?;
        let book_ids = self.ensure_books(&input.book_ids).await?;

        let now = Utc::now();
        let pack_id = Uuid::new_v4();
        let txn = self.db.begin().await?;
        book_pack::ActiveModel {
            id: Set(pack_id),
            title: Set(required_text("title", &input.title)?),
            description: Set(optional_text(input.description)),
            price: Set(input.price),
            cover_image_url: Set(optional_text(input.cover_image_url)),
            active: Set(true),
            created_by: Set(Some(actor.to_string())),
            created_at: Set(now),
            last_modified_by: Set(Some(actor.to_string())),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        replace_pack_books(&txn, pack_id, &book_ids).await?;
        txn.commit().await?;

        info!(%pack_id, books = book_ids.len(), "book pack created");
        self.get_pack(pack_id, true).await
    }

    #[instrument(skip(self, input))]
    pub async fn update_pack(
        &self,
        id: Uuid,
        input: UpdateBookPackInput,
        actor: &str,
    ) -> Result<BookPackDetail, ServiceError> {
        input.validate()?;
        let existing = self.find_pack(id, true).await?;
        if let Some(price) = input.price {
            ensure_price(price)?;
        }
        let book_ids = match &input.book_ids {
            Some(ids) => Some(self.ensure_books(ids).await?),
            None => None,
        };

        let txn = self.db.begin().await?;
        let mut active: book_pack::ActiveModel = existing.into();
        if let Some(title) = input.title {
            active.title = Set(required_text("title", &title)?);
        }
        if let Some(description) = input.description {
            active.description = Set(optional_text(Some(description)));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(url) = input.cover_image_url {
            active.cover_image_url = Set(optional_text(Some(url)));
        }
        active.last_modified_by = Set(Some(actor.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        if let Some(book_ids) = book_ids {
            replace_pack_books(&txn, id, &book_ids).await?;
        }
        txn.commit().await?;

        self.get_pack(id, true).await
    }

    pub async fn find_pack(
        &self,
        id: Uuid,
        include_inactive: bool,
    ) -> Result<book_pack::Model, ServiceError> {
        book_pack::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|p| p.active || include_inactive)
            .ok_or_else(|| ServiceError::NotFound(format!("Book pack {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn get_pack(
        &self,
        id: Uuid,
        include_inactive: bool,
    ) -> Result<BookPackDetail, ServiceError> {
        let pack = self.find_pack(id, include_inactive).await?;
        let mut details = self.hydrate(vec![pack]).await?;
        details
            .pop()
            .ok_or_else(|| ServiceError::NotFound(format!("Book pack {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_packs(
        &self,
        title: Option<String>,
        include_inactive: bool,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<BookPackDetail>, u64), ServiceError> {
        let mut query = book_pack::Entity::find();
        if !include_inactive {
            query = query.filter(book_pack::Column::Active.eq(true));
        }
        if let Some(title) = title.as_deref().filter(|t| !t.trim().is_empty()) {
            query = query.filter(ilike(book_pack::Column::Title, title));
        }

        let total = query.clone().count(&*self.db).await?;
        let packs = query
            .order_by_desc(book_pack::Column::CreatedAt)
            .offset(page_offset(page, per_page))
            .limit(per_page)
            .all(&*self.db)
            .await?;
        Ok((self.hydrate(packs).await?, total))
    }

    /// Soft delete
    #[instrument(skip(self))]
    pub async fn delete_pack(&self, id: Uuid, actor: &str) -> Result<(), ServiceError> {
        let mut active: book_pack::ActiveModel = self.find_pack(id, false).await?.into();
        active.active = Set(false);
        active.last_modified_by = Set(Some(actor.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(())
    }

    async fn hydrate(
        &self,
        packs: Vec<book_pack::Model>,
    ) -> Result<Vec<BookPackDetail>, ServiceError> {
        let links = pack_book_ids(&*self.db, packs.iter().map(|p| p.id)).await?;
        let all_ids: BTreeSet<Uuid> = links.values().flatten().copied().collect();
        let books: HashMap<Uuid, book::Model> = if all_ids.is_empty() {
            HashMap::new()
        } else {
            book::Entity::find()
                .filter(book::Column::Id.is_in(all_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|b| (b.id, b))
                .collect()
        };

        Ok(packs
            .into_iter()
            .map(|pack| {
                let pack_books = links
                    .get(&pack.id)
                    .map(|ids| ids.iter().filter_map(|id| books.get(id).cloned()).collect())
                    .unwrap_or_default();
                BookPackDetail::new(pack, pack_books)
            })
            .collect())
    }

    async fn ensure_books(&self, book_ids: &[Uuid]) -> Result<Vec<Uuid>, ServiceError> {
        let unique: BTreeSet<Uuid> = book_ids.iter().copied().collect();
        if unique.is_empty() {
            return Err(ServiceError::ValidationError(
                "A pack needs at least one book".into(),
            ));
        }
        let found = book::Entity::find()
            .filter(book::Column::Id.is_in(unique.iter().copied()))
            .filter(book::Column::Active.eq(true))
            .count(&*self.db)
            .await?;
        if found != unique.len() as u64 {
            return Err(ServiceError::ValidationError(
                "One or more books do not exist".into(),
            ));
        }
        Ok(unique.into_iter().collect())
    }
}

fn ensure_price(price: Decimal) -> Result<(), ServiceError> {
    if price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "price cannot be negative".into(),
        ));
    }
    Ok(())
}

async fn replace_pack_books<C: ConnectionTrait>(
    conn: &C,
    pack_id: Uuid,
    book_ids: &[Uuid],
) -> Result<(), ServiceError> {
    book_pack_book::Entity::delete_many()
        .filter(book_pack_book::Column::BookPackId.eq(pack_id))
        .exec(conn)
        .await?;
    book_pack_book::Entity::insert_many(book_ids.iter().map(|book_id| {
        book_pack_book::ActiveModel {
            book_pack_id: Set(pack_id),
            book_id: Set(*book_id),
        }
    }))
    .exec_without_returning(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book(stock: i32, active: bool) -> book::Model {
        let now = Utc::now();
        book::Model {
            id: Uuid::new_v4(),
            title: "Nedjma".into(),
            description: None,
            author_id: None,
            price: dec!(800),
            on_sale_price: None,
            stock_quantity: stock,
            cover_image_url: None,
            language: book::BookLanguage::FR,
            active,
            created_by: None,
            created_at: now,
            last_modified_by: None,
            updated_at: now,
        }
    }

    #[test]
    fn availability_is_the_scarcest_book() {
        assert_eq!(pack_availability(&[book(4, true), book(2, true), book(9, true)]), 2);
    }

    #[test]
    fn inactive_or_empty_packs_are_unavailable() {
        assert_eq!(pack_availability(&[]), 0);
        assert_eq!(pack_availability(&[book(4, true), book(7, false)]), 0);
        assert_eq!(pack_availability(&[book(0, true), book(7, true)]), 0);
    }
}
