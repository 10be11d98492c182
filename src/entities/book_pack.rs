use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Bundle of books sold at a single price
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = BookPack)]
#[sea_orm(table_name = "book_packs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub price: Decimal,
    pub cover_image_url: Option<String>,
    pub active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::book_pack_book::Entity")]
    BookPackBooks,
}

impl Related<super::book_pack_book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BookPackBooks.def()
    }
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        super::book_pack_book::Relation::Book.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::book_pack_book::Relation::BookPack.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
