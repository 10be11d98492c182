use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = Book)]
#[sea_orm(table_name = "books")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub author_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub on_sale_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub cover_image_url: Option<String>,
    pub language: BookLanguage,
    pub active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Price a customer pays: the sale price when one is set
    pub fn effective_price(&self) -> Decimal {
        self.on_sale_price.unwrap_or(self.price)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::author::Entity",
        from = "Column::AuthorId",
        to = "super::author::Column::Id"
    )]
    Author,
    #[sea_orm(has_many = "super::book_tag::Entity")]
    BookTags,
    #[sea_orm(has_many = "super::book_pack_book::Entity")]
    BookPackBooks,
}

impl Related<super::author::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl Related<super::tag::Entity> for Entity {
    fn to() -> RelationDef {
        super::book_tag::Relation::Tag.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::book_tag::Relation::Book.def().rev())
    }
}

impl Related<super::book_pack::Entity> for Entity {
    fn to() -> RelationDef {
        super::book_pack_book::Relation::BookPack.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::book_pack_book::Relation::Book.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(2))")]
pub enum BookLanguage {
    #[sea_orm(string_value = "FR")]
    FR,
    #[sea_orm(string_value = "EN")]
    EN,
    #[sea_orm(string_value = "AR")]
    AR,
}
