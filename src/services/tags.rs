use crate::{
    entities::tag::{self, TagType},
    errors::ServiceError,
    services::{ilike, optional_text, page_offset, required_text},
};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref COLOR_HEX: Regex = Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid regex");
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateTagInput {
    #[validate(length(min = 1, max = 100))]
    pub name_en: String,
    #[validate(length(min = 1, max = 100))]
    pub name_fr: String,
    pub tag_type: TagType,
    #[validate(regex = "COLOR_HEX")]
    pub color_hex: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateTagInput {
    #[validate(length(min = 1, max = 100))]
    pub name_en: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub name_fr: Option<String>,
    pub tag_type: Option<TagType>,
    #[validate(regex = "COLOR_HEX")]
    pub color_hex: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    pub tag_type: Option<TagType>,
    pub search: Option<String>,
    pub include_inactive: bool,
}

/// Category, home-section and sticker tags
#[derive(Clone)]
pub struct TagService {
    db: Arc<DatabaseConnection>,
}

impl TagService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input))]
    pub async fn create_tag(
        &self,
        input: CreateTagInput,
        actor: &str,
    ) -> Result<tag::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        let model = tag::ActiveModel {
            id: Set(Uuid::new_v4()),
            name_en: Set(required_text("name_en", &input.name_en)?),
            name_fr: Set(required_text("name_fr", &input.name_fr)?),
            tag_type: Set(input.tag_type),
            color_hex: Set(optional_text(input.color_hex).map(|c| c.to_uppercase())),
            image_url: Set(optional_text(input.image_url)),
            active: Set(true),
            created_by: Set(Some(actor.to_string())),
            created_at: Set(now),
            last_modified_by: Set(Some(actor.to_string())),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(tag_id = %model.id, tag_type = ?model.tag_type, "tag created");
        Ok(model)
    }

    #[instrument(skip(self, input))]
    pub async fn update_tag(
        &self,
        id: Uuid,
        input: UpdateTagInput,
        actor: &str,
    ) -> Result<tag::Model, ServiceError> {
        input.validate()?;
        let mut active: tag::ActiveModel = self.get_tag(id, true).await?.into();

        if let Some(name) = input.name_en {
            active.name_en = Set(required_text("name_en", &name)?);
        }
        if let Some(name) = input.name_fr {
            active.name_fr = Set(required_text("name_fr", &name)?);
        }
        if let Some(tag_type) = input.tag_type {
            active.tag_type = Set(tag_type);
        }
        if let Some(color) = input.color_hex {
            active.color_hex = Set(optional_text(Some(color)).map(|c| c.to_uppercase()));
        }
        if let Some(url) = input.image_url {
            active.image_url = Set(optional_text(Some(url)));
        }
        active.last_modified_by = Set(Some(actor.to_string()));
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_tag(&self, id: Uuid, include_inactive: bool) -> Result<tag::Model, ServiceError> {
        tag::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|t| t.active || include_inactive)
            .ok_or_else(|| ServiceError::NotFound(format!("Tag {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_tags(
        &self,
        filter: TagFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<tag::Model>, u64), ServiceError> {
        let mut query = tag::Entity::find();
        if !filter.include_inactive {
            query = query.filter(tag::Column::Active.eq(true));
        }
        if let Some(tag_type) = filter.tag_type {
            query = query.filter(tag::Column::TagType.eq(tag_type));
        }
        if let Some(term) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(ilike(tag::Column::NameEn, term))
                    .add(ilike(tag::Column::NameFr, term)),
            );
        }

        let total = query.clone().count(&*self.db).await?;
        let tags = query
            .order_by_asc(tag::Column::NameEn)
            .offset(page_offset(page, per_page))
            .limit(per_page)
            .all(&*self.db)
            .await?;
        Ok((tags, total))
    }

    /// Soft delete; existing book links are kept
    #[instrument(skip(self))]
    pub async fn delete_tag(&self, id: Uuid, actor: &str) -> Result<(), ServiceError> {
        let mut active: tag::ActiveModel = self.get_tag(id, false).await?.into();
        active.active = Set(false);
        active.last_modified_by = Set(Some(actor.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_hex_must_be_six_hex_digits() {
        let mut input = CreateTagInput {
            name_en: "Novels".into(),
            name_fr: "Romans".into(),
            tag_type: TagType::Category,
            color_hex: Some("#1a2B3c".into()),
            image_url: None,
        };
        assert!(input.validate().is_ok());

        input.color_hex = Some("1a2b3c".into());
        assert!(input.validate().is_err());
        input.color_hex = Some("#12345".into());
        assert!(input.validate().is_err());
        input.color_hex = None;
        assert!(input.validate().is_ok());
    }
}
