use crate::{
    entities::author,
    errors::ServiceError,
    services::{eq_ignore_case, ilike, optional_text, page_offset, required_text},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateAuthorInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub biography: Option<String>,
    #[validate(url)]
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateAuthorInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub biography: Option<String>,
    #[validate(url)]
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AuthorFilter {
    pub name: Option<String>,
    pub include_inactive: bool,
}

/// Author management
#[derive(Clone)]
pub struct AuthorService {
    db: Arc<DatabaseConnection>,
}

impl AuthorService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input))]
    pub async fn create_author(
        &self,
        input: CreateAuthorInput,
        actor: &str,
    ) -> Result<author::Model, ServiceError> {
        input.validate()?;
        let name = required_text("name", &input.name)?;
        self.ensure_unique_name(&name, None).await?;

        let now = Utc::now();
        let model = author::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            biography: Set(optional_text(input.biography)),
            profile_picture_url: Set(optional_text(input.profile_picture_url)),
            active: Set(true),
            created_by: Set(Some(actor.to_string())),
            created_at: Set(now),
            last_modified_by: Set(Some(actor.to_string())),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(author_id = %model.id, "author created");
        Ok(model)
    }

    #[instrument(skip(self, input))]
    pub async fn update_author(
        &self,
        id: Uuid,
        input: UpdateAuthorInput,
        actor: &str,
    ) -> Result<author::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_author(id, true).await?;
        let mut active: author::ActiveModel = existing.into();

        if let Some(name) = input.name {
            let name = required_text("name", &name)?;
            self.ensure_unique_name(&name, Some(id)).await?;
            active.name = Set(name);
        }
        if let Some(biography) = input.biography {
            active.biography = Set(optional_text(Some(biography)));
        }
        if let Some(url) = input.profile_picture_url {
            active.profile_picture_url = Set(optional_text(Some(url)));
        }
        active.last_modified_by = Set(Some(actor.to_string()));
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    /// Fetch an author; inactive authors are hidden unless asked for
    #[instrument(skip(self))]
    pub async fn get_author(
        &self,
        id: Uuid,
        include_inactive: bool,
    ) -> Result<author::Model, ServiceError> {
        author::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|a| a.active || include_inactive)
            .ok_or_else(|| ServiceError::NotFound(format!("Author {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_authors(
        &self,
        filter: AuthorFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<author::Model>, u64), ServiceError> {
        let mut query = author::Entity::find();
        if !filter.include_inactive {
            query = query.filter(author::Column::Active.eq(true));
        }
        if let Some(name) = filter.name.as_deref().filter(|n| !n.trim().is_empty()) {
            query = query.filter(ilike(author::Column::Name, name));
        }

        let total = query.clone().count(&*self.db).await?;
        let authors = query
            .order_by_asc(author::Column::Name)
            .offset(page_offset(page, per_page))
            .limit(per_page)
            .all(&*self.db)
            .await?;

        Ok((authors, total))
    }

    /// Soft delete
    #[instrument(skip(self))]
    pub async fn delete_author(&self, id: Uuid, actor: &str) -> Result<(), ServiceError> {
        let existing = self.get_author(id, false).await?;
        let mut active: author::ActiveModel = existing.into();
        active.active = Set(false);
        active.last_modified_by = Set(Some(actor.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        info!(author_id = %id, "author deactivated");
        Ok(())
    }

    async fn ensure_unique_name(&self, name: &str, exclude: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = author::Entity::find()
            .filter(author::Column::Active.eq(true))
            .filter(eq_ignore_case(author::Column::Name, name));
        if let Some(id) = exclude {
            query = query.filter(author::Column::Id.ne(id));
        }

        if query.count(&*self.db).await? > 0 {
            return Err(ServiceError::Conflict(format!(
                "An author named '{}' already exists",
                name
            )));
        }
        Ok(())
    }
}
