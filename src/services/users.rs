use crate::{
    auth::{hash_password, verify_password, AuthService, TokenPair},
    entities::user::{self, UserRole},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{eq_ignore_case, ilike, optional_text, page_offset},
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref LOGIN_REGEX: Regex = Regex::new(r"^[a-z0-9_.-]+$").expect("valid regex");
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterInput {
    #[validate(length(min = 3, max = 50), regex = "LOGIN_REGEX")]
    pub login: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 100))]
    pub password: String,
    #[validate(length(max = 50))]
    pub first_name: Option<String>,
    #[validate(length(max = 50))]
    pub last_name: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginInput {
    /// Login or e-mail address
    #[validate(length(min = 1, max = 254))]
    pub login: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshInput {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateAccountInput {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub first_name: Option<String>,
    #[validate(length(max = 50))]
    pub last_name: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordInput {
    pub current_password: String,
    #[validate(length(min = 8, max = 100))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetActivatedInput {
    pub activated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetRoleInput {
    pub role: UserRole,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserFilter {
    /// Matches login, e-mail or name
    pub search: Option<String>,
}

/// Account as exposed over the API, without the password hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub login: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub activated: bool,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            login: user.login,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            activated: user.activated,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Derive a login from the local part of an e-mail address
fn login_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default().to_lowercase();
    let cleaned: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    if cleaned.len() < 3 {
        "admin".to_string()
    } else {
        cleaned
    }
}

/// Accounts, sign-in and user administration
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
    event_sender: Arc<EventSender>,
}

impl UserService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        auth: Arc<AuthService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            auth,
            event_sender,
        }
    }

    #[instrument(skip(self, input), fields(login = %input.login))]
    pub async fn register(&self, mut input: RegisterInput) -> Result<UserResponse, ServiceError> {
        input.login = input.login.trim().to_lowercase();
        input.email = input.email.trim().to_lowercase();
        input.validate()?;

        let user = self
            .create_user(&input.login, &input.email, &input.password, UserRole::User, |u| {
                u.first_name = Set(optional_text(input.first_name.clone()));
                u.last_name = Set(optional_text(input.last_name.clone()));
                u.phone = Set(optional_text(input.phone.clone()));
            })
            .await?;

        self.event_sender
            .send_or_log(Event::UserRegistered(user.id))
            .await;
        Ok(user.into())
    }

    async fn create_user(
        &self,
        login: &str,
        email: &str,
        password: &str,
        role: UserRole,
        extra: impl FnOnce(&mut user::ActiveModel),
    ) -> Result<user::Model, ServiceError> {
        self.ensure_available(login, email, None).await?;

        let now = Utc::now();
        let mut model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            login: Set(login.to_string()),
            email: Set(email.to_string()),
            first_name: Set(None),
            last_name: Set(None),
            phone: Set(None),
            password_hash: Set(hash_password(password)?),
            activated: Set(true),
            role: Set(role),
            created_at: Set(now),
            updated_at: Set(now),
        };
        extra(&mut model);
        let user = model.insert(&*self.db).await?;
        info!(user_id = %user.id, role = role.as_str(), "account created");
        Ok(user)
    }

    /// Login and e-mail are unique without regard to case
    async fn ensure_available(
        &self,
        login: &str,
        email: &str,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = user::Entity::find().filter(
            Condition::any()
                .add(eq_ignore_case(user::Column::Login, login))
                .add(eq_ignore_case(user::Column::Email, email)),
        );
        if let Some(id) = except {
            query = query.filter(user::Column::Id.ne(id));
        }
        if let Some(existing) = query.one(&*self.db).await? {
            let field = if existing.login.eq_ignore_ascii_case(login) {
                "login"
            } else {
                "email"
            };
            return Err(ServiceError::Conflict(format!("{} is already in use", field)));
        }
        Ok(())
    }

    #[instrument(skip(self, input))]
    pub async fn login(&self, input: LoginInput) -> Result<TokenPair, ServiceError> {
        input.validate()?;
        let identifier = input.login.trim();
        let user = user::Entity::find()
            .filter(
                Condition::any()
                    .add(eq_ignore_case(user::Column::Login, identifier))
                    .add(eq_ignore_case(user::Column::Email, identifier)),
            )
            .one(&*self.db)
            .await?;

        let user = match user {
            Some(user) if verify_password(&input.password, &user.password_hash)? => user,
            _ => {
                warn!("failed sign-in attempt");
                return Err(ServiceError::Unauthorized("invalid credentials".into()));
            }
        };
        if !user.activated {
            return Err(ServiceError::Unauthorized("account is deactivated".into()));
        }

        info!(user_id = %user.id, "signed in");
        Ok(self.auth.generate_token(&user)?)
    }

    /// Exchange a refresh token; role and activation are re-read from the database
    #[instrument(skip(self, input))]
    pub async fn refresh(&self, input: RefreshInput) -> Result<TokenPair, ServiceError> {
        let user_id = self.auth.validate_refresh_token(input.refresh_token.trim())?;
        let user = user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .filter(|u| u.activated)
            .ok_or_else(|| ServiceError::Unauthorized("account unavailable".into()))?;
        Ok(self.auth.generate_token(&user)?)
    }

    pub async fn get_account(&self, user_id: Uuid) -> Result<UserResponse, ServiceError> {
        Ok(self.find_user(user_id).await?.into())
    }

    #[instrument(skip(self, input))]
    pub async fn update_account(
        &self,
        user_id: Uuid,
        input: UpdateAccountInput,
    ) -> Result<UserResponse, ServiceError> {
        input.validate()?;
        let existing = self.find_user(user_id).await?;

        let email = input.email.map(|e| e.trim().to_lowercase());
        if let Some(email) = &email {
            self.ensure_available(&existing.login, email, Some(user_id))
                .await?;
        }

        let mut active: user::ActiveModel = existing.into();
        if let Some(email) = email {
            active.email = Set(email);
        }
        if input.first_name.is_some() {
            active.first_name = Set(optional_text(input.first_name));
        }
        if input.last_name.is_some() {
            active.last_name = Set(optional_text(input.last_name));
        }
        if input.phone.is_some() {
            active.phone = Set(optional_text(input.phone));
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?.into())
    }

    #[instrument(skip(self, input))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        input: ChangePasswordInput,
    ) -> Result<(), ServiceError> {
        input.validate()?;
        let user = self.find_user(user_id).await?;
        if !verify_password(&input.current_password, &user.password_hash)? {
            return Err(ServiceError::Unauthorized(
                "current password is incorrect".into(),
            ));
        }
        let mut active: user::ActiveModel = user.into();
        active.password_hash = Set(hash_password(&input.new_password)?);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        info!(%user_id, "password changed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        filter: UserFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<UserResponse>, u64), ServiceError> {
        let mut query = user::Entity::find();
        if let Some(term) = filter.search.as_deref().filter(|t| !t.trim().is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(ilike(user::Column::Login, term))
                    .add(ilike(user::Column::Email, term))
                    .add(ilike(user::Column::FirstName, term))
                    .add(ilike(user::Column::LastName, term)),
            );
        }
        let total = query.clone().count(&*self.db).await?;
        let users = query
            .order_by_asc(user::Column::Login)
            .offset(page_offset(page, per_page))
            .limit(per_page)
            .all(&*self.db)
            .await?;
        Ok((users.into_iter().map(Into::into).collect(), total))
    }

    pub async fn get_user(&self, id: Uuid) -> Result<UserResponse, ServiceError> {
        self.get_account(id).await
    }

    #[instrument(skip(self))]
    pub async fn set_activated(
        &self,
        id: Uuid,
        activated: bool,
        actor_id: Uuid,
    ) -> Result<UserResponse, ServiceError> {
        if id == actor_id && !activated {
            return Err(ServiceError::InvalidInput(
                "administrators cannot deactivate their own account".into(),
            ));
        }
        let mut active: user::ActiveModel = self.find_user(id).await?.into();
        active.activated = Set(activated);
        active.updated_at = Set(Utc::now());
        let user = active.update(&*self.db).await?;
        info!(user_id = %id, activated, "activation changed");
        Ok(user.into())
    }

    #[instrument(skip(self))]
    pub async fn set_role(
        &self,
        id: Uuid,
        role: UserRole,
        actor_id: Uuid,
    ) -> Result<UserResponse, ServiceError> {
        if id == actor_id && role != UserRole::Admin {
            return Err(ServiceError::InvalidInput(
                "administrators cannot demote themselves".into(),
            ));
        }
        let mut active: user::ActiveModel = self.find_user(id).await?.into();
        active.role = Set(role);
        active.updated_at = Set(Utc::now());
        let user = active.update(&*self.db).await?;
        info!(user_id = %id, role = role.as_str(), "role changed");
        Ok(user.into())
    }

    /// First administrator, created at startup when none exists yet
    #[instrument(skip(self, password))]
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> Result<bool, ServiceError> {
        let admins = user::Entity::find()
            .filter(user::Column::Role.eq(UserRole::Admin))
            .count(&*self.db)
            .await?;
        if admins > 0 {
            return Ok(false);
        }
        let email = email.trim().to_lowercase();
        if password.len() < 8 {
            return Err(ServiceError::ValidationError(
                "bootstrap admin password must have at least 8 characters".into(),
            ));
        }
        self.create_user(&login_from_email(&email), &email, password, UserRole::Admin, |_| {})
            .await?;
        Ok(true)
    }

    async fn find_user(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(login: &str) -> RegisterInput {
        RegisterInput {
            login: login.into(),
            email: "reader@example.dz".into(),
            password: "correct horse".into(),
            first_name: None,
            last_name: None,
            phone: None,
        }
    }

    #[test]
    fn login_charset() {
        assert!(register("kateb.y").validate().is_ok());
        assert!(register("ab").validate().is_err());
        assert!(register("Yacine").validate().is_err());
        assert!(register("has space").validate().is_err());
    }

    #[test]
    fn logins_derived_from_email() {
        assert_eq!(login_from_email("Assia.Djebar@example.dz"), "assia.djebar");
        assert_eq!(login_from_email("a@example.dz"), "admin");
    }
}
