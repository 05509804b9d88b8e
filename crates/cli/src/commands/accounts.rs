//! Account management commands.
//!
//! These write to the identity store directly, bypassing any running
//! server's identity cache. A server that cached a process-local account for
//! the same email adopts the stored one on that user's next login.
//!
//! # Usage
//!
//! ```bash
//! cr-cli user create -e rep@acme.io -n "Sales Rep" -p 'a long password'
//! cr-cli subscription set-plan -e rep@acme.io -p pro
//! ```
//!
//! # Environment Variables
//!
//! - `CALLREADY_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

use thiserror::Error;

use callready_core::{Email, PlanTier, UserId};
use callready_server::db;
use callready_server::models::{SubscriptionDefaults, UserRecord};
use callready_server::services::identity::{
    Argon2Settings, IdentityStore, MIN_PASSWORD_LENGTH, PasswordError, PasswordHasher,
    PgIdentityStore, StoreError,
};

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Identity store error.
    #[error("Identity store error: {0}")]
    Store(#[from] StoreError),

    /// Password hashing error.
    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Password too short.
    #[error("Password must be at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,

    /// Invalid plan.
    #[error("Invalid plan: {0}. Valid plans: free, starter, pro, enterprise")]
    InvalidPlan(String),

    /// User already exists.
    #[error("User already exists with email: {0}")]
    UserExists(String),

    /// No such user.
    #[error("No user with email: {0}")]
    UserNotFound(String),
}

async fn connect() -> Result<PgIdentityStore, AccountError> {
    let database_url =
        super::database_url().ok_or(AccountError::MissingEnvVar("CALLREADY_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;
    Ok(PgIdentityStore::new(pool))
}

/// Create a user with the default subscription.
///
/// # Returns
///
/// The ID of the created user.
///
/// # Errors
///
/// Returns `AccountError` if validation fails, the email is taken, or the
/// database is unreachable.
pub async fn create_user(email: &str, name: &str, password: &str) -> Result<UserId, AccountError> {
    let email = Email::parse(email).map_err(|e| AccountError::InvalidEmail(e.to_string()))?;
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AccountError::WeakPassword);
    }

    let store = connect().await?;
    let hasher = PasswordHasher::new(Argon2Settings::default())?;

    let record = UserRecord {
        id: UserId::generate(),
        email: email.clone(),
        display_name: name.trim().to_owned(),
        password_hash: hasher.hash(password)?,
    };

    tracing::info!("Creating user: {}", email);
    match store.insert_credential(&record).await {
        Ok(()) => {}
        Err(StoreError::Conflict) => return Err(AccountError::UserExists(email.into_inner())),
        Err(e) => return Err(e.into()),
    }

    let subscription = store
        .ensure_subscription(record.id, &SubscriptionDefaults::default())
        .await?;

    tracing::info!(
        "Created user {} with id {} on the {} plan",
        email,
        record.id,
        subscription.plan
    );
    Ok(record.id)
}

/// Move a user to `plan`, reactivating the subscription.
///
/// # Errors
///
/// Returns `AccountError` if the email or plan is invalid, the user does not
/// exist, or the database is unreachable.
pub async fn set_plan(email: &str, plan: &str) -> Result<(), AccountError> {
    let email = Email::parse(email).map_err(|e| AccountError::InvalidEmail(e.to_string()))?;
    let plan: PlanTier = plan
        .parse()
        .map_err(|_| AccountError::InvalidPlan(plan.to_owned()))?;

    let store = connect().await?;
    let user = store
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AccountError::UserNotFound(email.as_str().to_owned()))?;

    // Users created before subscriptions existed get one first.
    store
        .ensure_subscription(user.record.id, &SubscriptionDefaults::default())
        .await?;

    let updated = store
        .set_plan(user.record.id, plan)
        .await?
        .ok_or_else(|| AccountError::UserNotFound(email.as_str().to_owned()))?;

    tracing::info!(
        "Moved {} to the {} plan (limit: {})",
        email,
        updated.plan,
        updated
            .usage_limit
            .map_or_else(|| "unlimited".to_owned(), |limit| limit.to_string())
    );
    Ok(())
}
