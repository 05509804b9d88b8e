//! Account route handlers (require a session).

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{SubscriptionRecord, UsageOutcome};
use crate::state::AppState;

use super::auth::UserResponse;

/// Account overview.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user: UserResponse,
    /// Absent when the store cannot be reached or the user has none yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionRecord>,
}

/// Usage after a metered generation.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub usage_count: i32,
    pub usage_limit: Option<i32>,
}

/// Identity from the session token, plus the subscription when available.
#[instrument(skip(state, claims), fields(user_id = %claims.user_id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(claims): RequireAuth,
) -> Json<AccountResponse> {
    let subscription = match state.reconciler().subscription(claims.user_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!(error = %e, "Subscription unavailable; serving identity only");
            None
        }
    };

    Json(AccountResponse {
        user: claims.into(),
        subscription,
    })
}

/// Meter one generation against the user's plan.
#[instrument(skip(state, claims), fields(user_id = %claims.user_id))]
pub async fn record_usage(
    State(state): State<AppState>,
    RequireAuth(claims): RequireAuth,
) -> Result<Json<UsageResponse>> {
    match state.reconciler().record_usage(claims.user_id).await? {
        UsageOutcome::Recorded {
            usage_count,
            usage_limit,
        } => Ok(Json(UsageResponse {
            usage_count,
            usage_limit,
        })),
        UsageOutcome::LimitReached { usage_limit } => Err(AppError::PaymentRequired(format!(
            "Usage limit of {usage_limit} reached for this billing period"
        ))),
        UsageOutcome::Inactive => Err(AppError::PaymentRequired(
            "Subscription is not active".to_string(),
        )),
        UsageOutcome::NoSubscription => Err(AppError::PaymentRequired(
            "No subscription for this account".to_string(),
        )),
    }
}
