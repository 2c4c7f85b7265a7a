use axum::{
    Extension,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppResult;
use crate::utils::{Claims, success_to_api_response};

/// 默认查询 7 天内到期的卡
const DEFAULT_EXPIRING_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

pub async fn trigger_expiry_check(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    tracing::info!("Expiry check triggered manually by {}", claims.sub);
    let report = state.expiry_scheduler.run_now().await;
    success_to_api_response(report)
}

pub async fn expiry_status(State(state): State<AppState>) -> impl IntoResponse {
    success_to_api_response(state.expiry_scheduler.status())
}

pub async fn trigger_performance_update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    tracing::info!("Performance update triggered manually by {}", claims.sub);
    let report = state.performance_scheduler.run_now().await;
    success_to_api_response(report)
}

pub async fn performance_status(State(state): State<AppState>) -> impl IntoResponse {
    success_to_api_response(state.performance_scheduler.status())
}

pub async fn expiring_cards(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> AppResult<impl IntoResponse> {
    let days = query.days.unwrap_or(DEFAULT_EXPIRING_DAYS);
    let cards = state.cards.get_expiring_cards(days).await?;
    Ok(success_to_api_response(cards))
}

pub async fn expired_cards(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let cards = state.cards.get_expired_cards().await?;
    Ok(success_to_api_response(cards))
}
