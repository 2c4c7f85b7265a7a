use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, middleware::auth_middleware};

pub mod admin;
pub mod card;

/// 构建全部业务路由，统一挂在 `api_base_uri` 下并要求认证
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        // 会员卡路由
        .route("/cards", post(card::create_card).get(card::list_cards))
        .route("/cards/{id}", get(card::get_card).delete(card::delete_card))
        .route("/cards/by-no/{card_no}", get(card::get_card_by_no))
        .route("/cards/{id}/operations", get(card::get_card_operations))
        .route("/cards/{id}/renew", post(card::renew_card))
        .route("/cards/{id}/freeze", post(card::freeze_card))
        .route("/cards/{id}/unfreeze", post(card::unfreeze_card))
        .route("/cards/{id}/transfer", post(card::transfer_card))
        .route("/users/{user_id}/cards", get(card::get_cards_by_user))
        // 管理路由
        .route("/admin/scheduler/trigger", post(admin::trigger_expiry_check))
        .route("/admin/scheduler/status", get(admin::expiry_status))
        .route(
            "/admin/performance/trigger",
            post(admin::trigger_performance_update),
        )
        .route("/admin/performance/status", get(admin::performance_status))
        .route("/admin/cards/expiring", get(admin::expiring_cards))
        .route("/admin/cards/expired", get(admin::expired_cards))
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest(&state.config.api_base_uri, protected_routes)
        .with_state(state)
}
