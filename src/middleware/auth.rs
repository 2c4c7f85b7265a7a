use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};

use crate::{AppState, error::AppError, utils::verify_token};

/// 校验 Bearer 令牌，并把 [`Claims`](crate::utils::Claims) 放入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let claims = verify_token(token.trim(), &state.config).map_err(|e| {
        tracing::debug!("Token rejected: {}", e);
        AppError::Unauthorized
    })?;

    // 令牌主体必须是数字操作员ID
    if claims.operator_id().is_none() {
        return Err(AppError::Unauthorized);
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
