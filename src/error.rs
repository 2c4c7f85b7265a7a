use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::utils::{error_codes, error_to_api_response};

/// 持久化边界上的错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    /// 乐观锁版本不匹配，卡片已被并发修改
    #[error("会员卡 {card_id} 已被并发修改")]
    VersionConflict { card_id: i64 },

    #[error("卡号重复: {0}")]
    DuplicateCardNo(String),

    #[error("存储不可用: {0}")]
    Unavailable(String),
}

/// 业务层错误，同时也是 HTTP 层的错误响应
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    PolicyViolation(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("未授权访问")]
    Unauthorized,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PolicyViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AppError::NotFound(_) => error_codes::NOT_FOUND,
            AppError::InvalidState(_) => error_codes::INVALID_STATE,
            AppError::PolicyViolation(_) => error_codes::POLICY_VIOLATION,
            AppError::Validation(_) => error_codes::VALIDATION_ERROR,
            AppError::Conflict(_) => error_codes::CONFLICT,
            AppError::Unauthorized => error_codes::AUTH_FAILED,
            AppError::Storage(_) => error_codes::INTERNAL_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // 存储层细节不暴露给调用方
        let message = match &self {
            AppError::Storage(e) => {
                tracing::error!("Storage failure: {}", e);
                "内部服务器错误".to_string()
            }
            other => other.to_string(),
        };

        (status, error_to_api_response::<()>(self.code(), message)).into_response()
    }
}
