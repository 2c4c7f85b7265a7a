// 卡类型与用户存储库
// 会员卡引擎只读取这些数据，不做修改

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::models::CardType;
use crate::database::store::{CardTypeRegistry, IdentityProvider, StoreResult};

pub struct CardTypeRepository {
    db: Arc<PgPool>,
}

impl CardTypeRepository {
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CardTypeRegistry for CardTypeRepository {
    async fn get_card_type(&self, id: i64) -> StoreResult<Option<CardType>> {
        let card_type = sqlx::query_as::<_, CardType>(
            r#"
            SELECT
                id, type_name, type_code, duration_type, duration_value, price,
                can_freeze, max_freeze_times, max_freeze_days, can_transfer,
                transfer_fee, status
            FROM card_types
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(card_type)
    }
}

/// 用户存储库，只提供存在性检查
pub struct UserRepository {
    db: Arc<PgPool>,
}

impl UserRepository {
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityProvider for UserRepository {
    async fn user_exists(&self, id: i64) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE id = $1 AND deleted_at IS NULL
            )
            "#,
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await?;

        Ok(exists)
    }
}
