// 会员卡存储库
// 包含会员卡与操作记录相关的数据库操作

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Error as SqlxError, PgPool};

use crate::database::models::{
    CardFilter, CardOperation, CardStatus, MembershipCard, NewCard, NewCardOperation,
};
use crate::database::store::{CardStore, StoreResult};
use crate::error::StoreError;

const CARD_COLUMNS: &str = r#"
    id, card_no, user_id, card_type_id, status, start_date, end_date,
    remaining_times, total_times, freeze_times, freeze_days, is_frozen, frozen_at,
    source, purchase_price, operator_id, remark, version,
    created_at, updated_at, deleted_at
"#;

const OPERATION_COLUMNS: &str = r#"
    id, card_id, operation_type, operator_id, amount, old_end_date, new_end_date,
    freeze_days, transfer_to_id, remark, created_at
"#;

/// 卡号唯一索引名，见 migrations
const CARD_NO_UNIQUE: &str = "membership_cards_card_no_key";

/// 会员卡存储库，处理所有与会员卡相关的数据库操作
pub struct CardRepository {
    db: Arc<PgPool>,
}

impl CardRepository {
    /// 创建新的会员卡存储库实例
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }
}

fn is_card_no_conflict(err: &SqlxError) -> bool {
    match err {
        SqlxError::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(CARD_NO_UNIQUE)
        }
        _ => false,
    }
}

#[async_trait]
impl CardStore for CardRepository {
    async fn insert_card(&self, card: NewCard) -> StoreResult<MembershipCard> {
        let sql = format!(
            r#"
            INSERT INTO membership_cards (
                card_no, user_id, card_type_id, status, start_date, end_date,
                remaining_times, total_times, source, purchase_price, operator_id, remark
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {CARD_COLUMNS}
            "#
        );

        sqlx::query_as::<_, MembershipCard>(&sql)
            .bind(&card.card_no)
            .bind(card.user_id)
            .bind(card.card_type_id)
            .bind(CardStatus::Active)
            .bind(card.start_date)
            .bind(card.end_date)
            .bind(card.remaining_times)
            .bind(card.total_times)
            .bind(card.source)
            .bind(card.purchase_price)
            .bind(card.operator_id)
            .bind(&card.remark)
            .fetch_one(&*self.db)
            .await
            .map_err(|e| {
                if is_card_no_conflict(&e) {
                    StoreError::DuplicateCardNo(card.card_no.clone())
                } else {
                    StoreError::Database(e)
                }
            })
    }

    async fn find_card(&self, id: i64) -> StoreResult<Option<MembershipCard>> {
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM membership_cards WHERE id = $1 AND deleted_at IS NULL"
        );
        let card = sqlx::query_as::<_, MembershipCard>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(card)
    }

    async fn find_card_by_no(&self, card_no: &str) -> StoreResult<Option<MembershipCard>> {
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM membership_cards WHERE card_no = $1 AND deleted_at IS NULL"
        );
        let card = sqlx::query_as::<_, MembershipCard>(&sql)
            .bind(card_no)
            .fetch_optional(&*self.db)
            .await?;
        Ok(card)
    }

    async fn list_cards(&self, filter: &CardFilter) -> StoreResult<(Vec<MembershipCard>, i64)> {
        // $1/$2 为空时不过滤
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM membership_cards
            WHERE deleted_at IS NULL
              AND ($1::SMALLINT IS NULL OR status = $1)
              AND ($2::BIGINT IS NULL OR user_id = $2)
            "#,
        )
        .bind(filter.status)
        .bind(filter.user_id)
        .fetch_one(&*self.db)
        .await?;

        let sql = format!(
            r#"
            SELECT {CARD_COLUMNS} FROM membership_cards
            WHERE deleted_at IS NULL
              AND ($1::SMALLINT IS NULL OR status = $1)
              AND ($2::BIGINT IS NULL OR user_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let cards = sqlx::query_as::<_, MembershipCard>(&sql)
            .bind(filter.status)
            .bind(filter.user_id)
            .bind(i64::from(filter.page_size))
            .bind(filter.offset())
            .fetch_all(&*self.db)
            .await?;

        Ok((cards, total))
    }

    async fn cards_by_user(&self, user_id: i64) -> StoreResult<Vec<MembershipCard>> {
        let sql = format!(
            r#"
            SELECT {CARD_COLUMNS} FROM membership_cards
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            "#
        );
        let cards = sqlx::query_as::<_, MembershipCard>(&sql)
            .bind(user_id)
            .fetch_all(&*self.db)
            .await?;
        Ok(cards)
    }

    async fn commit_mutation(
        &self,
        card: &MembershipCard,
        operation: NewCardOperation,
    ) -> StoreResult<CardOperation> {
        // 开启事务
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE membership_cards
            SET user_id = $2,
                status = $3,
                end_date = $4,
                is_frozen = $5,
                frozen_at = $6,
                freeze_times = $7,
                freeze_days = $8,
                updated_at = NOW(),
                version = version + 1
            WHERE id = $1 AND version = $9 AND deleted_at IS NULL
            "#,
        )
        .bind(card.id)
        .bind(card.user_id)
        .bind(card.status)
        .bind(card.end_date)
        .bind(card.is_frozen)
        .bind(card.frozen_at)
        .bind(card.freeze_times)
        .bind(card.freeze_days)
        .bind(card.version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::VersionConflict { card_id: card.id });
        }

        let sql = format!(
            r#"
            INSERT INTO card_operations (
                card_id, operation_type, operator_id, amount, old_end_date, new_end_date,
                freeze_days, transfer_to_id, remark
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {OPERATION_COLUMNS}
            "#
        );
        let recorded = sqlx::query_as::<_, CardOperation>(&sql)
            .bind(operation.card_id)
            .bind(operation.operation_type)
            .bind(operation.operator_id)
            .bind(operation.amount)
            .bind(operation.old_end_date)
            .bind(operation.new_end_date)
            .bind(operation.freeze_days)
            .bind(operation.transfer_to_id)
            .bind(&operation.remark)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(recorded)
    }

    async fn operations_for_card(&self, card_id: i64) -> StoreResult<Vec<CardOperation>> {
        let sql = format!(
            r#"
            SELECT {OPERATION_COLUMNS} FROM card_operations
            WHERE card_id = $1
            ORDER BY created_at DESC, id DESC
            "#
        );
        let operations = sqlx::query_as::<_, CardOperation>(&sql)
            .bind(card_id)
            .fetch_all(&*self.db)
            .await?;
        Ok(operations)
    }

    async fn expire_overdue(&self, today: NaiveDate) -> StoreResult<u64> {
        // 版本号同步加一，让并发中的单卡操作感知到状态变化
        let result = sqlx::query(
            r#"
            UPDATE membership_cards
            SET status = $1, updated_at = NOW(), version = version + 1
            WHERE status = $2 AND end_date < $3 AND deleted_at IS NULL
            "#,
        )
        .bind(CardStatus::Expired)
        .bind(CardStatus::Active)
        .bind(today)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn active_ending_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<MembershipCard>> {
        let sql = format!(
            r#"
            SELECT {CARD_COLUMNS} FROM membership_cards
            WHERE status = $1 AND end_date >= $2 AND end_date <= $3 AND deleted_at IS NULL
            ORDER BY end_date, id
            "#
        );
        let cards = sqlx::query_as::<_, MembershipCard>(&sql)
            .bind(CardStatus::Active)
            .bind(from)
            .bind(to)
            .fetch_all(&*self.db)
            .await?;
        Ok(cards)
    }

    async fn active_ended_before(&self, today: NaiveDate) -> StoreResult<Vec<MembershipCard>> {
        let sql = format!(
            r#"
            SELECT {CARD_COLUMNS} FROM membership_cards
            WHERE status = $1 AND end_date < $2 AND deleted_at IS NULL
            ORDER BY end_date, id
            "#
        );
        let cards = sqlx::query_as::<_, MembershipCard>(&sql)
            .bind(CardStatus::Active)
            .bind(today)
            .fetch_all(&*self.db)
            .await?;
        Ok(cards)
    }

    async fn soft_delete_card(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE membership_cards
            SET deleted_at = NOW(), updated_at = NOW(), version = version + 1
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
