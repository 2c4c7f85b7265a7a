// 会员卡服务
// 负责会员卡的创建、查询与四种生命周期操作

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::lifecycle::{Mutation, MutationContext};
use super::lock::CardLocks;
use crate::database::models::{
    CardFilter, CardOperation, CardSource, CardStatus, CardType, MembershipCard, NewCard,
};
use crate::database::store::{CardStore, CardTypeRegistry, IdentityProvider};
use crate::error::{AppError, AppResult, StoreError};
use crate::utils::PaginatedResponse;
use crate::utils::time::{Clock, add_days};

/// 版本冲突时的最大提交次数
const MAX_COMMIT_ATTEMPTS: usize = 3;
/// 卡号冲突时的最大生成次数
const MAX_CARD_NO_ATTEMPTS: usize = 5;
const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// 开卡请求
#[derive(Debug, Clone)]
pub struct CreateCardInput {
    pub user_id: i64,
    pub card_type_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub purchase_price: Decimal,
    pub remark: String,
    pub source: CardSource,
    pub operator_id: Option<i64>,
    pub remaining_times: Option<i32>,
    pub total_times: Option<i32>,
}

pub struct CardService {
    store: Arc<dyn CardStore>,
    card_types: Arc<dyn CardTypeRegistry>,
    users: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    locks: CardLocks,
}

/// 生成卡号：C + 日期 + 6 位随机数
pub fn generate_card_no(today: NaiveDate) -> String {
    let suffix = Uuid::new_v4().as_u128() % 1_000_000;
    format!("C{}{:06}", today.format("%Y%m%d"), suffix)
}

impl CardService {
    pub fn new(
        store: Arc<dyn CardStore>,
        card_types: Arc<dyn CardTypeRegistry>,
        users: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            card_types,
            users,
            clock,
            locks: CardLocks::new(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 开卡。卡类型和用户是否存在由调用方保证
    pub async fn create_card(&self, input: CreateCardInput) -> AppResult<MembershipCard> {
        if input.end_date < input.start_date {
            return Err(AppError::Validation("结束日期不能早于开始日期".into()));
        }
        if input.purchase_price.is_sign_negative() {
            return Err(AppError::Validation("购买价格不能为负数".into()));
        }

        let today = self.clock.today();
        for attempt in 1..=MAX_CARD_NO_ATTEMPTS {
            let new_card = NewCard {
                card_no: generate_card_no(today),
                user_id: input.user_id,
                card_type_id: input.card_type_id,
                start_date: input.start_date,
                end_date: input.end_date,
                remaining_times: input.remaining_times,
                total_times: input.total_times,
                source: input.source,
                purchase_price: input.purchase_price,
                operator_id: input.operator_id,
                remark: input.remark.clone(),
            };

            match self.store.insert_card(new_card).await {
                Ok(card) => {
                    tracing::info!(
                        "Card {} created for user {} (type {})",
                        card.card_no,
                        card.user_id,
                        card.card_type_id
                    );
                    return Ok(card);
                }
                Err(StoreError::DuplicateCardNo(card_no)) => {
                    tracing::warn!(
                        "Card number {} already taken, regenerating (attempt {})",
                        card_no,
                        attempt
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Conflict("生成卡号失败，请重试".into()))
    }

    pub async fn get_card(&self, id: i64) -> AppResult<MembershipCard> {
        self.store
            .find_card(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("会员卡 {} 不存在", id)))
    }

    pub async fn get_card_by_no(&self, card_no: &str) -> AppResult<MembershipCard> {
        self.store
            .find_card_by_no(card_no)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("卡号 {} 不存在", card_no)))
    }

    pub async fn list_cards(
        &self,
        page: u32,
        page_size: u32,
        status: Option<CardStatus>,
        user_id: Option<i64>,
    ) -> AppResult<PaginatedResponse<MembershipCard>> {
        let filter = CardFilter {
            status,
            user_id,
            page: page.max(1),
            page_size: if page_size == 0 || page_size > MAX_PAGE_SIZE {
                DEFAULT_PAGE_SIZE
            } else {
                page_size
            },
        };

        let (items, total) = self.store.list_cards(&filter).await?;
        Ok(PaginatedResponse {
            items,
            page: filter.page,
            page_size: filter.page_size,
            total,
        })
    }

    pub async fn get_cards_by_user(&self, user_id: i64) -> AppResult<Vec<MembershipCard>> {
        Ok(self.store.cards_by_user(user_id).await?)
    }

    /// 管理员软删除
    pub async fn delete_card(&self, id: i64) -> AppResult<()> {
        let _guard = self.locks.lock(id).await;
        if self.store.soft_delete_card(id).await? {
            tracing::warn!("Card {} soft-deleted", id);
            Ok(())
        } else {
            Err(AppError::NotFound(format!("会员卡 {} 不存在", id)))
        }
    }

    pub async fn renew_card(
        &self,
        card_id: i64,
        months: u32,
        amount: Decimal,
        operator_id: i64,
        remark: &str,
    ) -> AppResult<CardOperation> {
        self.mutate(card_id, Mutation::Renew { months, amount }, operator_id, remark)
            .await
    }

    pub async fn freeze_card(
        &self,
        card_id: i64,
        freeze_days: i32,
        operator_id: i64,
        remark: &str,
    ) -> AppResult<CardOperation> {
        self.mutate(
            card_id,
            Mutation::Freeze { days: freeze_days },
            operator_id,
            remark,
        )
        .await
    }

    pub async fn unfreeze_card(
        &self,
        card_id: i64,
        operator_id: i64,
        remark: &str,
    ) -> AppResult<CardOperation> {
        self.mutate(card_id, Mutation::Unfreeze, operator_id, remark)
            .await
    }

    pub async fn transfer_card(
        &self,
        card_id: i64,
        to_user_id: i64,
        transfer_fee: Decimal,
        operator_id: i64,
        remark: &str,
    ) -> AppResult<CardOperation> {
        self.mutate(
            card_id,
            Mutation::Transfer {
                to_user_id,
                fee: transfer_fee,
            },
            operator_id,
            remark,
        )
        .await
    }

    pub async fn get_card_operations(&self, card_id: i64) -> AppResult<Vec<CardOperation>> {
        Ok(self.store.operations_for_card(card_id).await?)
    }

    /// 批量过期，返回影响的卡片数
    pub async fn expire_overdue_cards(&self) -> AppResult<u64> {
        let today = self.clock.today();
        Ok(self.store.expire_overdue(today).await?)
    }

    /// 未来 `days` 天内（含今天）到期的正常卡
    pub async fn get_expiring_cards(&self, days: i64) -> AppResult<Vec<MembershipCard>> {
        if days < 0 {
            return Err(AppError::Validation("天数不能为负数".into()));
        }
        let today = self.clock.today();
        let until = add_days(today, days)
            .ok_or_else(|| AppError::Validation("天数超出范围".into()))?;
        Ok(self.store.active_ending_between(today, until).await?)
    }

    /// 已过期但尚未被标记的正常卡
    pub async fn get_expired_cards(&self) -> AppResult<Vec<MembershipCard>> {
        let today = self.clock.today();
        Ok(self.store.active_ended_before(today).await?)
    }

    async fn load_card_type(&self, card_type_id: i64) -> AppResult<CardType> {
        self.card_types
            .get_card_type(card_type_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("卡类型 {} 不存在", card_type_id)))
    }

    /// 单卡修改的统一入口：加锁、读取、校验、事务提交，版本冲突时重读重试
    async fn mutate(
        &self,
        card_id: i64,
        mutation: Mutation,
        operator_id: i64,
        remark: &str,
    ) -> AppResult<CardOperation> {
        mutation.validate()?;

        let _guard = self.locks.lock(card_id).await;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut card = self.get_card(card_id).await?;
            mutation.check_state(&card)?;

            if mutation.needs_card_type() {
                let card_type = self.load_card_type(card.card_type_id).await?;
                mutation.check_policy(&card, &card_type)?;
            }

            if let Mutation::Transfer { to_user_id, .. } = &mutation {
                if !self.users.user_exists(*to_user_id).await? {
                    return Err(AppError::NotFound(format!("目标用户 {} 不存在", to_user_id)));
                }
            }

            let ctx = MutationContext {
                operator_id,
                remark: remark.to_string(),
                today: self.clock.today(),
                now: Utc::now(),
            };
            let operation = mutation.apply(&mut card, &ctx)?;

            match self.store.commit_mutation(&card, operation).await {
                Ok(recorded) => {
                    tracing::info!(
                        "Card {} {:?} by operator {}: end date {} -> {}",
                        card_id,
                        recorded.operation_type,
                        operator_id,
                        recorded.old_end_date,
                        recorded.new_end_date
                    );
                    return Ok(recorded);
                }
                Err(StoreError::VersionConflict { .. }) => {
                    tracing::warn!(
                        "Card {} changed concurrently, retrying {:?} (attempt {})",
                        card_id,
                        mutation.operation_type(),
                        attempt
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Conflict(format!(
            "会员卡 {} 正在被修改，请稍后重试",
            card_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_no_is_date_prefixed() {
        let no = generate_card_no(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
        assert_eq!(no.len(), 15);
        assert!(no.starts_with("C20250309"));
        assert!(no[9..].chars().all(|c| c.is_ascii_digit()));
    }
}
