// 存储边界
// 业务层只依赖这些 trait，Postgres 与内存实现可互换

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::database::models::{
    CardFilter, CardOperation, CardType, CoachPerformance, CompletedCourse, MembershipCard,
    NewCard, NewCardOperation, NewNotification,
};
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// 会员卡与操作记录的持久化
#[async_trait]
pub trait CardStore: Send + Sync {
    /// 插入新卡，卡号冲突时返回 [`StoreError::DuplicateCardNo`]
    async fn insert_card(&self, card: NewCard) -> StoreResult<MembershipCard>;

    async fn find_card(&self, id: i64) -> StoreResult<Option<MembershipCard>>;

    async fn find_card_by_no(&self, card_no: &str) -> StoreResult<Option<MembershipCard>>;

    /// 分页查询，返回 (当前页, 总数)
    async fn list_cards(&self, filter: &CardFilter) -> StoreResult<(Vec<MembershipCard>, i64)>;

    async fn cards_by_user(&self, user_id: i64) -> StoreResult<Vec<MembershipCard>>;

    /// 在同一事务中写回卡片并追加操作记录。
    ///
    /// `card.version` 必须是读取时的版本；版本不符时整个事务回滚并返回
    /// [`StoreError::VersionConflict`]。
    async fn commit_mutation(
        &self,
        card: &MembershipCard,
        operation: NewCardOperation,
    ) -> StoreResult<CardOperation>;

    /// 卡片的全部操作记录，最新的在前
    async fn operations_for_card(&self, card_id: i64) -> StoreResult<Vec<CardOperation>>;

    /// 批量把 `end_date < today` 的正常卡置为过期，返回影响行数
    async fn expire_overdue(&self, today: NaiveDate) -> StoreResult<u64>;

    /// 正常状态且 `end_date` 落在 `[from, to]` 内的卡
    async fn active_ending_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<MembershipCard>>;

    /// 正常状态但 `end_date < today` 的卡
    async fn active_ended_before(&self, today: NaiveDate) -> StoreResult<Vec<MembershipCard>>;

    /// 软删除，返回是否存在
    async fn soft_delete_card(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait CardTypeRegistry: Send + Sync {
    async fn get_card_type(&self, id: i64) -> StoreResult<Option<CardType>>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn user_exists(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn create_notification(&self, notification: NewNotification) -> StoreResult<()>;
}

/// 教练业绩统计所需的数据访问
#[async_trait]
pub trait PerformanceStore: Send + Sync {
    async fn coach_ids(&self) -> StoreResult<Vec<i64>>;

    async fn completed_courses(
        &self,
        coach_id: i64,
        year: i32,
        month: u32,
    ) -> StoreResult<Vec<CompletedCourse>>;

    async fn save_performance(&self, performance: &CoachPerformance) -> StoreResult<()>;
}
