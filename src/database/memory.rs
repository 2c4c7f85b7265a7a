//! 内存存储
//!
//! 与 Postgres 存储库行为一致的进程内实现，供集成测试和本地演示使用。
//! 可以按用户或步骤注入失败，用来验证调度器的容错行为。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use parking_lot::Mutex;

use crate::database::models::{
    CardFilter, CardOperation, CardStatus, CardType, CoachPerformance, CompletedCourse,
    MembershipCard, NewCard, NewCardOperation, NewNotification,
};
use crate::database::store::{
    CardStore, CardTypeRegistry, IdentityProvider, NotificationSink, PerformanceStore, StoreResult,
};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    cards: Vec<MembershipCard>,
    operations: Vec<CardOperation>,
    card_types: HashMap<i64, CardType>,
    users: HashSet<i64>,
    notifications: Vec<NewNotification>,
    coaches: Vec<i64>,
    courses: Vec<CompletedCourse>,
    performances: HashMap<(i64, i32, u32), CoachPerformance>,
    failing_notification_users: HashSet<i64>,
    failing_coaches: HashSet<i64>,
    fail_bulk_expire: bool,
    next_card_id: i64,
    next_operation_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: i64) {
        self.inner.lock().users.insert(user_id);
    }

    pub fn add_card_type(&self, card_type: CardType) {
        self.inner.lock().card_types.insert(card_type.id, card_type);
    }

    pub fn add_coach(&self, coach_id: i64) {
        self.inner.lock().coaches.push(coach_id);
    }

    pub fn add_course(&self, course: CompletedCourse) {
        self.inner.lock().courses.push(course);
    }

    /// 直接覆盖卡片状态，模拟外部修改
    pub fn overwrite_card(&self, card: MembershipCard) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.cards.iter_mut().find(|c| c.id == card.id) {
            *slot = card;
        }
    }

    pub fn notifications(&self) -> Vec<NewNotification> {
        self.inner.lock().notifications.clone()
    }

    pub fn operation_count(&self) -> usize {
        self.inner.lock().operations.len()
    }

    pub fn performance(&self, coach_id: i64, year: i32, month: u32) -> Option<CoachPerformance> {
        self.inner
            .lock()
            .performances
            .get(&(coach_id, year, month))
            .cloned()
    }

    pub fn fail_notifications_for(&self, user_id: i64) {
        self.inner.lock().failing_notification_users.insert(user_id);
    }

    pub fn fail_performance_for(&self, coach_id: i64) {
        self.inner.lock().failing_coaches.insert(coach_id);
    }

    pub fn set_fail_bulk_expire(&self, fail: bool) {
        self.inner.lock().fail_bulk_expire = fail;
    }
}

fn live(card: &MembershipCard) -> bool {
    card.deleted_at.is_none()
}

#[async_trait]
impl CardStore for MemoryStore {
    async fn insert_card(&self, card: NewCard) -> StoreResult<MembershipCard> {
        let mut inner = self.inner.lock();
        if inner.cards.iter().any(|c| c.card_no == card.card_no) {
            return Err(StoreError::DuplicateCardNo(card.card_no));
        }

        inner.next_card_id += 1;
        let now = Utc::now();
        let stored = MembershipCard {
            id: inner.next_card_id,
            card_no: card.card_no,
            user_id: card.user_id,
            card_type_id: card.card_type_id,
            status: CardStatus::Active,
            start_date: card.start_date,
            end_date: card.end_date,
            remaining_times: card.remaining_times,
            total_times: card.total_times,
            freeze_times: 0,
            freeze_days: 0,
            is_frozen: false,
            frozen_at: None,
            source: card.source,
            purchase_price: card.purchase_price,
            operator_id: card.operator_id,
            remark: card.remark,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        inner.cards.push(stored.clone());
        Ok(stored)
    }

    async fn find_card(&self, id: i64) -> StoreResult<Option<MembershipCard>> {
        let inner = self.inner.lock();
        Ok(inner
            .cards
            .iter()
            .find(|c| c.id == id && live(c))
            .cloned())
    }

    async fn find_card_by_no(&self, card_no: &str) -> StoreResult<Option<MembershipCard>> {
        let inner = self.inner.lock();
        Ok(inner
            .cards
            .iter()
            .find(|c| c.card_no == card_no && live(c))
            .cloned())
    }

    async fn list_cards(&self, filter: &CardFilter) -> StoreResult<(Vec<MembershipCard>, i64)> {
        let inner = self.inner.lock();
        let mut matched: Vec<MembershipCard> = inner
            .cards
            .iter()
            .filter(|c| live(c))
            .filter(|c| filter.status.is_none_or(|s| c.status == s))
            .filter(|c| filter.user_id.is_none_or(|u| c.user_id == u))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.page_size as usize)
            .collect();
        Ok((page, total))
    }

    async fn cards_by_user(&self, user_id: i64) -> StoreResult<Vec<MembershipCard>> {
        let inner = self.inner.lock();
        let mut cards: Vec<MembershipCard> = inner
            .cards
            .iter()
            .filter(|c| c.user_id == user_id && live(c))
            .cloned()
            .collect();
        cards.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(cards)
    }

    async fn commit_mutation(
        &self,
        card: &MembershipCard,
        operation: NewCardOperation,
    ) -> StoreResult<CardOperation> {
        let mut inner = self.inner.lock();

        let slot = inner
            .cards
            .iter_mut()
            .find(|c| c.id == card.id && live(c) && c.version == card.version)
            .ok_or(StoreError::VersionConflict { card_id: card.id })?;

        let mut updated = card.clone();
        updated.version = card.version + 1;
        updated.updated_at = Utc::now();
        *slot = updated;

        inner.next_operation_id += 1;
        let recorded = CardOperation {
            id: inner.next_operation_id,
            card_id: operation.card_id,
            operation_type: operation.operation_type,
            operator_id: operation.operator_id,
            amount: operation.amount,
            old_end_date: operation.old_end_date,
            new_end_date: operation.new_end_date,
            freeze_days: operation.freeze_days,
            transfer_to_id: operation.transfer_to_id,
            remark: operation.remark,
            created_at: Utc::now(),
        };
        inner.operations.push(recorded.clone());
        Ok(recorded)
    }

    async fn operations_for_card(&self, card_id: i64) -> StoreResult<Vec<CardOperation>> {
        let inner = self.inner.lock();
        let mut operations: Vec<CardOperation> = inner
            .operations
            .iter()
            .filter(|op| op.card_id == card_id)
            .cloned()
            .collect();
        operations.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(operations)
    }

    async fn expire_overdue(&self, today: NaiveDate) -> StoreResult<u64> {
        let mut inner = self.inner.lock();
        if inner.fail_bulk_expire {
            return Err(StoreError::Unavailable("bulk expire disabled".into()));
        }

        let mut affected = 0;
        for card in inner.cards.iter_mut().filter(|c| live(c)) {
            if card.status == CardStatus::Active && card.end_date < today {
                card.status = CardStatus::Expired;
                card.version += 1;
                card.updated_at = Utc::now();
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn active_ending_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<MembershipCard>> {
        let inner = self.inner.lock();
        Ok(inner
            .cards
            .iter()
            .filter(|c| live(c) && c.status == CardStatus::Active)
            .filter(|c| c.end_date >= from && c.end_date <= to)
            .cloned()
            .collect())
    }

    async fn active_ended_before(&self, today: NaiveDate) -> StoreResult<Vec<MembershipCard>> {
        let inner = self.inner.lock();
        Ok(inner
            .cards
            .iter()
            .filter(|c| live(c) && c.status == CardStatus::Active && c.end_date < today)
            .cloned()
            .collect())
    }

    async fn soft_delete_card(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        match inner.cards.iter_mut().find(|c| c.id == id && live(c)) {
            Some(card) => {
                card.deleted_at = Some(Utc::now());
                card.version += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CardTypeRegistry for MemoryStore {
    async fn get_card_type(&self, id: i64) -> StoreResult<Option<CardType>> {
        Ok(self.inner.lock().card_types.get(&id).cloned())
    }
}

#[async_trait]
impl IdentityProvider for MemoryStore {
    async fn user_exists(&self, id: i64) -> StoreResult<bool> {
        Ok(self.inner.lock().users.contains(&id))
    }
}

#[async_trait]
impl NotificationSink for MemoryStore {
    async fn create_notification(&self, notification: NewNotification) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner
            .failing_notification_users
            .contains(&notification.user_id)
        {
            return Err(StoreError::Unavailable(format!(
                "notification insert rejected for user {}",
                notification.user_id
            )));
        }
        inner.notifications.push(notification);
        Ok(())
    }
}

#[async_trait]
impl PerformanceStore for MemoryStore {
    async fn coach_ids(&self) -> StoreResult<Vec<i64>> {
        Ok(self.inner.lock().coaches.clone())
    }

    async fn completed_courses(
        &self,
        coach_id: i64,
        year: i32,
        month: u32,
    ) -> StoreResult<Vec<CompletedCourse>> {
        let inner = self.inner.lock();
        if inner.failing_coaches.contains(&coach_id) {
            return Err(StoreError::Unavailable(format!(
                "courses unavailable for coach {}",
                coach_id
            )));
        }
        Ok(inner
            .courses
            .iter()
            .filter(|c| c.coach_id == coach_id)
            .filter(|c| c.start_time.year() == year && c.start_time.month() == month)
            .cloned()
            .collect())
    }

    async fn save_performance(&self, performance: &CoachPerformance) -> StoreResult<()> {
        self.inner.lock().performances.insert(
            (performance.coach_id, performance.year, performance.month),
            performance.clone(),
        );
        Ok(())
    }
}
