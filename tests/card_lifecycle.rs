mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use common::*;
use gym_backend::card::{CardService, CreateCardInput};
use gym_backend::database::models::{
    CardFilter, CardOperation, CardSource, CardStatus, MembershipCard, NewCard, NewCardOperation,
    OperationType,
};
use gym_backend::database::{CardStore, MemoryStore, StoreResult};
use gym_backend::error::{AppError, StoreError};
use gym_backend::utils::time::{Clock, add_days, add_months};
use rust_decimal::Decimal;

#[tokio::test]
async fn renew_extends_from_current_end_date() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 5, 20)).await;

    let op = h
        .cards
        .renew_card(card.id, 1, Decimal::from(299), OPERATOR, "续一个月")
        .await
        .unwrap();

    assert_eq!(op.operation_type, OperationType::Renew);
    assert_eq!(op.old_end_date, ymd(2025, 5, 20));
    assert_eq!(op.new_end_date, ymd(2025, 6, 20));
    assert_eq!(op.amount, Decimal::from(299));
    assert_eq!(op.operator_id, OPERATOR);
    assert_eq!(h.card(card.id).await.end_date, ymd(2025, 6, 20));
}

#[tokio::test]
async fn renewing_expired_card_restarts_from_today() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 3, 31)).await;

    assert_eq!(h.cards.expire_overdue_cards().await.unwrap(), 1);
    assert_eq!(h.card(card.id).await.status, CardStatus::Expired);

    let op = h
        .cards
        .renew_card(card.id, 3, Decimal::from(799), OPERATOR, "")
        .await
        .unwrap();

    let renewed = h.card(card.id).await;
    assert_eq!(renewed.status, CardStatus::Active);
    assert_eq!(renewed.end_date, add_months(h.today(), 3).unwrap());
    assert_eq!(op.old_end_date, ymd(2025, 3, 31));
    assert_eq!(op.new_end_date, ymd(2025, 8, 1));
}

#[tokio::test]
async fn freeze_adds_exact_days_and_unfreeze_keeps_end_date() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;

    let op = h
        .cards
        .freeze_card(card.id, 10, OPERATOR, "出差")
        .await
        .unwrap();
    assert_eq!(op.freeze_days, 10);

    let frozen = h.card(card.id).await;
    assert_eq!(frozen.end_date, add_days(ymd(2025, 12, 31), 10).unwrap());
    assert_eq!(frozen.freeze_days, 10);
    assert_eq!(frozen.freeze_times, 1);
    assert!(frozen.is_frozen);
    assert_eq!(frozen.status, CardStatus::Frozen);

    let op = h.cards.unfreeze_card(card.id, OPERATOR, "").await.unwrap();
    assert_eq!(op.old_end_date, op.new_end_date);

    let thawed = h.card(card.id).await;
    assert_eq!(thawed.end_date, frozen.end_date);
    assert_eq!(thawed.freeze_days, 10);
    assert!(!thawed.is_frozen);
    assert_eq!(thawed.status, CardStatus::Active);
}

#[tokio::test]
async fn third_freeze_violates_max_freeze_times() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;

    for _ in 0..2 {
        h.cards.freeze_card(card.id, 3, OPERATOR, "").await.unwrap();
        h.cards.unfreeze_card(card.id, OPERATOR, "").await.unwrap();
    }

    let err = h.cards.freeze_card(card.id, 3, OPERATOR, "").await.unwrap_err();
    assert!(matches!(err, AppError::PolicyViolation(_)), "{err:?}");
    assert_eq!(h.card(card.id).await.freeze_times, 2);
}

#[tokio::test]
async fn cumulative_freeze_days_are_capped() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;

    h.cards.freeze_card(card.id, 25, OPERATOR, "").await.unwrap();
    h.cards.unfreeze_card(card.id, OPERATOR, "").await.unwrap();

    let err = h.cards.freeze_card(card.id, 6, OPERATOR, "").await.unwrap_err();
    assert!(matches!(err, AppError::PolicyViolation(_)), "{err:?}");
}

#[tokio::test]
async fn freeze_is_rejected_when_card_type_disallows_it() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, BASIC_TYPE, ymd(2025, 12, 31)).await;

    let err = h.cards.freeze_card(card.id, 5, OPERATOR, "").await.unwrap_err();
    assert!(matches!(err, AppError::PolicyViolation(_)));

    let err = h
        .cards
        .transfer_card(card.id, OTHER_MEMBER, Decimal::ZERO, OPERATOR, "")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PolicyViolation(_)));
    assert_eq!(h.store.operation_count(), 0);
}

#[tokio::test]
async fn transferring_frozen_card_fails_and_keeps_owner() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;
    h.cards.freeze_card(card.id, 5, OPERATOR, "").await.unwrap();

    let err = h
        .cards
        .transfer_card(card.id, OTHER_MEMBER, Decimal::from(100), OPERATOR, "")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidState(_)), "{err:?}");
    assert_eq!(h.card(card.id).await.user_id, MEMBER);
    assert_eq!(h.store.operation_count(), 1);
}

#[tokio::test]
async fn transfer_moves_card_and_blocks_later_renewal() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;

    let op = h
        .cards
        .transfer_card(card.id, OTHER_MEMBER, Decimal::from(100), OPERATOR, "家人")
        .await
        .unwrap();
    assert_eq!(op.transfer_to_id, Some(OTHER_MEMBER));
    assert_eq!(op.amount, Decimal::from(100));
    assert_eq!(op.remark, "从用户1转至用户2, 家人");

    let moved = h.card(card.id).await;
    assert_eq!(moved.user_id, OTHER_MEMBER);
    assert_eq!(moved.status, CardStatus::Transferred);

    let err = h
        .cards
        .renew_card(card.id, 1, Decimal::from(299), OPERATOR, "")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn transfer_to_unknown_user_is_not_found() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;

    let err = h
        .cards
        .transfer_card(card.id, 404, Decimal::ZERO, OPERATOR, "")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(h.card(card.id).await.user_id, MEMBER);
}

#[tokio::test]
async fn invalid_arguments_are_rejected_before_loading() {
    let h = harness(ymd(2025, 5, 1));

    let err = h
        .cards
        .renew_card(12345, 0, Decimal::ZERO, OPERATOR, "")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h.cards.freeze_card(12345, -1, OPERATOR, "").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h.cards.unfreeze_card(12345, OPERATOR, "").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn each_mutation_appends_one_matching_operation() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 9, 30)).await;

    let mut previous_end = h.card(card.id).await.end_date;
    let steps: Vec<OperationType> = vec![
        OperationType::Renew,
        OperationType::Freeze,
        OperationType::Unfreeze,
        OperationType::Renew,
        OperationType::Transfer,
    ];

    for (i, step) in steps.iter().enumerate() {
        let op = match step {
            OperationType::Renew => h.cards.renew_card(card.id, 2, Decimal::from(500), OPERATOR, "").await,
            OperationType::Freeze => h.cards.freeze_card(card.id, 7, OPERATOR, "").await,
            OperationType::Unfreeze => h.cards.unfreeze_card(card.id, OPERATOR, "").await,
            OperationType::Transfer => {
                h.cards
                    .transfer_card(card.id, OTHER_MEMBER, Decimal::ZERO, OPERATOR, "")
                    .await
            }
        }
        .unwrap();

        let after = h.card(card.id).await;
        assert_eq!(op.old_end_date, previous_end);
        assert_eq!(op.new_end_date, after.end_date);
        assert!(after.end_date >= previous_end);
        assert_eq!(h.store.operation_count(), i + 1);
        previous_end = after.end_date;
    }

    let history = h.cards.get_card_operations(card.id).await.unwrap();
    assert_eq!(history.len(), steps.len());
    // 最新的在前
    assert_eq!(history[0].operation_type, OperationType::Transfer);
}

#[tokio::test]
async fn concurrent_freezes_of_same_card_yield_one_success() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;

    let (a, b) = tokio::join!(
        h.cards.freeze_card(card.id, 5, OPERATOR, "a"),
        h.cards.freeze_card(card.id, 5, OPERATOR, "b"),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let failure = if a.is_err() { a } else { b };
    assert!(matches!(failure, Err(AppError::InvalidState(_))));

    let frozen = h.card(card.id).await;
    assert_eq!(frozen.freeze_times, 1);
    assert_eq!(frozen.end_date, ymd(2026, 1, 5));
    assert_eq!(h.store.operation_count(), 1);
}

#[tokio::test]
async fn stale_version_commit_is_rejected() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;
    h.cards.renew_card(card.id, 1, Decimal::ZERO, OPERATOR, "").await.unwrap();

    // `card` 还是版本 0 的快照
    let operation = NewCardOperation {
        card_id: card.id,
        operation_type: OperationType::Renew,
        operator_id: OPERATOR,
        amount: Decimal::ZERO,
        old_end_date: card.end_date,
        new_end_date: card.end_date,
        freeze_days: 0,
        transfer_to_id: None,
        remark: String::new(),
    };
    let err = h.store.commit_mutation(&card, operation).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { card_id } if card_id == card.id));
    assert_eq!(h.store.operation_count(), 1);
}

#[tokio::test]
async fn deleted_cards_disappear_from_reads() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;
    h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 11, 30)).await;

    h.cards.delete_card(card.id).await.unwrap();

    assert!(matches!(h.cards.get_card(card.id).await, Err(AppError::NotFound(_))));
    assert!(matches!(
        h.cards.get_card_by_no(&card.card_no).await,
        Err(AppError::NotFound(_))
    ));
    assert_eq!(h.cards.get_cards_by_user(MEMBER).await.unwrap().len(), 1);
    assert!(matches!(h.cards.delete_card(card.id).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn list_cards_filters_and_clamps_paging() {
    let h = harness(ymd(2025, 5, 1));
    for _ in 0..3 {
        h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;
    }
    let lapsed = h.open_card(OTHER_MEMBER, FLEXIBLE_TYPE, ymd(2025, 1, 31)).await;
    h.cards.expire_overdue_cards().await.unwrap();

    let page = h.cards.list_cards(1, 2, None, Some(MEMBER)).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);

    let page = h.cards.list_cards(0, 500, Some(CardStatus::Expired), None).await.unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 10);
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, lapsed.id);
}

#[tokio::test]
async fn create_card_rejects_inverted_dates() {
    let h = harness(ymd(2025, 5, 1));
    let err = h
        .cards
        .create_card(CreateCardInput {
            user_id: MEMBER,
            card_type_id: FLEXIBLE_TYPE,
            start_date: ymd(2025, 6, 1),
            end_date: ymd(2025, 5, 1),
            purchase_price: Decimal::ZERO,
            remark: String::new(),
            source: CardSource::MiniProgram,
            operator_id: None,
            remaining_times: None,
            total_times: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

/// 可注入故障的存储：卡号冲突、版本冲突、提交前被批量过期抢先
struct FaultyStore {
    inner: Arc<MemoryStore>,
    collisions_left: AtomicUsize,
    conflicts_left: AtomicUsize,
    expire_before_commit: Option<NaiveDate>,
    commits: AtomicUsize,
}

impl FaultyStore {
    fn over(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            collisions_left: AtomicUsize::new(0),
            conflicts_left: AtomicUsize::new(0),
            expire_before_commit: None,
            commits: AtomicUsize::new(0),
        }
    }

    fn colliding(mut self, n: usize) -> Self {
        self.collisions_left = AtomicUsize::new(n);
        self
    }

    fn conflicting(mut self, n: usize) -> Self {
        self.conflicts_left = AtomicUsize::new(n);
        self
    }

    /// 第一次提交前先以 `today` 跑一次批量过期
    fn expiring_before_first_commit(mut self, today: NaiveDate) -> Self {
        self.expire_before_commit = Some(today);
        self
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl CardStore for FaultyStore {
    async fn insert_card(&self, card: NewCard) -> StoreResult<MembershipCard> {
        if take_one(&self.collisions_left) {
            return Err(StoreError::DuplicateCardNo(card.card_no));
        }
        self.inner.insert_card(card).await
    }

    async fn find_card(&self, id: i64) -> StoreResult<Option<MembershipCard>> {
        self.inner.find_card(id).await
    }

    async fn find_card_by_no(&self, card_no: &str) -> StoreResult<Option<MembershipCard>> {
        self.inner.find_card_by_no(card_no).await
    }

    async fn list_cards(&self, filter: &CardFilter) -> StoreResult<(Vec<MembershipCard>, i64)> {
        self.inner.list_cards(filter).await
    }

    async fn cards_by_user(&self, user_id: i64) -> StoreResult<Vec<MembershipCard>> {
        self.inner.cards_by_user(user_id).await
    }

    async fn commit_mutation(
        &self,
        card: &MembershipCard,
        operation: NewCardOperation,
    ) -> StoreResult<CardOperation> {
        let attempt = self.commits.fetch_add(1, Ordering::SeqCst);
        if attempt == 0 {
            if let Some(today) = self.expire_before_commit {
                self.inner.expire_overdue(today).await?;
            }
        }
        if take_one(&self.conflicts_left) {
            return Err(StoreError::VersionConflict { card_id: card.id });
        }
        self.inner.commit_mutation(card, operation).await
    }

    async fn operations_for_card(&self, card_id: i64) -> StoreResult<Vec<CardOperation>> {
        self.inner.operations_for_card(card_id).await
    }

    async fn expire_overdue(&self, today: NaiveDate) -> StoreResult<u64> {
        self.inner.expire_overdue(today).await
    }

    async fn active_ending_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<MembershipCard>> {
        self.inner.active_ending_between(from, to).await
    }

    async fn active_ended_before(&self, today: NaiveDate) -> StoreResult<Vec<MembershipCard>> {
        self.inner.active_ended_before(today).await
    }

    async fn soft_delete_card(&self, id: i64) -> StoreResult<bool> {
        self.inner.soft_delete_card(id).await
    }
}

fn service_over(store: Arc<dyn CardStore>, h: &Harness) -> CardService {
    let clock: Arc<dyn Clock> = h.clock.clone();
    CardService::new(store, h.store.clone(), h.store.clone(), clock)
}

fn input() -> CreateCardInput {
    CreateCardInput {
        user_id: MEMBER,
        card_type_id: FLEXIBLE_TYPE,
        start_date: ymd(2025, 5, 1),
        end_date: ymd(2026, 4, 30),
        purchase_price: Decimal::from(1999),
        remark: String::new(),
        source: CardSource::Meituan,
        operator_id: Some(OPERATOR),
        remaining_times: None,
        total_times: None,
    }
}

#[tokio::test]
async fn card_number_collision_is_retried() {
    let h = harness(ymd(2025, 5, 1));
    let store = Arc::new(FaultyStore::over(h.store.clone()).colliding(2));
    let cards = service_over(store, &h);

    let card = cards.create_card(input()).await.unwrap();
    assert!(card.card_no.starts_with("C20250501"));
    assert_eq!(card.status, CardStatus::Active);
    assert_eq!(card.source, CardSource::Meituan);
}

#[tokio::test]
async fn persistent_card_number_collision_gives_up() {
    let h = harness(ymd(2025, 5, 1));
    let store = Arc::new(FaultyStore::over(h.store.clone()).colliding(usize::MAX));
    let cards = service_over(store, &h);

    let err = cards.create_card(input()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn version_conflict_is_retried_once_and_recorded_once() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;
    let store = Arc::new(FaultyStore::over(h.store.clone()).conflicting(1));
    let cards = service_over(store.clone(), &h);

    let op = cards
        .freeze_card(card.id, 10, OPERATOR, "")
        .await
        .unwrap();

    assert_eq!(op.operation_type, OperationType::Freeze);
    assert_eq!(store.commits.load(Ordering::SeqCst), 2);
    assert_eq!(h.cards.get_card_operations(card.id).await.unwrap().len(), 1);

    let frozen = h.card(card.id).await;
    assert!(frozen.is_frozen);
    assert_eq!(frozen.freeze_times, 1);
    assert_eq!(frozen.end_date, ymd(2026, 1, 10));
}

#[tokio::test]
async fn retry_revalidates_against_concurrent_expiry() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 5, 10)).await;
    // 批量过期在读取之后、提交之前把卡标记为过期
    let store = Arc::new(
        FaultyStore::over(h.store.clone()).expiring_before_first_commit(ymd(2025, 6, 1)),
    );
    let cards = service_over(store.clone(), &h);

    let err = cards
        .freeze_card(card.id, 5, OPERATOR, "")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidState(_)), "{err:?}");
    assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    assert_eq!(h.card(card.id).await.status, CardStatus::Expired);
    assert!(h.cards.get_card_operations(card.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn persistent_version_conflict_gives_up_with_conflict() {
    let h = harness(ymd(2025, 5, 1));
    let card = h.open_card(MEMBER, FLEXIBLE_TYPE, ymd(2025, 12, 31)).await;
    let store = Arc::new(FaultyStore::over(h.store.clone()).conflicting(usize::MAX));
    let cards = service_over(store.clone(), &h);

    let err = cards
        .renew_card(card.id, 1, Decimal::from(299), OPERATOR, "")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)), "{err:?}");
    assert_eq!(store.commits.load(Ordering::SeqCst), 3);
    assert_eq!(h.card(card.id).await.end_date, ymd(2025, 12, 31));
    assert!(h.cards.get_card_operations(card.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn expiring_cards_rejects_out_of_range_days() {
    let h = harness(ymd(2025, 5, 1));
    let err = h.cards.get_expiring_cards(i64::MAX).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
