#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Asia::Shanghai;
use gym_backend::card::{CardService, CreateCardInput};
use gym_backend::database::MemoryStore;
use gym_backend::database::models::{CardSource, CardType, CardTypeStatus, MembershipCard};
use gym_backend::utils::time::FixedClock;
use rust_decimal::Decimal;

pub const OPERATOR: i64 = 900;
pub const MEMBER: i64 = 1;
pub const OTHER_MEMBER: i64 = 2;

/// 可冻结两次、累计 30 天，可转让
pub const FLEXIBLE_TYPE: i64 = 10;
/// 不可冻结、不可转让
pub const BASIC_TYPE: i64 = 11;

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub cards: Arc<CardService>,
}

impl Harness {
    pub fn today(&self) -> NaiveDate {
        self.cards.clock().today()
    }

    pub async fn card(&self, id: i64) -> MembershipCard {
        self.cards.get_card(id).await.unwrap()
    }

    /// 开一张在 `end_date` 到期的卡
    pub async fn open_card(&self, user_id: i64, card_type_id: i64, end_date: NaiveDate) -> MembershipCard {
        self.cards
            .create_card(CreateCardInput {
                user_id,
                card_type_id,
                start_date: ymd(2024, 1, 1),
                end_date,
                purchase_price: Decimal::from(1999),
                remark: String::new(),
                source: CardSource::FrontDesk,
                operator_id: Some(OPERATOR),
                remaining_times: None,
                total_times: None,
            })
            .await
            .unwrap()
    }
}

pub fn card_type(
    id: i64,
    can_freeze: bool,
    max_freeze_times: i32,
    max_freeze_days: i32,
    can_transfer: bool,
) -> CardType {
    CardType {
        id,
        type_name: format!("type-{}", id),
        type_code: format!("T{}", id),
        duration_type: 4,
        duration_value: 12,
        price: Decimal::from(1999),
        can_freeze,
        max_freeze_times,
        max_freeze_days,
        can_transfer,
        transfer_fee: Decimal::from(100),
        status: CardTypeStatus::Enabled,
    }
}

/// 上海时区 `today` 上午 10 点的测试环境
pub fn harness(today: NaiveDate) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.add_user(MEMBER);
    store.add_user(OTHER_MEMBER);
    store.add_card_type(card_type(FLEXIBLE_TYPE, true, 2, 30, true));
    store.add_card_type(card_type(BASIC_TYPE, false, 0, 0, false));

    let clock = Arc::new(FixedClock::at(Shanghai, today, 10, 0).unwrap());
    let cards = Arc::new(CardService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
    ));

    Harness {
        store,
        clock,
        cards,
    }
}
