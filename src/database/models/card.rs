// 会员卡实体
// 定义会员卡、卡类型与操作记录对应的数据库实体

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 会员卡状态：1-正常，2-已过期，3-已冻结，4-已转出，5-已退卡
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum CardStatus {
    Active = 1,
    Expired = 2,
    Frozen = 3,
    Transferred = 4,
    Refunded = 5,
}

/// 卡片来源：1-前台办理，2-小程序购买，3-美团，4-抖音
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum CardSource {
    #[default]
    FrontDesk = 1,
    MiniProgram = 2,
    Meituan = 3,
    Douyin = 4,
}

/// 操作类型：1-续费，2-冻结，3-解冻，4-转卡
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum OperationType {
    Renew = 1,
    Freeze = 2,
    Unfreeze = 3,
    Transfer = 4,
}

/// 卡类型状态：1-启用，2-停用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum CardTypeStatus {
    Enabled = 1,
    Disabled = 2,
}

/// 卡类型，对应 card_types 表，只读策略来源
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CardType {
    pub id: i64,
    pub type_name: String,
    pub type_code: String,
    /// 1-天卡，2-月卡，3-季卡，4-年卡，5-次卡
    pub duration_type: i16,
    pub duration_value: i32,
    pub price: Decimal,
    pub can_freeze: bool,
    /// 0 表示不限
    pub max_freeze_times: i32,
    /// 0 表示不限
    pub max_freeze_days: i32,
    pub can_transfer: bool,
    pub transfer_fee: Decimal,
    pub status: CardTypeStatus,
}

/// 会员卡实体，对应 membership_cards 表
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MembershipCard {
    pub id: i64,
    pub card_no: String,
    pub user_id: i64,
    pub card_type_id: i64,
    pub status: CardStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub remaining_times: Option<i32>,
    pub total_times: Option<i32>,
    /// 累计冻结次数
    pub freeze_times: i32,
    /// 累计冻结天数
    pub freeze_days: i32,
    pub is_frozen: bool,
    pub frozen_at: Option<DateTime<Utc>>,
    pub source: CardSource,
    pub purchase_price: Decimal,
    pub operator_id: Option<i64>,
    pub remark: String,
    /// 乐观锁版本号，每次写入加一
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// 待插入的会员卡
#[derive(Debug, Clone)]
pub struct NewCard {
    pub card_no: String,
    pub user_id: i64,
    pub card_type_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub remaining_times: Option<i32>,
    pub total_times: Option<i32>,
    pub source: CardSource,
    pub purchase_price: Decimal,
    pub operator_id: Option<i64>,
    pub remark: String,
}

/// 会员卡操作记录，对应 card_operations 表，只追加不修改
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CardOperation {
    pub id: i64,
    pub card_id: i64,
    pub operation_type: OperationType,
    pub operator_id: i64,
    pub amount: Decimal,
    pub old_end_date: NaiveDate,
    pub new_end_date: NaiveDate,
    pub freeze_days: i32,
    /// 转卡目标用户ID
    pub transfer_to_id: Option<i64>,
    pub remark: String,
    pub created_at: DateTime<Utc>,
}

/// 待追加的操作记录
#[derive(Debug, Clone, PartialEq)]
pub struct NewCardOperation {
    pub card_id: i64,
    pub operation_type: OperationType,
    pub operator_id: i64,
    pub amount: Decimal,
    pub old_end_date: NaiveDate,
    pub new_end_date: NaiveDate,
    pub freeze_days: i32,
    pub transfer_to_id: Option<i64>,
    pub remark: String,
}

/// 会员卡列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct CardFilter {
    pub status: Option<CardStatus>,
    pub user_id: Option<i64>,
    pub page: u32,
    pub page_size: u32,
}

impl CardFilter {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}
