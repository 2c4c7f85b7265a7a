use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::card::CreateCardInput;
use crate::database::models::{CardOperation, CardSource, CardStatus, MembershipCard};

#[derive(Debug, Deserialize)]
pub struct CreateCardRequest {
    pub user_id: i64,
    pub card_type_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub purchase_price: Decimal,
    #[serde(default)]
    pub source: CardSource,
    #[serde(default)]
    pub remark: String,
    pub remaining_times: Option<i32>,
    pub total_times: Option<i32>,
}

impl CreateCardRequest {
    pub fn into_input(self, operator_id: i64) -> CreateCardInput {
        CreateCardInput {
            user_id: self.user_id,
            card_type_id: self.card_type_id,
            start_date: self.start_date,
            end_date: self.end_date,
            purchase_price: self.purchase_price,
            remark: self.remark,
            source: self.source,
            operator_id: Some(operator_id),
            remaining_times: self.remaining_times,
            total_times: self.total_times,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RenewCardRequest {
    pub months: i64,
    pub amount: Decimal,
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Deserialize)]
pub struct FreezeCardRequest {
    pub freeze_days: i32,
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnfreezeCardRequest {
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferCardRequest {
    pub to_user_id: i64,
    #[serde(default)]
    pub transfer_fee: Decimal,
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Deserialize)]
pub struct ListCardsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<CardStatus>,
    pub user_id: Option<i64>,
}

/// 会员卡信息，附带剩余天数
#[derive(Debug, Serialize)]
pub struct CardInfo {
    #[serde(flatten)]
    pub card: MembershipCard,
    pub days_remaining: i64,
}

impl CardInfo {
    pub fn new(card: MembershipCard, today: NaiveDate) -> Self {
        let days_remaining = (card.end_date - today).num_days().max(0);
        Self {
            card,
            days_remaining,
        }
    }
}

/// 生命周期操作的响应：操作记录与操作后的卡片
#[derive(Debug, Serialize)]
pub struct OperationResult {
    pub operation: CardOperation,
    pub card: CardInfo,
}
