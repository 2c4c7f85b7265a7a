//! 会员卡状态迁移规则
//!
//! 这里只做纯计算：给定当前卡片、卡类型和“今天”，校验前置条件并就地修改卡片，
//! 同时产出对应的操作记录。读取与持久化由 [`super::CardService`] 负责。

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::database::models::{
    CardStatus, CardType, MembershipCard, NewCardOperation, OperationType,
};
use crate::error::{AppError, AppResult};
use crate::utils::time::{add_days, add_months};

/// 单次续费允许的最大月数
pub const MAX_RENEW_MONTHS: u32 = 120;
/// 单次冻结允许的最大天数
pub const MAX_FREEZE_DAYS: i32 = 3650;

#[derive(Debug, Clone)]
pub enum Mutation {
    Renew {
        months: u32,
        amount: Decimal,
    },
    Freeze {
        days: i32,
    },
    Unfreeze,
    Transfer {
        to_user_id: i64,
        fee: Decimal,
    },
}

/// 一次迁移的调用上下文
#[derive(Debug, Clone)]
pub struct MutationContext {
    pub operator_id: i64,
    pub remark: String,
    pub today: NaiveDate,
    pub now: DateTime<Utc>,
}

impl Mutation {
    pub fn operation_type(&self) -> OperationType {
        match self {
            Mutation::Renew { .. } => OperationType::Renew,
            Mutation::Freeze { .. } => OperationType::Freeze,
            Mutation::Unfreeze => OperationType::Unfreeze,
            Mutation::Transfer { .. } => OperationType::Transfer,
        }
    }

    /// 入参校验，与卡片状态无关
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Mutation::Renew { months, amount } => {
                if *months == 0 || *months > MAX_RENEW_MONTHS {
                    return Err(AppError::Validation(format!(
                        "续费月数必须在 1 到 {} 之间",
                        MAX_RENEW_MONTHS
                    )));
                }
                if amount.is_sign_negative() {
                    return Err(AppError::Validation("续费金额不能为负数".into()));
                }
            }
            Mutation::Freeze { days } => {
                if *days <= 0 || *days > MAX_FREEZE_DAYS {
                    return Err(AppError::Validation(format!(
                        "冻结天数必须在 1 到 {} 之间",
                        MAX_FREEZE_DAYS
                    )));
                }
            }
            Mutation::Unfreeze => {}
            Mutation::Transfer { fee, .. } => {
                if fee.is_sign_negative() {
                    return Err(AppError::Validation("转卡手续费不能为负数".into()));
                }
            }
        }
        Ok(())
    }

    /// 是否需要读取卡类型策略
    pub fn needs_card_type(&self) -> bool {
        matches!(self, Mutation::Freeze { .. } | Mutation::Transfer { .. })
    }

    /// 状态前置条件，在读取卡类型之前检查
    pub fn check_state(&self, card: &MembershipCard) -> AppResult<()> {
        match self {
            Mutation::Renew { .. } => {
                if matches!(card.status, CardStatus::Transferred | CardStatus::Refunded) {
                    return Err(AppError::InvalidState(
                        "已转出或已退卡的会员卡不能续费".into(),
                    ));
                }
            }
            Mutation::Freeze { .. } => {
                if card.is_frozen {
                    return Err(AppError::InvalidState("会员卡已处于冻结状态".into()));
                }
                if card.status != CardStatus::Active {
                    return Err(AppError::InvalidState("只有正常状态的会员卡可以冻结".into()));
                }
            }
            Mutation::Unfreeze => {
                if !card.is_frozen {
                    return Err(AppError::InvalidState("会员卡未冻结".into()));
                }
            }
            Mutation::Transfer { to_user_id, .. } => {
                if card.is_frozen {
                    return Err(AppError::InvalidState("冻结中的会员卡不能转让".into()));
                }
                if card.status != CardStatus::Active {
                    return Err(AppError::InvalidState("只有正常状态的会员卡可以转让".into()));
                }
                if *to_user_id == card.user_id {
                    return Err(AppError::Validation("不能转让给当前持卡人".into()));
                }
            }
        }
        Ok(())
    }

    /// 卡类型策略检查
    pub fn check_policy(&self, card: &MembershipCard, card_type: &CardType) -> AppResult<()> {
        match self {
            Mutation::Freeze { days } => {
                if !card_type.can_freeze {
                    return Err(AppError::PolicyViolation("该卡类型不允许冻结".into()));
                }
                if card_type.max_freeze_times > 0 && card.freeze_times >= card_type.max_freeze_times
                {
                    return Err(AppError::PolicyViolation(format!(
                        "冻结次数已达上限（{} 次）",
                        card_type.max_freeze_times
                    )));
                }
                if card_type.max_freeze_days > 0
                    && card.freeze_days + days > card_type.max_freeze_days
                {
                    return Err(AppError::PolicyViolation(format!(
                        "累计冻结天数超过上限（已冻结 {} 天，上限 {} 天）",
                        card.freeze_days, card_type.max_freeze_days
                    )));
                }
            }
            Mutation::Transfer { .. } => {
                if !card_type.can_transfer {
                    return Err(AppError::PolicyViolation("该卡类型不允许转让".into()));
                }
            }
            Mutation::Renew { .. } | Mutation::Unfreeze => {}
        }
        Ok(())
    }

    /// 就地修改卡片并生成操作记录，调用前必须已通过全部检查
    pub fn apply(
        &self,
        card: &mut MembershipCard,
        ctx: &MutationContext,
    ) -> AppResult<NewCardOperation> {
        let old_end_date = card.end_date;
        let mut amount = Decimal::ZERO;
        let mut freeze_days = 0;
        let mut transfer_to_id = None;
        let mut remark = ctx.remark.clone();

        match self {
            Mutation::Renew {
                months,
                amount: paid,
            } => {
                // 已过期的卡从今天起算，未过期的顺延
                let base = if card.end_date < ctx.today {
                    ctx.today
                } else {
                    card.end_date
                };
                card.end_date = add_months(base, *months)
                    .ok_or_else(|| AppError::Validation("续费后日期超出范围".into()))?;
                if card.status == CardStatus::Expired {
                    card.status = CardStatus::Active;
                }
                amount = *paid;
            }
            Mutation::Freeze { days } => {
                card.end_date = add_days(card.end_date, i64::from(*days))
                    .ok_or_else(|| AppError::Validation("冻结后日期超出范围".into()))?;
                card.is_frozen = true;
                card.frozen_at = Some(ctx.now);
                card.status = CardStatus::Frozen;
                card.freeze_times += 1;
                card.freeze_days += days;
                freeze_days = *days;
            }
            Mutation::Unfreeze => {
                card.is_frozen = false;
                card.frozen_at = None;
                card.status = CardStatus::Active;
            }
            Mutation::Transfer { to_user_id, fee } => {
                let from_user_id = card.user_id;
                card.user_id = *to_user_id;
                card.status = CardStatus::Transferred;
                amount = *fee;
                transfer_to_id = Some(*to_user_id);
                remark = format!("从用户{}转至用户{}, {}", from_user_id, to_user_id, ctx.remark);
            }
        }

        Ok(NewCardOperation {
            card_id: card.id,
            operation_type: self.operation_type(),
            operator_id: ctx.operator_id,
            amount,
            old_end_date,
            new_end_date: card.end_date,
            freeze_days,
            transfer_to_id,
            remark,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{CardSource, CardTypeStatus};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn card(status: CardStatus, end_date: NaiveDate) -> MembershipCard {
        MembershipCard {
            id: 1,
            card_no: "C202501010001".into(),
            user_id: 10,
            card_type_id: 1,
            status,
            start_date: ymd(2025, 1, 1),
            end_date,
            remaining_times: None,
            total_times: None,
            freeze_times: 0,
            freeze_days: 0,
            is_frozen: status == CardStatus::Frozen,
            frozen_at: None,
            source: CardSource::FrontDesk,
            purchase_price: Decimal::new(199900, 2),
            operator_id: None,
            remark: String::new(),
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn card_type(max_times: i32, max_days: i32) -> CardType {
        CardType {
            id: 1,
            type_name: "年卡".into(),
            type_code: "YEAR".into(),
            duration_type: 4,
            duration_value: 1,
            price: Decimal::new(199900, 2),
            can_freeze: true,
            max_freeze_times: max_times,
            max_freeze_days: max_days,
            can_transfer: true,
            transfer_fee: Decimal::new(10000, 2),
            status: CardTypeStatus::Enabled,
        }
    }

    fn ctx(today: NaiveDate) -> MutationContext {
        MutationContext {
            operator_id: 99,
            remark: "前台".into(),
            today,
            now: Utc::now(),
        }
    }

    #[test]
    fn renew_extends_from_current_end_date_when_still_valid() {
        let mut c = card(CardStatus::Active, ymd(2025, 3, 31));
        let op = Mutation::Renew {
            months: 1,
            amount: Decimal::new(30000, 2),
        }
        .apply(&mut c, &ctx(ymd(2025, 3, 1)))
        .unwrap();

        assert_eq!(c.end_date, ymd(2025, 4, 30));
        assert_eq!(op.old_end_date, ymd(2025, 3, 31));
        assert_eq!(op.new_end_date, ymd(2025, 4, 30));
        assert_eq!(op.amount, Decimal::new(30000, 2));
    }

    #[test]
    fn renew_of_lapsed_card_restarts_from_today() {
        let mut c = card(CardStatus::Expired, ymd(2025, 1, 10));
        Mutation::Renew {
            months: 2,
            amount: Decimal::ZERO,
        }
        .apply(&mut c, &ctx(ymd(2025, 5, 20)))
        .unwrap();

        assert_eq!(c.end_date, ymd(2025, 7, 20));
        assert_eq!(c.status, CardStatus::Active);
    }

    #[test]
    fn renew_rejected_for_transferred_and_refunded() {
        let renew = Mutation::Renew {
            months: 1,
            amount: Decimal::ZERO,
        };
        for status in [CardStatus::Transferred, CardStatus::Refunded] {
            let err = renew.check_state(&card(status, ymd(2025, 6, 1))).unwrap_err();
            assert!(matches!(err, AppError::InvalidState(_)));
        }
    }

    #[test]
    fn freeze_extends_end_date_and_counters() {
        let mut c = card(CardStatus::Active, ymd(2025, 6, 1));
        let op = Mutation::Freeze { days: 15 }
            .apply(&mut c, &ctx(ymd(2025, 5, 1)))
            .unwrap();

        assert_eq!(c.end_date, ymd(2025, 6, 16));
        assert!(c.is_frozen);
        assert_eq!(c.status, CardStatus::Frozen);
        assert_eq!(c.freeze_times, 1);
        assert_eq!(c.freeze_days, 15);
        assert_eq!(op.freeze_days, 15);
    }

    #[test]
    fn freeze_policy_limits() {
        let freeze = Mutation::Freeze { days: 10 };
        let mut c = card(CardStatus::Active, ymd(2025, 6, 1));

        c.freeze_times = 2;
        let err = freeze.check_policy(&c, &card_type(2, 0)).unwrap_err();
        assert!(matches!(err, AppError::PolicyViolation(_)));

        c.freeze_times = 0;
        c.freeze_days = 25;
        let err = freeze.check_policy(&c, &card_type(0, 30)).unwrap_err();
        assert!(matches!(err, AppError::PolicyViolation(_)));

        // 0 表示不限
        assert!(freeze.check_policy(&c, &card_type(0, 0)).is_ok());

        let mut no_freeze = card_type(0, 0);
        no_freeze.can_freeze = false;
        assert!(freeze.check_policy(&c, &no_freeze).is_err());
    }

    #[test]
    fn unfreeze_keeps_end_date() {
        let mut c = card(CardStatus::Frozen, ymd(2025, 6, 16));
        let op = Mutation::Unfreeze
            .apply(&mut c, &ctx(ymd(2025, 5, 5)))
            .unwrap();

        assert_eq!(c.end_date, ymd(2025, 6, 16));
        assert_eq!(c.status, CardStatus::Active);
        assert!(!c.is_frozen);
        assert!(c.frozen_at.is_none());
        assert_eq!(op.old_end_date, op.new_end_date);
    }

    #[test]
    fn transfer_of_frozen_card_is_invalid_state() {
        let transfer = Mutation::Transfer {
            to_user_id: 20,
            fee: Decimal::ZERO,
        };
        let err = transfer
            .check_state(&card(CardStatus::Frozen, ymd(2025, 6, 1)))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn transfer_records_both_users() {
        let mut c = card(CardStatus::Active, ymd(2025, 6, 1));
        let op = Mutation::Transfer {
            to_user_id: 20,
            fee: Decimal::new(5000, 2),
        }
        .apply(&mut c, &ctx(ymd(2025, 5, 1)))
        .unwrap();

        assert_eq!(c.user_id, 20);
        assert_eq!(c.status, CardStatus::Transferred);
        assert_eq!(op.transfer_to_id, Some(20));
        assert_eq!(op.remark, "从用户10转至用户20, 前台");
    }

    #[test]
    fn validation_rejects_non_positive_inputs() {
        assert!(
            Mutation::Renew {
                months: 0,
                amount: Decimal::ZERO
            }
            .validate()
            .is_err()
        );
        assert!(Mutation::Freeze { days: 0 }.validate().is_err());
        assert!(
            Mutation::Transfer {
                to_user_id: 2,
                fee: Decimal::new(-1, 0)
            }
            .validate()
            .is_err()
        );
    }
}
