// 会员卡到期检查任务
// 每个周期依次执行：批量过期 -> 各档到期提醒

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::runner::{ScheduledJob, StepReport};
use crate::card::CardService;
use crate::database::models::{MembershipCard, NewNotification, NotificationType};
use crate::database::store::NotificationSink;

pub const EXPIRE_STEP: &str = "expire_overdue_cards";
pub const REMINDER_TITLE: &str = "会员卡即将到期提醒";

/// 提醒去重：同一张卡、同一档位、同一天只提醒一次
#[async_trait]
pub trait ReminderDedupe: Send + Sync {
    /// 首次登记返回 true；存储不可用时应放行
    async fn claim(&self, card_id: i64, threshold_days: i64, date: NaiveDate) -> bool;

    /// 发送失败后撤销登记，允许下个周期重试
    async fn release(&self, card_id: i64, threshold_days: i64, date: NaiveDate);
}

pub fn reminder_step_name(days: i64) -> String {
    format!("expiry_reminder_{}d", days)
}

/// 构造到期提醒
pub fn expiry_notification(card: &MembershipCard, today: NaiveDate) -> NewNotification {
    let days_left = (card.end_date - today).num_days();
    NewNotification {
        user_id: card.user_id,
        notification_type: NotificationType::CardExpiry,
        title: REMINDER_TITLE.to_string(),
        content: format!(
            "您的会员卡（卡号：{}）将在{}天后到期，到期日期为{}，请及时续费。",
            card.card_no,
            days_left,
            card.end_date.format("%Y-%m-%d")
        ),
        related_id: Some(card.id),
    }
}

pub struct CardExpiryJob {
    cards: Arc<CardService>,
    sink: Arc<dyn NotificationSink>,
    dedupe: Option<Arc<dyn ReminderDedupe>>,
    reminder_days: Vec<i64>,
}

impl CardExpiryJob {
    pub fn new(
        cards: Arc<CardService>,
        sink: Arc<dyn NotificationSink>,
        reminder_days: Vec<i64>,
    ) -> Self {
        Self {
            cards,
            sink,
            dedupe: None,
            reminder_days,
        }
    }

    pub fn with_dedupe(mut self, dedupe: Arc<dyn ReminderDedupe>) -> Self {
        self.dedupe = Some(dedupe);
        self
    }

    pub async fn expire_overdue_cards(&self) -> StepReport {
        match self.cards.expire_overdue_cards().await {
            Ok(count) => StepReport::new(EXPIRE_STEP).with_affected(count),
            Err(e) => StepReport::failed(EXPIRE_STEP, e),
        }
    }

    /// 给 `days` 天内到期的卡发送提醒。单张卡失败不影响其余卡片
    pub async fn send_expiry_notifications(&self, days: i64) -> StepReport {
        let step = reminder_step_name(days);
        let cards = match self.cards.get_expiring_cards(days).await {
            Ok(cards) => cards,
            Err(e) => return StepReport::failed(step, e),
        };

        let today = self.cards.clock().today();
        let mut report = StepReport::new(step);

        for card in &cards {
            if let Some(dedupe) = &self.dedupe {
                if !dedupe.claim(card.id, days, today).await {
                    report.skipped += 1;
                    continue;
                }
            }

            match self
                .sink
                .create_notification(expiry_notification(card, today))
                .await
            {
                Ok(()) => report.affected += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to create expiry notification for card {}: {}",
                        card.card_no,
                        e
                    );
                    report.failed += 1;
                    if let Some(dedupe) = &self.dedupe {
                        dedupe.release(card.id, days, today).await;
                    }
                }
            }
        }

        report
    }
}

#[async_trait]
impl ScheduledJob for CardExpiryJob {
    fn name(&self) -> &'static str {
        "card_expiry"
    }

    async fn run_cycle(&self) -> Vec<StepReport> {
        let mut steps = Vec::with_capacity(self.reminder_days.len() + 1);

        // 过期必须先于提醒，提醒只针对仍为正常状态的卡
        steps.push(self.expire_overdue_cards().await);

        for days in &self.reminder_days {
            steps.push(self.send_expiry_notifications(*days).await);
        }

        steps
    }
}
