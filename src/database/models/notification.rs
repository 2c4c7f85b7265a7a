use serde::{Deserialize, Serialize};

/// 通知类型：1-会员卡到期，2-课程提醒，3-系统通知
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum NotificationType {
    CardExpiry = 1,
    CourseReminder = 2,
    System = 3,
}

/// 待写入的通知
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNotification {
    pub user_id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    pub content: String,
    /// 关联ID（如会员卡ID）
    pub related_id: Option<i64>,
}
