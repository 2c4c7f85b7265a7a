use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::database::models::NewNotification;
use crate::database::store::{NotificationSink, StoreResult};

/// 通知存储库，写入 notifications 表
pub struct NotificationRepository {
    db: Arc<PgPool>,
}

impl NotificationRepository {
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationSink for NotificationRepository {
    async fn create_notification(&self, notification: NewNotification) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (user_id, type, title, content, related_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(notification.user_id)
        .bind(notification.notification_type)
        .bind(&notification.title)
        .bind(&notification.content)
        .bind(notification.related_id)
        .execute(&*self.db)
        .await?;

        Ok(())
    }
}
