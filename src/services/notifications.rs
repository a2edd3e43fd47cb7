use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::{models::NotificationStatus, repository::table_service::create_row};

#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub user_id: &'a str,
    pub kind: &'a str,
    pub title: String,
    pub message: String,
    pub related_id: Option<&'a str>,
}

pub fn notification_record(input: &NewNotification<'_>) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert("user_id".to_string(), Value::String(input.user_id.to_string()));
    record.insert("type".to_string(), Value::String(input.kind.to_string()));
    record.insert("title".to_string(), Value::String(input.title.trim().to_string()));
    record.insert(
        "message".to_string(),
        Value::String(input.message.trim().to_string()),
    );
    record.insert(
        "status".to_string(),
        Value::String(NotificationStatus::Unread.as_str().to_string()),
    );
    if let Some(related_id) = input.related_id.filter(|id| !id.trim().is_empty()) {
        record.insert("related_id".to_string(), Value::String(related_id.to_string()));
    }
    record
}

/// Best effort: a failed notification is logged and never fails the
/// request that triggered it.
pub async fn notify(pool: &PgPool, input: NewNotification<'_>) -> Option<Value> {
    if input.user_id.trim().is_empty() {
        return None;
    }
    match create_row(pool, "notifications", &notification_record(&input)).await {
        Ok(row) => Some(row),
        Err(error) => {
            tracing::warn!(
                user_id = input.user_id,
                kind = input.kind,
                error = %error,
                "Failed to create notification"
            );
            None
        }
    }
}
