use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    Created,
    Updated,
    Deleted,
    StatusChanged,
    Assigned,
    Unassigned,
    CommentAdded,
    #[serde(other)]
    Unknown,
}

/// Who performed the action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityUser {
    pub id: u64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
}

/// Task reference, taken from a snapshot if the task was deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: u64,
    #[serde(default)]
    pub user: Option<ActivityUser>,
    pub action: ActivityAction,
    #[serde(default)]
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub changes: Option<Value>,
    #[serde(default)]
    pub task_info: Option<TaskInfo>,
}

/// Query parameters for the activity list
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_deserialization() {
        let activity: Activity = serde_json::from_str(
            r#"{
                "id": 7,
                "user": {"id": 1, "email": "ama@example.com", "username": "ama", "role": "admin"},
                "action": "STATUS_CHANGED",
                "description": "Status changed to completed",
                "timestamp": "2025-02-20T09:15:00Z",
                "changes": {"status": ["pending", "completed"]},
                "task_info": {"id": 4, "title": "Ship release"}
            }"#,
        )
        .unwrap();

        assert_eq!(activity.action, ActivityAction::StatusChanged);
        assert_eq!(activity.task_info.unwrap().title.as_deref(), Some("Ship release"));
    }

    #[test]
    fn test_unknown_action() {
        let action: ActivityAction = serde_json::from_str(r#""ARCHIVED""#).unwrap();
        assert_eq!(action, ActivityAction::Unknown);
    }

    #[test]
    fn test_filter_skips_empty_fields() {
        let filter = ActivityFilter {
            task_id: Some(4),
            ..ActivityFilter::default()
        };
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            serde_json::json!({ "task_id": 4 })
        );
    }
}
