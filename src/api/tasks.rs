// Task endpoints

use serde_json::json;

use crate::error::Result;
use crate::http_client::AuthHttpClient;
use crate::models::{NewTask, Task, TaskPatch, TaskStatus};

pub async fn list(client: &AuthHttpClient) -> Result<Vec<Task>> {
    client.get_json("/tasks/").await
}

pub async fn get(client: &AuthHttpClient, id: u64) -> Result<Task> {
    client.get_json(&format!("/tasks/{}/", id)).await
}

/// Admin only
pub async fn create(client: &AuthHttpClient, task: &NewTask) -> Result<Task> {
    client.post_json("/tasks/create/", task).await
}

/// Admin only
pub async fn edit(client: &AuthHttpClient, id: u64, patch: &TaskPatch) -> Result<Task> {
    client.patch_json(&format!("/tasks/{}/edit/", id), patch).await
}

/// Admin only
pub async fn delete(client: &AuthHttpClient, id: u64) -> Result<()> {
    client.delete(&format!("/tasks/{}/delete/", id)).await
}

/// Admins, or staff assigned to the task
pub async fn update_status(client: &AuthHttpClient, id: u64, status: TaskStatus) -> Result<Task> {
    client
        .patch_json(&format!("/tasks/{}/status/", id), &json!({ "status": status.as_param() }))
        .await
}
