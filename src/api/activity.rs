// Activity log endpoints

use serde::Deserialize;

use crate::error::Result;
use crate::http_client::AuthHttpClient;
use crate::models::{Activity, ActivityFilter};

/// List responses are paginated on some deployments
#[derive(Deserialize)]
#[serde(untagged)]
enum ActivityPage {
    Paginated { results: Vec<Activity> },
    Plain(Vec<Activity>),
}

impl ActivityPage {
    fn into_items(self) -> Vec<Activity> {
        match self {
            ActivityPage::Paginated { results } => results,
            ActivityPage::Plain(items) => items,
        }
    }
}

pub async fn list(client: &AuthHttpClient, filter: &ActivityFilter) -> Result<Vec<Activity>> {
    let page: ActivityPage = client.get_json_with_query("/api/activity/", filter).await?;
    Ok(page.into_items())
}

pub async fn by_task(client: &AuthHttpClient, task_id: u64) -> Result<Vec<Activity>> {
    client
        .get_json_with_query("/api/activity/by_task/", &[("task_id", task_id)])
        .await
}

pub async fn recent(client: &AuthHttpClient) -> Result<Vec<Activity>> {
    client.get_json("/api/activity/recent/").await
}
