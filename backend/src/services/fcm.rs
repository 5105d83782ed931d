use anyhow::Result;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info};

use crate::constants::FCM_API_BASE;
use crate::models::PushMessage;

/// Firebase Cloud Messaging client (HTTP v1 API).
///
/// Messages are data-only with a background APNs push so the app decides how
/// to render them.
#[derive(Debug, Clone)]
pub struct FcmClient {
    client: Client,
    project_id: String,
    access_token: String,
}

impl FcmClient {
    pub fn new(project_id: String, access_token: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            project_id,
            access_token,
        })
    }

    pub async fn send(&self, message: &PushMessage) -> Result<()> {
        let url = format!("{}/projects/{}/messages:send", FCM_API_BASE, self.project_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&build_message(message))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("FCM push failed {}: {}", status, body);
            anyhow::bail!("FCM API error {}: {}", status, body);
        }

        info!("Push sent for notification {}", message.notification_id);
        Ok(())
    }
}

fn build_message(message: &PushMessage) -> Value {
    json!({
        "message": {
            "token": message.device_token,
            "data": {
                "notificationId": message.notification_id.to_string(),
                "type": message.kind,
                "subType": message.sub_kind,
                "title": message.title,
                "body": message.body,
                "entityId": message.counterparty_id.to_string(),
                "entityImage": message.counterparty_image_url.clone().unwrap_or_default(),
            },
            "apns": {
                "headers": { "apns-push-type": "background" },
                "payload": { "aps": { "content-available": 1 } },
            },
        }
    })
}
