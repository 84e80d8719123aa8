// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Operator notifiers: JSON webhook, or the error log when none is configured.

use async_trait::async_trait;
use tracing::error;

use crate::domain::notification::{NotificationError, OperatorNotice, OperatorNotifier};
use crate::domain::provisioner_config::{resolve_secret, NotificationConfig};

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self { client: reqwest::Client::new(), url }
    }

    pub fn from_config(config: &NotificationConfig) -> anyhow::Result<Self> {
        Ok(Self::new(resolve_secret(&config.webhook_url)?))
    }
}

#[async_trait]
impl OperatorNotifier for WebhookNotifier {
    async fn notify(&self, notice: &OperatorNotice) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.url)
            .json(notice)
            .send()
            .await
            .map_err(|e| NotificationError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected(format!("HTTP {}: {}", status, error_text)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl OperatorNotifier for LoggingNotifier {
    async fn notify(&self, notice: &OperatorNotice) -> Result<(), NotificationError> {
        error!(
            client_id = %notice.client_id,
            client_name = %notice.client_name,
            occurred_at = %notice.occurred_at,
            "Provisioning failed and was rolled back: {}",
            notice.error
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provisioning::ClientId;
    use chrono::Utc;
    use mockito::Matcher;

    fn notice() -> OperatorNotice {
        OperatorNotice {
            client_id: ClientId::new("t1"),
            client_name: "Acme".to_string(),
            error: "Deployment error: build failed".to_string(),
            recent_logs: vec!["ERROR: Deployment error: build failed".to_string()],
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_webhook_posts_notice() {
        let mut server = mockito::Server::new_async().await;
        let hook = server
            .mock("POST", "/hooks/provisioning")
            .match_body(Matcher::PartialJson(serde_json::json!({ "client_id": "t1", "client_name": "Acme" })))
            .with_status(204)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hooks/provisioning", server.url()));
        notifier.notify(&notice()).await.unwrap();
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_rejection() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/hooks/provisioning").with_status(500).create_async().await;

        let notifier = WebhookNotifier::new(format!("{}/hooks/provisioning", server.url()));
        let result = notifier.notify(&notice()).await;
        assert!(matches!(result, Err(NotificationError::Rejected(_))));
    }
}
