//! Webhook destination settings.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::Result;
use crate::options::{get_string, OptionsStore};

pub const UPDATE_WEBHOOK_KEY: &str = "update_webhook_url";
pub const DAILY_WEBHOOK_KEY: &str = "daily_webhook_url";

/// Both destinations as currently stored. An empty string disables the
/// corresponding webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub webhook_url: String,
    pub daily_webhook_url: String,
}

/// Cleans a user supplied URL before it is stored.
///
/// Only absolute `http`/`https` URLs survive; anything else becomes the
/// empty string, which disables the webhook.
pub fn sanitize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
            url.to_string()
        }
        Ok(url) => {
            warn!("Rejecting webhook URL with scheme {}", url.scheme());
            String::new()
        }
        Err(e) => {
            warn!("Rejecting malformed webhook URL: {}", e);
            String::new()
        }
    }
}

pub async fn update_webhook_url(store: &dyn OptionsStore) -> String {
    get_string(store, UPDATE_WEBHOOK_KEY).await
}

pub async fn daily_webhook_url(store: &dyn OptionsStore) -> String {
    get_string(store, DAILY_WEBHOOK_KEY).await
}

pub async fn load(store: &dyn OptionsStore) -> WebhookSettings {
    WebhookSettings {
        webhook_url: update_webhook_url(store).await,
        daily_webhook_url: daily_webhook_url(store).await,
    }
}

/// Stores whichever of the two URLs is given, sanitized.
pub async fn save(
    store: &dyn OptionsStore,
    webhook_url: Option<&str>,
    daily_webhook_url: Option<&str>,
) -> Result<WebhookSettings> {
    if let Some(raw) = webhook_url {
        store
            .set(UPDATE_WEBHOOK_KEY, Value::String(sanitize_url(raw)))
            .await?;
    }
    if let Some(raw) = daily_webhook_url {
        store
            .set(DAILY_WEBHOOK_KEY, Value::String(sanitize_url(raw)))
            .await?;
    }
    let settings = load(store).await;
    info!(
        "Webhook settings saved (update: {}, daily: {})",
        enabled(&settings.webhook_url),
        enabled(&settings.daily_webhook_url)
    );
    Ok(settings)
}

fn enabled(url: &str) -> &'static str {
    if url.is_empty() {
        "disabled"
    } else {
        "enabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::MemoryOptions;

    #[test]
    fn sanitize_keeps_http_and_https() {
        assert_eq!(
            sanitize_url("  https://hooks.example.com/a?b=c "),
            "https://hooks.example.com/a?b=c"
        );
        assert_eq!(sanitize_url("http://10.0.0.1:8080/x"), "http://10.0.0.1:8080/x");
    }

    #[test]
    fn sanitize_rejects_other_inputs() {
        assert_eq!(sanitize_url(""), "");
        assert_eq!(sanitize_url("   "), "");
        assert_eq!(sanitize_url("javascript:alert(1)"), "");
        assert_eq!(sanitize_url("ftp://example.com/file"), "");
        assert_eq!(sanitize_url("not a url"), "");
    }

    #[tokio::test]
    async fn defaults_are_empty() {
        let store = MemoryOptions::new();
        assert_eq!(load(&store).await, WebhookSettings::default());
    }

    #[tokio::test]
    async fn save_updates_only_given_fields() {
        let store = MemoryOptions::new();
        save(&store, Some("https://a.example.com/u"), Some("https://a.example.com/d"))
            .await
            .unwrap();
        let settings = save(&store, None, Some("")).await.unwrap();

        assert_eq!(settings.webhook_url, "https://a.example.com/u");
        assert_eq!(settings.daily_webhook_url, "");
    }
}
