//! Generic webhook receiver.
//!
//! Posts the extended template data as JSON, together with a rendered title
//! and message. The payload is compatible with Alertmanager webhook receivers
//! and adds the Grafana fields (`title`, `state`, `message`, `orgId`).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use alerting_templates::extend::IMAGE_TOKEN_ANNOTATION;
use alerting_templates::{Alert, AlertStatus, ExtendedData, NotificationContext, Template};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ImageError, ReceiverError, Result};
use crate::sender::{
    BoxFuture, DecryptFn, ImageProvider, NoImages, Notifier, WebhookMessage, WebhookSender,
};

/// Title used when the settings give none.
pub const DEFAULT_TITLE: &str = "{{> default_title}}";

/// Message used when the settings give none.
pub const DEFAULT_MESSAGE: &str = "{{> default_message}}";

const PAYLOAD_VERSION: &str = "1";

/// Validated webhook settings.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSettings {
    /// Target URL.
    pub url: String,
    /// `POST` or `PUT`.
    pub http_method: String,
    /// Maximum alerts per message, 0 for no limit.
    pub max_alerts: usize,
    /// Basic auth user.
    pub user: String,
    /// Basic auth password.
    pub password: String,
    /// Authorization header scheme.
    pub authorization_scheme: String,
    /// Authorization header credentials.
    pub authorization_credentials: String,
    /// Title template text.
    pub title: String,
    /// Message template text.
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default)]
    url: String,
    #[serde(default, rename = "httpMethod")]
    http_method: String,
    #[serde(default, rename = "maxAlerts")]
    max_alerts: Option<Value>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    authorization_scheme: String,
    #[serde(default)]
    authorization_credentials: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
}

impl WebhookSettings {
    /// Parses settings from their stored JSON form.
    ///
    /// Secure fields (`password`, `authorization_credentials`) are read
    /// through `decrypt`, falling back to the plain value.
    pub fn from_json(settings: &Value, decrypt: DecryptFn<'_>) -> Result<Self> {
        let raw = RawSettings::deserialize(settings)?;

        if raw.url.is_empty() {
            return Err(ReceiverError::invalid_settings(
                "required field 'url' is not specified",
            ));
        }

        let http_method = match raw.http_method.to_uppercase().as_str() {
            "" | "POST" => "POST".to_string(),
            "PUT" => "PUT".to_string(),
            other => {
                return Err(ReceiverError::invalid_settings(format!(
                    "invalid HTTP method {other:?}, must be POST or PUT"
                )));
            }
        };

        let max_alerts = parse_max_alerts(raw.max_alerts.as_ref())?;
        let password = decrypt("password", &raw.password);
        let authorization_credentials =
            decrypt("authorization_credentials", &raw.authorization_credentials);

        let basic_auth = !raw.username.is_empty() || !password.is_empty();
        if basic_auth && !authorization_credentials.is_empty() {
            return Err(ReceiverError::invalid_settings(
                "both HTTP Basic Authentication and Authorization Header are set, only 1 is permitted",
            ));
        }

        let authorization_scheme = if raw.authorization_scheme.is_empty() {
            "Bearer".to_string()
        } else {
            raw.authorization_scheme
        };

        Ok(Self {
            url: raw.url,
            http_method,
            max_alerts,
            user: raw.username,
            password,
            authorization_scheme,
            authorization_credentials,
            title: non_empty_or(raw.title, DEFAULT_TITLE),
            message: non_empty_or(raw.message, DEFAULT_MESSAGE),
        })
    }

    fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if !self.authorization_credentials.is_empty() {
            headers.insert(
                "Authorization".to_string(),
                format!(
                    "{} {}",
                    self.authorization_scheme, self.authorization_credentials
                ),
            );
        }
        headers
    }
}

impl fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("url", &self.url)
            .field("http_method", &self.http_method)
            .field("max_alerts", &self.max_alerts)
            .field("user", &self.user)
            .field("authorization_scheme", &self.authorization_scheme)
            .field("title", &self.title)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// Accepts a non-negative number or a numeric string.
fn parse_max_alerts(value: Option<&Value>) -> Result<usize> {
    let invalid = || ReceiverError::invalid_settings("invalid maxAlerts value");
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(invalid),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(0),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// Keeps at most `max` alerts, returning how many were dropped.
fn truncate_alerts(max: usize, alerts: &[Alert]) -> (&[Alert], usize) {
    if max == 0 || alerts.len() <= max {
        (alerts, 0)
    } else {
        (&alerts[..max], alerts.len() - max)
    }
}

/// The JSON body posted to the webhook.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    #[serde(flatten)]
    data: &'a ExtendedData,
    version: &'static str,
    truncated_alerts: usize,
    org_id: i64,
    title: String,
    state: &'static str,
    message: String,
}

/// Sends notifications to a generic webhook.
pub struct WebhookNotifier {
    name: String,
    org_id: i64,
    settings: WebhookSettings,
    template: Template,
    sender: Arc<dyn WebhookSender>,
    images: Arc<dyn ImageProvider>,
}

impl WebhookNotifier {
    /// Creates a notifier rendering with `template` and delivering through `sender`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        settings: WebhookSettings,
        template: Template,
        sender: Arc<dyn WebhookSender>,
    ) -> Self {
        Self {
            name: name.into(),
            org_id: 1,
            settings,
            template,
            sender,
            images: Arc::new(NoImages),
        }
    }

    /// Sets the organisation reported in payloads.
    #[must_use]
    pub const fn with_org_id(mut self, org_id: i64) -> Self {
        self.org_id = org_id;
        self
    }

    /// Sets the provider used to attach alert images.
    #[must_use]
    pub fn with_images(mut self, images: Arc<dyn ImageProvider>) -> Self {
        self.images = images;
        self
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &WebhookSettings {
        &self.settings
    }

    #[tracing::instrument(
        name = "webhook_notify",
        skip_all,
        fields(notifier = %self.name, receiver = %ctx.receiver, alerts = alerts.len())
    )]
    async fn deliver(&self, ctx: &NotificationContext, alerts: &[Alert]) -> Result<()> {
        let (alerts, truncated) = truncate_alerts(self.settings.max_alerts, alerts);
        let image_urls = self.image_urls(alerts).await;

        let body = {
            let mut session = self.template.session(ctx, alerts);
            for (alert, url) in session.data_mut().alerts.iter_mut().zip(image_urls) {
                if let Some(url) = url {
                    alert.image_url = url;
                }
            }

            let title = session.render(&self.settings.title);
            let message = session.render(&self.settings.message);
            if let Some(err) = session.error() {
                warn!(error = %err, "failed to render webhook notification");
                return Err(err.clone().into());
            }

            let data = session.data();
            let payload = WebhookPayload {
                data,
                version: PAYLOAD_VERSION,
                truncated_alerts: truncated,
                org_id: self.org_id,
                title,
                state: match data.status {
                    AlertStatus::Firing => "alerting",
                    AlertStatus::Resolved => "ok",
                },
                message,
            };
            serde_json::to_string(&payload)?
        };

        let message = WebhookMessage {
            url: self.settings.url.clone(),
            body,
            http_method: self.settings.http_method.clone(),
            http_headers: self.settings.headers(),
            user: self.settings.user.clone(),
            password: self.settings.password.clone(),
        };
        self.sender.send(&message).await?;

        info!(url = %message.url, truncated, "webhook notification sent");
        Ok(())
    }

    /// Resolves the image URL of each alert carrying an image token.
    async fn image_urls(&self, alerts: &[Alert]) -> Vec<Option<String>> {
        let mut urls = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let url = match alert.annotations.get(IMAGE_TOKEN_ANNOTATION) {
                None => None,
                Some(token) => match self.images.get_image(token).await {
                    Ok(image) if !image.url.is_empty() => Some(image.url),
                    Ok(_) => None,
                    Err(err @ (ImageError::NotFound | ImageError::Unavailable)) => {
                        debug!(token = %token, error = %err, "no image for alert");
                        None
                    }
                    Err(err) => {
                        warn!(token = %token, error = %err, "failed to get image for alert");
                        None
                    }
                },
            };
            urls.push(url);
        }
        urls
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify<'a>(
        &'a self,
        ctx: &'a NotificationContext,
        alerts: &'a [Alert],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.deliver(ctx, alerts))
    }
}

impl fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("name", &self.name)
            .field("org_id", &self.org_id)
            .field("settings", &self.settings)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}
