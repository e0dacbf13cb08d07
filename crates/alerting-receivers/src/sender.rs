//! Collaborators a receiver delegates to.
//!
//! Receivers never open connections or read secrets themselves. Delivery goes
//! through a [`WebhookSender`], screenshots through an [`ImageProvider`], and
//! secure settings through a [`DecryptFn`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use alerting_templates::{Alert, NotificationContext};

use crate::error::{ImageError, Result};

/// Boxed future returned by collaborator and notifier methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Looks up a secure setting by key, returning `fallback` when it is not set.
pub type DecryptFn<'a> = &'a dyn Fn(&str, &str) -> String;

/// An outgoing HTTP request produced by a receiver.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookMessage {
    /// Target URL.
    pub url: String,
    /// Request body.
    pub body: String,
    /// HTTP method, `POST` or `PUT`.
    pub http_method: String,
    /// Extra request headers.
    pub http_headers: BTreeMap<String, String>,
    /// Basic auth user, empty when unused.
    pub user: String,
    /// Basic auth password, empty when unused.
    pub password: String,
}

impl fmt::Debug for WebhookMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookMessage")
            .field("url", &self.url)
            .field("http_method", &self.http_method)
            .field("headers", &self.http_headers.keys().collect::<Vec<_>>())
            .field("user", &self.user)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

/// Delivers webhook messages.
pub trait WebhookSender: Send + Sync {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::Delivery`](crate::ReceiverError::Delivery) if the
    /// message cannot be delivered.
    fn send<'a>(&'a self, message: &'a WebhookMessage) -> BoxFuture<'a, Result<()>>;
}

/// A screenshot attached to an alert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    /// Token the image is stored under.
    pub token: String,
    /// Public URL, empty if the image is only stored locally.
    pub url: String,
}

/// Resolves image tokens to stored images.
pub trait ImageProvider: Send + Sync {
    /// Returns the image stored under `token`.
    fn get_image<'a>(&'a self, token: &'a str)
    -> BoxFuture<'a, std::result::Result<Image, ImageError>>;
}

/// An image provider that knows no images.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImages;

impl ImageProvider for NoImages {
    fn get_image<'a>(
        &'a self,
        _token: &'a str,
    ) -> BoxFuture<'a, std::result::Result<Image, ImageError>> {
        Box::pin(async { Err(ImageError::NotFound) })
    }
}

/// A receiver integration.
pub trait Notifier: Send + Sync {
    /// Returns the name of this integration.
    fn name(&self) -> &str;

    /// Notifies about `alerts` in the group described by `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or delivery fails.
    fn notify<'a>(
        &'a self,
        ctx: &'a NotificationContext,
        alerts: &'a [Alert],
    ) -> BoxFuture<'a, Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_images_finds_nothing() {
        assert_eq!(NoImages.get_image("abc").await, Err(ImageError::NotFound));
    }

    #[test]
    fn debug_hides_body_and_password() {
        let message = WebhookMessage {
            url: "http://hook".to_string(),
            body: "secret body".to_string(),
            http_method: "POST".to_string(),
            http_headers: BTreeMap::from([("Authorization".to_string(), "Bearer t".to_string())]),
            user: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{message:?}");
        assert!(debug.contains("http://hook"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("secret body"));
        assert!(!debug.contains("Bearer t"));
    }
}
