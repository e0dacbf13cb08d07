//! Notification receivers built on `alerting-templates`.
//!
//! A receiver renders its templated fields through a render session, checks
//! the session for errors and only then hands a message to its sender. A
//! render failure is returned as [`ReceiverError::Template`] and nothing is
//! delivered.
//!
//! # Example
//!
//! ```rust
//! use alerting_receivers::WebhookSettings;
//!
//! let settings = WebhookSettings::from_json(
//!     &serde_json::json!({"url": "http://hook.example", "maxAlerts": "10"}),
//!     &|_key: &str, fallback: &str| fallback.to_string(),
//! )?;
//! assert_eq!(settings.http_method, "POST");
//! assert_eq!(settings.max_alerts, 10);
//! # Ok::<(), alerting_receivers::ReceiverError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod sender;
pub mod webhook;

// Re-export main types at crate root
pub use error::{ImageError, ReceiverError, Result};
pub use sender::{
    BoxFuture, DecryptFn, Image, ImageProvider, NoImages, Notifier, WebhookMessage, WebhookSender,
};
pub use webhook::{WebhookNotifier, WebhookSettings};
