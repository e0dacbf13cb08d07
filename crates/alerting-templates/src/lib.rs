//! Notification templates for Alertmanager-compatible receivers.
//!
//! `alerting-templates` turns a group of alerts into the text a receiver
//! sends: titles, messages and any other templated field.
//!
//! # Features
//!
//! - **Kinds**: Grafana and Mimir definitions live in separate namespaces
//! - **Defaults**: Alertmanager-compatible and Grafana built-in templates
//! - **Extended data**: silence, dashboard and panel links, parsed values
//! - **Bounded output**: optional maximum size per render, UTF-8 safe
//! - **Fail fast**: a session stops rendering after its first error
//!
//! Templates are written in Handlebars. A definition can hold several
//! callable templates as `{{#*inline "name"}}…{{/inline}}` blocks; they are
//! called with `{{> name}}`.
//!
//! # Example
//!
//! ```rust
//! use alerting_templates::{
//!     Alert, Factory, Kind, LabelSet, NotificationContext, TemplateDefinition,
//! };
//!
//! let factory = Factory::new(
//!     [TemplateDefinition::grafana(
//!         "custom",
//!         r#"{{#*inline "greeting"}}Hello {{receiver}}{{/inline}}"#,
//!     )],
//!     "http://localhost:3000",
//! )?;
//! let template = factory.get_template(Kind::Grafana)?;
//!
//! let alert = Alert::new(LabelSet::new()).with_label("alertname", "HighCPU");
//! let ctx = NotificationContext::new("ops");
//! let mut session = template.session(&ctx, &[alert]);
//!
//! let text = session.render("{{> greeting}}: {{len alerts}} alert(s)");
//! assert_eq!(text, "Hello ops: 1 alert(s)");
//! assert!(session.error().is_none());
//! # Ok::<(), alerting_templates::TemplateError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod data;
pub mod defaults;
pub mod definition;
pub mod error;
pub mod extend;
pub mod factory;
pub mod funcs;
pub mod kind;
pub mod render;
pub mod template;
pub mod types;

// Re-export main types at crate root
pub use config::{FactoryConfig, Limits, TemplateConfig};
pub use data::{Data, DataAlert};
pub use definition::TemplateDefinition;
pub use error::{Result, TemplateError};
pub use extend::{ExtendedAlert, ExtendedData};
pub use factory::{Factory, FactoryBuilder};
pub use funcs::FuncMap;
pub use kind::Kind;
pub use render::{RenderSession, tmpl_text};
pub use template::Template;
pub use types::{Alert, AlertStatus, Fingerprint, LabelSet, NotificationContext};
