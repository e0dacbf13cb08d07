//! Render sessions.
//!
//! A notification attempt renders several fields (title, message, extra
//! fields) from the same alerts. The session builds the template data once,
//! then renders each field, remembering the first failure. After a failure
//! every further render returns an empty string without executing, and the
//! caller checks the recorded error before sending anything.

use std::sync::Arc;

use crate::data::Data;
use crate::error::{Result, TemplateError};
use crate::extend::ExtendedData;
use crate::template::Template;
use crate::types::{Alert, NotificationContext};

/// Renders template text for one notification attempt.
#[derive(Debug)]
pub struct RenderSession<'t> {
    template: &'t Template,
    data: ExtendedData,
    error: Option<TemplateError>,
}

impl<'t> RenderSession<'t> {
    /// Opens a session over `alerts`, building the extended data once.
    #[must_use]
    pub fn new(template: &'t Template, ctx: &NotificationContext, alerts: &[Alert]) -> Self {
        Self {
            template,
            data: extended_data(template, ctx, alerts),
            error: None,
        }
    }

    /// Renders `text`.
    ///
    /// Returns an empty string if an earlier call failed. Oversized output
    /// is returned truncated with [`TemplateError::OutputTooLarge`] recorded.
    pub fn render(&mut self, text: &str) -> String {
        if self.error.is_some() {
            return String::new();
        }
        let (output, error) = self.template.execute_bounded(text, &self.data);
        if error.is_some() {
            self.error = error;
        }
        output
    }

    /// Renders `text`, failing if this or an earlier call failed.
    pub fn try_render(&mut self, text: &str) -> Result<String> {
        let output = self.render(text);
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(output),
        }
    }

    /// The first error recorded, if any.
    #[must_use]
    pub fn error(&self) -> Option<&TemplateError> {
        self.error.as_ref()
    }

    /// Returns true if a render failed.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Consumes the session, returning the first error recorded.
    #[must_use]
    pub fn into_error(self) -> Option<TemplateError> {
        self.error
    }

    /// The data templates are executed against.
    #[must_use]
    pub fn data(&self) -> &ExtendedData {
        &self.data
    }

    /// Mutable access to the data, e.g. to attach image URLs.
    pub fn data_mut(&mut self) -> &mut ExtendedData {
        &mut self.data
    }

    /// The template this session renders with.
    #[must_use]
    pub fn template(&self) -> &'t Template {
        self.template
    }
}

impl Template {
    /// Opens a render session over `alerts`.
    #[must_use]
    pub fn session(&self, ctx: &NotificationContext, alerts: &[Alert]) -> RenderSession<'_> {
        RenderSession::new(self, ctx, alerts)
    }
}

/// Returns a render function over `alerts` sharing the error cell `err`, and the data it uses.
///
/// The function returns an empty string once `err` holds an error; the first
/// error stored is never overwritten.
pub fn tmpl_text<'a>(
    ctx: &NotificationContext,
    template: &'a Template,
    alerts: &[Alert],
    err: &'a mut Option<TemplateError>,
) -> (impl FnMut(&str) -> String + use<'a>, Arc<ExtendedData>) {
    let data = Arc::new(extended_data(template, ctx, alerts));
    let shared = Arc::clone(&data);

    let render = move |text: &str| {
        if err.is_some() {
            return String::new();
        }
        let (output, error) = template.execute_bounded(text, &shared);
        if error.is_some() {
            *err = error;
        }
        output
    };

    (render, data)
}

fn extended_data(template: &Template, ctx: &NotificationContext, alerts: &[Alert]) -> ExtendedData {
    ExtendedData::from_data(Data::new(ctx, template.external_url(), alerts))
}
