//! Compiled, kind-specific template handles and bounded execution.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::sync::Arc;

use handlebars::{Handlebars, RenderError, RenderErrorReason};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::Limits;
use crate::definition::{TemplateDefinition, has_dynamic_partial, split_inline};
use crate::error::{Result, TemplateError};
use crate::extend::ExtendedData;
use crate::funcs::FuncMap;
use crate::kind::Kind;

/// Partial calls inside a template source.
static PARTIAL_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{~?\s*#?>\s*([A-Za-z0-9_-]+)").unwrap_or_else(|_| unreachable!())
});

/// Partial names each template calls.
type CallGraph = BTreeMap<String, BTreeSet<String>>;

/// A compiled set of definitions for one kind, ready to execute template text.
///
/// Cloning is cheap; clones share the compiled definitions.
#[derive(Clone)]
pub struct Template {
    inner: Arc<Compiled>,
}

struct Compiled {
    registry: Handlebars<'static>,
    calls: CallGraph,
    kind: Kind,
    external_url: String,
    limits: Limits,
}

impl Template {
    /// Compiles `definitions` in order; later units replace earlier ones of the same name.
    pub(crate) fn compile(
        kind: Kind,
        definitions: &[TemplateDefinition],
        funcs: &FuncMap,
        external_url: &str,
        limits: Limits,
    ) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        funcs.register(&mut registry);

        let mut calls = CallGraph::new();
        for definition in definitions {
            for unit in definition.units()? {
                registry
                    .register_template_string(&unit.name, &unit.source)
                    .map_err(|e| TemplateError::Parse {
                        name: unit.name.clone(),
                        reason: e.to_string(),
                    })?;
                calls.insert(unit.name, partial_calls(&unit.source));
            }
        }
        reject_recursion(&calls)?;

        debug!(kind = %kind, templates = calls.len(), "compiled templates");

        Ok(Self {
            inner: Arc::new(Compiled {
                registry,
                calls,
                kind,
                external_url: external_url.to_string(),
                limits,
            }),
        })
    }

    /// The kind this template was compiled for.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.inner.kind
    }

    /// The external URL data is extended with.
    #[must_use]
    pub fn external_url(&self) -> &str {
        &self.inner.external_url
    }

    /// Output limits applied to every execution.
    #[must_use]
    pub fn limits(&self) -> Limits {
        self.inner.limits
    }

    /// Returns true if a template with this name can be called.
    #[must_use]
    pub fn has_template(&self, name: &str) -> bool {
        self.inner.registry.has_template(name)
    }

    /// Returns true if both handles share the same compilation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Names of every callable template, sorted.
    #[must_use]
    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .inner
            .registry
            .get_templates()
            .keys()
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    /// Executes `text` against `data`.
    ///
    /// Output over the configured limit is an [`TemplateError::OutputTooLarge`] error.
    pub fn execute(&self, text: &str, data: &ExtendedData) -> Result<String> {
        match self.execute_bounded(text, data) {
            (output, None) => Ok(output),
            (_, Some(err)) => Err(err),
        }
    }

    /// Executes `text`, returning the bounded output and the error, if any.
    ///
    /// Oversized output is cut at the limit, backed off to a character
    /// boundary. Any other failure yields empty output.
    pub(crate) fn execute_bounded(
        &self,
        text: &str,
        data: &ExtendedData,
    ) -> (String, Option<TemplateError>) {
        if let Err(err) = self.check_text(text) {
            debug!(kind = %self.inner.kind, error = %err, "template text rejected");
            return (String::new(), Some(err));
        }

        let limit = self.inner.limits.max_template_output_size;
        let mut writer = LimitedWriter::new(limit);
        let result = self
            .inner
            .registry
            .render_template_to_write(text, data, &mut writer);

        if writer.exceeded {
            let limit = limit.unwrap_or_default();
            warn!(kind = %self.inner.kind, limit, "template output truncated");
            return (
                writer.into_truncated_string(),
                Some(TemplateError::OutputTooLarge { limit }),
            );
        }

        match result {
            Ok(()) => (writer.into_truncated_string(), None),
            Err(err) => {
                let err = render_error(&err);
                debug!(kind = %self.inner.kind, error = %err, "template execution failed");
                (String::new(), Some(err))
            }
        }
    }

    /// Rejects text whose partial calls could recurse without bound.
    ///
    /// Inline blocks declared in the text shadow compiled templates of the
    /// same name, so they are checked together with the compiled call graph.
    fn check_text(&self, text: &str) -> Result<()> {
        let rejected = |reason: String| TemplateError::Render { reason };
        if has_dynamic_partial(text) {
            return Err(rejected("dynamic partial calls are not supported".to_string()));
        }

        let (blocks, _) = split_inline(text).map_err(rejected)?;
        if blocks.is_empty() {
            return Ok(());
        }

        let mut calls = self.inner.calls.clone();
        for block in blocks {
            calls.insert(block.name, partial_calls(&block.source));
        }
        reject_recursion(&calls).map_err(|err| match err {
            TemplateError::Parse { name, reason } => {
                rejected(format!("template {name:?}: {reason}"))
            }
            other => other,
        })
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("kind", &self.inner.kind)
            .field("external_url", &self.inner.external_url)
            .field("limits", &self.inner.limits)
            .field("templates", &self.template_names())
            .finish()
    }
}

fn render_error(err: &RenderError) -> TemplateError {
    let reason = match err.reason() {
        RenderErrorReason::PartialNotFound(name) => format!("template {name:?} not defined"),
        _ => err.to_string(),
    };
    TemplateError::Render { reason }
}

fn partial_calls(source: &str) -> BTreeSet<String> {
    PARTIAL_CALL
        .captures_iter(source)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Fails if any template can reach itself through partial calls.
fn reject_recursion(calls: &CallGraph) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        calls: &'a CallGraph,
        marks: &mut BTreeMap<&'a str, Mark>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(TemplateError::Parse {
                    name: name.to_string(),
                    reason: "template calls itself recursively".to_string(),
                });
            }
            None => {}
        }
        marks.insert(name, Mark::Visiting);
        if let Some(callees) = calls.get(name) {
            for callee in callees {
                visit(callee, calls, marks)?;
            }
        }
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let mut marks = BTreeMap::new();
    for name in calls.keys() {
        visit(name, calls, &mut marks)?;
    }
    Ok(())
}

/// Collects rendered bytes up to an optional limit.
struct LimitedWriter {
    buf: Vec<u8>,
    limit: Option<usize>,
    exceeded: bool,
}

impl LimitedWriter {
    fn new(limit: Option<usize>) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            exceeded: false,
        }
    }

    fn into_truncated_string(self) -> String {
        match String::from_utf8(self.buf) {
            Ok(s) => s,
            Err(err) => {
                let valid = err.utf8_error().valid_up_to();
                let mut bytes = err.into_bytes();
                bytes.truncate(valid);
                String::from_utf8(bytes).unwrap_or_default()
            }
        }
    }
}

impl io::Write for LimitedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let Some(limit) = self.limit else {
            self.buf.extend_from_slice(data);
            return Ok(data.len());
        };

        let room = limit.saturating_sub(self.buf.len());
        if data.len() <= room {
            self.buf.extend_from_slice(data);
            return Ok(data.len());
        }

        self.buf.extend_from_slice(&data[..room]);
        self.exceeded = true;
        Err(io::Error::other("template output limit exceeded"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
