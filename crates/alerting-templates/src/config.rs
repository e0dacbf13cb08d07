//! Factory configuration.
//!
//! Configuration is plain serde data so it can be stored alongside the rest
//! of an alerting configuration and turned into a [`Factory`](crate::Factory)
//! with [`Factory::from_config`](crate::Factory::from_config).

use serde::{Deserialize, Serialize};

use crate::definition::TemplateDefinition;
use crate::error::Result;
use crate::kind::Kind;

/// Default base URL of the alerting UI.
pub const DEFAULT_EXTERNAL_URL: &str = "http://localhost:3000/";

/// Output limits applied when executing templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum rendered size in bytes; unbounded when unset.
    pub max_template_output_size: Option<usize>,
}

impl Limits {
    /// Limits with no bound on output size.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_template_output_size: None,
        }
    }

    /// Limits output to `bytes`.
    #[must_use]
    pub const fn with_max_output_size(bytes: usize) -> Self {
        Self {
            max_template_output_size: Some(bytes),
        }
    }
}

/// One stored template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Template name.
    pub name: String,
    /// Kind as text; defaults to `grafana`.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Template text.
    #[serde(default)]
    pub template: String,
}

fn default_kind() -> String {
    Kind::Grafana.as_str().to_string()
}

impl TemplateConfig {
    /// Creates a Grafana template entry.
    #[must_use]
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: default_kind(),
            template: template.into(),
        }
    }

    /// Sets the kind text.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Converts the entry into a definition, validating its kind.
    pub fn to_definition(&self) -> Result<TemplateDefinition> {
        let kind: Kind = self.kind.parse()?;
        Ok(TemplateDefinition::new(
            self.name.clone(),
            kind,
            self.template.clone(),
        ))
    }
}

/// Configuration a factory is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Base URL of the alerting UI.
    pub external_url: String,
    /// Tenant exposed to Mimir templates through `tenantID`.
    pub tenant_id: Option<String>,
    /// Output limits.
    pub limits: Limits,
    /// User templates, in override order.
    pub templates: Vec<TemplateConfig>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            external_url: DEFAULT_EXTERNAL_URL.to_string(),
            tenant_id: None,
            limits: Limits::default(),
            templates: Vec::new(),
        }
    }
}

impl FactoryConfig {
    /// Parses configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Converts every template entry into a definition.
    pub fn definitions(&self) -> Result<Vec<TemplateDefinition>> {
        self.templates
            .iter()
            .map(TemplateConfig::to_definition)
            .collect()
    }
}
