//! Template factory.
//!
//! A [`Factory`] holds user definitions per [`Kind`] and hands out compiled
//! [`Template`]s. Each kind is compiled at most once per factory, on first
//! use, from the kind's built-in defaults followed by the user definitions.
//!
//! Factories are immutable. [`Factory::with_template`] returns a new factory
//! that shares every kind it does not touch with the original, including
//! already compiled templates.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use tracing::{debug, warn};
use url::Url;

use crate::config::{FactoryConfig, Limits};
use crate::defaults::default_definitions;
use crate::definition::TemplateDefinition;
use crate::error::{Result, TemplateError};
use crate::funcs::{FuncMap, default_funcs, mimir_funcs};
use crate::kind::Kind;
use crate::template::Template;

/// Definitions of one kind and their lazily compiled template.
#[derive(Debug, Default)]
struct KindTemplates {
    definitions: Vec<TemplateDefinition>,
    compiled: OnceCell<Template>,
}

impl KindTemplates {
    fn with_definition(&self, definition: TemplateDefinition) -> Self {
        let mut definitions = self.definitions.clone();
        upsert(&mut definitions, definition);
        Self {
            definitions,
            compiled: OnceCell::new(),
        }
    }
}

/// Appends `definition`, dropping an earlier one with the same name.
fn upsert(definitions: &mut Vec<TemplateDefinition>, definition: TemplateDefinition) {
    if let Some(pos) = definitions.iter().position(|d| d.name == definition.name) {
        warn!(
            name = %definition.name,
            kind = %definition.kind,
            "template definition replaced by a later one with the same name"
        );
        definitions.remove(pos);
    }
    definitions.push(definition);
}

/// Produces kind-specific templates from a fixed set of definitions.
#[derive(Debug, Clone)]
pub struct Factory {
    kinds: BTreeMap<Kind, Arc<KindTemplates>>,
    funcs: Arc<BTreeMap<Kind, FuncMap>>,
    external_url: String,
    tenant_id: Option<String>,
    limits: Limits,
}

impl Factory {
    /// Creates a factory from user definitions.
    pub fn new(
        definitions: impl IntoIterator<Item = TemplateDefinition>,
        external_url: impl Into<String>,
    ) -> Result<Self> {
        Self::builder(external_url).templates(definitions).build()
    }

    /// Starts building a factory.
    #[must_use]
    pub fn builder(external_url: impl Into<String>) -> FactoryBuilder {
        FactoryBuilder::new(external_url)
    }

    /// Creates a factory from configuration.
    ///
    /// Fails with [`TemplateError::InvalidKind`] if a template names an unknown kind.
    pub fn from_config(config: &FactoryConfig) -> Result<Self> {
        let mut builder = Self::builder(config.external_url.clone())
            .limits(config.limits)
            .templates(config.definitions()?);
        if let Some(tenant_id) = &config.tenant_id {
            builder = builder.tenant_id(tenant_id.clone());
        }
        builder.build()
    }

    /// Returns the compiled template for `kind`, compiling it on first use.
    pub fn get_template(&self, kind: Kind) -> Result<Template> {
        let templates = self.kind_templates(kind)?;
        templates
            .compiled
            .get_or_try_init(|| {
                let mut definitions = default_definitions(kind);
                definitions.extend(templates.definitions.iter().cloned());
                let funcs = self
                    .funcs
                    .get(&kind)
                    .ok_or_else(|| TemplateError::InvalidKind {
                        kind: kind.to_string(),
                    })?;
                Template::compile(kind, &definitions, funcs, &self.external_url, self.limits)
            })
            .cloned()
    }

    /// Returns a new factory with `definition` added to its kind.
    ///
    /// A definition with the same name and kind is replaced. `self` is left
    /// unchanged and other kinds are shared with the result.
    pub fn with_template(&self, definition: TemplateDefinition) -> Result<Self> {
        definition.units()?;
        let kind = definition.kind;
        let updated = self.kind_templates(kind)?.with_definition(definition);

        let mut kinds = self.kinds.clone();
        kinds.insert(kind, Arc::new(updated));
        debug!(kind = %kind, "factory updated with template");

        Ok(Self {
            kinds,
            ..self.clone()
        })
    }

    /// User definitions of `kind`, in registration order.
    #[must_use]
    pub fn definitions(&self, kind: Kind) -> &[TemplateDefinition] {
        self.kinds
            .get(&kind)
            .map(|templates| templates.definitions.as_slice())
            .unwrap_or_default()
    }

    /// The external URL templates are bound to.
    #[must_use]
    pub fn external_url(&self) -> &str {
        &self.external_url
    }

    /// The tenant exposed to Mimir templates.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Output limits of produced templates.
    #[must_use]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    fn kind_templates(&self, kind: Kind) -> Result<&Arc<KindTemplates>> {
        self.kinds.get(&kind).ok_or_else(|| TemplateError::InvalidKind {
            kind: kind.to_string(),
        })
    }
}

/// Base relative external URLs are resolved against to check their syntax.
static RELATIVE_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("http://localhost/").unwrap_or_else(|_| unreachable!()));

/// Accepts an empty URL and relative references, rejecting malformed URLs.
///
/// Templates built on an empty or relative URL render without derived links.
fn validate_external_url(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Ok(());
    }
    let parsed = match Url::parse(raw) {
        Err(url::ParseError::RelativeUrlWithoutBase) => RELATIVE_BASE.join(raw),
        parsed => parsed,
    };
    parsed
        .map(drop)
        .map_err(|e| TemplateError::InvalidExternalUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Builder for [`Factory`].
#[derive(Debug, Clone)]
pub struct FactoryBuilder {
    external_url: String,
    tenant_id: Option<String>,
    limits: Limits,
    definitions: Vec<TemplateDefinition>,
}

impl FactoryBuilder {
    /// Creates a builder for the given external URL.
    #[must_use]
    pub fn new(external_url: impl Into<String>) -> Self {
        Self {
            external_url: external_url.into(),
            tenant_id: None,
            limits: Limits::default(),
            definitions: Vec::new(),
        }
    }

    /// Sets the tenant exposed through `tenantID`.
    #[must_use]
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Sets output limits.
    #[must_use]
    pub const fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Adds a definition.
    #[must_use]
    pub fn template(mut self, definition: TemplateDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Adds several definitions, in order.
    #[must_use]
    pub fn templates(mut self, definitions: impl IntoIterator<Item = TemplateDefinition>) -> Self {
        self.definitions.extend(definitions);
        self
    }

    /// Validates the configuration and builds the factory.
    pub fn build(self) -> Result<Factory> {
        validate_external_url(&self.external_url)?;

        let mut per_kind: BTreeMap<Kind, Vec<TemplateDefinition>> =
            Kind::ALL.iter().map(|k| (*k, Vec::new())).collect();
        for definition in self.definitions {
            definition.units()?;
            let list = per_kind.entry(definition.kind).or_default();
            upsert(list, definition);
        }

        let kinds = per_kind
            .into_iter()
            .map(|(kind, definitions)| {
                let templates = KindTemplates {
                    definitions,
                    compiled: OnceCell::new(),
                };
                (kind, Arc::new(templates))
            })
            .collect();

        let general = default_funcs();
        let mimir = general.clone().merge(&mimir_funcs(
            self.tenant_id.clone().unwrap_or_default(),
        ));
        let funcs = BTreeMap::from([(Kind::Grafana, general), (Kind::Mimir, mimir)]);

        Ok(Factory {
            kinds,
            funcs: Arc::new(funcs),
            external_url: self.external_url,
            tenant_id: self.tenant_id,
            limits: self.limits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateConfig;
    use test_case::test_case;

    fn factory() -> Factory {
        Factory::new(
            [
                TemplateDefinition::grafana("a", "grafana a"),
                TemplateDefinition::mimir("b", "mimir b"),
            ],
            "http://localhost",
        )
        .unwrap()
    }

    mod build_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("http://[::1" ; "unclosed ipv6 host")]
        #[test_case("http://exa mple.com" ; "space in host")]
        #[test_case("http://localhost:99999" ; "port out of range")]
        fn rejects_malformed_external_url(url: &str) {
            let err = Factory::builder(url).build().unwrap_err();
            assert!(matches!(err, TemplateError::InvalidExternalUrl { .. }));
        }

        #[test_case("" ; "empty")]
        #[test_case("/grafana/" ; "relative path")]
        #[test_case("http://localhost:3000/grafana" ; "absolute")]
        fn accepts_external_url(url: &str) {
            let factory = Factory::builder(url).build().unwrap();
            assert_eq!(factory.external_url(), url);
        }

        #[test]
        fn rejects_invalid_definition_names() {
            let err = Factory::new([TemplateDefinition::grafana("a.b", "")], "http://localhost")
                .unwrap_err();
            assert!(matches!(err, TemplateError::InvalidDefinition { .. }));
        }

        #[test]
        fn groups_definitions_by_kind() {
            let factory = factory();
            assert_eq!(factory.definitions(Kind::Grafana).len(), 1);
            assert_eq!(factory.definitions(Kind::Mimir)[0].name, "b");
        }

        #[test]
        fn later_definition_with_same_name_wins() {
            let factory = Factory::new(
                [
                    TemplateDefinition::grafana("a", "first"),
                    TemplateDefinition::grafana("other", "x"),
                    TemplateDefinition::grafana("a", "second"),
                ],
                "http://localhost",
            )
            .unwrap();
            let names: Vec<_> = factory
                .definitions(Kind::Grafana)
                .iter()
                .map(|d| (d.name.as_str(), d.template.as_str()))
                .collect();
            assert_eq!(names, vec![("other", "x"), ("a", "second")]);
        }

        #[test]
        fn builder_options() {
            let factory = Factory::builder("http://localhost")
                .tenant_id("tenant-1")
                .limits(Limits::with_max_output_size(10))
                .template(TemplateDefinition::grafana("a", "x"))
                .build()
                .unwrap();
            assert_eq!(factory.tenant_id(), Some("tenant-1"));
            assert_eq!(factory.limits(), Limits::with_max_output_size(10));
            assert_eq!(factory.external_url(), "http://localhost");
            assert_eq!(factory.get_template(Kind::Grafana).unwrap().limits(), factory.limits());
        }

        #[test]
        fn from_config_rejects_unknown_kind() {
            let config = FactoryConfig {
                templates: vec![TemplateConfig::new("t", "x").with_kind("loki")],
                ..FactoryConfig::default()
            };
            assert!(Factory::from_config(&config).unwrap_err().is_invalid_kind());
        }

        #[test]
        fn from_config_builds_factory() {
            let config = FactoryConfig {
                tenant_id: Some("t1".to_string()),
                templates: vec![TemplateConfig::new("custom", "{{receiver}}")],
                ..FactoryConfig::default()
            };
            let factory = Factory::from_config(&config).unwrap();
            assert_eq!(factory.external_url(), "http://localhost:3000/");
            assert_eq!(factory.tenant_id(), Some("t1"));
            assert_eq!(factory.definitions(Kind::Grafana)[0].name, "custom");
        }
    }

    mod template_tests {
        use super::*;

        #[test]
        fn templates_are_cached_per_kind() {
            let factory = factory();
            let first = factory.get_template(Kind::Grafana).unwrap();
            let second = factory.get_template(Kind::Grafana).unwrap();
            assert!(first.ptr_eq(&second));
        }

        #[test]
        fn kinds_are_isolated() {
            let factory = factory();
            let grafana = factory.get_template(Kind::Grafana).unwrap();
            let mimir = factory.get_template(Kind::Mimir).unwrap();

            assert!(grafana.has_template("a"));
            assert!(!grafana.has_template("b"));
            assert!(mimir.has_template("b"));
            assert!(!mimir.has_template("a"));
            assert_eq!(grafana.kind(), Kind::Grafana);
        }

        #[test]
        fn broken_definition_fails_at_compile() {
            let factory =
                Factory::new([TemplateDefinition::mimir("bad", "{{#if x}}")], "http://localhost")
                    .unwrap();
            assert!(matches!(
                factory.get_template(Kind::Mimir),
                Err(TemplateError::Parse { .. })
            ));
            assert!(factory.get_template(Kind::Grafana).is_ok());
        }
    }

    mod with_template_tests {
        use super::*;

        #[test]
        fn original_is_unchanged() {
            let factory = factory();
            let updated = factory
                .with_template(TemplateDefinition::grafana("c", "new"))
                .unwrap();

            assert_eq!(factory.definitions(Kind::Grafana).len(), 1);
            assert_eq!(updated.definitions(Kind::Grafana).len(), 2);
            assert!(!factory.get_template(Kind::Grafana).unwrap().has_template("c"));
            assert!(updated.get_template(Kind::Grafana).unwrap().has_template("c"));
        }

        #[test]
        fn untouched_kinds_are_shared() {
            let factory = factory();
            let mimir = factory.get_template(Kind::Mimir).unwrap();
            let updated = factory
                .with_template(TemplateDefinition::grafana("c", "new"))
                .unwrap();

            assert!(Arc::ptr_eq(
                &factory.kinds[&Kind::Mimir],
                &updated.kinds[&Kind::Mimir]
            ));
            let shared = updated.get_template(Kind::Mimir).unwrap();
            assert!(mimir.ptr_eq(&shared));
        }

        #[test]
        fn replaces_same_name() {
            let updated = factory()
                .with_template(TemplateDefinition::grafana("a", "replaced"))
                .unwrap();
            let definitions = updated.definitions(Kind::Grafana);
            assert_eq!(definitions.len(), 1);
            assert_eq!(definitions[0].template, "replaced");
        }

        #[test]
        fn rejects_invalid_definition() {
            let err = factory()
                .with_template(TemplateDefinition::grafana("x", "{{#*inline \"y\"}}open"))
                .unwrap_err();
            assert!(matches!(err, TemplateError::InvalidDefinition { .. }));
        }
    }
}
