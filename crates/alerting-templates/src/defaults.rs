//! Built-in template definitions.
//!
//! Both kinds start from the Alertmanager-compatible set. The Grafana kind
//! layers its own set on top, replacing `__subject` and `__text_alert_list`
//! and adding `default_title` and `default_message`.

use crate::definition::TemplateDefinition;
use crate::kind::Kind;

/// Name of the Alertmanager-compatible default definition.
pub const ALERTMANAGER_DEFAULTS: &str = "__alertmanager_defaults";

/// Name of the Grafana default definition.
pub const GRAFANA_DEFAULTS: &str = "__grafana_defaults";

const ALERTMANAGER_TEMPLATES: &str = r##"
{{#*inline "__alertmanager"}}Alertmanager{{/inline}}
{{#*inline "__alertmanager_url"}}{{externalURL}}/#/alerts?receiver={{urlquery receiver}}{{/inline}}
{{#*inline "__subject"}}
[{{toUpper status}}{{#if (eq status "firing")}}:{{len (firing alerts)}}{{/if}}] {{join (labelValues groupLabels) " "}} {{#if (gt (len commonLabels) (len groupLabels))}}({{join (labelValues (removeLabels commonLabels (labelNames groupLabels))) " "}}){{/if}}
{{/inline}}
{{#*inline "__description"}}{{/inline}}
{{#*inline "__text_alert_list"}}
{{#each this}}Labels:
{{#each (sortedPairs labels)}} - {{name}} = {{value}}
{{/each}}Annotations:
{{#each (sortedPairs annotations)}} - {{name}} = {{value}}
{{/each}}Source: {{generatorURL}}
{{/each}}
{{/inline}}
{{#*inline "slack_default_title"}}{{> __subject}}{{/inline}}
{{#*inline "slack_default_username"}}{{> __alertmanager}}{{/inline}}
{{#*inline "slack_default_fallback"}}{{> slack_default_title}} | {{> slack_default_titlelink}}{{/inline}}
{{#*inline "slack_default_titlelink"}}{{> __alertmanager_url}}{{/inline}}
{{#*inline "slack_default_text"}}{{/inline}}
{{#*inline "pagerduty_default_description"}}{{> __subject}}{{/inline}}
{{#*inline "opsgenie_default_message"}}{{> __subject}}{{/inline}}
{{#*inline "opsgenie_default_description"}}
{{join (labelValues commonAnnotations) " "}}
{{#with (firing alerts)}}Alerts Firing:
{{> __text_alert_list}}{{/with}}{{#with (resolved alerts)}}Alerts Resolved:
{{> __text_alert_list}}{{/with}}
{{/inline}}
{{#*inline "email_default_subject"}}{{> __subject}}{{/inline}}
"##;

const GRAFANA_TEMPLATES: &str = r##"
{{#*inline "__alertmanager"}}Grafana{{/inline}}
{{#*inline "__subject"}}
[{{toUpper status}}{{#if (eq status "firing")}}:{{len (firing alerts)}}{{#if (resolved alerts)}}, RESOLVED:{{len (resolved alerts)}}{{/if}}{{/if}}] {{join (labelValues groupLabels) " "}} {{#if (gt (len commonLabels) (len groupLabels))}}({{join (labelValues (removeLabels commonLabels (labelNames groupLabels))) " "}}){{/if}}
{{/inline}}
{{#*inline "__text_values_list"}}
{{#if values}}{{#each values}}{{#unless @first}}, {{/unless}}{{@key}}={{this}}{{/each}}{{else}}[no value]{{/if}}
{{/inline}}
{{#*inline "__text_alert_list"}}
{{#each this}}{{#unless @first}}
{{/unless}}Value: {{> __text_values_list}}
Labels:
{{#each labels}} - {{@key}} = {{this}}
{{/each}}Annotations:
{{#each annotations}} - {{@key}} = {{this}}
{{/each}}{{#if generatorURL}}Source: {{generatorURL}}
{{/if}}{{#if silenceURL}}Silence: {{silenceURL}}
{{/if}}{{#if dashboardURL}}Dashboard: {{dashboardURL}}
{{/if}}{{#if panelURL}}Panel: {{panelURL}}
{{/if}}{{/each}}
{{/inline}}
{{#*inline "default_title"}}{{> __subject}}{{/inline}}
{{#*inline "default_message"}}
{{#with (firing alerts)}}**Firing**

{{> __text_alert_list}}{{/with}}{{#if (firing alerts)}}{{#if (resolved alerts)}}

{{/if}}{{/if}}{{#with (resolved alerts)}}**Resolved**

{{> __text_alert_list}}{{/with}}
{{/inline}}
{{#*inline "teams_default_title"}}{{> default_title}}{{/inline}}
{{#*inline "teams_default_message"}}{{> default_message}}{{/inline}}
"##;

/// Built-in definitions for `kind`, in registration order.
#[must_use]
pub fn default_definitions(kind: Kind) -> Vec<TemplateDefinition> {
    let alertmanager = TemplateDefinition::new(ALERTMANAGER_DEFAULTS, kind, ALERTMANAGER_TEMPLATES);
    match kind {
        Kind::Grafana => vec![
            alertmanager,
            TemplateDefinition::new(GRAFANA_DEFAULTS, kind, GRAFANA_TEMPLATES),
        ],
        Kind::Mimir => vec![alertmanager],
    }
}
