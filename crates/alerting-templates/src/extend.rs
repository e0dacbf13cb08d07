//! Grafana-specific extension of the template data.
//!
//! [`ExtendedData`] is the root object every template is executed against.
//! On top of the Alertmanager [`Data`] it removes private labels and
//! annotations and derives links into the alerting UI: a pre-filled silence
//! form, the originating dashboard and panel.
//!
//! Degradation is per alert and silent from the caller's point of view: a
//! missing external URL leaves the derived links empty, malformed values are
//! logged and dropped. Neither aborts a render.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};
use url::Url;

use crate::data::{Data, DataAlert};
use crate::types::{AlertStatus, LabelSet};

/// Annotation carrying the UID of the dashboard the rule belongs to.
pub const DASHBOARD_UID_ANNOTATION: &str = "__dashboardUid__";
/// Annotation carrying the ID of the panel the rule belongs to.
pub const PANEL_ID_ANNOTATION: &str = "__panelId__";
/// Annotation carrying the organization ID.
pub const ORG_ID_ANNOTATION: &str = "__orgId__";
/// Annotation carrying the JSON-encoded evaluation values.
pub const VALUES_ANNOTATION: &str = "__values__";
/// Annotation carrying the legacy value string.
pub const VALUE_STRING_ANNOTATION: &str = "__value_string__";
/// Annotation carrying the token of a screenshot taken for the alert.
pub const IMAGE_TOKEN_ANNOTATION: &str = "__alertImageToken__";

const SILENCE_PATH: &str = "/alerting/silence/new";
const DASHBOARD_PATH: &str = "/d/";

/// Returns true for keys bracketed by double underscores, like `__orgId__`.
#[must_use]
pub fn is_private_key(key: &str) -> bool {
    key.starts_with("__") && key.ends_with("__")
}

/// Returns a copy of `set` without private keys.
#[must_use]
pub fn remove_private_items(set: &LabelSet) -> LabelSet {
    set.iter()
        .filter(|(k, _)| !is_private_key(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// An alert as seen by templates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedAlert {
    /// Status at the time of rendering.
    pub status: AlertStatus,
    /// Labels without private entries.
    pub labels: LabelSet,
    /// Annotations without private entries.
    pub annotations: LabelSet,
    /// When the alert started.
    pub starts_at: DateTime<Utc>,
    /// When the alert ended, if known.
    pub ends_at: Option<DateTime<Utc>>,
    /// Link back to the generating rule.
    #[serde(rename = "generatorURL")]
    pub generator_url: String,
    /// Fingerprint of the label set.
    pub fingerprint: String,
    /// Link to a silence form pre-filled with the alert's labels.
    #[serde(rename = "silenceURL")]
    pub silence_url: String,
    /// Link to the dashboard of the rule.
    #[serde(rename = "dashboardURL")]
    pub dashboard_url: String,
    /// Link to the panel of the rule.
    #[serde(rename = "panelURL")]
    pub panel_url: String,
    /// Evaluation values by reference ID.
    #[serde(serialize_with = "serialize_values")]
    pub values: BTreeMap<String, f64>,
    /// Legacy single value string.
    pub value_string: String,
    /// Link to a screenshot, filled in by receivers that resolve images.
    #[serde(rename = "imageURL", skip_serializing_if = "String::is_empty")]
    pub image_url: String,
    /// Organization the alert belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
}

/// The root object visible to templates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedData {
    /// The receiver the notification is for.
    pub receiver: String,
    /// Firing if any alert in the group is firing.
    pub status: AlertStatus,
    /// The alerts in the group.
    pub alerts: Vec<ExtendedAlert>,
    /// Labels the group was formed by.
    pub group_labels: LabelSet,
    /// Labels with the same value on every alert.
    pub common_labels: LabelSet,
    /// Annotations with the same value on every alert.
    pub common_annotations: LabelSet,
    /// Base URL of the alerting UI.
    #[serde(rename = "externalURL")]
    pub external_url: String,
    /// Key of the alert group.
    pub group_key: String,
}

impl ExtendedData {
    /// Extends Alertmanager template data with Grafana-specific fields.
    #[must_use]
    pub fn from_data(data: Data) -> Self {
        let base = parse_base_url(&data.external_url);
        if base.is_none() {
            debug!(
                external_url = %data.external_url,
                "external URL missing or invalid, alert links will be empty"
            );
        }

        let alerts = data
            .alerts
            .into_iter()
            .map(|alert| extend_alert(alert, base.as_ref()))
            .collect();

        Self {
            receiver: data.receiver,
            status: data.status,
            alerts,
            group_labels: remove_private_items(&data.group_labels),
            common_labels: remove_private_items(&data.common_labels),
            common_annotations: remove_private_items(&data.common_annotations),
            external_url: data.external_url,
            group_key: data.group_key,
        }
    }

    /// Returns the alerts that are firing.
    pub fn firing(&self) -> impl Iterator<Item = &ExtendedAlert> {
        self.alerts
            .iter()
            .filter(|a| a.status == AlertStatus::Firing)
    }

    /// Returns the alerts that are resolved.
    pub fn resolved(&self) -> impl Iterator<Item = &ExtendedAlert> {
        self.alerts
            .iter()
            .filter(|a| a.status == AlertStatus::Resolved)
    }
}

/// Whole numbers are written as integers so `{{this}}` prints `1`, not `1.0`.
#[allow(clippy::float_cmp)]
fn serialize_values<S: Serializer>(
    values: &BTreeMap<String, f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(values.len()))?;
    for (key, value) in values {
        if value.fract() == 0.0 && value.abs() < 1e15 {
            map.serialize_entry(key, &(*value as i64))?;
        } else {
            map.serialize_entry(key, value)?;
        }
    }
    map.end()
}

impl From<Data> for ExtendedData {
    fn from(data: Data) -> Self {
        Self::from_data(data)
    }
}

fn parse_base_url(raw: &str) -> Option<Url> {
    if raw.is_empty() {
        return None;
    }
    Url::parse(raw).ok().filter(|u| !u.cannot_be_a_base())
}

fn extend_alert(alert: DataAlert, base: Option<&Url>) -> ExtendedAlert {
    let mut extended = ExtendedAlert {
        status: alert.status,
        labels: remove_private_items(&alert.labels),
        annotations: remove_private_items(&alert.annotations),
        starts_at: alert.starts_at,
        ends_at: alert.ends_at,
        generator_url: alert.generator_url,
        fingerprint: alert.fingerprint,
        silence_url: String::new(),
        dashboard_url: String::new(),
        panel_url: String::new(),
        values: BTreeMap::new(),
        value_string: String::new(),
        image_url: String::new(),
        org_id: None,
    };

    let Some(base) = base else {
        return extended;
    };

    extended.org_id = alert
        .annotations
        .get(ORG_ID_ANNOTATION)
        .and_then(|raw| match raw.parse::<i64>() {
            Ok(id) => Some(id),
            Err(err) => {
                debug!(org_id = %raw, error = %err, "ignoring unparsable organization ID");
                None
            }
        });
    let org_id = extended.org_id.map(|id| id.to_string());

    if let Some(uid) = alert.annotations.get(DASHBOARD_UID_ANNOTATION) {
        let mut dashboard = join_path(base, &format!("{DASHBOARD_PATH}{uid}"));
        if let Some(org) = &org_id {
            dashboard.query_pairs_mut().append_pair("orgId", org);
        }
        extended.dashboard_url = dashboard.to_string();

        if let Some(panel_id) = alert.annotations.get(PANEL_ID_ANNOTATION) {
            dashboard.query_pairs_mut().append_pair("viewPanel", panel_id);
            extended.panel_url = dashboard.to_string();
        }
    }

    if let Some(raw) = alert.annotations.get(VALUES_ANNOTATION) {
        match serde_json::from_str::<BTreeMap<String, f64>>(raw) {
            Ok(values) => extended.values = values,
            Err(err) => {
                warn!(values = %raw, error = %err, "failed to parse alert values");
            }
        }
    }

    if let Some(value_string) = alert.annotations.get(VALUE_STRING_ANNOTATION) {
        extended.value_string.clone_from(value_string);
    }

    if let Some(org) = &org_id {
        if let Some(generator) = with_org_id(&extended.generator_url, org) {
            extended.generator_url = generator;
        }
    }

    extended.silence_url = silence_url(base, &extended.labels, org_id.as_deref());
    extended
}

/// Builds a silence link whose matchers are the sorted `name=value` pairs.
fn silence_url(base: &Url, labels: &LabelSet, org_id: Option<&str>) -> String {
    let mut matchers: Vec<String> = labels
        .iter()
        .filter(|(k, _)| !is_private_key(k))
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    matchers.sort();

    let mut url = join_path(base, SILENCE_PATH);
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("alertmanager", "grafana");
        for matcher in &matchers {
            query.append_pair("matcher", matcher);
        }
        if let Some(org) = org_id {
            query.append_pair("orgId", org);
        }
    }
    url.to_string()
}

/// Appends `suffix` to the path of `base`, dropping its query and fragment.
fn join_path(base: &Url, suffix: &str) -> Url {
    let mut url = base.clone();
    let path = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        suffix.trim_start_matches('/')
    );
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Sets `orgId` on a generator URL; query parameters end up sorted by name.
fn with_org_id(generator_url: &str, org_id: &str) -> Option<String> {
    if generator_url.is_empty() {
        return None;
    }
    let mut url = Url::parse(generator_url).ok()?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "orgId")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.push(("orgId".to_string(), org_id.to_string()));
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (k, v) in &pairs {
            query.append_pair(k, v);
        }
    }
    Some(url.to_string())
}
