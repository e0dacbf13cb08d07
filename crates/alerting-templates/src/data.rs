//! Alertmanager template data.
//!
//! [`Data`] mirrors the data contract Alertmanager hands to notification
//! templates: receiver, group status, per-alert records and the label and
//! annotation sets shared by the whole group.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Alert, AlertStatus, LabelSet, NotificationContext};

/// An alert as seen by templates, before Grafana-specific extension.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataAlert {
    /// Status at the time of rendering.
    pub status: AlertStatus,
    /// Labels of the alert.
    pub labels: LabelSet,
    /// Annotations of the alert.
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
}

/// Template data for one alert group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Data {
    /// The receiver the notification is for.
    pub receiver: String,
    /// Firing if any alert in the group is firing.
    pub status: AlertStatus,
    /// The alerts in the group, in input order.
    pub alerts: Vec<DataAlert>,
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

impl Data {
    /// Builds template data for `alerts` in the given pipeline context.
    #[must_use]
    pub fn new(ctx: &NotificationContext, external_url: &str, alerts: &[Alert]) -> Self {
        let alerts: Vec<DataAlert> = alerts
            .iter()
            .map(|alert| DataAlert {
                status: alert.status_at(ctx.now),
                labels: alert.labels.clone(),
                annotations: alert.annotations.clone(),
                starts_at: alert.starts_at,
                ends_at: alert.ends_at,
                generator_url: alert.generator_url.clone(),
                fingerprint: alert.fingerprint().to_string(),
            })
            .collect();

        let status = if alerts.iter().any(|a| a.status == AlertStatus::Firing) {
            AlertStatus::Firing
        } else {
            AlertStatus::Resolved
        };

        let common_labels = common_pairs(alerts.iter().map(|a| &a.labels));
        let common_annotations = common_pairs(alerts.iter().map(|a| &a.annotations));

        Self {
            receiver: ctx.receiver.clone(),
            status,
            alerts,
            group_labels: ctx.group_labels.clone(),
            common_labels,
            common_annotations,
            external_url: external_url.to_string(),
            group_key: ctx.group_key.clone(),
        }
    }

    /// Returns the alerts that are firing.
    pub fn firing(&self) -> impl Iterator<Item = &DataAlert> {
        self.alerts
            .iter()
            .filter(|a| a.status == AlertStatus::Firing)
    }

    /// Returns the alerts that are resolved.
    pub fn resolved(&self) -> impl Iterator<Item = &DataAlert> {
        self.alerts
            .iter()
            .filter(|a| a.status == AlertStatus::Resolved)
    }
}

/// Pairs present with an identical value in every set.
fn common_pairs<'a, I>(mut sets: I) -> LabelSet
where
    I: Iterator<Item = &'a LabelSet>,
{
    let Some(first) = sets.next() else {
        return LabelSet::new();
    };

    let mut common = first.clone();
    for set in sets {
        common.retain(|k, v| set.get(k) == Some(v));
        if common.is_empty() {
            break;
        }
    }
    common
}
