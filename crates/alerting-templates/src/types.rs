//! Core types consumed by the renderer.
//!
//! This module provides the alert-side inputs of a render:
//! - [`AlertStatus`]: Whether an alert is firing or resolved
//! - [`Alert`]: A single alert as handed over by the notification pipeline
//! - [`Fingerprint`]: A stable identifier derived from an alert's labels
//! - [`NotificationContext`]: Receiver name, group key, group labels and "now"

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A set of labels or annotations, kept sorted by name.
pub type LabelSet = BTreeMap<String, String>;

/// Label holding the alert name.
pub const ALERT_NAME_LABEL: &str = "alertname";

/// The status of an alert or an alert group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// The alert condition is currently true.
    Firing,
    /// The alert condition is no longer true.
    Resolved,
}

impl AlertStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stable identifier for an alert, derived from its label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u64);

impl Fingerprint {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    const SEPARATOR: u8 = 0xff;

    /// Computes the fingerprint of a label set (FNV-1a over sorted pairs).
    #[must_use]
    pub fn from_labels(labels: &LabelSet) -> Self {
        if labels.is_empty() {
            return Self(Self::OFFSET);
        }

        let mut hash = Self::OFFSET;
        let mut feed = |bytes: &[u8]| {
            for byte in bytes {
                hash ^= u64::from(*byte);
                hash = hash.wrapping_mul(Self::PRIME);
            }
        };
        for (name, value) in labels {
            feed(name.as_bytes());
            feed(&[Self::SEPARATOR]);
            feed(value.as_bytes());
            feed(&[Self::SEPARATOR]);
        }

        Self(hash)
    }

    /// Returns the raw hash value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// An alert handed to a receiver by the notification pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Labels identifying the alert.
    #[serde(default)]
    pub labels: LabelSet,
    /// Annotations providing additional information.
    #[serde(default)]
    pub annotations: LabelSet,
    /// When the alert started firing.
    pub starts_at: DateTime<Utc>,
    /// When the alert ends; `None` while it has no known end.
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Link back to the rule that generated the alert.
    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,
}

impl Alert {
    /// Creates a firing alert that started now.
    #[must_use]
    pub fn new(labels: LabelSet) -> Self {
        Self {
            labels,
            annotations: LabelSet::new(),
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: String::new(),
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Sets the start time.
    #[must_use]
    pub const fn starting_at(mut self, starts_at: DateTime<Utc>) -> Self {
        self.starts_at = starts_at;
        self
    }

    /// Sets the end time.
    #[must_use]
    pub const fn ending_at(mut self, ends_at: DateTime<Utc>) -> Self {
        self.ends_at = Some(ends_at);
        self
    }

    /// Sets the generator URL.
    #[must_use]
    pub fn with_generator_url(mut self, url: impl Into<String>) -> Self {
        self.generator_url = url.into();
        self
    }

    /// Returns the value of the `alertname` label, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.labels.get(ALERT_NAME_LABEL).map(String::as_str)
    }

    /// Returns true if the alert had ended at `now`.
    #[must_use]
    pub fn resolved_at(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|end| end <= now)
    }

    /// Returns the status of the alert at `now`.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> AlertStatus {
        if self.resolved_at(now) {
            AlertStatus::Resolved
        } else {
            AlertStatus::Firing
        }
    }

    /// Computes the fingerprint for deduplication.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_labels(&self.labels)
    }
}

/// Pipeline context a notification is rendered in.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContext {
    /// The receiver the notification is for.
    pub receiver: String,
    /// Key of the alert group.
    pub group_key: String,
    /// Labels the alerts were grouped by.
    pub group_labels: LabelSet,
    /// The instant alert statuses are evaluated at.
    pub now: DateTime<Utc>,
}

impl NotificationContext {
    /// Creates a context for the given receiver, evaluated at the current time.
    #[must_use]
    pub fn new(receiver: impl Into<String>) -> Self {
        Self {
            receiver: receiver.into(),
            group_key: String::new(),
            group_labels: LabelSet::new(),
            now: Utc::now(),
        }
    }

    /// Sets the group key.
    #[must_use]
    pub fn with_group_key(mut self, key: impl Into<String>) -> Self {
        self.group_key = key.into();
        self
    }

    /// Adds a group label.
    #[must_use]
    pub fn with_group_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.group_labels.insert(key.into(), value.into());
        self
    }

    /// Replaces the group labels.
    #[must_use]
    pub fn with_group_labels(mut self, labels: LabelSet) -> Self {
        self.group_labels = labels;
        self
    }

    /// Sets the evaluation time.
    #[must_use]
    pub const fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

impl Default for NotificationContext {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    mod status_tests {
        use super::*;

        #[test]
        fn status_as_str() {
            assert_eq!(AlertStatus::Firing.as_str(), "firing");
            assert_eq!(AlertStatus::Resolved.as_str(), "resolved");
        }

        #[test]
        fn status_serialization() {
            assert_eq!(
                serde_json::to_string(&AlertStatus::Firing).ok(),
                Some("\"firing\"".to_string())
            );
        }
    }

    mod fingerprint_tests {
        use super::*;

        #[test]
        fn empty_labels_use_offset_basis() {
            let fp = Fingerprint::from_labels(&LabelSet::new());
            assert_eq!(fp.to_string(), "cbf29ce484222325");
        }

        #[test]
        fn fingerprint_is_order_independent() {
            let mut a = LabelSet::new();
            a.insert("b".to_string(), "2".to_string());
            a.insert("a".to_string(), "1".to_string());
            let b = labels(&[("a", "1"), ("b", "2")]);

            assert_eq!(Fingerprint::from_labels(&a), Fingerprint::from_labels(&b));
        }

        #[test]
        fn fingerprint_differs_by_value() {
            let a = labels(&[("alertname", "one")]);
            let b = labels(&[("alertname", "two")]);
            assert_ne!(Fingerprint::from_labels(&a), Fingerprint::from_labels(&b));
        }

        #[test]
        fn fingerprint_separates_name_and_value() {
            let a = labels(&[("ab", "c")]);
            let b = labels(&[("a", "bc")]);
            assert_ne!(Fingerprint::from_labels(&a), Fingerprint::from_labels(&b));
        }

        #[test]
        fn fingerprint_display_is_zero_padded_hex() {
            let fp = Fingerprint(0xab);
            assert_eq!(fp.to_string(), "00000000000000ab");
        }
    }

    mod alert_tests {
        use super::*;

        #[test]
        fn alert_without_end_is_firing() {
            let alert = Alert::new(labels(&[("alertname", "HighCPU")]));
            assert_eq!(alert.status_at(Utc::now()), AlertStatus::Firing);
            assert_eq!(alert.name(), Some("HighCPU"));
        }

        #[test]
        fn alert_with_future_end_is_firing() {
            let now = Utc::now();
            let alert = Alert::new(LabelSet::new()).ending_at(now + Duration::minutes(5));
            assert_eq!(alert.status_at(now), AlertStatus::Firing);
        }

        #[test]
        fn alert_with_past_end_is_resolved() {
            let now = Utc::now();
            let alert = Alert::new(LabelSet::new()).ending_at(now - Duration::minutes(5));
            assert_eq!(alert.status_at(now), AlertStatus::Resolved);
        }

        #[test]
        fn alert_ending_exactly_now_is_resolved() {
            let now = Utc::now();
            let alert = Alert::new(LabelSet::new()).ending_at(now);
            assert!(alert.resolved_at(now));
        }

        #[test]
        fn alert_builder() {
            let alert = Alert::new(LabelSet::new())
                .with_label("team", "sre")
                .with_annotation("summary", "disk full")
                .with_generator_url("http://prom/graph");

            assert_eq!(alert.labels.get("team"), Some(&"sre".to_string()));
            assert_eq!(
                alert.annotations.get("summary"),
                Some(&"disk full".to_string())
            );
            assert_eq!(alert.generator_url, "http://prom/graph");
        }

        #[test]
        fn alert_deserializes_webhook_shape() {
            let json = r#"{
                "labels": {"alertname": "Down"},
                "annotations": {"summary": "target down"},
                "startsAt": "2024-01-01T00:00:00Z",
                "generatorURL": "http://prom/graph?g0.expr=up"
            }"#;
            let alert: Alert = serde_json::from_str(json).unwrap();
            assert_eq!(alert.name(), Some("Down"));
            assert!(alert.ends_at.is_none());
            assert_eq!(alert.generator_url, "http://prom/graph?g0.expr=up");
        }
    }

    mod context_tests {
        use super::*;

        #[test]
        fn context_builder() {
            let now = Utc::now();
            let ctx = NotificationContext::new("team-a")
                .with_group_key("{}:{alertname=\"x\"}")
                .with_group_label("alertname", "x")
                .at(now);

            assert_eq!(ctx.receiver, "team-a");
            assert_eq!(ctx.group_key, "{}:{alertname=\"x\"}");
            assert_eq!(ctx.group_labels.get("alertname"), Some(&"x".to_string()));
            assert_eq!(ctx.now, now);
        }
    }
}
