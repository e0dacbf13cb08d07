//! Template kinds.
//!
//! A [`Kind`] partitions template definitions into independent namespaces.
//! Definitions registered under one kind are never visible to templates
//! executed under another.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TemplateError};

/// The template syntax and namespace a definition belongs to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Grafana-native templates.
    #[default]
    Grafana,
    /// Mimir / Prometheus Alertmanager compatible templates.
    Mimir,
}

impl Kind {
    /// Every known kind, in numeric order.
    pub const ALL: [Self; 2] = [Self::Grafana, Self::Mimir];

    /// Returns the kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Grafana => "grafana",
            Self::Mimir => "mimir",
        }
    }

    /// Returns the numeric form of the kind.
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Grafana => 0,
            Self::Mimir => 1,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Kind {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "grafana" => Ok(Self::Grafana),
            "mimir" => Ok(Self::Mimir),
            _ => Err(TemplateError::InvalidKind {
                kind: s.to_string(),
            }),
        }
    }
}

impl TryFrom<u8> for Kind {
    type Error = TemplateError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Grafana),
            1 => Ok(Self::Mimir),
            other => Err(TemplateError::InvalidKind {
                kind: other.to_string(),
            }),
        }
    }
}
