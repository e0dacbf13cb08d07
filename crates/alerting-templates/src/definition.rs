//! Template definitions and their compilation units.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TemplateError};
use crate::kind::Kind;

/// Opening tag of a named sub-template.
static INLINE_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{~?\s*#\*inline\s+"([^"]*)"\s*~?\}\}"#).unwrap_or_else(|_| unreachable!())
});

/// Closing tag of a named sub-template.
static INLINE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{~?\s*/inline\s*~?\}\}").unwrap_or_else(|_| unreachable!()));

/// Trailing newline and indentation before a closing tag.
static TRAILING_INDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n[ \t]*$").unwrap_or_else(|_| unreachable!()));

/// A partial call whose name is not a plain identifier, e.g. `{{> (lookup ..)}}`.
static DYNAMIC_PARTIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{~?\s*#?>\s*[^A-Za-z0-9_\s-]").unwrap_or_else(|_| unreachable!())
});

/// A named block of template text belonging to one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    /// Name the remainder of the text is callable as.
    pub name: String,
    /// Namespace the definition belongs to.
    #[serde(default)]
    pub kind: Kind,
    /// Template text, optionally holding `{{#*inline "name"}}` blocks.
    pub template: String,
}

impl TemplateDefinition {
    /// Creates a definition.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: Kind, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            template: template.into(),
        }
    }

    /// Creates a Grafana definition.
    #[must_use]
    pub fn grafana(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(name, Kind::Grafana, template)
    }

    /// Creates a Mimir definition.
    #[must_use]
    pub fn mimir(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(name, Kind::Mimir, template)
    }

    /// Checks that the name can be called as a partial.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name, &self.name)
    }

    /// Splits the text into separately callable units.
    ///
    /// Every top-level inline block becomes a unit named after the block.
    /// The text outside of them becomes a unit named after the definition,
    /// unless it is blank and a block already carries that name.
    pub(crate) fn units(&self) -> Result<Vec<TemplateUnit>> {
        self.validate()?;
        if has_dynamic_partial(&self.template) {
            return Err(self.invalid("dynamic partial calls are not supported".to_string()));
        }

        let (mut units, remainder) = split_inline(&self.template).map_err(|r| self.invalid(r))?;
        for unit in &units {
            validate_name(&self.name, &unit.name)?;
        }

        let shadowed = units.iter().any(|u| u.name == self.name);
        if shadowed && !remainder.trim().is_empty() {
            return Err(self.invalid(format!(
                "template {:?} is defined twice",
                self.name
            )));
        }
        if !shadowed {
            units.push(TemplateUnit {
                name: self.name.clone(),
                source: remainder,
            });
        }

        Ok(units)
    }

    fn invalid(&self, reason: String) -> TemplateError {
        TemplateError::InvalidDefinition {
            name: self.name.clone(),
            reason,
        }
    }
}

/// A callable template produced from a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TemplateUnit {
    pub name: String,
    pub source: String,
}

/// Returns true if `text` calls a partial by a computed, quoted or special name.
pub(crate) fn has_dynamic_partial(text: &str) -> bool {
    DYNAMIC_PARTIAL.is_match(text)
}

/// Splits `text` into its inline blocks and the text outside of them.
///
/// Fails with a reason on unterminated, nested or stray blocks.
pub(crate) fn split_inline(
    text: &str,
) -> std::result::Result<(Vec<TemplateUnit>, String), String> {
    let mut units = Vec::new();
    let mut remainder = String::new();
    let mut pos = 0;

    while let Some(open) = INLINE_OPEN.captures_at(text, pos) {
        let (Some(tag), Some(name)) = (open.get(0), open.get(1)) else {
            break;
        };
        reject_stray_close(&text[pos..tag.start()])?;
        remainder.push_str(&text[pos..tag.start()]);

        let Some(close) = INLINE_CLOSE.find_at(text, tag.end()) else {
            return Err(format!("unterminated inline block {:?}", name.as_str()));
        };
        if INLINE_OPEN.is_match(&text[tag.end()..close.start()]) {
            return Err(format!("inline block nested inside {:?}", name.as_str()));
        }

        units.push(TemplateUnit {
            name: name.as_str().to_string(),
            source: trim_block(&text[tag.end()..close.start()]),
        });
        pos = close.end();
    }

    reject_stray_close(&text[pos..])?;
    remainder.push_str(&text[pos..]);
    Ok((units, remainder))
}

fn reject_stray_close(text: &str) -> std::result::Result<(), String> {
    if INLINE_CLOSE.is_match(text) {
        return Err("closing inline tag without an opening tag".to_string());
    }
    Ok(())
}

fn validate_name(definition: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TemplateError::InvalidDefinition {
            name: definition.to_string(),
            reason: "template name is empty".to_string(),
        });
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(TemplateError::InvalidDefinition {
            name: definition.to_string(),
            reason: format!("unexpected character {c:?} in template name {name:?}"),
        });
    }
    Ok(())
}

/// Drops one newline after the opening tag and the last line break before the closing tag.
fn trim_block(body: &str) -> String {
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body);
    TRAILING_INDENT.replace(body, "").into_owned()
}
