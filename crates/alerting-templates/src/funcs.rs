//! Template-callable functions.
//!
//! A [`FuncMap`] is a name-ordered set of Handlebars helpers. Three sets are
//! provided:
//! - [`general_funcs`]: string and encoding utilities
//! - [`alertmanager_funcs`]: the Alertmanager template functions plus the
//!   formatting helpers notification templates rely on
//! - [`mimir_funcs`]: tenant and Explore helpers for the Mimir kind
//!
//! [`default_funcs`] merges the first two; on a name collision the
//! Alertmanager function wins.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, PathAndJson, RenderContext,
    RenderError, RenderErrorReason, ScopedJson,
};
use regex::Regex;
use serde::Serialize;
use serde_json::Value as Json;

/// A helper shared between every registry it is registered with.
pub type SharedHelperDef = Arc<dyn HelperDef + Send + Sync>;

/// An immutable, name-ordered map of template helpers.
#[derive(Clone, Default)]
pub struct FuncMap {
    funcs: BTreeMap<&'static str, SharedHelperDef>,
}

impl FuncMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a helper, replacing any helper with the same name.
    #[must_use]
    pub fn with(
        mut self,
        name: &'static str,
        helper: impl HelperDef + Send + Sync + 'static,
    ) -> Self {
        self.funcs.insert(name, Arc::new(helper));
        self
    }

    /// Merges `other` into this map; helpers from `other` win on collision.
    #[must_use]
    pub fn merge(mut self, other: &Self) -> Self {
        for (name, helper) in &other.funcs {
            self.funcs.insert(name, Arc::clone(helper));
        }
        self
    }

    /// Returns true if a helper with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    /// Returns the helper names in order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.funcs.keys().copied()
    }

    /// Number of helpers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    /// Returns true if the map holds no helpers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Registers every helper with `registry`.
    pub(crate) fn register(&self, registry: &mut Handlebars<'static>) {
        for (name, helper) in &self.funcs {
            registry.register_helper(name, Box::new(Shared(Arc::clone(helper))));
        }
    }
}

impl fmt::Debug for FuncMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.funcs.keys()).finish()
    }
}

struct Shared(SharedHelperDef);

impl HelperDef for Shared {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        self.0.call_inner(h, r, ctx, rc)
    }

    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        self.0.call(h, r, ctx, rc, out)
    }
}

type FnResult = std::result::Result<Json, String>;

/// A helper over positional parameters that may fail.
struct TemplateFn {
    name: &'static str,
    func: fn(&[&Json]) -> FnResult,
}

impl HelperDef for TemplateFn {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let params: Vec<&Json> = h.params().iter().map(PathAndJson::value).collect();
        (self.func)(&params).map(ScopedJson::Derived).map_err(|reason| {
            RenderErrorReason::Other(format!("error calling {}: {reason}", self.name)).into()
        })
    }
}

const fn func(name: &'static str, func: fn(&[&Json]) -> FnResult) -> (&'static str, TemplateFn) {
    (name, TemplateFn { name, func })
}

fn with_fns(mut map: FuncMap, fns: Vec<(&'static str, TemplateFn)>) -> FuncMap {
    for (name, helper) in fns {
        map = map.with(name, helper);
    }
    map
}

mod simple {
    use handlebars::handlebars_helper;

    use super::title_case;

    handlebars_helper!(to_upper: |s: str| s.to_uppercase());
    handlebars_helper!(to_lower: |s: str| s.to_lowercase());
    handlebars_helper!(trim_space: |s: str| s.trim().to_string());
    handlebars_helper!(title: |s: str| title_case(s));
    handlebars_helper!(safe_html: |s: str| s.to_string());
    handlebars_helper!(quote: |s: str| format!("{s:?}"));
    handlebars_helper!(squote: |s: str| format!("'{s}'"));
    handlebars_helper!(contains: |substr: str, s: str| s.contains(substr));
    handlebars_helper!(has_prefix: |prefix: str, s: str| s.starts_with(prefix));
    handlebars_helper!(has_suffix: |suffix: str, s: str| s.ends_with(suffix));
    handlebars_helper!(trim_prefix: |prefix: str, s: str| {
        s.strip_prefix(prefix).unwrap_or(s).to_string()
    });
    handlebars_helper!(trim_suffix: |suffix: str, s: str| {
        s.strip_suffix(suffix).unwrap_or(s).to_string()
    });
    handlebars_helper!(replace: |old: str, new: str, s: str| s.replace(old, new));
    handlebars_helper!(repeat: |count: u64, s: str| s.repeat(usize::try_from(count).unwrap_or(0)));
    handlebars_helper!(split_list: |sep: str, s: str| {
        s.split(sep).map(str::to_string).collect::<Vec<_>>()
    });
}

use simple::{
    contains, has_prefix, has_suffix, quote, repeat, replace, safe_html, split_list, squote, title,
    to_lower, to_upper, trim_prefix, trim_space, trim_suffix,
};

/// String and encoding utilities.
#[must_use]
pub fn general_funcs() -> FuncMap {
    let map = FuncMap::new()
        .with("upper", to_upper)
        .with("lower", to_lower)
        .with("trim", trim_space)
        .with("title", title)
        .with("quote", quote)
        .with("squote", squote)
        .with("contains", contains)
        .with("hasPrefix", has_prefix)
        .with("hasSuffix", has_suffix)
        .with("trimPrefix", trim_prefix)
        .with("trimSuffix", trim_suffix)
        .with("replace", replace)
        .with("repeat", repeat)
        .with("splitList", split_list);

    with_fns(
        map,
        vec![
            func("substr", substr_fn),
            func("trunc", trunc_fn),
            func("default", default_fn),
            func("join", |args| {
                let sep = str_arg(args, 0)?;
                join_values(array_arg(args, 1)?, sep)
            }),
            func("toJson", |args| {
                let value = arg(args, 0)?;
                serde_json::to_string(value)
                    .map(Json::String)
                    .map_err(|e| e.to_string())
            }),
            func("now", |_| Ok(Json::String(Utc::now().to_rfc3339()))),
        ],
    )
}

/// The Alertmanager template functions and notification formatting helpers.
#[must_use]
pub fn alertmanager_funcs() -> FuncMap {
    let map = FuncMap::new()
        .with("toUpper", to_upper)
        .with("toLower", to_lower)
        .with("title", title)
        .with("trimSpace", trim_space)
        .with("safeHtml", safe_html);

    with_fns(
        map,
        vec![
            func("join", |args| {
                let list = array_arg(args, 0)?;
                join_values(list, str_arg(args, 1)?)
            }),
            func("match", |args| {
                let re = regex_arg(args, 0)?;
                Ok(Json::Bool(re.is_match(str_arg(args, 1)?)))
            }),
            func("reReplaceAll", |args| {
                let re = regex_arg(args, 0)?;
                let replacement = str_arg(args, 1)?;
                let text = str_arg(args, 2)?;
                Ok(Json::String(re.replace_all(text, replacement).into_owned()))
            }),
            func("urlUnescape", |args| {
                url_unescape(str_arg(args, 0)?).map(Json::String)
            }),
            func("urlquery", |args| {
                let escaped = url::form_urlencoded::byte_serialize(str_arg(args, 0)?.as_bytes());
                Ok(Json::String(escaped.collect()))
            }),
            func("stringSlice", |args| {
                args.iter()
                    .enumerate()
                    .map(|(i, _)| str_arg(args, i).map(|s| Json::String(s.to_string())))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Json::Array)
            }),
            func("date", date_fn),
            func("since", |args| {
                let start = time_arg(args, 0)?;
                let elapsed = Utc::now().signed_duration_since(start);
                Ok(Json::from(elapsed.num_milliseconds() as f64 / 1000.0))
            }),
            func("humanize", |args| Ok(Json::String(humanize(float_arg(args, 0)?)))),
            func("humanizeDuration", |args| {
                Ok(Json::String(humanize_duration(float_arg(args, 0)?)))
            }),
            func("humanizePercentage", |args| {
                Ok(Json::String(humanize_percentage(float_arg(args, 0)?)))
            }),
            func("len", len_fn),
            func("firing", |args| filter_status(args, "firing")),
            func("resolved", |args| filter_status(args, "resolved")),
            func("sortedPairs", |args| {
                let pairs = sorted_entries(object_arg(args, 0)?)
                    .into_iter()
                    .map(|(name, value)| serde_json::json!({ "name": name, "value": value }))
                    .collect();
                Ok(Json::Array(pairs))
            }),
            func("labelNames", |args| {
                let names = sorted_entries(object_arg(args, 0)?)
                    .into_iter()
                    .map(|(name, _)| Json::String(name.clone()))
                    .collect();
                Ok(Json::Array(names))
            }),
            func("labelValues", |args| {
                let values = sorted_entries(object_arg(args, 0)?)
                    .into_iter()
                    .map(|(_, value)| value.clone())
                    .collect();
                Ok(Json::Array(values))
            }),
            func("removeLabels", |args| {
                let mut labels = object_arg(args, 0)?.clone();
                for name in array_arg(args, 1)? {
                    if let Json::String(name) = name {
                        labels.remove(name);
                    }
                }
                Ok(Json::Object(labels))
            }),
        ],
    )
}

/// General utilities merged with the Alertmanager functions.
#[must_use]
pub fn default_funcs() -> FuncMap {
    general_funcs().merge(&alertmanager_funcs())
}

/// Helpers available to Mimir templates only.
#[must_use]
pub fn mimir_funcs(tenant_id: impl Into<String>) -> FuncMap {
    let map = FuncMap::new().with("tenantID", TenantId(tenant_id.into()));
    with_fns(
        map,
        vec![
            func("grafanaExploreURL", |args| {
                let base = str_arg(args, 0)?;
                let datasource = str_arg(args, 1)?;
                let from = str_arg(args, 2)?;
                let to = str_arg(args, 3)?;
                let expr = str_arg(args, 4)?;
                grafana_explore_url(base, datasource, from, to, expr).map(Json::String)
            }),
            func("queryFromGeneratorURL", |args| {
                query_from_generator_url(str_arg(args, 0)?).map(Json::String)
            }),
        ],
    )
}

struct TenantId(String);

impl HelperDef for TenantId {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        _: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        Ok(ScopedJson::Derived(Json::String(self.0.clone())))
    }
}

fn arg<'a>(args: &[&'a Json], index: usize) -> std::result::Result<&'a Json, String> {
    args.get(index)
        .copied()
        .ok_or_else(|| format!("missing argument {index}"))
}

fn str_arg<'a>(args: &[&'a Json], index: usize) -> std::result::Result<&'a str, String> {
    match arg(args, index)? {
        Json::String(s) => Ok(s),
        other => Err(format!("argument {index} must be a string, got {other}")),
    }
}

fn array_arg<'a>(args: &[&'a Json], index: usize) -> std::result::Result<&'a Vec<Json>, String> {
    match arg(args, index)? {
        Json::Array(list) => Ok(list),
        other => Err(format!("argument {index} must be a list, got {other}")),
    }
}

fn object_arg<'a>(
    args: &[&'a Json],
    index: usize,
) -> std::result::Result<&'a serde_json::Map<String, Json>, String> {
    match arg(args, index)? {
        Json::Object(map) => Ok(map),
        other => Err(format!("argument {index} must be a map, got {other}")),
    }
}

fn int_arg(args: &[&Json], index: usize) -> std::result::Result<i64, String> {
    match arg(args, index)? {
        Json::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("argument {index} must be an integer, got {n}")),
        other => Err(format!("argument {index} must be an integer, got {other}")),
    }
}

fn float_arg(args: &[&Json], index: usize) -> std::result::Result<f64, String> {
    match arg(args, index)? {
        Json::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("argument {index} is not a float: {n}")),
        Json::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("argument {index} is not a number: {s:?}")),
        other => Err(format!("argument {index} must be a number, got {other}")),
    }
}

fn time_arg(args: &[&Json], index: usize) -> std::result::Result<DateTime<Utc>, String> {
    let raw = str_arg(args, index)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid time {raw:?}: {e}"))
}

fn regex_arg(args: &[&Json], index: usize) -> std::result::Result<Regex, String> {
    let pattern = str_arg(args, index)?;
    Regex::new(pattern).map_err(|e| e.to_string())
}

fn sorted_entries(map: &serde_json::Map<String, Json>) -> Vec<(&String, &Json)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn join_values(list: &[Json], sep: &str) -> FnResult {
    let parts: Vec<String> = list
        .iter()
        .map(|v| match v {
            Json::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    Ok(Json::String(parts.join(sep)))
}

fn filter_status(args: &[&Json], status: &str) -> FnResult {
    let alerts = array_arg(args, 0)?;
    Ok(Json::Array(
        alerts
            .iter()
            .filter(|a| a.get("status").and_then(Json::as_str) == Some(status))
            .cloned()
            .collect(),
    ))
}

fn len_fn(args: &[&Json]) -> FnResult {
    let len = match arg(args, 0)? {
        Json::Array(list) => list.len(),
        Json::Object(map) => map.len(),
        Json::String(s) => s.chars().count(),
        Json::Null => 0,
        other => return Err(format!("len of {other} is undefined")),
    };
    Ok(Json::from(len))
}

fn default_fn(args: &[&Json]) -> FnResult {
    let fallback = arg(args, 0)?;
    let given = args.get(1).copied().unwrap_or(&Json::Null);
    let empty = match given {
        Json::Null => true,
        Json::Bool(b) => !b,
        Json::Number(n) => n.as_f64().is_none_or(|f| f == 0.0),
        Json::String(s) => s.is_empty(),
        Json::Array(list) => list.is_empty(),
        Json::Object(map) => map.is_empty(),
    };
    Ok(if empty { fallback.clone() } else { given.clone() })
}

fn substr_fn(args: &[&Json]) -> FnResult {
    let start = int_arg(args, 0)?;
    let end = int_arg(args, 1)?;
    let chars: Vec<char> = str_arg(args, 2)?.chars().collect();
    let len = chars.len() as i64;

    let (from, to) = if start < 0 {
        (0, end.clamp(0, len))
    } else if end < 0 || end > len {
        (start.min(len), len)
    } else {
        (start.min(end), end)
    };
    Ok(Json::String(chars[from as usize..to as usize].iter().collect()))
}

fn trunc_fn(args: &[&Json]) -> FnResult {
    let count = int_arg(args, 0)?;
    let s = str_arg(args, 1)?;
    Ok(Json::String(truncate_chars(s, count)))
}

fn truncate_chars(s: &str, count: i64) -> String {
    let len = s.chars().count() as i64;
    if count < 0 && len + count > 0 {
        s.chars().skip((len + count) as usize).collect()
    } else if count >= 0 && len > count {
        s.chars().take(count as usize).collect()
    } else {
        s.to_string()
    }
}

fn date_fn(args: &[&Json]) -> FnResult {
    let time = time_arg(args, 0)?;
    let layout = str_arg(args, 1)?;

    let items: Vec<Item<'_>> = StrftimeItems::new(layout).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid date format {layout:?}"));
    }

    let mut out = String::new();
    write!(out, "{}", time.format_with_items(items.into_iter()))
        .map_err(|_| format!("failed to format date with {layout:?}"))?;
    Ok(Json::String(out))
}

/// Uppercases the first letter of every word.
pub(crate) fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '_' || c == '\'');
    }
    out
}

/// Decodes a query-escaped string (`+` is a space).
///
/// Malformed escapes are errors; the `url` and `percent_encoding` decoders
/// pass them through unchanged instead.
pub(crate) fn url_unescape(s: &str) -> std::result::Result<String, String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| format!("invalid URL escape in {s:?}"))?;
                out.push(hex);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Formats like Go's `%.4g`.
fn format_g4(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    let scientific = format!("{v:.3e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..4).contains(&exponent) {
        let decimals = usize::try_from(3 - exponent).unwrap_or(0);
        trim_fraction(&format!("{v:.decimals$}"))
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    }
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// Scales a number with an SI prefix.
pub(crate) fn humanize(v: f64) -> String {
    if v == 0.0 || !v.is_finite() {
        return format_g4(v);
    }

    let mut v = v;
    let mut prefix = "";
    if v.abs() >= 1.0 {
        for p in ["k", "M", "G", "T", "P", "E", "Z", "Y"] {
            if v.abs() < 1000.0 {
                break;
            }
            prefix = p;
            v /= 1000.0;
        }
    } else {
        for p in ["m", "u", "n", "p", "f", "a", "z", "y"] {
            if v.abs() >= 1.0 {
                break;
            }
            prefix = p;
            v *= 1000.0;
        }
    }
    format!("{}{prefix}", format_g4(v))
}

/// Renders a number of seconds as `1d 2h 3m 4s`.
pub(crate) fn humanize_duration(v: f64) -> String {
    if !v.is_finite() {
        return format_g4(v);
    }

    if v.abs() >= 1.0 {
        let sign = if v < 0.0 { "-" } else { "" };
        let total = v.abs() as i64;
        let seconds = total % 60;
        let minutes = (total / 60) % 60;
        let hours = (total / 3600) % 24;
        let days = total / 86_400;

        return if days != 0 {
            format!("{sign}{days}d {hours}h {minutes}m {seconds}s")
        } else if hours != 0 {
            format!("{sign}{hours}h {minutes}m {seconds}s")
        } else if minutes != 0 {
            format!("{sign}{minutes}m {seconds}s")
        } else {
            format!("{sign}{}s", format_g4(v.abs()))
        };
    }

    if v == 0.0 {
        return "0s".to_string();
    }

    let mut v = v;
    let mut prefix = "";
    for p in ["m", "u", "n", "p", "f", "a", "z", "y"] {
        if v.abs() >= 1.0 {
            break;
        }
        prefix = p;
        v *= 1000.0;
    }
    format!("{}{prefix}s", format_g4(v))
}

/// Renders a ratio as a percentage.
pub(crate) fn humanize_percentage(v: f64) -> String {
    format!("{}%", format_g4(v * 100.0))
}

#[derive(Serialize)]
struct ExploreState<'a> {
    range: ExploreRange<'a>,
    queries: [ExploreQuery<'a>; 1],
}

#[derive(Serialize)]
struct ExploreRange<'a> {
    from: &'a str,
    to: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExploreQuery<'a> {
    datasource: ExploreDatasource<'a>,
    expr: &'a str,
    instant: bool,
    range: bool,
    ref_id: &'a str,
}

#[derive(Serialize)]
struct ExploreDatasource<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    uid: &'a str,
}

/// Builds a Grafana Explore link running `expr` against a Prometheus datasource.
pub(crate) fn grafana_explore_url(
    base: &str,
    datasource: &str,
    from: &str,
    to: &str,
    expr: &str,
) -> std::result::Result<String, String> {
    let state = ExploreState {
        range: ExploreRange { from, to },
        queries: [ExploreQuery {
            datasource: ExploreDatasource {
                kind: "prometheus",
                uid: datasource,
            },
            expr,
            instant: false,
            range: true,
            ref_id: "A",
        }],
    };
    let state = serde_json::to_string(&state).map_err(|e| e.to_string())?;
    let escaped: String = url::form_urlencoded::byte_serialize(state.as_bytes()).collect();
    Ok(format!("{base}/explore?left={escaped}"))
}

/// Extracts the PromQL expression from a Prometheus generator URL.
pub(crate) fn query_from_generator_url(generator_url: &str) -> std::result::Result<String, String> {
    let url = url::Url::parse(generator_url)
        .map_err(|e| format!("failed to parse generator URL: {e}"))?;
    let query = url
        .query_pairs()
        .find(|(k, _)| k == "g0.expr")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "query not found in the generator URL".to_string())?;
    url_unescape(&query).map_err(|e| format!("failed to URL decode the query: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn render(funcs: &FuncMap, template: &str, data: &Json) -> Result<String, RenderError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        funcs.register(&mut registry);
        registry.render_template(template, data)
    }

    fn render_default(template: &str, data: &Json) -> String {
        render(&default_funcs(), template, data).unwrap()
    }

    mod map_tests {
        use super::*;

        #[test]
        fn merge_prefers_other() {
            let merged = default_funcs();
            // join takes the list first in the Alertmanager set
            let out = render(&merged, r#"{{join list ","}}"#, &json!({"list": ["a", "b"]}));
            assert_eq!(out.unwrap(), "a,b");
        }

        #[test]
        fn general_join_takes_separator_first() {
            let out = render(
                &general_funcs(),
                r#"{{join "-" list}}"#,
                &json!({"list": ["a", "b"]}),
            );
            assert_eq!(out.unwrap(), "a-b");
        }

        #[test]
        fn default_set_contains_both() {
            let funcs = default_funcs();
            for name in ["toUpper", "upper", "humanize", "trimPrefix", "firing", "len"] {
                assert!(funcs.contains(name), "missing {name}");
            }
            assert!(!funcs.contains("tenantID"));
        }

        #[test]
        fn names_are_ordered() {
            let names: Vec<_> = general_funcs().names().collect();
            let mut sorted = names.clone();
            sorted.sort_unstable();
            assert_eq!(names, sorted);
        }

        #[test]
        fn debug_lists_names() {
            let funcs = FuncMap::new().with("toUpper", to_upper);
            assert_eq!(format!("{funcs:?}"), r#"{"toUpper"}"#);
            assert_eq!(funcs.len(), 1);
            assert!(!funcs.is_empty());
        }
    }

    mod string_tests {
        use super::*;
        use test_case::test_case;

        #[test_case(r#"{{toUpper "abc"}}"#, "ABC" ; "to upper")]
        #[test_case(r#"{{toLower "ABC"}}"#, "abc" ; "to lower")]
        #[test_case(r#"{{trimSpace "  x  "}}"#, "x" ; "trim space")]
        #[test_case(r#"{{title "hello big world"}}"#, "Hello Big World" ; "title")]
        #[test_case(r#"{{trimPrefix "-" "-x"}}"#, "x" ; "trim prefix")]
        #[test_case(r#"{{trimSuffix ".com" "a.com"}}"#, "a" ; "trim suffix")]
        #[test_case(r#"{{replace "a" "b" "aaa"}}"#, "bbb" ; "replace")]
        #[test_case(r#"{{repeat 3 "ab"}}"#, "ababab" ; "repeat")]
        #[test_case(r#"{{quote "x"}}"#, "\"x\"" ; "quote")]
        #[test_case(r#"{{squote "x"}}"#, "'x'" ; "single quote")]
        #[test_case(r#"{{substr 1 3 "hello"}}"#, "el" ; "substr")]
        #[test_case(r#"{{trunc 2 "hello"}}"#, "he" ; "trunc")]
        #[test_case(r#"{{default "none" missing}}"#, "none" ; "default fallback")]
        #[test_case(r#"{{default "none" "set"}}"#, "set" ; "default given")]
        #[test_case(r#"{{#if (hasPrefix "ab" "abc")}}yes{{/if}}"#, "yes" ; "has prefix")]
        #[test_case(r#"{{#if (contains "b" "abc")}}yes{{/if}}"#, "yes" ; "contains")]
        #[test_case(r#"{{len (splitList "," "a,b,c")}}"#, "3" ; "split list")]
        #[test_case(r#"{{reReplaceAll "(a)(b)" "$2$1" "abab"}}"#, "baba" ; "regex replace")]
        #[test_case(r#"{{#if (match "^fir" "firing")}}yes{{/if}}"#, "yes" ; "regex match")]
        #[test_case(r#"{{urlUnescape "a%20b+c"}}"#, "a b c" ; "url unescape")]
        #[test_case(r#"{{urlquery "a b&c"}}"#, "a+b%26c" ; "url query escape")]
        #[test_case(r#"{{safeHtml "<b>"}}"#, "<b>" ; "safe html")]
        #[test_case(r#"{{join (stringSlice "a" "b") " "}}"#, "a b" ; "string slice")]
        fn renders(template: &str, expected: &str) {
            assert_eq!(render_default(template, &json!({})), expected);
        }

        #[test]
        fn to_json_serializes_values() {
            let out = render_default("{{toJson labels}}", &json!({"labels": {"a": "1"}}));
            assert_eq!(out, r#"{"a":"1"}"#);
        }

        #[test]
        fn truncate_from_end() {
            assert_eq!(truncate_chars("hello", -2), "lo");
            assert_eq!(truncate_chars("hello", 10), "hello");
            assert_eq!(truncate_chars("héllo", 2), "hé");
        }

        #[test]
        fn invalid_regex_is_an_error() {
            let err = render(&default_funcs(), r#"{{match "(" "x"}}"#, &json!({}));
            assert!(err.is_err());
        }

        #[test]
        fn wrong_argument_type_is_an_error() {
            assert!(render(&default_funcs(), "{{toUpper 1}}", &json!({})).is_err());
            assert!(render(&default_funcs(), "{{join 1 2}}", &json!({})).is_err());
        }

        #[test]
        fn bad_escape_is_an_error() {
            assert!(url_unescape("%zz").is_err());
            assert!(url_unescape("%4").is_err());
        }
    }

    mod label_tests {
        use super::*;

        fn data() -> Json {
            json!({
                "labels": {"b": "2", "a": "1", "c": "3"},
                "names": ["c"],
                "alerts": [
                    {"status": "firing"},
                    {"status": "resolved"},
                    {"status": "firing"}
                ]
            })
        }

        #[test]
        fn label_names_and_values_are_sorted() {
            assert_eq!(render_default(r#"{{join (labelNames labels) ","}}"#, &data()), "a,b,c");
            assert_eq!(render_default(r#"{{join (labelValues labels) ","}}"#, &data()), "1,2,3");
        }

        #[test]
        fn remove_labels_drops_names() {
            let out = render_default(
                r#"{{join (labelNames (removeLabels labels names)) ","}}"#,
                &data(),
            );
            assert_eq!(out, "a,b");
        }

        #[test]
        fn sorted_pairs() {
            let out = render_default(
                "{{#each (sortedPairs labels)}}{{name}}={{value}};{{/each}}",
                &data(),
            );
            assert_eq!(out, "a=1;b=2;c=3;");
        }

        #[test]
        fn firing_and_resolved_filter_alerts() {
            assert_eq!(render_default("{{len (firing alerts)}}", &data()), "2");
            assert_eq!(render_default("{{len (resolved alerts)}}", &data()), "1");
        }

        #[test]
        fn len_of_maps_and_strings() {
            assert_eq!(render_default("{{len labels}}", &data()), "3");
            assert_eq!(render_default(r#"{{len "héllo"}}"#, &data()), "5");
            assert_eq!(render_default("{{len missing}}", &data()), "0");
        }
    }

    mod number_tests {
        use super::*;
        use test_case::test_case;

        #[test_case(0.0, "0" ; "zero")]
        #[test_case(1234.0, "1.234k" ; "kilo")]
        #[test_case(1_234_567.0, "1.235M" ; "mega")]
        #[test_case(0.001_234, "1.234m" ; "milli")]
        #[test_case(12.5, "12.5" ; "plain")]
        fn humanizes(value: f64, expected: &str) {
            assert_eq!(humanize(value), expected);
        }

        #[test_case(0.0, "0s" ; "zero")]
        #[test_case(1.5, "1.5s" ; "seconds")]
        #[test_case(61.0, "1m 1s" ; "minutes")]
        #[test_case(3_661.0, "1h 1m 1s" ; "hours")]
        #[test_case(90_061.0, "1d 1h 1m 1s" ; "days")]
        #[test_case(0.25, "250ms" ; "milliseconds")]
        #[test_case(-61.0, "-1m 1s" ; "negative")]
        fn humanizes_durations(value: f64, expected: &str) {
            assert_eq!(humanize_duration(value), expected);
        }

        #[test]
        fn humanizes_percentage() {
            assert_eq!(humanize_percentage(0.1234), "12.34%");
            assert_eq!(humanize_percentage(1.0), "100%");
        }

        #[test]
        fn format_g4_switches_to_exponent() {
            assert_eq!(format_g4(123_456.0), "1.235e+05");
            assert_eq!(format_g4(0.000_012_3), "1.23e-05");
            assert_eq!(format_g4(9999.0), "9999");
        }

        #[test]
        fn humanize_accepts_numeric_strings() {
            assert_eq!(render_default(r#"{{humanize "2048"}}"#, &json!({})), "2.048k");
            assert!(render(&default_funcs(), r#"{{humanize "abc"}}"#, &json!({})).is_err());
        }
    }

    mod time_tests {
        use super::*;

        #[test]
        fn date_formats_rfc3339() {
            let out = render_default(
                r#"{{date startsAt "%Y-%m-%d %H:%M"}}"#,
                &json!({"startsAt": "2024-03-01T12:30:00Z"}),
            );
            assert_eq!(out, "2024-03-01 12:30");
        }

        #[test]
        fn date_rejects_bad_input() {
            let data = json!({"startsAt": "yesterday"});
            assert!(render(&default_funcs(), r#"{{date startsAt "%Y"}}"#, &data).is_err());
            let data = json!({"startsAt": "2024-03-01T12:30:00Z"});
            assert!(render(&default_funcs(), r#"{{date startsAt "%Q"}}"#, &data).is_err());
        }

        #[test]
        fn since_is_positive_for_past_times() {
            let out = render_default("{{since t}}", &json!({"t": "2000-01-01T00:00:00Z"}));
            assert!(out.parse::<f64>().unwrap() > 0.0);
        }
    }

    mod mimir_tests {
        use super::*;
        use test_case::test_case;

        fn mimir() -> FuncMap {
            default_funcs().merge(&mimir_funcs("tenant-1"))
        }

        #[test]
        fn tenant_id() {
            assert_eq!(render(&mimir(), "{{tenantID}}", &json!({})).unwrap(), "tenant-1");
        }

        #[test]
        fn explore_url() {
            let out = render(
                &mimir(),
                r#"{{grafanaExploreURL "https://g" "xyz" "now-1h" "now" "up"}}"#,
                &json!({}),
            )
            .unwrap();
            let expected_state = r#"{"range":{"from":"now-1h","to":"now"},"queries":[{"datasource":{"type":"prometheus","uid":"xyz"},"expr":"up","instant":false,"range":true,"refId":"A"}]}"#;
            let expected: String =
                url::form_urlencoded::byte_serialize(expected_state.as_bytes()).collect();
            assert_eq!(out, format!("https://g/explore?left={expected}"));
        }

        #[test]
        fn explore_url_requires_five_strings() {
            let missing = r#"{{grafanaExploreURL "https://g" "xyz" "now-1h" "now"}}"#;
            assert!(render(&mimir(), missing, &json!({})).is_err());
            let number = r#"{{grafanaExploreURL "https://g" "xyz" "now-1h" "now" 5}}"#;
            assert!(render(&mimir(), number, &json!({})).is_err());
        }

        #[test_case("http://prom/graph?g0.expr=up%7Bjob%3D%22a%22%7D&g0.tab=1", Ok("up{job=\"a\"}") ; "encoded expression")]
        #[test_case("http://prom/graph?g0.expr=rate(x%5B5m%5D)", Ok("rate(x[5m])") ; "brackets")]
        #[test_case("http://prom/graph?g0.tab=1", Err(()) ; "missing")]
        #[test_case("http://prom/graph?g0.expr=", Err(()) ; "empty")]
        #[test_case("::not a url", Err(()) ; "unparsable")]
        #[test_case("http://prom/graph?g0.expr=%25zz", Err(()) ; "bad double encoding")]
        fn query_from_generator(url: &str, expected: std::result::Result<&str, ()>) {
            let got = query_from_generator_url(url);
            match expected {
                Ok(query) => assert_eq!(got.as_deref(), Ok(query)),
                Err(()) => assert!(got.is_err(), "expected error, got {got:?}"),
            }
        }

        #[test]
        fn mimir_helpers_are_separate() {
            assert!(!default_funcs().contains("tenantID"));
            assert!(!default_funcs().contains("grafanaExploreURL"));
            assert!(mimir().contains("queryFromGeneratorURL"));
        }
    }
}
