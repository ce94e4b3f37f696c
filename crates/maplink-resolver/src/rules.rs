//! Ordered coordinate-extraction rules shared by every stage.
//!
//! A stage is a list of [`CoordinateRule`]s evaluated in order. Each rule
//! yields raw candidates in document order; the first candidate that passes
//! the validator (and the region filter, when the rule asks for it) wins.

use std::sync::LazyLock;

use maplink_core::{validate_candidate, Candidate, Coordinates, RegionFilter};
use regex::Regex;
use reqwest::Url;

/// `@lat,lon` path segment, optionally followed by `,zoom`.
pub(crate) static AT_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(-?\d{1,2}\.\d+),(-?\d{1,3}\.\d+)").expect("valid regex"));

/// `!3d<lat>` … `!4d<lon>` data markers with anything in between.
pub(crate) static DATA_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!3d(-?\d+\.\d+).*?!4d(-?\d+\.\d+)").expect("valid regex"));

/// `q=lat,lon` query parameter matched directly on the URL string.
pub(crate) static QUERY_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[?&]q=(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)").expect("valid regex")
});

/// A whole parameter value that is exactly `lat,lon`.
static EXACT_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*$").expect("valid regex")
});

/// `[lat,lon]` with at least six fractional digits on both sides.
pub(crate) static PRECISE_BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*(-?\d{1,3}\.\d{6,})\s*,\s*(-?\d{1,3}\.\d{6,})\s*\]").expect("valid regex")
});

pub(crate) static CENTER_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""center"\s*:\s*\[\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)"#)
        .expect("valid regex")
});

pub(crate) static LOCATION_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""location"\s*:\s*\[\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)"#)
        .expect("valid regex")
});

pub(crate) static NESTED_ARRAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[\s*(-?\d+\.\d+)\s*,\s*(-?\d+\.\d+)").expect("valid regex")
});

static META_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("valid regex"));

static PROPERTY_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| attr_regex("property"));
static NAME_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| attr_regex("name"));
static CONTENT_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| attr_regex("content"));

/// `attr="value"` (either quote style) inside a single tag.
fn attr_regex(attr: &str) -> Regex {
    Regex::new(&format!(r#"(?is)\s{attr}\s*=\s*["']([^"']+)["']"#)).expect("valid regex")
}

/// How a rule turns text into raw candidates.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RuleKind {
    /// A regex whose first two capture groups are latitude and longitude.
    Pattern(&'static LazyLock<Regex>),
    /// A query parameter of the (URL) text whose whole value is `lat,lon`.
    QueryParam(&'static str),
    /// A pair of `<meta>` tags keyed by `property` (or `name`).
    MetaPair {
        lat_key: &'static str,
        lon_key: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CoordinateRule {
    pub name: &'static str,
    pub kind: RuleKind,
    /// Apply the deployment region filter on top of the validator.
    pub region_checked: bool,
}

impl CoordinateRule {
    pub(crate) const fn pattern(name: &'static str, re: &'static LazyLock<Regex>) -> Self {
        Self {
            name,
            kind: RuleKind::Pattern(re),
            region_checked: false,
        }
    }

    pub(crate) const fn region_checked(mut self) -> Self {
        self.region_checked = true;
        self
    }

    fn candidates(&self, text: &str) -> Vec<Candidate> {
        match self.kind {
            RuleKind::Pattern(re) => re
                .captures_iter(text)
                .filter_map(|caps| Some(Candidate::new(caps.get(1)?.as_str(), caps.get(2)?.as_str())))
                .collect(),
            RuleKind::QueryParam(param) => query_param_candidates(text, param),
            RuleKind::MetaPair { lat_key, lon_key } => {
                match (find_meta_content(text, lat_key), find_meta_content(text, lon_key)) {
                    (Some(lat), Some(lon)) => vec![Candidate::new(lat, lon)],
                    _ => Vec::new(),
                }
            }
        }
    }
}

/// The rule that produced an accepted coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleMatch {
    pub rule: &'static str,
    pub coords: Coordinates,
}

/// Evaluate `rules` in order against `text` and return the first accepted
/// pair. Rejected candidates fall through to the next candidate, then to the
/// next rule.
pub(crate) fn first_match(
    rules: &[CoordinateRule],
    text: &str,
    region: RegionFilter,
) -> Option<RuleMatch> {
    rules.iter().find_map(|rule| {
        rule.candidates(text).iter().find_map(|candidate| {
            let coords = validate_candidate(candidate)?;
            if rule.region_checked && !region.allows(coords) {
                tracing::trace!(rule = rule.name, ?candidate, "candidate outside deployment region");
                return None;
            }
            Some(RuleMatch {
                rule: rule.name,
                coords,
            })
        })
    })
}

fn query_param_candidates(text: &str, param: &str) -> Vec<Candidate> {
    let Ok(url) = Url::parse(text) else {
        return Vec::new();
    };
    url.query_pairs()
        .filter(|(key, _)| key == param)
        .filter_map(|(_, value)| {
            let caps = EXACT_PAIR_RE.captures(&value)?;
            Some(Candidate::new(caps.get(1)?.as_str(), caps.get(2)?.as_str()))
        })
        .collect()
}

fn find_meta_content(html: &str, key: &str) -> Option<String> {
    META_TAG_RE.find_iter(html).find_map(|m| {
        let tag = m.as_str();
        let tag_key =
            extract_attr(tag, &PROPERTY_ATTR_RE).or_else(|| extract_attr(tag, &NAME_ATTR_RE))?;
        if tag_key.eq_ignore_ascii_case(key) {
            extract_attr(tag, &CONTENT_ATTR_RE)
        } else {
            None
        }
    })
}

fn extract_attr(tag: &str, re: &Regex) -> Option<String> {
    re.captures(tag)
        .and_then(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
}
