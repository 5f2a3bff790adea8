//! Compiled attribute conditions for sampling overrides.
//!
//! Conditions are compiled once when a sampler is built; evaluation is a
//! pure read over the unit's attributes. An absent attribute never satisfies
//! a condition.

use regex::Regex;

use crate::attributes::{
    Attributes, HTTP_URL, REQUEST_HEADER_PREFIX, RESPONSE_HEADER_PREFIX, synthesize_http_url,
};
use crate::config::{AttributeCondition, ConfigError, MatchType, SamplingOverride};
use crate::percentage::normalize_percentage;

/// A single compiled attribute matcher.
#[derive(Debug)]
enum Matcher {
    /// Exact string equality.
    Strict { key: String, value: String },
    /// Exact equality against any element of a string-array attribute.
    StrictArrayContains { key: String, value: String },
    /// Full-string regular expression match.
    Regexp { key: String, pattern: Regex },
    /// Full-string regular expression match against any array element.
    RegexpArrayContains { key: String, pattern: Regex },
    /// Matches when the attribute is present with a string value.
    KeyOnly { key: String },
}

impl Matcher {
    fn new(condition: &AttributeCondition) -> Result<Self, ConfigError> {
        let key = condition.key.clone();

        let Some(match_type) = condition.match_type else {
            return Ok(Self::KeyOnly { key });
        };

        let value =
            condition
                .value
                .clone()
                .ok_or_else(|| ConfigError::MissingMatchValue {
                    key: condition.key.clone(),
                })?;

        // Header attributes hold one array element per header occurrence;
        // all other attributes are matched as scalars.
        let is_header =
            key.starts_with(REQUEST_HEADER_PREFIX) || key.starts_with(RESPONSE_HEADER_PREFIX);

        Ok(match (match_type, is_header) {
            (MatchType::Strict, false) => Self::Strict { key, value },
            (MatchType::Strict, true) => Self::StrictArrayContains { key, value },
            (MatchType::Regexp, is_header) => {
                let pattern = full_match_regex(&value).map_err(|source| {
                    ConfigError::InvalidRegex {
                        key: condition.key.clone(),
                        source,
                    }
                })?;
                if is_header {
                    Self::RegexpArrayContains { key, pattern }
                } else {
                    Self::Regexp { key, pattern }
                }
            }
        })
    }

    fn matches(&self, attributes: &Attributes, synthesized_url: Option<&str>) -> bool {
        match self {
            Self::Strict { key, value } => {
                scalar_value(attributes, key, synthesized_url).is_some_and(|actual| actual == value)
            }
            Self::Regexp { key, pattern } => scalar_value(attributes, key, synthesized_url)
                .is_some_and(|actual| pattern.is_match(actual)),
            Self::KeyOnly { key } => scalar_value(attributes, key, synthesized_url).is_some(),
            Self::StrictArrayContains { key, value } => attributes
                .get_str_array(key)
                .is_some_and(|values| values.iter().any(|actual| actual == value)),
            Self::RegexpArrayContains { key, pattern } => attributes
                .get_str_array(key)
                .is_some_and(|values| values.iter().any(|actual| pattern.is_match(actual))),
        }
    }

    fn consults_url(&self) -> bool {
        match self {
            Self::Strict { key, .. } | Self::Regexp { key, .. } | Self::KeyOnly { key } => {
                key == HTTP_URL
            }
            Self::StrictArrayContains { .. } | Self::RegexpArrayContains { .. } => false,
        }
    }
}

/// Looks up a scalar attribute, falling back to the synthesized URL for the
/// URL key.
fn scalar_value<'a>(
    attributes: &'a Attributes,
    key: &str,
    synthesized_url: Option<&'a str>,
) -> Option<&'a str> {
    match attributes.get_str(key) {
        Some(value) => Some(value),
        None if key == HTTP_URL => synthesized_url,
        None => None,
    }
}

/// The configured pattern must match the entire value, not a substring.
fn full_match_regex(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("\\A(?:{pattern})\\z"))
}

/// One compiled override: a condition set and the percentage it enforces.
#[derive(Debug)]
pub struct OverrideRule {
    matchers: Vec<Matcher>,
    percentage: f64,
    include_standalone: bool,
}

impl OverrideRule {
    fn new(config: &SamplingOverride) -> Result<Self, ConfigError> {
        if !(0.0..=100.0).contains(&config.percentage) {
            return Err(ConfigError::PercentageOutOfRange(config.percentage));
        }

        let matchers = config
            .attributes
            .iter()
            .map(Matcher::new)
            .collect::<Result<_, _>>()?;

        Ok(Self {
            matchers,
            percentage: normalize_percentage(config.percentage),
            include_standalone: config.include_standalone,
        })
    }

    /// The percentage applied to units matching this rule, in `100/N` form.
    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    fn matches(&self, standalone: bool, attributes: &Attributes, synthesized_url: Option<&str>) -> bool {
        if standalone && !self.include_standalone {
            return false;
        }
        self.matchers
            .iter()
            .all(|matcher| matcher.matches(attributes, synthesized_url))
    }
}

/// An ordered set of compiled sampling overrides.
///
/// Rules are evaluated in configured order and evaluation stops at the first
/// rule whose conditions all hold; rules are never reordered by specificity.
#[derive(Debug, Default)]
pub struct SamplingOverrides {
    rules: Vec<OverrideRule>,
    needs_url: bool,
}

impl SamplingOverrides {
    /// Compiles the configured overrides, failing on the first invalid rule.
    pub fn new(configs: &[SamplingOverride]) -> Result<Self, ConfigError> {
        let rules: Vec<OverrideRule> = configs
            .iter()
            .map(OverrideRule::new)
            .collect::<Result<_, _>>()?;

        let needs_url = rules
            .iter()
            .flat_map(|rule| rule.matchers.iter())
            .any(Matcher::consults_url);

        Ok(Self { rules, needs_url })
    }

    /// Returns the first matching override for a traced unit, if any.
    pub fn get_override(&self, attributes: &Attributes) -> Option<&OverrideRule> {
        self.lookup(false, attributes)
    }

    /// Returns the first matching override's percentage.
    ///
    /// This is the lookup used by the log-record export path, where only the
    /// percentage is needed and telemetry may live outside any trace
    /// (`standalone`).
    pub fn get_override_percentage(&self, standalone: bool, attributes: &Attributes) -> Option<f64> {
        self.lookup(standalone, attributes)
            .map(OverrideRule::percentage)
    }

    fn lookup(&self, standalone: bool, attributes: &Attributes) -> Option<&OverrideRule> {
        // The synthesized URL is computed at most once per evaluation and
        // handed down by value; it is never cached across evaluations.
        let synthesized_url = if self.needs_url && attributes.get_str(HTTP_URL).is_none() {
            synthesize_http_url(attributes)
        } else {
            None
        };

        self.rules
            .iter()
            .find(|rule| rule.matches(standalone, attributes, synthesized_url.as_deref()))
    }
}
