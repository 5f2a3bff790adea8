//! Sampling configuration.
//!
//! These types mirror the agent configuration file; loading and env-var
//! overlay happen elsewhere. Everything here is validated when a
//! [`Sampler`](crate::Sampler) is built from it: a configuration problem
//! surfaces as a [`ConfigError`] at construction and never as a failure
//! while deciding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default adaptation window of the rate-limited mode, in seconds.
pub const DEFAULT_ADAPTATION_TIME_SECONDS: f64 = 0.1;

/// A fatal problem in the sampling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An override attribute pattern failed to compile.
    #[error("invalid regex for sampling override attribute {key:?}")]
    InvalidRegex {
        /// The attribute key the pattern applies to.
        key: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// An override attribute with a match type is missing its value.
    #[error("sampling override attribute {key:?} requires a value")]
    MissingMatchValue {
        /// The attribute key of the offending condition.
        key: String,
    },

    /// A percentage is outside of `[0, 100]`.
    #[error("sampling percentage {0} is outside the range [0, 100]")]
    PercentageOutOfRange(f64),

    /// The rate-limited target is negative.
    #[error("items per second limit {0} is negative")]
    NegativeItemLimit(f64),

    /// The rate-limited adaptation time is negative.
    #[error("adaptation time {0} is negative")]
    NegativeAdaptationTime(f64),

    /// Both a fixed percentage and a throughput target are configured.
    #[error("percentage and itemsPerSecond cannot both be configured")]
    ConflictingModes,
}

/// How an override condition compares the attribute value.
///
/// A condition without a match type checks only that the attribute exists.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    /// Exact string equality.
    Strict,
    /// A regular expression that must match the entire value.
    Regexp,
}

/// A single attribute condition within a sampling override.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeCondition {
    /// The attribute key to inspect.
    pub key: String,

    /// How to compare the attribute value.
    ///
    /// When absent, the condition matches any unit that carries the
    /// attribute, regardless of its value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,

    /// The value to compare against. Required unless `match_type` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// The kind of telemetry unit, as classified by the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    /// An incoming operation handled by this process.
    Request,
    /// An outgoing or child operation, such as a downstream call.
    Dependency,
}

/// A sampling override rule.
///
/// Overrides are evaluated strictly in configured order and the first rule
/// whose conditions all hold wins. An earlier catch-all rule therefore
/// silently shadows everything after it; this is part of the contract, not
/// an error.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingOverride {
    /// Which kind of unit this override applies to.
    pub item_kind: ItemKind,

    /// Conditions that must all hold for the override to apply.
    #[serde(default)]
    pub attributes: Vec<AttributeCondition>,

    /// The percentage to apply instead of the default.
    pub percentage: f64,

    /// Whether the override also applies to telemetry outside any trace.
    #[serde(default)]
    pub include_standalone: bool,
}

/// Sampling configuration of the engine.
///
/// `percentage` and `items_per_second` select the default mode and are
/// mutually exclusive. With neither set, everything is kept.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingConfig {
    /// Fixed default percentage, `0` to `100`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,

    /// Target number of kept items per second for the rate-limited mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_per_second: Option<f64>,

    /// How quickly the rate-limited mode adapts to load changes, in seconds.
    pub adaptation_time_seconds: f64,

    /// Ordered override rules, first full match wins.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<SamplingOverride>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            percentage: None,
            items_per_second: None,
            adaptation_time_seconds: DEFAULT_ADAPTATION_TIME_SECONDS,
            overrides: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn config_deserialize() {
        let json = include_str!("../tests/fixtures/sampling_config.json");
        let config: SamplingConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.items_per_second, Some(5.0));
        assert_eq!(config.overrides.len(), 3);
        assert_eq!(config.overrides[0].item_kind, ItemKind::Request);
        assert_eq!(config.overrides[0].percentage, 0.0);
    }

    #[test]
    fn condition_serialization() {
        let condition = AttributeCondition {
            key: "url.path".to_owned(),
            match_type: Some(MatchType::Regexp),
            value: Some("/health.*".to_owned()),
        };

        insta::assert_json_snapshot!(condition, @r#"
        {
          "key": "url.path",
          "matchType": "regexp",
          "value": "/health.*"
        }
        "#);
    }

    #[test]
    fn key_only_condition_deserializes_without_value() {
        let condition: AttributeCondition =
            serde_json::from_str(r#"{"key": "enduser.id"}"#).unwrap();

        assert_eq!(condition.match_type, None);
        assert_eq!(condition.value, None);
    }

    #[test]
    fn unknown_match_type_is_rejected() {
        let result: Result<AttributeCondition, _> = serde_json::from_str(
            r#"{"key": "enduser.id", "matchType": "substring", "value": "x"}"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn defaults() {
        let config: SamplingConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.percentage, None);
        assert_eq!(config.items_per_second, None);
        assert_eq!(
            config.adaptation_time_seconds,
            DEFAULT_ADAPTATION_TIME_SECONDS
        );
        assert!(config.overrides.is_empty());
    }
}
