//! Sampling decisions for beacon telemetry.
//!
//! Beacon keeps only a fraction of the spans and trace-correlated log
//! records a process produces. Which fraction is controlled by a default
//! percentage, by per-attribute [override rules](SamplingOverride), or by a
//! [rate-limited adaptive mode](RateLimitedPercentage) that caps kept items
//! per second. Every kept unit reports its effective percentage through the
//! [`SAMPLE_RATE`](attributes::SAMPLE_RATE) attribute, so downstream
//! aggregation can scale sampled counts back to estimated totals.
//!
//! # Components
//!
//! - [`sampling_score`]: maps a trace id to a stable pseudo-random value in
//!   `[0, 100)`.
//! - [`round_to_nearest`] and friends: normalize percentages to `100/N`
//!   form so counts can be reconstructed without bias.
//! - [`SamplingPercentage`]: the default-percentage source, either fixed or
//!   derived from a throughput target.
//! - [`SamplingOverrides`]: ordered attribute-match rules, first full match
//!   wins.
//! - [`Sampler`]: combines all of the above with parent consistency into
//!   one decision per unit.
//! - [`DelegatingSampler`]: the hot-swappable holder of the active sampler.
//!
//! # Determinism
//!
//! Sampling decisions must agree across every process observing the same
//! trace, without coordination: a trace dropped in one service but kept in
//! another produces broken end-to-end views. The score is therefore a pure
//! hash of the trace id, and the percentage cutoff is applied to that score
//! wherever the trace is seen. Two services with different percentages
//! still nest correctly: the one keeping less selects a strict subset of
//! the traces the other keeps.
//!
//! Consistency with a parent span from the same process goes further than
//! the shared score: the parent's already-recorded rate caps the child's
//! effective rate, so a subtree is never reported at a rate its ancestor
//! contradicts.

#![warn(missing_docs)]

pub mod attributes;
pub mod condition;
pub mod config;
pub mod evaluation;
pub mod percentage;
pub mod registry;
pub mod score;

pub use self::attributes::{AttributeValue, Attributes, synthesize_http_url};
pub use self::condition::{OverrideRule, SamplingOverrides};
pub use self::config::{
    AttributeCondition, ConfigError, DEFAULT_ADAPTATION_TIME_SECONDS, ItemKind, MatchType,
    SamplingConfig, SamplingOverride,
};
pub use self::evaluation::{
    INGESTION_BYPASS_PERCENTAGE, LiveMetrics, ParentContext, Sampler, SamplingDecision,
    SamplingResult,
};
pub use self::percentage::{
    RateLimitedPercentage, SamplingPercentage, is_significantly_rounded, round_down_to_nearest,
    round_to_nearest,
};
pub use self::registry::DelegatingSampler;
pub use self::score::sampling_score;

#[cfg(test)]
mod tests {
    use crate::config::{AttributeCondition, ItemKind, MatchType, SamplingOverride};

    pub(crate) fn strict(key: &str, value: &str) -> AttributeCondition {
        AttributeCondition {
            key: key.to_owned(),
            match_type: Some(MatchType::Strict),
            value: Some(value.to_owned()),
        }
    }

    pub(crate) fn regexp(key: &str, pattern: &str) -> AttributeCondition {
        AttributeCondition {
            key: key.to_owned(),
            match_type: Some(MatchType::Regexp),
            value: Some(pattern.to_owned()),
        }
    }

    pub(crate) fn key_only(key: &str) -> AttributeCondition {
        AttributeCondition {
            key: key.to_owned(),
            match_type: None,
            value: None,
        }
    }

    pub(crate) fn override_for_kind(
        kind: ItemKind,
        conditions: &[AttributeCondition],
        percentage: f64,
    ) -> SamplingOverride {
        SamplingOverride {
            item_kind: kind,
            attributes: conditions.to_vec(),
            percentage,
            include_standalone: false,
        }
    }

    pub(crate) fn override_for(
        conditions: &[AttributeCondition],
        percentage: f64,
    ) -> SamplingOverride {
        override_for_kind(ItemKind::Request, conditions, percentage)
    }
}
