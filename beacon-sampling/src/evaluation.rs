//! Evaluation of sampling decisions.
//!
//! [`Sampler::should_sample`] is called on the hot path of every traced
//! operation. It is fully synchronous and total over well-formed input:
//! configuration problems are rejected when the sampler is built, so no
//! decision can fail at runtime.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;

use crate::attributes::{Attributes, SAMPLE_RATE};
use crate::condition::{OverrideRule, SamplingOverrides};
use crate::config::{ConfigError, ItemKind, SamplingConfig};
use crate::percentage::SamplingPercentage;
use crate::score::sampling_score;

/// The rate reported for units sampled at 100%.
///
/// The ingestion backend re-samples items whose reported rate is 100;
/// reporting 99.99 instead bypasses that second sampling step while the
/// per-item count still rounds to one.
pub const INGESTION_BYPASS_PERCENTAGE: f64 = 99.99;

const RESULT_CACHE_CAPACITY: usize = 100;

/// The verdict for a single telemetry unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SamplingDecision {
    /// The unit is neither recorded nor exported.
    Drop,
    /// The unit is recorded for live consumers but not exported.
    RecordOnly,
    /// The unit is recorded and exported.
    RecordAndSample,
}

/// A sampling decision together with the data attached to kept units.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingResult {
    decision: SamplingDecision,
    sample_rate: Option<f64>,
    attributes: Option<Arc<Attributes>>,
}

impl SamplingResult {
    fn not_recorded() -> Self {
        Self {
            decision: SamplingDecision::Drop,
            sample_rate: None,
            attributes: None,
        }
    }

    fn record_only() -> Self {
        Self {
            decision: SamplingDecision::RecordOnly,
            sample_rate: None,
            attributes: None,
        }
    }

    fn sampled(rate: f64) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(SAMPLE_RATE, rate);
        Self {
            decision: SamplingDecision::RecordAndSample,
            sample_rate: Some(rate),
            attributes: Some(Arc::new(attributes)),
        }
    }

    /// The verdict for the unit.
    pub fn decision(&self) -> SamplingDecision {
        self.decision
    }

    /// The effective percentage of a kept unit.
    ///
    /// Propagation writes this into the outgoing trace state, where remote
    /// children read it as their parent rate, and aggregation multiplies
    /// counts by `100 / rate`.
    pub fn sample_rate(&self) -> Option<f64> {
        self.sample_rate
    }

    /// Attributes to attach to a kept unit, carrying
    /// [`SAMPLE_RATE`](crate::attributes::SAMPLE_RATE).
    pub fn attributes(&self) -> Option<&Attributes> {
        self.attributes.as_deref()
    }

    /// Returns `true` if the unit is exported.
    pub fn is_sampled(&self) -> bool {
        self.decision == SamplingDecision::RecordAndSample
    }
}

/// Sampling state of the parent span, captured at the call site.
///
/// The engine does not own trace context; callers pass the relevant facts
/// per call. A unit without a valid parent passes `None` instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParentContext {
    /// `true` if the parent was created by another process.
    pub is_remote: bool,
    /// The parent's own sampling verdict.
    pub is_sampled: bool,
    /// The effective rate recorded on the parent, if known.
    pub sample_rate: Option<f64>,
}

/// Switch that turns dropped units into record-only units.
///
/// When a live-metrics consumer is attached, units dropped for ingestion are
/// still recorded so they can feed the real-time dashboard. The handle is
/// shared with the consumer, which flips it as it connects and disconnects.
#[derive(Clone, Debug, Default)]
pub struct LiveMetrics(Arc<AtomicBool>);

impl LiveMetrics {
    /// Creates a disabled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables recording of dropped units.
    pub fn set_enabled(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    /// Returns `true` if dropped units are currently recorded.
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Bounded cache of kept results, keyed by the exact rate.
///
/// The attribute payload of a kept result is immutable and reused extremely
/// frequently, so results are shared per distinct rate. Purely an
/// optimization: a full cache computes further rates uncached.
#[derive(Debug)]
struct ResultCache {
    results: ArcSwap<HashMap<u64, SamplingResult>>,
}

impl ResultCache {
    fn new() -> Self {
        Self {
            results: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    fn get(&self, rate: f64) -> SamplingResult {
        let key = rate.to_bits();
        let current = self.results.load();
        if let Some(result) = current.get(&key) {
            return result.clone();
        }

        let result = SamplingResult::sampled(rate);
        if current.len() < RESULT_CACHE_CAPACITY {
            self.results.rcu(|cache| {
                let mut cache = HashMap::clone(cache);
                if cache.len() < RESULT_CACHE_CAPACITY {
                    cache.insert(key, result.clone());
                }
                cache
            });
        }
        result
    }
}

/// The sampling decision core.
///
/// A sampler is built from one configuration and is immutable afterwards;
/// configuration reloads build a new sampler and install it through the
/// [`DelegatingSampler`](crate::DelegatingSampler), so in-flight decisions
/// never observe a half-updated rule set.
#[derive(Debug)]
pub struct Sampler {
    request_overrides: SamplingOverrides,
    dependency_overrides: SamplingOverrides,
    percentage: SamplingPercentage,
    live_metrics: LiveMetrics,
    kept_results: ResultCache,
}

impl Sampler {
    /// Builds a sampler from configuration.
    ///
    /// Fails on the first invalid rule or mode so that a broken
    /// configuration can never be installed.
    pub fn new(config: &SamplingConfig) -> Result<Self, ConfigError> {
        Self::with_live_metrics(config, LiveMetrics::new())
    }

    /// Builds a sampler sharing the given live-metrics handle.
    pub fn with_live_metrics(
        config: &SamplingConfig,
        live_metrics: LiveMetrics,
    ) -> Result<Self, ConfigError> {
        let percentage = match (config.percentage, config.items_per_second) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingModes),
            (Some(percentage), None) => {
                if !(0.0..=100.0).contains(&percentage) {
                    return Err(ConfigError::PercentageOutOfRange(percentage));
                }
                SamplingPercentage::fixed(percentage)
            }
            (None, Some(limit)) => {
                if limit < 0.0 {
                    return Err(ConfigError::NegativeItemLimit(limit));
                }
                if config.adaptation_time_seconds < 0.0 {
                    return Err(ConfigError::NegativeAdaptationTime(
                        config.adaptation_time_seconds,
                    ));
                }
                SamplingPercentage::rate_limited(limit, config.adaptation_time_seconds)
            }
            (None, None) => SamplingPercentage::fixed(100.0),
        };

        let request_overrides: Vec<_> = config
            .overrides
            .iter()
            .filter(|o| o.item_kind == ItemKind::Request)
            .cloned()
            .collect();
        let dependency_overrides: Vec<_> = config
            .overrides
            .iter()
            .filter(|o| o.item_kind == ItemKind::Dependency)
            .cloned()
            .collect();

        Ok(Self {
            request_overrides: SamplingOverrides::new(&request_overrides)?,
            dependency_overrides: SamplingOverrides::new(&dependency_overrides)?,
            percentage,
            live_metrics,
            kept_results: ResultCache::new(),
        })
    }

    /// A sampler that drops every unit.
    ///
    /// This is the safe default installed before any configuration is
    /// loaded, so a startup race can never produce uncontrolled telemetry
    /// volume.
    pub fn drop_all() -> Self {
        Self {
            request_overrides: SamplingOverrides::default(),
            dependency_overrides: SamplingOverrides::default(),
            percentage: SamplingPercentage::fixed(0.0),
            live_metrics: LiveMetrics::new(),
            kept_results: ResultCache::new(),
        }
    }

    /// The live-metrics handle shared with the real-time consumer.
    pub fn live_metrics(&self) -> &LiveMetrics {
        &self.live_metrics
    }

    /// Decides whether to keep one telemetry unit.
    ///
    /// `kind` is the caller's classification of the unit; `parent` is the
    /// sampling state of its parent span, or `None` for a root unit. The
    /// decision is deterministic per trace id, so every process observing
    /// the same trace keeps or drops it consistently.
    pub fn should_sample(
        &self,
        trace_id: &str,
        parent: Option<&ParentContext>,
        kind: ItemKind,
        attributes: &Attributes,
    ) -> SamplingResult {
        let percentage = self
            .overrides(kind)
            .get_override(attributes)
            .map(OverrideRule::percentage)
            .unwrap_or_else(|| self.percentage.get());

        if let Some(result) = self.local_parent_result(parent, percentage) {
            return result;
        }

        self.apply_percentage(trace_id, percentage)
    }

    /// Returns the override percentage for a unit, if any rule matches.
    ///
    /// Used by the log-record export path, which applies the percentage
    /// itself against the score of the record's trace.
    pub fn override_percentage(
        &self,
        kind: ItemKind,
        standalone: bool,
        attributes: &Attributes,
    ) -> Option<f64> {
        self.overrides(kind)
            .get_override_percentage(standalone, attributes)
    }

    fn overrides(&self, kind: ItemKind) -> &SamplingOverrides {
        match kind {
            ItemKind::Request => &self.request_overrides,
            ItemKind::Dependency => &self.dependency_overrides,
        }
    }

    /// Keeps the decision consistent with a parent from the same process.
    ///
    /// Remote parents are excluded: their rate metadata is not reliably
    /// propagated across process boundaries.
    fn local_parent_result(
        &self,
        parent: Option<&ParentContext>,
        percentage: f64,
    ) -> Option<SamplingResult> {
        let parent = parent?;
        if parent.is_remote {
            return None;
        }

        if !parent.is_sampled {
            // Only an unconstrained percentage may override an unsampled
            // parent; everything else propagates the parent's decision.
            if percentage < 100.0 {
                return Some(SamplingResult::not_recorded());
            }
            return None;
        }

        let parent_rate = parent.sample_rate?;
        if percentage < parent_rate || percentage == 100.0 {
            return None;
        }

        // Keeping this unit at a higher effective rate than its ancestor
        // would under-count the parent's subtree.
        Some(self.kept_results.get(parent_rate))
    }

    fn apply_percentage(&self, trace_id: &str, percentage: f64) -> SamplingResult {
        // Degenerate percentages skip the score entirely.
        if percentage <= 0.0 {
            return self.not_sampled();
        }
        if percentage >= 100.0 {
            return self.kept_results.get(INGESTION_BYPASS_PERCENTAGE);
        }

        let score = sampling_score(trace_id);
        if score >= percentage {
            beacon_log::trace!(score, percentage, "unit sampled out");
            self.not_sampled()
        } else {
            self.kept_results.get(percentage)
        }
    }

    fn not_sampled(&self) -> SamplingResult {
        if self.live_metrics.is_enabled() {
            SamplingResult::record_only()
        } else {
            SamplingResult::not_recorded()
        }
    }
}
