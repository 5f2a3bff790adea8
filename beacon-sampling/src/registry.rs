//! Hot-swappable holder of the active sampler.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::attributes::Attributes;
use crate::config::ItemKind;
use crate::evaluation::{ParentContext, Sampler, SamplingResult};

/// Holds the sampler currently in effect.
///
/// Callers keep a reference to the registry for the lifetime of the process;
/// configuration reloads build a new [`Sampler`] and [`replace`] it in a
/// single pointer swap, so concurrent decisions either see the old sampler
/// or the new one, never a partially constructed one.
///
/// The registry is owned by the telemetry pipeline's composition root and
/// passed to call sites explicitly; there is no process-global instance, so
/// tests construct isolated registries freely.
///
/// Until the first [`replace`], the delegate drops every unit. A startup
/// race between instrumentation and configuration loading therefore
/// suppresses telemetry instead of flooding the backend.
///
/// [`replace`]: Self::replace
#[derive(Debug)]
pub struct DelegatingSampler {
    delegate: ArcSwap<Sampler>,
}

impl DelegatingSampler {
    /// Creates a registry whose delegate drops every unit.
    pub fn new() -> Self {
        Self::with_delegate(Sampler::drop_all())
    }

    /// Creates a registry with the given initial delegate.
    pub fn with_delegate(sampler: Sampler) -> Self {
        Self {
            delegate: ArcSwap::from_pointee(sampler),
        }
    }

    /// Atomically installs a new delegate.
    ///
    /// In-flight decisions finish on the sampler they already loaded.
    pub fn replace(&self, sampler: Sampler) {
        self.delegate.store(Arc::new(sampler));
    }

    /// Returns the currently installed delegate.
    pub fn current(&self) -> Arc<Sampler> {
        self.delegate.load_full()
    }

    /// Decides one unit using the currently installed delegate.
    pub fn should_sample(
        &self,
        trace_id: &str,
        parent: Option<&ParentContext>,
        kind: ItemKind,
        attributes: &Attributes,
    ) -> SamplingResult {
        self.delegate
            .load()
            .should_sample(trace_id, parent, kind, attributes)
    }
}

impl Default for DelegatingSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SamplingConfig;
    use crate::evaluation::SamplingDecision;

    use super::*;

    #[test]
    fn drops_until_configured() {
        let registry = DelegatingSampler::new();

        let result = registry.should_sample(
            "27272727272727272727272727272727",
            None,
            ItemKind::Request,
            &Attributes::new(),
        );
        assert_eq!(result.decision(), SamplingDecision::Drop);
    }

    #[test]
    fn replace_swaps_the_delegate() {
        let registry = DelegatingSampler::new();

        let config = SamplingConfig {
            percentage: Some(100.0),
            ..SamplingConfig::default()
        };
        registry.replace(Sampler::new(&config).unwrap());

        let result = registry.should_sample(
            "27272727272727272727272727272727",
            None,
            ItemKind::Request,
            &Attributes::new(),
        );
        assert_eq!(result.decision(), SamplingDecision::RecordAndSample);
    }

    #[test]
    fn decisions_race_safely_with_replace() {
        let registry = Arc::new(DelegatingSampler::new());

        std::thread::scope(|scope| {
            let decider = Arc::clone(&registry);
            scope.spawn(move || {
                for _ in 0..1000 {
                    let result = decider.should_sample(
                        "0af7651916cd43dd8448eb211c80319c",
                        None,
                        ItemKind::Dependency,
                        &Attributes::new(),
                    );
                    // Every observed delegate is self-consistent: either the
                    // drop-all default or the 100% replacement.
                    assert_ne!(result.decision(), SamplingDecision::RecordOnly);
                }
            });

            let replacer = Arc::clone(&registry);
            scope.spawn(move || {
                for _ in 0..100 {
                    let config = SamplingConfig {
                        percentage: Some(100.0),
                        ..SamplingConfig::default()
                    };
                    replacer.replace(Sampler::new(&config).unwrap());
                }
            });
        });

        assert!(
            registry
                .current()
                .should_sample(
                    "0af7651916cd43dd8448eb211c80319c",
                    None,
                    ItemKind::Request,
                    &Attributes::new(),
                )
                .is_sampled()
        );
    }
}
