//! Deterministic scoring of trace identifiers.
//!
//! Every process observing the same trace must reach the same keep/drop
//! verdict without coordination, including legacy clients that implement the
//! same hash independently. The score is therefore a pure function of the
//! trace id; two processes with different default percentages still agree on
//! the ordering of traces.

/// Returns the sampling score for a trace id, in `[0, 100)`.
///
/// The score is deterministic for any non-empty id: the same id yields the
/// same score in every process. A unit is kept by a percentage `p` exactly
/// when its score is below `p`.
///
/// An empty id has no stable identity to hash, so it draws a uniformly
/// random score instead. This is the only non-deterministic path and applies
/// only to synthetic standalone items.
pub fn sampling_score(trace_id: &str) -> f64 {
    if trace_id.is_empty() {
        return rand::random::<f64>() * 100.0;
    }
    f64::from(sampling_hash(trace_id)) / f64::from(i32::MAX) * 100.0
}

fn sampling_hash(trace_id: &str) -> i32 {
    let mut units: Vec<u16> = trace_id.encode_utf16().collect();
    // Tile short ids by doubling rather than padding, so their unit
    // distribution carries through to the hash.
    while units.len() < 8 {
        units.extend_from_within(..);
    }

    let mut hash: i32 = 5381;
    for &unit in &units {
        hash = (hash << 5).wrapping_add(hash).wrapping_add(i32::from(unit));
    }

    // `abs(i32::MIN)` overflows, and a magnitude of `i32::MAX` would map to a
    // score of exactly 100, which must stay out of range.
    match hash {
        i32::MIN => i32::MAX - 1,
        hash => hash.abs().min(i32::MAX - 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Changing this algorithm changes which traces are kept across the
    /// entire fleet, including clients hashing independently.
    #[test]
    fn known_scores() {
        let score = sampling_score("27272727272727272727272727272727");
        assert!((score - 0.668_353_820_530_862_5).abs() < 1e-9);

        let score = sampling_score("0af7651916cd43dd8448eb211c80319c");
        assert!((score - 52.788_928_036_014_05).abs() < 1e-9);
    }

    #[test]
    fn repeatable() {
        for trace_id in ["4bf92f3577b34da6a3ce929d0e0e4736", "123", "a"] {
            assert_eq!(sampling_score(trace_id), sampling_score(trace_id));
        }
    }

    #[test]
    fn in_range() {
        for seed in 0..500u32 {
            let trace_id = format!("{seed:032x}");
            let score = sampling_score(&trace_id);
            assert!((0.0..100.0).contains(&score), "{trace_id} scored {score}");
        }
    }

    #[test]
    fn short_ids_are_tiled() {
        // Tiling doubles "abc" to 12 units; hashing the tiled id directly
        // must give the same score.
        assert_eq!(sampling_score("abc"), sampling_score("abcabcabcabc"));
    }

    #[test]
    fn empty_id_draws_randomly() {
        for _ in 0..100 {
            let score = sampling_score("");
            assert!((0.0..100.0).contains(&score));
        }
    }
}
