//! Aggregation of per-stage counters.

use crate::stages::{Counters, StageResult};

/// Combines stage counters under the configured statistics policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsAggregator;

impl StatsAggregator {
    /// Field-wise sum of all counters, with discard causes concatenated in
    /// the order the results are given. The payload is left empty.
    #[must_use]
    pub fn sum_all<'a, I>(results: I) -> StageResult
    where
        I: IntoIterator<Item = &'a StageResult>,
    {
        let mut total = StageResult::default();
        for result in results {
            total.counters = total.counters + result.counters;
            total.discard_causes.extend(result.discard_causes.iter().cloned());
        }
        total
    }

    /// Copies `read`, `insert`, `update` and `total` from `source` into
    /// `dest`. `discard` and the discard causes of `dest` are kept.
    pub fn copy_selected(source: &StageResult, dest: &mut StageResult) {
        dest.counters = Counters {
            read: source.counters.read,
            insert: source.counters.insert,
            update: source.counters.update,
            discard: dest.counters.discard,
            total: source.counters.total,
        };
    }
}
