// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use crate::catalog::{LABEL_INTERFACE, LABEL_METRIC_TYPE, LABEL_SOURCE};
use crate::metric::{CanonicalMetric, Labels, SeriesKey};
use log::{info, warn};
use std::collections::{HashMap, hash_map::Entry};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StalenessRecord {
    pub last: f64,
    /// Consecutive cycles that repeated `last` bit for bit.
    pub unchanged: u32,
    pub stale: bool,
}

/// Flags series whose readings stop jittering.
///
/// Live optical sensors never report the exact same value twice in a row for
/// long, so a value that recurs bit-identically for `threshold` consecutive
/// cycles is treated as a frozen reading.  Only series whose description
/// links a `*_data_stale` family are tracked.
pub struct StalenessTracker {
    threshold: u32,
    records: HashMap<SeriesKey, StalenessRecord>,
}

impl StalenessTracker {
    pub fn new(threshold: u32) -> Self {
        StalenessTracker {
            threshold: threshold.max(2),
            records: HashMap::new(),
        }
    }

    pub fn record(&self, key: &SeriesKey) -> Option<&StalenessRecord> {
        self.records.get(key)
    }

    fn advance(&mut self, key: SeriesKey, value: f64) -> bool {
        let record = match self.records.entry(key) {
            Entry::Vacant(entry) => entry.insert(StalenessRecord {
                last: value,
                unchanged: 0,
                stale: false,
            }),
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                if record.last.to_bits() == value.to_bits() {
                    record.unchanged = record.unchanged.saturating_add(1);
                } else {
                    record.last = value;
                    record.unchanged = 0;
                }
                record
            }
        };

        // the first sighting counts as one of the identical cycles
        record.stale = record.unchanged + 1 >= self.threshold;
        record.stale
    }

    /// Feeds one cycle of a source's metrics and returns the companion
    /// staleness series.  Series missing from `metrics` are left untouched.
    pub fn observe(&mut self, metrics: &[CanonicalMetric]) -> Vec<CanonicalMetric> {
        let mut flags = Vec::new();

        for metric in metrics {
            let Some(stale_desc) = metric.desc.staleness else {
                continue;
            };

            let key = metric.key();
            let was_stale = self.record(&key).is_some_and(|rec| rec.stale);
            let stale = self.advance(key.clone(), metric.value);
            match (was_stale, stale) {
                (false, true) => warn!(
                    "{} {:?} has not changed for {} cycles",
                    key.name, key.labels, self.threshold
                ),
                (true, false) => info!("{} is live again", key.name),
                _ => (),
            }

            let mut labels = Labels::new();
            for label in [LABEL_INTERFACE, LABEL_SOURCE] {
                if let Some(val) = metric.label(label) {
                    labels.insert(label, val.to_string());
                }
            }
            labels.insert(LABEL_METRIC_TYPE, metric.desc.name.to_string());

            flags.push(CanonicalMetric {
                desc: stale_desc,
                labels,
                value: if stale { 1.0 } else { 0.0 },
                sample_time: metric.sample_time,
            });
        }

        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use std::time;

    fn rx(desc: &'static crate::metric::Desc, value: f64) -> CanonicalMetric {
        let labels = [
            (LABEL_INTERFACE, "sfp-sfpplus1".to_string()),
            (LABEL_SOURCE, desc.namespace.to_string()),
        ];
        CanonicalMetric {
            desc,
            labels: labels.into_iter().collect(),
            value,
            sample_time: time::SystemTime::now(),
        }
    }

    fn flag(tracker: &mut StalenessTracker, metric: CanonicalMetric) -> f64 {
        let flags = tracker.observe(&[metric]);
        assert_eq!(flags.len(), 1);
        flags[0].value
    }

    #[test]
    fn stale_on_third_identical_cycle() {
        let mut tracker = StalenessTracker::new(3);
        let desc = &catalog::ROUTEROS_SFP_RX_POWER;

        assert_eq!(flag(&mut tracker, rx(desc, -9.5)), 0.0);
        assert_eq!(flag(&mut tracker, rx(desc, -9.5)), 0.0);
        assert_eq!(flag(&mut tracker, rx(desc, -9.5)), 1.0);
        assert_eq!(flag(&mut tracker, rx(desc, -9.5)), 1.0);

        // the smallest representable change clears it
        let next = f64::from_bits((-9.5f64).to_bits() + 1);
        assert_eq!(flag(&mut tracker, rx(desc, next)), 0.0);
        let rec = tracker.record(&rx(desc, next).key()).unwrap();
        assert_eq!(rec.unchanged, 0);
        assert!(!rec.stale);
    }

    #[test]
    fn companion_series_labels() {
        let mut tracker = StalenessTracker::new(3);
        let flags = tracker.observe(&[rx(&catalog::ZARAM_SFP_RX_POWER, -18.7)]);

        let stale = &flags[0];
        assert_eq!(stale.desc.full_name(), "zaram_ont_sfp_data_stale");
        assert_eq!(stale.label(LABEL_METRIC_TYPE), Some("rx_power"));
        assert_eq!(stale.label(LABEL_SOURCE), Some("zaram_ont"));
        assert_eq!(stale.label(LABEL_INTERFACE), Some("sfp-sfpplus1"));
    }

    #[test]
    fn absent_samples_neither_advance_nor_reset() {
        let mut tracker = StalenessTracker::new(3);
        let desc = &catalog::ROUTEROS_SFP_RX_POWER;

        flag(&mut tracker, rx(desc, -9.5));
        flag(&mut tracker, rx(desc, -9.5));
        // failed cycles
        assert!(tracker.observe(&[]).is_empty());
        assert!(tracker.observe(&[]).is_empty());
        assert_eq!(tracker.record(&rx(desc, 0.0).key()).unwrap().unchanged, 1);

        assert_eq!(flag(&mut tracker, rx(desc, -9.5)), 1.0);
    }

    #[test]
    fn vantage_points_are_tracked_independently() {
        let mut tracker = StalenessTracker::new(3);
        let router = &catalog::ROUTEROS_SFP_RX_POWER;
        let ont = &catalog::ZARAM_SFP_RX_POWER;

        for cycle in 0..3 {
            let flags = tracker.observe(&[rx(router, -9.5), rx(ont, -9.6 - cycle as f64 * 0.001)]);
            assert_eq!(flags.len(), 2);
            assert_eq!(flags[0].value, if cycle == 2 { 1.0 } else { 0.0 });
            assert_eq!(flags[1].value, 0.0);
        }
    }

    #[test]
    fn untracked_series_are_ignored() {
        let mut tracker = StalenessTracker::new(2);
        let temp = rx(&catalog::ROUTEROS_SFP_TEMPERATURE, 41.0);
        for _ in 0..5 {
            assert!(tracker.observe(&[temp.clone()]).is_empty());
        }
        assert!(tracker.record(&temp.key()).is_none());
    }
}
