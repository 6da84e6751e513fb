// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use crate::metric::{CanonicalMetric, Encoder, SeriesKey};
use log::debug;
use std::{collections::BTreeMap, sync};

type Partition = sync::Arc<BTreeMap<SeriesKey, CanonicalMetric>>;

/// Current value of every series, partitioned by writer.
///
/// Updates build a new partition and swap it in, so readers always see whole
/// cycles.  The merge happens under the write lock because a partition may
/// have more than one writer (a skipped tick and the poll it skipped).
#[derive(Default)]
pub struct Registry {
    partitions: sync::RwLock<BTreeMap<String, Partition>>,
}

/// Immutable view of the registry at one instant.
pub struct Snapshot {
    partitions: Vec<Partition>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the given series of a partition.  Series the writer did not
    /// produce this time keep their previous value.
    pub fn update(&self, partition: &str, metrics: Vec<CanonicalMetric>) {
        if metrics.is_empty() {
            return;
        }

        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(sync::PoisonError::into_inner);

        let mut series = partitions
            .get(partition)
            .map(|old| (**old).clone())
            .unwrap_or_default();
        for metric in metrics {
            series.insert(metric.key(), metric);
        }
        partitions.insert(partition.to_string(), sync::Arc::new(series));
    }

    pub fn snapshot(&self) -> Snapshot {
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(sync::PoisonError::into_inner);
        Snapshot {
            partitions: partitions.values().cloned().collect(),
        }
    }

    /// Renders the current snapshot in the text exposition format.
    pub fn render(&self, timestamps: bool) -> String {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            debug!("no series collected yet");
        }
        snapshot.encode(timestamps)
    }
}

impl Snapshot {
    /// All series sorted by name, then labels.
    pub fn metrics(&self) -> Vec<&CanonicalMetric> {
        let mut all: Vec<_> = self
            .partitions
            .iter()
            .flat_map(|partition| partition.iter())
            .collect();
        all.sort_by(|(a, _), (b, _)| a.cmp(b));
        all.into_iter().map(|(_, metric)| metric).collect()
    }

    #[cfg(test)]
    pub fn get(&self, name: &str, labels: &[(&str, &str)]) -> Option<&CanonicalMetric> {
        self.metrics().into_iter().find(|metric| {
            metric.desc.full_name() == name
                && labels
                    .iter()
                    .all(|(key, val)| metric.label(key) == Some(*val))
        })
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(|partition| partition.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn encode(&self, timestamps: bool) -> String {
        let mut encoder = Encoder::new(timestamps);
        for metric in self.metrics() {
            encoder.write(metric);
        }
        encoder.into_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, LABEL_INTERFACE, LABEL_SOURCE};
    use crate::metric::Desc;
    use std::{thread, time};

    fn metric(desc: &'static Desc, iface: &str, value: f64) -> CanonicalMetric {
        let labels = [
            (LABEL_INTERFACE, iface.to_string()),
            (LABEL_SOURCE, desc.namespace.to_string()),
        ];
        CanonicalMetric {
            desc,
            labels: labels.into_iter().collect(),
            value,
            sample_time: time::SystemTime::now(),
        }
    }

    fn serdes(text: &str) -> CanonicalMetric {
        let mut metric = metric(&catalog::ZARAM_PON_SERDES_TEXT, "sfp-sfpplus1", 1.0);
        metric.labels.insert("state", text.to_string());
        metric
    }

    #[test]
    fn updates_merge_per_partition() {
        let registry = Registry::new();
        registry.update(
            "routeros",
            vec![
                metric(&catalog::ROUTEROS_SFP_RX_POWER, "sfp-sfpplus1", -9.5),
                metric(&catalog::ROUTEROS_LINK_STATUS, "pppoe-wan", 1.0),
            ],
        );
        registry.update(
            "zaram_ont",
            vec![metric(&catalog::ZARAM_SFP_RX_POWER, "sfp-sfpplus1", -9.6)],
        );

        // second cycle only produced the SFP reading
        registry.update(
            "routeros",
            vec![metric(&catalog::ROUTEROS_SFP_RX_POWER, "sfp-sfpplus1", -9.4)],
        );

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 3);
        let rx = snap.get("routeros_sfp_rx_power_dbm", &[]).unwrap();
        assert_eq!(rx.value, -9.4);
        let link = snap
            .get("routeros_interface_link_status", &[(LABEL_INTERFACE, "pppoe-wan")])
            .unwrap();
        assert_eq!(link.value, 1.0);
        assert_eq!(snap.get("zaram_ont_sfp_rx_power_dbm", &[]).unwrap().value, -9.6);
    }

    #[test]
    fn info_series_replace_their_label() {
        let registry = Registry::new();
        registry.update("zaram_ont", vec![serdes("Very good")]);
        registry.update("zaram_ont", vec![serdes("Bad")]);

        let text = registry.render(false);
        assert!(text.contains("state=\"Bad\""));
        assert!(!text.contains("Very good"));
    }

    #[test]
    fn render_groups_families_across_partitions() {
        let registry = Registry::new();
        registry.update("b", vec![metric(&catalog::ROUTEROS_SFP_RX_POWER, "sfp2", -3.0)]);
        registry.update("a", vec![metric(&catalog::ROUTEROS_SFP_RX_POWER, "sfp1", -2.0)]);
        registry.update("c", vec![metric(&catalog::ROUTEROS_SFP_TX_POWER, "sfp1", 1.0)]);

        let text = registry.render(false);
        assert_eq!(text.matches("# TYPE routeros_sfp_rx_power_dbm gauge").count(), 1);
        let first = text.find("interface_name=\"sfp1\"").unwrap();
        let second = text.find("interface_name=\"sfp2\"").unwrap();
        assert!(first < second);
    }

    #[test]
    fn snapshots_are_never_torn() {
        let registry = Registry::new();
        let cycle = |value: f64| {
            (0..16)
                .map(|i| metric(&catalog::ROUTEROS_SFP_RX_POWER, &format!("sfp{i}"), value))
                .collect::<Vec<_>>()
        };
        registry.update("routeros", cycle(0.0));

        let held = registry.snapshot();
        thread::scope(|scope| {
            scope.spawn(|| {
                for n in 1..200 {
                    registry.update("routeros", cycle(n as f64));
                }
            });
            scope.spawn(|| {
                for _ in 0..200 {
                    let snap = registry.snapshot();
                    let values: Vec<_> = snap.metrics().iter().map(|m| m.value).collect();
                    assert_eq!(values.len(), 16);
                    assert!(values.iter().all(|v| *v == values[0]));
                }
            });
        });

        // an earlier snapshot is unaffected by later cycles
        assert!(held.metrics().iter().all(|m| m.value == 0.0));
        assert_eq!(registry.snapshot().metrics()[0].value, 199.0);
    }

    #[test]
    fn concurrent_writers_to_one_partition_lose_nothing() {
        let registry = Registry::new();
        let writer = |prefix: &'static str| {
            let registry = &registry;
            move || {
                for i in 0..200 {
                    let iface = format!("{prefix}{i}");
                    let update = metric(&catalog::COLLECTION_SKIPPED, &iface, i as f64);
                    registry.update("zaram_ont/collector", vec![update]);
                }
            }
        };

        thread::scope(|scope| {
            scope.spawn(writer("skip"));
            scope.spawn(writer("poll"));
        });

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 400);
        assert_eq!(
            snap.get("sfp_monitor_collection_skipped_total", &[(LABEL_INTERFACE, "skip199")])
                .unwrap()
                .value,
            199.0
        );
        assert!(snap
            .get("sfp_monitor_collection_skipped_total", &[(LABEL_INTERFACE, "poll0")])
            .is_some());
    }
}
