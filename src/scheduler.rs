// Copyright 2025 Google LLC
// SPDX-License-Identifier: MIT

use crate::catalog::{self, LABEL_COLLECTOR, LABEL_ERROR};
use crate::metric::{CanonicalMetric, Desc, Labels};
use crate::normalize;
use crate::registry::Registry;
use crate::source::{Adapter, DeviceSource, SourceError};
use crate::staleness::StalenessTracker;
use log::{debug, info, warn};
use std::{collections::BTreeMap, fmt, sync, time};
use tokio::sync::Mutex;

#[derive(Debug)]
pub enum Outcome {
    Success,
    /// Some commands or fields failed; the rest was stored.
    Partial(Vec<SourceError>),
    Failure(SourceError),
    /// The previous poll of this source was still running.
    Skipped,
}

impl Outcome {
    fn errors(&self) -> Vec<&SourceError> {
        match self {
            Outcome::Partial(errors) => errors.iter().collect(),
            Outcome::Failure(err) => vec![err],
            Outcome::Success | Outcome::Skipped => Vec::new(),
        }
    }

    fn stored(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::Partial(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::Partial(errors) => write!(f, "partial ({} errors)", errors.len()),
            Outcome::Failure(err) => write!(f, "failure ({}: {err})", err.kind()),
            Outcome::Skipped => f.write_str("skipped"),
        }
    }
}

/// One scheduler tick.  Logged, then dropped.
#[derive(Debug)]
pub struct PollCycle {
    pub start: time::SystemTime,
    pub outcomes: Vec<(&'static str, Outcome)>,
    pub duration: time::Duration,
}

impl PollCycle {
    #[cfg(test)]
    pub fn outcome(&self, source: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| *name == source)
            .map(|(_, outcome)| outcome)
    }
}

/// Everything only the poll holding the lock may touch.
struct Slot<A> {
    adapter: A,
    tracker: StalenessTracker,
    errors: BTreeMap<&'static str, u64>,
}

struct Task<A> {
    source: DeviceSource,
    slot: sync::Arc<Mutex<Slot<A>>>,
    skipped: sync::atomic::AtomicU64,
}

impl<A> Task<A> {
    fn health_partition(&self) -> String {
        format!("{}/collector", self.source.name())
    }

    fn health(&self, desc: &'static Desc, value: f64) -> CanonicalMetric {
        let mut labels = Labels::new();
        labels.insert(LABEL_COLLECTOR, self.source.name().to_string());
        CanonicalMetric {
            desc,
            labels,
            value,
            sample_time: time::SystemTime::now(),
        }
    }
}

/// Fans each tick out to every source, one poll at a time per source.
pub struct Scheduler<A> {
    interval: time::Duration,
    registry: sync::Arc<Registry>,
    tasks: Vec<sync::Arc<Task<A>>>,
}

type Collected = (Vec<CanonicalMetric>, Vec<SourceError>);

async fn collect<A: Adapter>(
    adapter: &mut A,
    source: &DeviceSource,
) -> Result<Collected, SourceError> {
    adapter.connect().await?;
    let fetch = adapter.fetch_all().await?;

    let (metrics, errors) = normalize::normalize_all(&fetch.samples, source);
    let mut failures = fetch.failures;
    failures.extend(errors);
    Ok((metrics, failures))
}

async fn poll<A: Adapter>(task: sync::Arc<Task<A>>, registry: sync::Arc<Registry>) -> Outcome {
    let name = task.source.name();

    let Ok(mut slot) = task.slot.clone().try_lock_owned() else {
        let skipped = task.skipped.fetch_add(1, sync::atomic::Ordering::Relaxed) + 1;
        warn!("{name}: previous poll still running, skipping this tick");
        let metric = task.health(&catalog::COLLECTION_SKIPPED, skipped as f64);
        registry.update(&task.health_partition(), vec![metric]);
        return Outcome::Skipped;
    };

    let started = tokio::time::Instant::now();
    let timeout = task.source.timeout;
    let collected = tokio::time::timeout(timeout, collect(&mut slot.adapter, &task.source)).await;
    let outcome = match collected {
        Err(_) => {
            slot.adapter.abort();
            Outcome::Failure(SourceError::Timeout(timeout))
        }
        Ok(Err(err)) => Outcome::Failure(err),
        Ok(Ok((mut metrics, failures))) => {
            let flags = slot.tracker.observe(&metrics);
            metrics.extend(flags);
            debug!("{name}: storing {} series", metrics.len());
            registry.update(name, metrics);

            if failures.is_empty() {
                Outcome::Success
            } else {
                Outcome::Partial(failures)
            }
        }
    };
    let elapsed = started.elapsed();

    for err in outcome.errors() {
        warn!("{name}: {} error: {err}", err.kind());
        *slot.errors.entry(err.kind()).or_default() += 1;
    }

    let mut health = vec![
        task.health(&catalog::COLLECTION_DURATION, elapsed.as_secs_f64()),
        task.health(
            &catalog::COLLECTION_SUCCESS,
            if outcome.stored() { 1.0 } else { 0.0 },
        ),
        task.health(
            &catalog::COLLECTION_SKIPPED,
            task.skipped.load(sync::atomic::Ordering::Relaxed) as f64,
        ),
    ];
    if outcome.stored() {
        let now = time::SystemTime::now()
            .duration_since(time::UNIX_EPOCH)
            .unwrap_or_default();
        health.push(task.health(&catalog::LAST_COLLECTION, now.as_secs_f64()));
    }
    for (kind, count) in &slot.errors {
        let mut metric = task.health(&catalog::COLLECTION_ERRORS, *count as f64);
        metric.labels.insert(LABEL_ERROR, kind.to_string());
        health.push(metric);
    }
    registry.update(&task.health_partition(), health);

    outcome
}

impl<A: Adapter> Scheduler<A> {
    pub fn new(
        registry: sync::Arc<Registry>,
        interval: time::Duration,
        stale_threshold: u32,
        sources: Vec<(DeviceSource, A)>,
    ) -> Self {
        let tasks = sources
            .into_iter()
            .map(|(source, adapter)| {
                sync::Arc::new(Task {
                    source,
                    slot: sync::Arc::new(Mutex::new(Slot {
                        adapter,
                        tracker: StalenessTracker::new(stale_threshold),
                        errors: BTreeMap::new(),
                    })),
                    skipped: sync::atomic::AtomicU64::new(0),
                })
            })
            .collect();

        Scheduler {
            interval,
            registry,
            tasks,
        }
    }

    /// Starts one cycle.  The cycle finishes when the slowest source does,
    /// which is bounded by that source's timeout.
    pub fn start_cycle(&self) -> tokio::task::JoinHandle<PollCycle> {
        let polls: Vec<_> = self
            .tasks
            .iter()
            .map(|task| {
                let name = task.source.name();
                let handle = tokio::spawn(poll(task.clone(), self.registry.clone()));
                (name, handle)
            })
            .collect();

        tokio::spawn(async move {
            let start = time::SystemTime::now();
            let started = tokio::time::Instant::now();

            let mut outcomes = Vec::with_capacity(polls.len());
            for (name, handle) in polls {
                let outcome = handle.await.unwrap_or_else(|err| {
                    Outcome::Failure(SourceError::Connect(format!("poll task failed: {err}")))
                });
                outcomes.push((name, outcome));
            }

            let cycle = PollCycle {
                start,
                outcomes,
                duration: started.elapsed(),
            };
            let summary: Vec<_> = cycle
                .outcomes
                .iter()
                .map(|(name, outcome)| format!("{name}={outcome}"))
                .collect();
            let at = cycle
                .start
                .duration_since(time::UNIX_EPOCH)
                .map(|dur| dur.as_secs())
                .unwrap_or_default();
            info!(
                "poll cycle at {at} took {:?}: {}",
                cycle.duration,
                summary.join(", ")
            );

            cycle
        })
    }

    /// Ticks forever.  Cycles run detached so a slow source never delays the
    /// tick; it only makes its own next poll skip.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.start_cycle();
        }
    }

    /// Waits for in-flight polls, then closes every session.
    pub async fn shutdown(&self) {
        for task in &self.tasks {
            let mut slot = task.slot.lock().await;
            debug!("{}: closing session", task.source.name());
            slot.adapter.close().await;
        }
    }
}
