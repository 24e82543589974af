//! Sampling scheduler: drives libmetrics callbacks on configured per-group
//! cadences and hands encoded bytes to the egress fan-out.

use std::time::{Duration, Instant};

use crate::config::CollectionGroupConfig;
use crate::libmetrics::{self, Callback};
use crate::message::{MetricId, MetricMessage};

/// One resolved metric within a collection group: its registered catalog id
/// and the libmetrics callback that samples it.
struct ResolvedMetric {
    id: MetricId,
    callback: Callback,
    name: &'static str,
}

/// One collection group with its cadence tracked against the wall clock.
struct Group {
    interval: Duration,
    last_fired: Option<Instant>,
    metrics: Vec<ResolvedMetric>,
}

/// Degenerate cadence used when no collection groups are configured at all
/// — the loop degenerates to pure ingest.
const NO_GROUPS_INTERVAL: Duration = Duration::from_secs(3600);

pub struct Scheduler {
    groups: Vec<Group>,
}

impl Scheduler {
    /// Resolve every configured group's metric names against the libmetrics
    /// catalog+registry. A name that doesn't resolve to both a catalog entry
    /// and a registered callback is dropped with a warning — it can never
    /// fire, but that's not startup-fatal (only bind/ACL/config shape errors
    /// are).
    pub fn new(groups: &[CollectionGroupConfig]) -> Self {
        let resolved = groups
            .iter()
            .map(|g| {
                let metrics = g
                    .metric
                    .iter()
                    .filter_map(|name| {
                        let entry = crate::catalog::lookup_by_name(name);
                        let callback = libmetrics::lookup(name);
                        match (entry, callback) {
                            (Some(entry), Some(callback)) => {
                                Some(ResolvedMetric { id: entry.id, callback, name: entry.name })
                            }
                            _ => {
                                tracing::warn!(metric = %name, group = %g.name, "unresolvable metric name, skipping");
                                None
                            }
                        }
                    })
                    .collect();
                Group { interval: Duration::from_secs(g.interval_seconds.max(1)), last_fired: None, metrics }
            })
            .collect();
        Self { groups: resolved }
    }

    /// One scheduler tick. `emit` is called once per due metric with
    /// its encoded wire bytes; the runtime core wires this to
    /// `crate::egress::broadcast`. Returns the number of seconds until the
    /// earliest next-due group.
    pub fn tick(&mut self, now: Instant, mut emit: impl FnMut(&[u8])) -> u64 {
        if self.groups.is_empty() {
            return NO_GROUPS_INTERVAL.as_secs();
        }

        let mut next_due = NO_GROUPS_INTERVAL;

        for group in &mut self.groups {
            let due = group.last_fired.map(|t| now.duration_since(t) >= group.interval).unwrap_or(true);
            if due {
                for metric in &group.metrics {
                    match (metric.callback)() {
                        Some(value) => {
                            let message = MetricMessage::new(metric.id, value);
                            match crate::codec::encode(&message) {
                                Ok(bytes) => emit(&bytes),
                                Err(e) => tracing::debug!(metric = %metric.name, error = %e, "failed to encode sample"),
                            }
                        }
                        None => tracing::debug!(metric = %metric.name, "sampling callback returned no value"),
                    }
                }
                group.last_fired = Some(now);
            }

            let remaining = group
                .last_fired
                .map(|t| group.interval.saturating_sub(now.duration_since(t)))
                .unwrap_or(Duration::ZERO);
            next_due = next_due.min(remaining.max(Duration::from_secs(1)));
        }

        next_due.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, interval: u64, metrics: &[&str]) -> CollectionGroupConfig {
        CollectionGroupConfig {
            name: name.to_string(),
            interval_seconds: interval,
            metric: metrics.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn no_groups_degenerates_to_long_interval() {
        let mut scheduler = Scheduler::new(&[]);
        let mut emitted = 0;
        let next = scheduler.tick(Instant::now(), |_| emitted += 1);
        assert_eq!(emitted, 0);
        assert_eq!(next, NO_GROUPS_INTERVAL.as_secs());
    }

    #[test]
    fn unresolvable_metric_names_are_skipped_not_fatal() {
        let scheduler = Scheduler::new(&[group("g", 10, &["not_a_real_metric", "cpu_user"])]);
        assert_eq!(scheduler.groups[0].metrics.len(), 1);
    }

    #[test]
    fn first_tick_always_fires_every_group() {
        let mut scheduler = Scheduler::new(&[group("g", 20, &["cpu_user"])]);
        let mut emitted = 0;
        scheduler.tick(Instant::now(), |_| emitted += 1);
        assert_eq!(emitted, 1);
    }

    #[test]
    fn second_tick_within_interval_does_not_refire() {
        let mut scheduler = Scheduler::new(&[group("g", 20, &["cpu_user"])]);
        let t0 = Instant::now();
        let mut emitted = 0;
        scheduler.tick(t0, |_| emitted += 1);
        scheduler.tick(t0 + Duration::from_secs(1), |_| emitted += 1);
        assert_eq!(emitted, 1);
    }

    #[test]
    fn tick_past_interval_refires() {
        let mut scheduler = Scheduler::new(&[group("g", 5, &["cpu_user"])]);
        let t0 = Instant::now();
        let mut emitted = 0;
        scheduler.tick(t0, |_| emitted += 1);
        scheduler.tick(t0 + Duration::from_secs(6), |_| emitted += 1);
        assert_eq!(emitted, 2);
    }
}
