mod render;


pub use render::{render_report, write_output};

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::gun::{Cartridge, Magazine};

/// Outcome of one fired shot. Immutable once produced; folded exactly once.
#[derive(Debug, Clone)]
pub struct Hit {
    pub cartridge_id: u32,
    /// `None` when no response arrived (timeout, refused connection, DNS).
    pub status: Option<u16>,
    pub latency_secs: f64,
    pub body_len: u64,
    pub started_unix: i64,
    pub ended_unix: i64,
}

/// Success/failure code sets copied out of a leaf cartridge, so the
/// aggregator never reaches back into the catalog per hit.
#[derive(Debug, Clone)]
pub(crate) struct StatusPolicy {
    success_codes: Vec<u16>,
    failure_codes: Vec<u16>,
}

impl From<&Cartridge> for StatusPolicy {
    fn from(cartridge: &Cartridge) -> Self {
        Self {
            success_codes: cartridge.success_codes.clone(),
            failure_codes: cartridge.failure_codes.clone(),
        }
    }
}

impl StatusPolicy {
    /// True when the hit counts as complete. Explicit failure codes win,
    /// then success codes; anything else (including no response) fails.
    fn is_complete(&self, status: Option<u16>) -> bool {
        match status {
            Some(code) if self.failure_codes.contains(&code) => false,
            Some(code) => self.success_codes.contains(&code),
            None => false,
        }
    }
}

/// Running aggregate for one cartridge. Counters only grow; the fold is
/// commutative and associative, so hit arrival order never matters.
#[derive(Debug, Clone, Default)]
pub struct CartridgeReport {
    pub total: u64,
    pub complete: u64,
    pub failed: u64,
    pub min_latency: f64,
    pub max_latency: f64,
    pub total_latency: f64,
    pub total_transferred: u64,
    /// Size of the first observed response body.
    pub content_length: u64,
}

impl CartridgeReport {
    fn fold(&mut self, hit: &Hit, complete: bool) {
        if self.total == 0 {
            self.min_latency = hit.latency_secs;
            self.max_latency = hit.latency_secs;
        } else {
            self.min_latency = self.min_latency.min(hit.latency_secs);
            self.max_latency = self.max_latency.max(hit.latency_secs);
        }
        self.total = self.total.saturating_add(1);
        self.total_latency += hit.latency_secs;
        if complete {
            self.complete = self.complete.saturating_add(1);
        } else {
            self.failed = self.failed.saturating_add(1);
        }
        if hit.status.is_some() {
            self.total_transferred = self.total_transferred.saturating_add(hit.body_len);
            if self.content_length == 0 {
                self.content_length = self.total_transferred;
            }
        }
    }

    /// Percentage of complete hits, e.g. 70.0 for 7 complete out of 10.
    #[must_use]
    pub fn availability(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.complete as f64 * 100.0 / self.total as f64
        }
    }

    #[must_use]
    pub fn avg_latency(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_latency / self.total as f64
        }
    }
}

/// Per-second hit counts for one cartridge, reduced over the run's
/// one-second buckets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateStats {
    pub min: u64,
    pub avg: f64,
    pub max: u64,
}

/// The folded outcome of a whole run.
#[derive(Debug, Default)]
pub struct Report {
    by_cartridge: BTreeMap<u32, CartridgeReport>,
    /// hit-completion second -> cartridge id -> count
    per_second: BTreeMap<i64, BTreeMap<u32, u64>>,
    started_unix: Option<i64>,
    ended_unix: Option<i64>,
}

impl Report {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fold(&mut self, hit: &Hit, policy: &StatusPolicy) {
        let complete = policy.is_complete(hit.status);
        self.by_cartridge
            .entry(hit.cartridge_id)
            .or_default()
            .fold(hit, complete);
        let bucket = self.per_second.entry(hit.ended_unix).or_default();
        let count = bucket.entry(hit.cartridge_id).or_insert(0);
        *count = count.saturating_add(1);
        self.started_unix = Some(
            self.started_unix
                .map_or(hit.started_unix, |current| current.min(hit.started_unix)),
        );
        self.ended_unix = Some(
            self.ended_unix
                .map_or(hit.ended_unix, |current| current.max(hit.ended_unix)),
        );
    }

    #[must_use]
    pub fn cartridge(&self, id: u32) -> Option<&CartridgeReport> {
        self.by_cartridge.get(&id)
    }

    #[must_use]
    pub fn total_hits(&self) -> u64 {
        self.by_cartridge
            .values()
            .fold(0u64, |sum, entry| sum.saturating_add(entry.total))
    }

    /// Wall-clock seconds between the earliest shot start and the latest
    /// hit completion.
    #[must_use]
    pub fn duration_secs(&self) -> i64 {
        match (self.started_unix, self.ended_unix) {
            (Some(start), Some(end)) => end.saturating_sub(start).max(0),
            (None, Some(_)) | (Some(_), None) | (None, None) => 0,
        }
    }

    /// Min/avg/max hits per second for one cartridge across the run's
    /// one-second buckets. `None` when the cartridge never completed a hit.
    #[must_use]
    pub fn rate_stats(&self, id: u32) -> Option<RateStats> {
        let mut min = 0u64;
        let mut max = 0u64;
        let mut sum = 0u64;
        let mut buckets = 0u64;
        for counts in self.per_second.values() {
            if let Some(count) = counts.get(&id) {
                if buckets == 0 {
                    min = *count;
                    max = *count;
                } else {
                    min = min.min(*count);
                    max = max.max(*count);
                }
                sum = sum.saturating_add(*count);
                buckets = buckets.saturating_add(1);
            }
        }
        if buckets == 0 {
            return None;
        }
        Some(RateStats {
            min,
            avg: sum as f64 / buckets as f64,
            max,
        })
    }
}

/// Spawns the single consumer folding the hit stream. The report map is
/// touched by this task alone; the handle resolves once every sender is
/// dropped and the stream drains.
#[must_use]
pub fn spawn_aggregator(magazine: Arc<Magazine>, mut hits: mpsc::Receiver<Hit>) -> JoinHandle<Report> {
    tokio::spawn(async move {
        let policies: BTreeMap<u32, StatusPolicy> = magazine
            .leaves()
            .into_iter()
            .map(|leaf| (leaf.id, StatusPolicy::from(leaf)))
            .collect();
        let mut report = Report::new();
        while let Some(hit) = hits.recv().await {
            match policies.get(&hit.cartridge_id) {
                Some(policy) => report.fold(&hit, policy),
                None => warn!("hit for unknown cartridge {}", hit.cartridge_id),
            }
        }
        report
    })
}
