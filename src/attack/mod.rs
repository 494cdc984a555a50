mod killer;
mod rate;

#[cfg(test)]
mod tests;

pub use killer::{Killer, Shot};
pub use rate::RateGate;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::error::{AppError, AppResult, ValidationError};
use crate::gun::Magazine;
use crate::report::{self, Report};

/// Default per-request timeout when the config leaves `timeout` unset.
pub const DEFAULT_TIMEOUT_SECS: u64 = 2;

/// `ratepersecond` value that disables pacing entirely. Kept for config
/// compatibility: the documented default doubles as the "unlimited" marker.
pub const RATE_SENTINEL: u32 = 1000;

const HTTP_SCHEME: &str = "http";
const HTTPS_SCHEME: &str = "https";
const DEFAULT_PORT: u16 = 80;

/// Where the shots land.
#[derive(Debug, Clone)]
pub struct Target {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Validates and defaults the target section of the config.
    ///
    /// # Errors
    ///
    /// Returns an error for a scheme outside http/https or an empty host.
    pub fn from_config(config: &ConfigFile) -> AppResult<Self> {
        let raw_scheme = config.scheme.clone().unwrap_or_default();
        if !raw_scheme.is_empty() && raw_scheme != HTTP_SCHEME && raw_scheme != HTTPS_SCHEME {
            return Err(AppError::validation(ValidationError::InvalidScheme {
                scheme: raw_scheme,
            }));
        }
        let host = config.host.clone().unwrap_or_default();
        if host.is_empty() {
            return Err(AppError::validation(ValidationError::EmptyHost));
        }
        let scheme = if raw_scheme.is_empty() {
            HTTP_SCHEME.to_owned()
        } else {
            raw_scheme
        };
        let port = match config.port {
            None | Some(0) => DEFAULT_PORT,
            Some(port) => port,
        };
        Ok(Self { scheme, host, port })
    }

    /// Effective host string: `host:port` unless the port is 80.
    #[must_use]
    pub fn authority(&self) -> String {
        if self.port == DEFAULT_PORT {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority())
    }
}

/// Global run parameters, defaulted from the config.
#[derive(Debug, Clone, Copy)]
pub struct Attack {
    /// Workers spawned per round.
    pub concurrency: u32,
    /// Full-batch rounds.
    pub attempts: u32,
    /// Default per-request timeout.
    pub timeout: Duration,
    /// Pacing cap; `None` means unlimited.
    pub rate: Option<u32>,
    /// Extra per-shot jitter ceiling, milliseconds.
    pub random_delay_ms: u64,
}

impl Attack {
    #[must_use]
    pub fn from_config(config: &ConfigFile) -> Self {
        let concurrency = config.concurrency.filter(|value| *value > 0).unwrap_or(1);
        let attempts = config.loopcount.filter(|value| *value > 0).unwrap_or(1);
        let timeout = Duration::from_secs(
            config
                .timeout
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );
        let rate = match config.ratepersecond {
            None | Some(0 | RATE_SENTINEL) => None,
            Some(rate) => Some(rate),
        };
        let random_delay_ms = config.randomdelayms.unwrap_or(0);
        Self {
            concurrency,
            attempts,
            timeout,
            rate,
            random_delay_ms,
        }
    }
}

/// Everything a run needs, constructed once and passed into every worker.
/// The rate gate lives here instead of in process globals.
pub struct RunContext {
    pub target: Target,
    pub attack: Attack,
    pub magazine: Arc<Magazine>,
    pub limiter: Option<RateGate>,
}

impl RunContext {
    /// Must be called inside a tokio runtime: the rate gate spawns its
    /// refill task on creation.
    #[must_use]
    pub fn new(target: Target, attack: Attack, magazine: Magazine) -> Self {
        let limiter = attack.rate.map(RateGate::new);
        Self {
            target,
            attack,
            magazine: Arc::new(magazine),
            limiter,
        }
    }
}

/// Executes every round and returns the folded report.
///
/// Each round spawns `concurrency` workers; a worker is a charge task
/// (expands cartridges, builds shots) feeding a fire task (paces and sends)
/// over a bounded queue sized to the worker's batch. All tasks of a round
/// are joined before the next round starts.
///
/// # Errors
///
/// Returns an error when a worker's HTTP client cannot be built or a task
/// panics; per-shot failures only mark hits as failed.
pub async fn run(context: &RunContext) -> AppResult<Report> {
    let shots_per_batch = context.magazine.shots_per_batch();
    let concurrency = usize::try_from(context.attack.concurrency).unwrap_or(usize::MAX);
    let hits_per_round = shots_per_batch.saturating_mul(concurrency);
    info!(
        "start attack: {} round(s), {} worker(s), {} shot(s) per batch",
        context.attack.attempts, context.attack.concurrency, shots_per_batch
    );

    let (hit_tx, hit_rx) = mpsc::channel(hits_per_round.max(1));
    let aggregator = report::spawn_aggregator(Arc::clone(&context.magazine), hit_rx);

    for round in 0..context.attack.attempts {
        debug!("round {}", round);
        let mut handles = Vec::with_capacity(concurrency.saturating_mul(2));
        for _ in 0..context.attack.concurrency {
            let killer = Killer::new(
                &context.target,
                Arc::clone(&context.magazine),
                context.attack.timeout,
            )?;
            let (shot_tx, shot_rx) = mpsc::channel::<Shot>(shots_per_batch.max(1));
            handles.push(tokio::spawn(killer.charge(shot_tx)));
            handles.push(tokio::spawn(killer::fire(
                shot_rx,
                hit_tx.clone(),
                context.limiter.clone(),
                context.attack.random_delay_ms,
            )));
        }
        for handle in handles {
            handle.await?;
        }
    }

    drop(hit_tx);
    let outcome = aggregator.await?;
    Ok(outcome)
}
