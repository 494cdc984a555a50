use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::interval;

/// Evenly paced token gate shared by every worker. The bucket holds at most
/// one permit and is refilled once per `1/rate` interval, so idle time never
/// accumulates into bursts.
#[derive(Clone)]
pub struct RateGate {
    semaphore: Arc<Semaphore>,
}

impl RateGate {
    /// Must be called inside a tokio runtime: the refill task is spawned
    /// on creation and lives for the rest of the process.
    #[must_use]
    pub fn new(rate: u32) -> Self {
        let semaphore = Arc::new(Semaphore::new(1));
        spawn_refill(Arc::clone(&semaphore), rate);
        Self { semaphore }
    }

    /// Waits for the next pacing token. Returns false when the semaphore
    /// has been closed.
    pub async fn acquire(&self) -> bool {
        match self.semaphore.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }
}

fn spawn_refill(semaphore: Arc<Semaphore>, rate: u32) {
    tokio::spawn(async move {
        let period = Duration::from_secs(1)
            .checked_div(rate.max(1))
            .unwrap_or_else(|| Duration::from_millis(1))
            .max(Duration::from_nanos(1));
        let mut tick = interval(period);
        loop {
            tick.tick().await;
            if semaphore.available_permits() == 0 {
                semaphore.add_permits(1);
            }
        }
    });
}
