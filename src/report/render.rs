use std::path::Path;

use crate::attack::{Attack, Target};
use crate::error::{AppError, AppResult, ReportError};
use crate::gun::Magazine;

use super::{RateStats, Report};

/// Renders the overall summary followed by the per-endpoint table, in the
/// form it is printed to the console and duplicated to the output file.
#[must_use]
pub fn render_report(
    report: &Report,
    target: &Target,
    attack: &Attack,
    magazine: &Magazine,
) -> String {
    let leaves = magazine.leaves();

    let mut rows = Vec::new();
    let mut total_requests = 0u64;
    let mut complete_requests = 0u64;
    let mut failed_requests = 0u64;
    let mut availability_sum = 0.0f64;
    let mut rate_sum = 0.0f64;
    let mut total_transferred = 0u64;
    let mut reported = 0u64;

    for leaf in &leaves {
        let Some(entry) = report.cartridge(leaf.id) else {
            continue;
        };
        let rates = report.rate_stats(leaf.id).unwrap_or_default();
        total_requests = total_requests.saturating_add(entry.total);
        complete_requests = complete_requests.saturating_add(entry.complete);
        failed_requests = failed_requests.saturating_add(entry.failed);
        availability_sum += entry.availability();
        rate_sum += rates.avg;
        total_transferred = total_transferred.saturating_add(entry.total_transferred);
        reported = reported.saturating_add(1);

        rows.push(format!("{}.  {}", leaf.id, leaf.label));
        rows.push(endpoint_row(entry, &rates));
        rows.push(String::new());
    }

    let availability = if reported == 0 {
        0.0
    } else {
        availability_sum / reported as f64
    };
    let requests_per_second = if leaves.is_empty() {
        0.0
    } else {
        rate_sum / leaves.len() as f64
    };

    let mut lines = Vec::new();
    lines.push(format!("Server Hostname:        {}", target.host));
    lines.push(format!("Server Port:            {}", target.port));
    lines.push(format!("Concurrency Level:      {}", attack.concurrency));
    lines.push(format!(
        "Rate per second:        {}",
        attack
            .rate
            .map_or_else(|| "unlimited".to_owned(), |rate| rate.to_string())
    ));
    lines.push(format!("Random delay ms:        {}", attack.random_delay_ms));
    lines.push(format!("Loop count:             {}", attack.attempts));
    lines.push(format!(
        "Timeout:                {} seconds",
        attack.timeout.as_secs()
    ));
    lines.push(format!(
        "Time taken for tests:   {} seconds",
        report.duration_secs()
    ));
    lines.push(format!("Total requests:         {}", total_requests));
    lines.push(format!("Complete requests:      {}", complete_requests));
    lines.push(format!("Failed requests:        {}", failed_requests));
    lines.push(format!("Availability:           {:.2}%", availability));
    lines.push(format!("Requests per second:    ~ {:.2}", requests_per_second));
    lines.push(format!(
        "Total transferred:      {}",
        human_bytes(total_transferred)
    ));
    lines.push(String::new());
    lines.push("#   Request".to_owned());
    lines.push(format!(
        "    {:<8} {:<8} {:<8} {:<8} {:<8} {:<8} {:<19} {:<10} {:<10}",
        "Compl", "Fail.", "Min/s", "Max/s", "Avg/s", "Avail%", "Min/Avg/Max req/s", "Cont len",
        "Total trans"
    ));
    lines.extend(rows);

    lines.join("\n")
}

fn endpoint_row(entry: &super::CartridgeReport, rates: &RateStats) -> String {
    format!(
        "    {:<8} {:<8} {:<8.3} {:<8.3} {:<8.3} {:<8.2} {:>2} / ~ {:<5.2} / {:<4} {:<10} {:<10}",
        entry.complete,
        entry.failed,
        entry.min_latency,
        entry.max_latency,
        entry.avg_latency(),
        entry.availability(),
        rates.min,
        rates.avg,
        rates.max,
        human_bytes(entry.content_length),
        human_bytes(entry.total_transferred)
    )
}

/// SI-style byte formatting, whole bytes below 1 KB.
fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0usize;
    value /= 1000.0;
    while value >= 1000.0 && unit.saturating_add(1) < UNITS.len() {
        value /= 1000.0;
        unit = unit.saturating_add(1);
    }
    let suffix = UNITS.get(unit).copied().unwrap_or("TB");
    format!("{:.1} {}", value, suffix)
}

/// Duplicates the rendered report to a file.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn write_output(text: &str, path: &Path) -> AppResult<()> {
    std::fs::write(path, text).map_err(|err| {
        AppError::report(ReportError::WriteOutput {
            path: path.to_path_buf(),
            source: err,
        })
    })
}
