mod support;

use std::fs;
use std::path::PathBuf;

use tempfile::tempdir;

use support::{run_volley, spawn_http_server};

fn write_config(dir: &tempfile::TempDir, name: &str, content: &str) -> Result<PathBuf, String> {
    let path = dir.path().join(name);
    fs::write(&path, content).map_err(|err| format!("write config failed: {}", err))?;
    Ok(path)
}

fn line_value(text: &str, prefix: &str) -> Option<String> {
    text.lines()
        .find(|line| line.starts_with(prefix))
        .map(|line| line.trim_start_matches(prefix).trim().to_owned())
}

#[test]
fn e2e_two_workers_one_round() -> Result<(), String> {
    let (port, _server) = spawn_http_server()?;
    let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;
    let config = write_config(
        &dir,
        "gun.yaml",
        &format!(
            "host: 127.0.0.1\nport: {}\nconcurrency: 2\nloopcount: 1\nrequests:\n  - GET: /ping\n",
            port
        ),
    )?;
    let report_path = dir.path().join("report.txt");

    let output = run_volley([
        "-f".to_owned(),
        config.to_string_lossy().into_owned(),
        "-o".to_owned(),
        report_path.to_string_lossy().into_owned(),
    ])?;
    if !output.status.success() {
        return Err(format!(
            "stdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    let report = fs::read_to_string(&report_path)
        .map_err(|err| format!("read report failed: {}", err))?;
    if line_value(&report, "Total requests:").as_deref() != Some("2") {
        return Err(format!("Expected 2 total requests in:\n{}", report));
    }
    if line_value(&report, "Complete requests:").as_deref() != Some("2") {
        return Err(format!("Expected 2 complete requests in:\n{}", report));
    }
    if line_value(&report, "Failed requests:").as_deref() != Some("0") {
        return Err(format!("Expected 0 failed requests in:\n{}", report));
    }
    if line_value(&report, "Availability:").as_deref() != Some("100.00%") {
        return Err(format!("Expected 100.00% availability in:\n{}", report));
    }
    if !report.contains("GET /ping") {
        return Err(format!("Missing endpoint row in:\n{}", report));
    }
    Ok(())
}

#[test]
fn e2e_loopcount_replays_the_batch() -> Result<(), String> {
    let (port, _server) = spawn_http_server()?;
    let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;
    let config = write_config(
        &dir,
        "gun.yaml",
        &format!(
            "host: 127.0.0.1\nport: {}\nconcurrency: 2\nloopcount: 3\nrequests:\n  - SYNC:\n      - GET: /a\n      - GET: /b\n",
            port
        ),
    )?;
    let report_path = dir.path().join("report.txt");

    let output = run_volley([
        "-f".to_owned(),
        config.to_string_lossy().into_owned(),
        "-o".to_owned(),
        report_path.to_string_lossy().into_owned(),
    ])?;
    if !output.status.success() {
        return Err(format!(
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    let report = fs::read_to_string(&report_path)
        .map_err(|err| format!("read report failed: {}", err))?;
    // 2 workers x 3 rounds x 2 leaves
    if line_value(&report, "Total requests:").as_deref() != Some("12") {
        return Err(format!("Expected 12 total requests in:\n{}", report));
    }
    Ok(())
}

#[test]
fn e2e_unreachable_target_counts_failures() -> Result<(), String> {
    // Bind a port, then drop the listener so connections are refused.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")
            .map_err(|err| format!("bind failed: {}", err))?;
        listener
            .local_addr()
            .map_err(|err| format!("addr failed: {}", err))?
            .port()
    };
    let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;
    let config = write_config(
        &dir,
        "gun.yaml",
        &format!(
            "host: 127.0.0.1\nport: {}\ntimeout: 1\nrequests:\n  - GET: /\n",
            port
        ),
    )?;
    let report_path = dir.path().join("report.txt");

    let output = run_volley([
        "-f".to_owned(),
        config.to_string_lossy().into_owned(),
        "-o".to_owned(),
        report_path.to_string_lossy().into_owned(),
    ])?;
    if !output.status.success() {
        return Err(format!(
            "A failed shot must not fail the run: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    let report = fs::read_to_string(&report_path)
        .map_err(|err| format!("read report failed: {}", err))?;
    if line_value(&report, "Failed requests:").as_deref() != Some("1") {
        return Err(format!("Expected 1 failed request in:\n{}", report));
    }
    if line_value(&report, "Availability:").as_deref() != Some("0.00%") {
        return Err(format!("Expected 0.00% availability in:\n{}", report));
    }
    Ok(())
}

#[test]
fn e2e_sample_flag_prints_embedded_config() -> Result<(), String> {
    let output = run_volley(["-s"])?;
    if !output.status.success() {
        return Err("Sample flag must exit 0".to_owned());
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.contains("requests:") || !stdout.contains("session:") {
        return Err(format!("Unexpected sample output:\n{}", stdout));
    }
    Ok(())
}

#[test]
fn e2e_missing_config_flag_is_a_usage_error() -> Result<(), String> {
    let output = run_volley::<[&str; 0], &str>([])?;
    if output.status.success() {
        return Err("Missing -f must exit non-zero".to_owned());
    }
    Ok(())
}

#[test]
fn e2e_missing_config_file_is_an_error() -> Result<(), String> {
    let output = run_volley(["-f", "/definitely/not/here.yaml"])?;
    if output.status.success() {
        return Err("Missing config file must exit non-zero".to_owned());
    }
    Ok(())
}

#[test]
fn e2e_invalid_yaml_is_an_error() -> Result<(), String> {
    let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;
    let config = write_config(&dir, "bad.yaml", "host: [unclosed\n")?;
    let output = run_volley(["-f".to_owned(), config.to_string_lossy().into_owned()])?;
    if output.status.success() {
        return Err("Invalid YAML must exit non-zero".to_owned());
    }
    Ok(())
}
