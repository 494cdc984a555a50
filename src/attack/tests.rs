use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::{Attack, Killer, RateGate, Shot, Target};
use crate::config::ConfigFile;
use crate::gun::Magazine;

fn parse(yaml: &str) -> Result<ConfigFile, String> {
    serde_yaml::from_str(yaml).map_err(|err| format!("config parse failed: {}", err))
}

fn killer_from(yaml: &str) -> Result<Killer, String> {
    let config = parse(yaml)?;
    let target =
        Target::from_config(&config).map_err(|err| format!("target invalid: {}", err))?;
    let attack = Attack::from_config(&config);
    let magazine =
        Magazine::from_config(&config).map_err(|err| format!("magazine invalid: {}", err))?;
    Killer::new(&target, Arc::new(magazine), attack.timeout)
        .map_err(|err| format!("killer build failed: {}", err))
}

fn first_shot(yaml: &str) -> Result<Shot, String> {
    let config = parse(yaml)?;
    let magazine =
        Magazine::from_config(&config).map_err(|err| format!("magazine invalid: {}", err))?;
    let Some(cartridge) = magazine.cartridges().first() else {
        return Err("Missing cartridge".to_owned());
    };
    let mut killer = killer_from(yaml)?;
    killer
        .build_shot(cartridge)
        .map_err(|err| format!("shot build failed: {}", err))
}

fn run_async_test<F>(future: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to build runtime: {}", err))?;
    runtime.block_on(future)
}

#[test]
fn attack_defaults_apply() -> Result<(), String> {
    let attack = Attack::from_config(&parse("host: localhost\n")?);
    if attack.concurrency != 1 || attack.attempts != 1 {
        return Err(format!(
            "Unexpected defaults: {}/{}",
            attack.concurrency, attack.attempts
        ));
    }
    if attack.timeout != Duration::from_secs(2) {
        return Err(format!("Unexpected default timeout: {:?}", attack.timeout));
    }
    if attack.rate.is_some() || attack.random_delay_ms != 0 {
        return Err("Pacing should default to off".to_owned());
    }
    Ok(())
}

#[test]
fn rate_sentinel_disables_pacing() -> Result<(), String> {
    let unlimited = Attack::from_config(&parse("host: localhost\nratepersecond: 1000\n")?);
    if unlimited.rate.is_some() {
        return Err("1000 is the unlimited sentinel".to_owned());
    }
    let zero = Attack::from_config(&parse("host: localhost\nratepersecond: 0\n")?);
    if zero.rate.is_some() {
        return Err("0 falls back to the unlimited default".to_owned());
    }
    let limited = Attack::from_config(&parse("host: localhost\nratepersecond: 50\n")?);
    if limited.rate != Some(50) {
        return Err(format!("Expected Some(50), got {:?}", limited.rate));
    }
    Ok(())
}

#[test]
fn target_validation_and_defaults() -> Result<(), String> {
    if Target::from_config(&parse("host: localhost\nscheme: ftp\n")?).is_ok() {
        return Err("ftp scheme must be rejected".to_owned());
    }
    if Target::from_config(&parse("scheme: http\n")?).is_ok() {
        return Err("Empty host must be rejected".to_owned());
    }

    let defaulted = Target::from_config(&parse("host: localhost\n")?)
        .map_err(|err| format!("target invalid: {}", err))?;
    if defaulted.scheme != "http" || defaulted.port != 80 {
        return Err(format!(
            "Unexpected defaults: {}:{}",
            defaulted.scheme, defaulted.port
        ));
    }
    if defaulted.authority() != "localhost" {
        return Err(format!("Port 80 must not appear: {}", defaulted.authority()));
    }

    let custom = Target::from_config(&parse("host: localhost\nport: 8080\nscheme: https\n")?)
        .map_err(|err| format!("target invalid: {}", err))?;
    if custom.authority() != "localhost:8080" {
        return Err(format!("Unexpected authority: {}", custom.authority()));
    }
    if custom.base_url() != "https://localhost:8080" {
        return Err(format!("Unexpected base url: {}", custom.base_url()));
    }
    Ok(())
}

#[test]
fn raw_body_supplies_json_payload() -> Result<(), String> {
    let shot = first_shot(
        r#"
host: localhost
requests:
  - POST: /submit
    headers:
      Content-Type: application/json
    params:
      raw_body: '{"k":"v"}'
      ignored: value
"#,
    )?;
    if *shot.request.method() != reqwest::Method::POST {
        return Err(format!("Unexpected method: {}", shot.request.method()));
    }
    let content_type = shot
        .request
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if content_type != "application/json" {
        return Err(format!("Unexpected content type: {}", content_type));
    }
    let body = shot
        .request
        .body()
        .and_then(reqwest::Body::as_bytes)
        .ok_or("Missing request body")?;
    if body != br#"{"k":"v"}"#.as_slice() {
        return Err(format!("Unexpected body: {:?}", String::from_utf8_lossy(body)));
    }
    Ok(())
}

#[test]
fn default_body_is_form_encoded_and_sorted() -> Result<(), String> {
    let shot = first_shot(
        r"
host: localhost
requests:
  - POST: /submit
    params:
      b: 2
      a: 1
",
    )?;
    let content_type = shot
        .request
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if content_type != "application/x-www-form-urlencoded; charset=UTF-8" {
        return Err(format!("Unexpected content type: {}", content_type));
    }
    let body = shot
        .request
        .body()
        .and_then(reqwest::Body::as_bytes)
        .ok_or("Missing request body")?;
    if body != b"a=1&b=2".as_slice() {
        return Err(format!("Unexpected body: {:?}", String::from_utf8_lossy(body)));
    }
    Ok(())
}

#[test]
fn multipart_body_sets_boundary() -> Result<(), String> {
    let shot = first_shot(
        r"
host: localhost
requests:
  - POST: /upload
    headers:
      Content-Type: multipart/form-data
    params:
      field: value
",
    )?;
    let content_type = shot
        .request
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("multipart/form-data; boundary=") {
        return Err(format!("Unexpected content type: {}", content_type));
    }
    Ok(())
}

#[test]
fn query_string_is_reencoded_canonically() -> Result<(), String> {
    let shot = first_shot(
        r"
host: localhost
requests:
  - GET: /search?b=2&a=1
",
    )?;
    if shot.request.url().path() != "/search" {
        return Err(format!("Unexpected path: {}", shot.request.url().path()));
    }
    if shot.request.url().query() != Some("a=1&b=2") {
        return Err(format!("Unexpected query: {:?}", shot.request.url().query()));
    }
    Ok(())
}

#[test]
fn cartridge_headers_override_global_headers() -> Result<(), String> {
    let shot = first_shot(
        r"
host: localhost
headers:
  Accept: text/plain
  X-Run: volley
requests:
  - GET: /
    headers:
      Accept: application/json
",
    )?;
    let accept = shot
        .request
        .headers()
        .get("accept")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if accept != "application/json" {
        return Err(format!("Cartridge header must win: {}", accept));
    }
    let run_header = shot
        .request
        .headers()
        .get("x-run")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if run_header != "volley" {
        return Err(format!("Global header lost: {}", run_header));
    }
    Ok(())
}

#[test]
fn cartridge_timeout_overrides_run_default() -> Result<(), String> {
    let inherited = first_shot(
        r"
host: localhost
timeout: 7
requests:
  - GET: /
",
    )?;
    if inherited.request.timeout() != Some(&Duration::from_secs(7)) {
        return Err(format!(
            "Expected the run default, got {:?}",
            inherited.request.timeout()
        ));
    }
    let overridden = first_shot(
        r"
host: localhost
timeout: 7
requests:
  - GET: /
    timeout: 3
",
    )?;
    if overridden.request.timeout() != Some(&Duration::from_secs(3)) {
        return Err(format!(
            "Expected the cartridge timeout, got {:?}",
            overridden.request.timeout()
        ));
    }
    Ok(())
}

#[test]
fn composite_cartridge_cannot_fire() -> Result<(), String> {
    let yaml = r"
host: localhost
requests:
  - SYNC:
      - GET: /
";
    let config = parse(yaml)?;
    let magazine =
        Magazine::from_config(&config).map_err(|err| format!("magazine invalid: {}", err))?;
    let Some(composite) = magazine.cartridges().first() else {
        return Err("Missing composite".to_owned());
    };
    let mut killer = killer_from(yaml)?;
    if killer.build_shot(composite).is_ok() {
        return Err("Expected an error for a composite shot".to_owned());
    }
    Ok(())
}

#[test]
fn rate_gate_paces_token_grants() -> Result<(), String> {
    run_async_test(async {
        let gate = RateGate::new(100);
        let start = Instant::now();
        for _ in 0..11 {
            if !gate.acquire().await {
                return Err("Gate closed unexpectedly".to_owned());
            }
        }
        let elapsed = start.elapsed();
        if elapsed < Duration::from_millis(80) {
            return Err(format!("Pacing too fast: {:?}", elapsed));
        }
        Ok(())
    })
}
