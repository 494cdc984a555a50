use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Request, Url, multipart};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::error::{AppError, AppResult, HttpError};
use crate::gun::{Cartridge, Magazine, Method};
use crate::report::Hit;

use super::{RateGate, Target};

/// Body feature that carries the literal payload of a JSON request.
const RAW_BODY_FEATURE: &str = "raw_body";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// One worker: an isolated HTTP client (own cookie jar, no connection
/// reuse), a private sticky session pick, and the catalog it expands into
/// shots. Never shared between tasks.
pub struct Killer {
    base: Url,
    magazine: Arc<Magazine>,
    default_timeout: Duration,
    session: Option<usize>,
    client: Client,
}

/// A fully built, ready-to-send request.
pub struct Shot {
    pub cartridge_id: u32,
    pub label: String,
    pub request: Request,
    pub client: Client,
}

impl Killer {
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built or the target
    /// does not form a valid base URL.
    pub fn new(
        target: &Target,
        magazine: Arc<Magazine>,
        default_timeout: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Some(Duration::from_secs(0)))
            .connect_timeout(default_timeout)
            .build()
            .map_err(|err| AppError::http(HttpError::BuildClientFailed { source: err }))?;
        let raw_base = target.base_url();
        let base = Url::parse(&raw_base).map_err(|err| {
            AppError::http(HttpError::InvalidTargetUrl {
                url: raw_base,
                source: err,
            })
        })?;
        Ok(Self {
            base,
            magazine,
            default_timeout,
            session: None,
            client,
        })
    }

    /// Expands the cartridge forest into this worker's batch and streams
    /// the built shots. A shot that fails to build is logged and dropped;
    /// it produces no hit.
    pub(crate) async fn charge(mut self, shots: mpsc::Sender<Shot>) {
        let magazine = Arc::clone(&self.magazine);
        let mut batch: Vec<&Cartridge> = Vec::new();
        {
            let mut rng = rand::thread_rng();
            for cartridge in magazine.cartridges() {
                batch.extend(cartridge.expand(&mut rng));
            }
        }
        for cartridge in batch {
            match self.build_shot(cartridge) {
                Ok(shot) => {
                    if shots.send(shot).await.is_err() {
                        return;
                    }
                }
                Err(err) => warn!("request not created: {}", err),
            }
        }
    }

    pub(crate) fn build_shot(&mut self, cartridge: &Cartridge) -> AppResult<Shot> {
        let magazine = Arc::clone(&self.magazine);
        let mut rng = rand::thread_rng();

        let Some(method) = leaf_method(cartridge.method) else {
            return Err(AppError::http(HttpError::CompositeShot {
                label: cartridge.label.clone(),
            }));
        };

        let raw_path = cartridge
            .path
            .resolve(&magazine, &mut self.session, &mut rng);
        let mut url = self.base.clone();
        match raw_path.split_once('?') {
            Some((path, query)) => {
                url.set_path(path);
                let canonical = canonical_query(query);
                if canonical.is_empty() {
                    url.set_query(None);
                } else {
                    url.set_query(Some(&canonical));
                }
            }
            None => {
                url.set_path(&raw_path);
                url.set_query(None);
            }
        }

        let mut headers = HeaderMap::new();
        for feature in magazine.features() {
            let value = feature.resolve(&magazine, &mut self.session, &mut rng);
            insert_header(&mut headers, feature.name(), &value)?;
        }
        for feature in &cartridge.headers {
            let value = feature.resolve(&magazine, &mut self.session, &mut rng);
            insert_header(&mut headers, feature.name(), &value)?;
        }

        let timeout = cartridge.timeout.unwrap_or(self.default_timeout);
        let mut builder = self.client.request(method, url).timeout(timeout);

        if cartridge.method.has_body() {
            let content_type = headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_owned();
            match content_type.as_str() {
                "multipart/form-data" => {
                    let mut form = multipart::Form::new();
                    for feature in &cartridge.params {
                        let value = feature.resolve(&magazine, &mut self.session, &mut rng);
                        form = form.text(feature.name().to_owned(), value);
                    }
                    // the multipart builder supplies its own boundary header
                    headers.remove(CONTENT_TYPE);
                    builder = builder.headers(headers).multipart(form);
                }
                "application/json" => {
                    let mut body = String::new();
                    for feature in &cartridge.params {
                        if feature.name() == RAW_BODY_FEATURE {
                            body.push_str(&feature.resolve(&magazine, &mut self.session, &mut rng));
                        }
                    }
                    builder = builder.headers(headers).body(body);
                }
                _ => {
                    let mut pairs: Vec<(String, String)> = cartridge
                        .params
                        .iter()
                        .map(|feature| {
                            let value = feature.resolve(&magazine, &mut self.session, &mut rng);
                            (feature.name().to_owned(), value)
                        })
                        .collect();
                    pairs.sort_by(|left, right| left.0.cmp(&right.0));
                    let encoded = form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(pairs)
                        .finish();
                    if !headers.contains_key(CONTENT_TYPE) {
                        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
                    }
                    builder = builder.headers(headers).body(encoded);
                }
            }
        } else {
            builder = builder.headers(headers);
        }

        let request = builder
            .build()
            .map_err(|err| AppError::http(HttpError::BuildRequestFailed { source: err }))?;
        Ok(Shot {
            cartridge_id: cartridge.id,
            label: cartridge.label.clone(),
            request,
            client: self.client.clone(),
        })
    }
}

fn leaf_method(method: Method) -> Option<reqwest::Method> {
    match method {
        Method::Get => Some(reqwest::Method::GET),
        Method::Post => Some(reqwest::Method::POST),
        Method::Put => Some(reqwest::Method::PUT),
        Method::Delete => Some(reqwest::Method::DELETE),
        Method::Random | Method::Sync => None,
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> AppResult<()> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
        AppError::http(HttpError::InvalidHeaderName {
            name: name.to_owned(),
            source: err,
        })
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|err| {
        AppError::http(HttpError::InvalidHeaderValue {
            name: name.to_owned(),
            source: err,
        })
    })?;
    // later assignments for the same header name win
    headers.insert(header_name, header_value);
    Ok(())
}

/// Re-encodes a raw query string with key-sorted pairs.
fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    pairs.sort_by(|left, right| left.0.cmp(&right.0));
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Consumes a worker's shot queue: acquires a pacing token, applies the
/// optional jitter, sends, and forwards the hit.
pub(crate) async fn fire(
    mut shots: mpsc::Receiver<Shot>,
    hits: mpsc::Sender<Hit>,
    limiter: Option<RateGate>,
    random_delay_ms: u64,
) {
    while let Some(shot) = shots.recv().await {
        if let Some(gate) = limiter.as_ref() {
            if !gate.acquire().await {
                return;
            }
        }
        if random_delay_ms > 0 {
            let jitter = rand::thread_rng().gen_range(0..=random_delay_ms);
            sleep(Duration::from_millis(jitter)).await;
        }
        let hit = send_shot(shot).await;
        if hits.send(hit).await.is_err() {
            return;
        }
    }
}

async fn send_shot(shot: Shot) -> Hit {
    let started_unix = Utc::now().timestamp();
    let clock = Instant::now();
    let result = shot.client.execute(shot.request).await;
    let latency_secs = clock.elapsed().as_secs_f64();
    let ended_unix = Utc::now().timestamp();
    match result {
        Ok(response) => {
            let status = response.status().as_u16();
            debug!("{} -> {}", shot.label, status);
            let body_len = response
                .bytes()
                .await
                .map_or(0, |body| u64::try_from(body.len()).unwrap_or(u64::MAX));
            Hit {
                cartridge_id: shot.cartridge_id,
                status: Some(status),
                latency_secs,
                body_len,
                started_unix,
                ended_unix,
            }
        }
        Err(err) => {
            debug!("{}: response not received: {}", shot.label, err);
            Hit {
                cartridge_id: shot.cartridge_id,
                status: None,
                latency_secs,
                body_len: 0,
                started_unix,
                ended_unix,
            }
        }
    }
}
