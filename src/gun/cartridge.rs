use std::time::Duration;

use rand::RngCore;
use rand::seq::SliceRandom;
use serde_yaml::Value;

use crate::error::{AppError, AppResult, ConfigError};

use super::caliber::yaml_string;
use super::feature::{Feature, Patterns};

/// Response codes counted as complete when a cartridge configures none.
pub const DEFAULT_SUCCESS_CODES: [u16; 3] = [200, 301, 302];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    /// Composite: children fire in a fresh random order per worker batch.
    Random,
    /// Composite: children fire in declared order.
    Sync,
}

impl Method {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            "RANDOM" => Some(Method::Random),
            "SYNC" => Some(Method::Sync),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Random => "RANDOM",
            Method::Sync => "SYNC",
        }
    }

    #[must_use]
    pub fn is_composite(self) -> bool {
        matches!(self, Method::Random | Method::Sync)
    }

    /// Methods that carry a request body built from the cartridge params.
    #[must_use]
    pub fn has_body(self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Delete)
    }
}

/// One configured request definition: a concrete call for leaf methods, a
/// grouping node for RANDOM/SYNC.
#[derive(Debug, Clone)]
pub struct Cartridge {
    /// Unique across the whole tree, assigned in document order. Composite
    /// cartridges consume ids too, so ids equal declaration positions.
    pub id: u32,
    pub method: Method,
    pub path: Feature,
    /// Raw method + path, used to label report rows.
    pub label: String,
    pub headers: Vec<Feature>,
    pub params: Vec<Feature>,
    /// Per-cartridge override; `None` inherits the run default.
    pub timeout: Option<Duration>,
    pub success_codes: Vec<u16>,
    pub failure_codes: Vec<u16>,
    pub children: Vec<Cartridge>,
}

impl Cartridge {
    pub(crate) fn default_root(patterns: &Patterns, next_id: &mut u32) -> Self {
        *next_id = next_id.saturating_add(1);
        Self {
            id: *next_id,
            method: Method::Get,
            path: Feature::new("GET", "/", &patterns.placeholder),
            label: "GET /".to_owned(),
            headers: Vec::new(),
            params: Vec::new(),
            timeout: None,
            success_codes: DEFAULT_SUCCESS_CODES.to_vec(),
            failure_codes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Flattens this cartridge into the leaf sequence one worker fires:
    /// leaves yield themselves, SYNC keeps declared order, RANDOM applies a
    /// fresh uniform permutation of its children.
    #[must_use]
    pub fn expand(&self, rng: &mut dyn RngCore) -> Vec<&Cartridge> {
        let mut out = Vec::new();
        self.expand_into(&mut out, rng);
        out
    }

    fn expand_into<'tree>(&'tree self, out: &mut Vec<&'tree Cartridge>, rng: &mut dyn RngCore) {
        match self.method {
            Method::Get | Method::Post | Method::Put | Method::Delete => out.push(self),
            Method::Sync => {
                for child in &self.children {
                    child.expand_into(out, rng);
                }
            }
            Method::Random => {
                let mut order: Vec<usize> = (0..self.children.len()).collect();
                order.shuffle(rng);
                for index in order {
                    if let Some(child) = self.children.get(index) {
                        child.expand_into(out, rng);
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        if self.method.is_composite() {
            self.children.iter().map(Cartridge::leaf_count).sum()
        } else {
            1
        }
    }

    fn collect_leaves<'tree>(&'tree self, out: &mut Vec<&'tree Cartridge>) {
        if self.method.is_composite() {
            for child in &self.children {
                child.collect_leaves(out);
            }
        } else {
            out.push(self);
        }
    }

    /// Document-order leaves of a cartridge forest, for the report phase.
    #[must_use]
    pub fn plain_slice(cartridges: &[Cartridge]) -> Vec<&Cartridge> {
        let mut out = Vec::new();
        for cartridge in cartridges {
            cartridge.collect_leaves(&mut out);
        }
        out
    }
}

pub(crate) fn parse_cartridges(
    raw: &[Value],
    patterns: &Patterns,
    next_id: &mut u32,
) -> AppResult<Vec<Cartridge>> {
    let mut cartridges = Vec::with_capacity(raw.len());
    for (index, entry) in raw.iter().enumerate() {
        let Value::Mapping(map) = entry else {
            return Err(AppError::config(ConfigError::CartridgeMissingMethod { index }));
        };
        cartridges.push(parse_cartridge(map, index, patterns, next_id)?);
    }
    Ok(cartridges)
}

fn parse_cartridge(
    map: &serde_yaml::Mapping,
    index: usize,
    patterns: &Patterns,
    next_id: &mut u32,
) -> AppResult<Cartridge> {
    let mut found: Option<(Method, &Value)> = None;
    for (raw_key, raw_value) in map {
        if let Some(method) = Method::from_key(&yaml_string(raw_key)) {
            found = Some((method, raw_value));
            break;
        }
    }
    let Some((method, method_value)) = found else {
        return Err(AppError::config(ConfigError::CartridgeMissingMethod { index }));
    };

    // Id before children: parents precede children in document order.
    *next_id = next_id.saturating_add(1);
    let id = *next_id;

    let (path, label, children) = if method.is_composite() {
        let Value::Sequence(raw_children) = method_value else {
            return Err(AppError::config(ConfigError::CartridgeChildrenNotSequence {
                index,
                method: method.as_str().to_owned(),
            }));
        };
        let children = parse_cartridges(raw_children, patterns, next_id)?;
        let path = Feature::new(method.as_str(), "", &patterns.placeholder);
        (path, method.as_str().to_owned(), children)
    } else {
        let raw_path = yaml_string(method_value);
        let path = Feature::new(method.as_str(), &raw_path, &patterns.placeholder);
        let label = format!("{} {}", method.as_str(), raw_path);
        (path, label, Vec::new())
    };

    let mut headers = Vec::new();
    let mut params = Vec::new();
    let mut timeout = None;
    let mut success_codes = DEFAULT_SUCCESS_CODES.to_vec();
    let mut failure_codes = Vec::new();

    for (raw_key, raw_value) in map {
        let key = yaml_string(raw_key);
        match key.as_str() {
            "headers" => headers = parse_features(raw_value, index, &key, patterns)?,
            "params" => params = parse_features(raw_value, index, &key, patterns)?,
            "timeout" => {
                let seconds = raw_value
                    .as_u64()
                    .ok_or_else(|| AppError::config(ConfigError::InvalidTimeout { index }))?;
                timeout = Some(Duration::from_secs(seconds));
            }
            "successcodes" => success_codes = parse_codes(raw_value, index, &key)?,
            "failedcodes" => failure_codes = parse_codes(raw_value, index, &key)?,
            _ => {}
        }
    }

    Ok(Cartridge {
        id,
        method,
        path,
        label,
        headers,
        params,
        timeout,
        success_codes,
        failure_codes,
        children,
    })
}

fn parse_features(
    value: &Value,
    index: usize,
    key: &str,
    patterns: &Patterns,
) -> AppResult<Vec<Feature>> {
    let Value::Mapping(map) = value else {
        return Err(AppError::config(ConfigError::FeatureMapExpected {
            index,
            key: key.to_owned(),
        }));
    };
    Ok(parse_feature_map(map, patterns))
}

pub(crate) fn parse_feature_map(map: &serde_yaml::Mapping, patterns: &Patterns) -> Vec<Feature> {
    map.iter()
        .map(|(raw_name, raw_value)| {
            let name = yaml_string(raw_name);
            let raw = yaml_string(raw_value);
            Feature::new(&name, &raw, &patterns.placeholder)
        })
        .collect()
}

fn parse_codes(value: &Value, index: usize, key: &str) -> AppResult<Vec<u16>> {
    let invalid = || {
        AppError::config(ConfigError::InvalidStatusCodes {
            index,
            key: key.to_owned(),
        })
    };
    match value {
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|code| u16::try_from(code).ok())
                    .ok_or_else(invalid)
            })
            .collect(),
        Value::Number(_) => {
            let code = value
                .as_u64()
                .and_then(|code| u16::try_from(code).ok())
                .ok_or_else(invalid)?;
            Ok(vec![code])
        }
        Value::Null
        | Value::Bool(_)
        | Value::String(_)
        | Value::Mapping(_)
        | Value::Tagged(_) => Err(invalid()),
    }
}
