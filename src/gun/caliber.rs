use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use regex::Regex;
use serde_yaml::Value;

/// The `params` key whose list members become the sticky session pick-list.
pub(crate) const SESSION_KEY: &str = "session";

/// A terminal configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub(crate) fn from_yaml(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(flag) => Scalar::Bool(*flag),
            Value::Number(number) => number
                .as_i64()
                .map_or_else(|| Scalar::Float(number.as_f64().unwrap_or(0.0)), Scalar::Int),
            Value::String(text) => Scalar::Text(text.clone()),
            Value::Sequence(_) | Value::Mapping(_) => Scalar::Null,
            Value::Tagged(tagged) => Scalar::from_yaml(&tagged.value),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(flag) => write!(formatter, "{}", flag),
            Scalar::Int(number) => write!(formatter, "{}", number),
            Scalar::Float(number) => write!(formatter, "{}", number),
            Scalar::Text(text) => formatter.write_str(text),
        }
    }
}

/// String form of an arbitrary YAML scalar, used for map keys and raw
/// feature values.
pub(crate) fn yaml_string(value: &Value) -> String {
    Scalar::from_yaml(value).to_string()
}

/// One node of the parameter tree built from the `params` document section.
///
/// `List` is a pick-list: every lookup draws a member uniformly at random.
/// `Session` is the sticky variant: the first lookup per worker draws a
/// member and the worker keeps it for its whole batch. `Array` is an array
/// literal (key ends in `[]`) and never triggers random selection.
#[derive(Debug, Clone)]
pub enum Caliber {
    Scalar(Scalar),
    Array(Vec<Scalar>),
    Map(BTreeMap<String, Caliber>),
    List(Vec<Caliber>),
    Session(Vec<Caliber>),
}

impl Caliber {
    /// Renders a terminal node. Containers render empty: a lookup that
    /// stops on a container is treated as an empty substitution.
    #[must_use]
    pub fn value_string(&self) -> String {
        match self {
            Caliber::Scalar(scalar) => scalar.to_string(),
            Caliber::Array(items) => {
                let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
                format!("[{}]", rendered.join(", "))
            }
            Caliber::Map(_) | Caliber::List(_) | Caliber::Session(_) => String::new(),
        }
    }
}

/// Builds the parameter tree root. Only here does the `session` key get its
/// special meaning; nested `session` keys are ordinary pick-lists.
pub(crate) fn build_root(mapping: &serde_yaml::Mapping, array_key: &Regex) -> BTreeMap<String, Caliber> {
    let mut root = BTreeMap::new();
    for (raw_key, raw_value) in mapping {
        let key = yaml_string(raw_key);
        if key == SESSION_KEY {
            if let Value::Sequence(entries) = raw_value {
                let members = entries
                    .iter()
                    .filter_map(|entry| {
                        if let Value::Mapping(member) = entry {
                            Some(Caliber::Map(build_map(member, array_key)))
                        } else {
                            None
                        }
                    })
                    .collect();
                root.insert(key, Caliber::Session(members));
                continue;
            }
        }
        let node = build_value(&key, raw_value, array_key);
        root.insert(key, node);
    }
    root
}

fn build_map(mapping: &serde_yaml::Mapping, array_key: &Regex) -> BTreeMap<String, Caliber> {
    let mut children = BTreeMap::new();
    for (raw_key, raw_value) in mapping {
        let key = yaml_string(raw_key);
        let node = build_value(&key, raw_value, array_key);
        children.insert(key, node);
    }
    children
}

fn build_value(key: &str, value: &Value, array_key: &Regex) -> Caliber {
    match value {
        Value::Sequence(items) => {
            if array_key.is_match(key) {
                Caliber::Array(items.iter().map(Scalar::from_yaml).collect())
            } else {
                Caliber::List(build_list(items, array_key))
            }
        }
        Value::Mapping(mapping) => Caliber::Map(build_map(mapping, array_key)),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Tagged(_) => {
            Caliber::Scalar(Scalar::from_yaml(value))
        }
    }
}

fn build_list(items: &[Value], array_key: &Regex) -> Vec<Caliber> {
    items
        .iter()
        .map(|item| match item {
            Value::Sequence(nested) => Caliber::List(build_list(nested, array_key)),
            Value::Mapping(mapping) => Caliber::Map(build_map(mapping, array_key)),
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Tagged(_) => {
                Caliber::Scalar(Scalar::from_yaml(item))
            }
        })
        .collect()
}

/// Walks the tree for a dotted path. A map descent consumes one path
/// segment; pick-lists draw a member without consuming a segment. The
/// sticky session pick is cached in `session`, which is owned by exactly
/// one worker.
pub(crate) fn find<'tree>(
    root: &'tree BTreeMap<String, Caliber>,
    path: &str,
    session: &mut Option<usize>,
    rng: &mut dyn RngCore,
) -> Option<&'tree Caliber> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let node = root.get(first)?;
    let rest: Vec<&str> = segments.collect();
    find_in(node, &rest, session, rng)
}

fn find_in<'tree>(
    node: &'tree Caliber,
    parts: &[&str],
    session: &mut Option<usize>,
    rng: &mut dyn RngCore,
) -> Option<&'tree Caliber> {
    match node {
        Caliber::Scalar(_) | Caliber::Array(_) => Some(node),
        Caliber::Map(children) => {
            let (key, rest) = parts.split_first()?;
            let child = children.get(*key)?;
            find_in(child, rest, session, rng)
        }
        Caliber::List(members) => {
            let member = members.choose(rng)?;
            match member {
                Caliber::Scalar(_) | Caliber::Array(_) => Some(member),
                Caliber::Map(_) | Caliber::List(_) | Caliber::Session(_) => {
                    find_in(member, parts, session, rng)
                }
            }
        }
        Caliber::Session(members) => {
            if members.is_empty() {
                return None;
            }
            let pick = *session.get_or_insert_with(|| rng.gen_range(0..members.len()));
            let member = members.get(pick)?;
            find_in(member, parts, session, rng)
        }
    }
}
