//! Status tree walker.
//!
//! The aggregation API does not commit to a response shape, so servers are
//! located heuristically: any object that resolves to an address and carries
//! at least one status-shaped key is treated as that server's fragment.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::address::{is_host_port, normalize, NormalizedAddress};

/// Keys that name an address directly, in priority order.
const ADDRESS_PATHS: &[&[&str]] = &[&["server"], &["address"], &["ip_port"], &["host"]];

/// Presence of any of these marks an object as a status fragment.
const STATUS_KEYS: [&str; 11] = [
    "online",
    "is_online",
    "status",
    "state",
    "_updater",
    "players",
    "players_online",
    "players_max",
    "online_players",
    "numplayers",
    "maxplayers",
];

const ONLINE_PATHS: &[&[&str]] = &[
    &["online"],
    &["is_online"],
    &["status"],
    &["state"],
    &["_updater", "status"],
    &["_updater", "online"],
    &["_updater", "is_online"],
];

const PLAYERS_ONLINE_PATHS: &[&[&str]] = &[
    &["players_online"],
    &["online_players"],
    &["numplayers"],
    &["players"],
    &["players", "online"],
    &["players", "current"],
];

const PLAYERS_MAX_PATHS: &[&[&str]] = &[
    &["players_max"],
    &["maxplayers"],
    &["max_players"],
    &["players", "max"],
    &["players", "maximum"],
];

const ONLINE_WORDS: [&str; 7] = ["online", "up", "alive", "true", "yes", "ok", "running"];
const OFFLINE_WORDS: [&str; 7] = ["offline", "down", "dead", "false", "no", "error", "stopped"];

/// Normalised status of one server, extracted from one fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub online: Option<bool>,
    pub players_online: Option<u32>,
    pub players_max: Option<u32>,
    /// The fragment the record was extracted from.
    pub raw: Value,
}

/// Status records keyed by normalised address.
pub type StatusMap = HashMap<NormalizedAddress, StatusRecord>;

/// Walk a decoded response and collect one record per discovered address.
///
/// Traversal is depth-first in document order; when an address is found
/// more than once the last fragment wins.
pub fn walk_response(root: &Value) -> StatusMap {
    let mut mapped = StatusMap::new();
    walk(root, None, &mut mapped);
    mapped
}

fn walk(node: &Value, hint: Option<&str>, mapped: &mut StatusMap) {
    match node {
        Value::Object(fields) => {
            if let Some(address) = extract_address(fields, hint) {
                if has_status_data(fields) {
                    mapped.insert(normalize(&address), extract_status(fields, node));
                }
            }

            for (key, child) in fields {
                if is_container(child) {
                    walk(child, Some(key.trim()), mapped);
                }
            }
        }
        Value::Array(items) => {
            for child in items.iter().filter(|c| is_container(c)) {
                walk(child, None, mapped);
            }
        }
        _ => {}
    }
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn has_status_data(node: &Map<String, Value>) -> bool {
    STATUS_KEYS.iter().any(|key| node.contains_key(*key))
}

fn extract_address(node: &Map<String, Value>, hint: Option<&str>) -> Option<String> {
    if let Some(address) = first_match(node, ADDRESS_PATHS, non_blank_string) {
        return Some(address);
    }

    let ip = node.get("ip").and_then(scalar_text);
    let port = node.get("port").and_then(scalar_text);
    if let (Some(ip), Some(port)) = (ip, port) {
        return Some(format!("{}:{}", ip, port));
    }

    hint.filter(|h| is_host_port(h)).map(str::to_string)
}

fn extract_status(fields: &Map<String, Value>, node: &Value) -> StatusRecord {
    StatusRecord {
        online: first_match(fields, ONLINE_PATHS, coerce_bool),
        players_online: first_match(fields, PLAYERS_ONLINE_PATHS, coerce_count),
        players_max: first_match(fields, PLAYERS_MAX_PATHS, coerce_count),
        raw: node.clone(),
    }
}

/// Try each candidate path in order and return the first value `coerce`
/// accepts. Paths that are missing or whose value is rejected fall through.
fn first_match<T>(
    node: &Map<String, Value>,
    paths: &[&[&str]],
    coerce: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    paths
        .iter()
        .find_map(|path| value_by_path(node, path).and_then(&coerce))
}

fn value_by_path<'a>(node: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = node.get(*first)?;
    for segment in rest {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

fn non_blank_string(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Text of a string or number, treating blanks and zero as absent.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => non_blank_string(value).filter(|s| s != "0"),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(number_text(n)),
        _ => None,
    }
}

/// Integral floats lose their fraction so `27015.0` reads as `27015`.
fn number_text(n: &serde_json::Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 1e15) {
            return format!("{}", f as i64);
        }
    }
    n.to_string()
}

/// A finite number from a JSON number or a numeric string.
fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn coerce_bool(value: &Value) -> Option<bool> {
    if let Value::Bool(b) = value {
        return Some(*b);
    }

    if let Some(n) = numeric(value) {
        return Some(n.trunc() > 0.0);
    }

    let word = value.as_str()?.trim().to_lowercase();
    if ONLINE_WORDS.contains(&word.as_str()) {
        Some(true)
    } else if OFFLINE_WORDS.contains(&word.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn coerce_count(value: &Value) -> Option<u32> {
    let n = numeric(value)?.trunc();
    if n < 0.0 || n > f64::from(u32::MAX) {
        return None;
    }
    Some(n as u32)
}
