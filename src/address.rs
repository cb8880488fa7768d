//! Address normalisation used to match API fragments against stored servers.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// A lowercase, trimmed `host:port` string.
///
/// Two addresses refer to the same server iff their normalised forms are
/// byte-equal. This is the only join key between status fragments and
/// stored servers; the game id does not take part in matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NormalizedAddress(String);

impl NormalizedAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalise a `host:port` string for matching.
///
/// No syntax validation happens here; callers are expected to have
/// validated the address when it was stored.
pub fn normalize(address: &str) -> NormalizedAddress {
    NormalizedAddress(address.trim().to_lowercase())
}

/// Whether `s` looks like `host:port`.
pub fn is_host_port(s: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9._:-]+:\d+$").expect("address pattern compiles"))
        .is_match(s)
}
