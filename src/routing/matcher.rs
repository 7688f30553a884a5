//! Route matching logic.
//!
//! # Design Decisions
//! - Host matching is case-insensitive and ignores any port
//! - Path matching is case-sensitive prefix matching
//! - Empty condition = always matches (wildcard)
//! - No regex to keep matching linear

/// Conditions a request must satisfy, combined with AND.
#[derive(Debug, Clone, Default)]
pub struct RouteMatcher {
    host: Option<String>,
    path_prefix: Option<String>,
}

impl RouteMatcher {
    pub fn new(host: Option<&str>, path_prefix: Option<&str>) -> Self {
        Self {
            host: host.map(|h| strip_port(h).to_ascii_lowercase()),
            path_prefix: path_prefix.map(str::to_string),
        }
    }

    pub fn matches(&self, host: Option<&str>, path: &str) -> bool {
        let host_ok = match &self.host {
            Some(expected) => host
                .map(|h| strip_port(h).eq_ignore_ascii_case(expected))
                .unwrap_or(false),
            None => true,
        };
        let path_ok = match &self.path_prefix {
            Some(prefix) => path.starts_with(prefix.as_str()),
            None => true,
        };
        host_ok && path_ok
    }

    /// Tie-breaker among equal priorities: host-bound first, then longer prefix.
    pub fn specificity(&self) -> (bool, usize) {
        (self.host.is_some(), self.path_prefix.as_ref().map_or(0, String::len))
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
