//! Route lookup.
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Ordered by priority, then by specificity; first match wins
//! - Explicit `None` rather than a silent default route

use crate::config::RouteConfig;
use crate::routing::matcher::RouteMatcher;

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub upstream: String,
    pub priority: u32,
    matcher: RouteMatcher,
}

/// Ordered route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn from_config(configs: Vec<RouteConfig>) -> Self {
        let mut routes: Vec<Route> = configs
            .into_iter()
            .map(|config| Route {
                matcher: RouteMatcher::new(config.host.as_deref(), config.path_prefix.as_deref()),
                name: config.name,
                upstream: config.upstream,
                priority: config.priority,
            })
            .collect();

        // Stable sort keeps config order among equals.
        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.matcher.specificity().cmp(&a.matcher.specificity()))
        });

        Self { routes }
    }

    pub fn match_route(&self, host: Option<&str>, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(host, path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
