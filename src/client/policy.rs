//! Which endpoints may be persisted to the durable tier.

use serde::{Deserialize, Serialize};

/// Cache tiers a successful response may be written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    /// Memory and durable tiers
    Durable,
    /// Memory tier only
    MemoryOnly,
}

/// Read-mostly routes whose responses survive restarts.
///
/// Write endpoints and "latest page" listings stay memory-only.
pub const DEFAULT_DURABLE_ROUTES: &[&str] = &[
    "/country/details",
    "/country/crime",
    "/country/names",
    "/departements/details",
    "/departements/crime",
    "/departements/names",
    "/communes/details",
    "/communes/crime",
    "/communes/names",
    "/rankings",
    "/search",
    "/migrants",
    "/qpv",
    "/subventions",
];

/// Per-route durable persistence policy.
///
/// A route matches an endpoint when the endpoint's path (query stripped)
/// equals the route or continues it with a further path segment, so
/// `/departements/crime` covers `/departements/crime/history` but not
/// `/departements/crimes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurablePolicy {
    routes: Vec<String>,
}

impl Default for DurablePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DURABLE_ROUTES.iter().map(ToString::to_string))
    }
}

impl DurablePolicy {
    /// Build a policy from route paths
    pub fn new(routes: impl IntoIterator<Item = String>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|r| r.trim_end_matches('/').to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }

    /// Policy that never persists
    #[must_use]
    pub fn memory_only() -> Self {
        Self { routes: Vec::new() }
    }

    /// Configured routes
    #[must_use]
    pub fn routes(&self) -> &[String] {
        &self.routes
    }

    /// Resolve persistence for `endpoint`; an explicit choice always wins
    #[must_use]
    pub fn resolve(&self, endpoint: &str, explicit: Option<Persistence>) -> Persistence {
        if let Some(choice) = explicit {
            return choice;
        }
        let path = endpoint_path(endpoint);
        if self.routes.iter().any(|route| route_matches(route, path)) {
            Persistence::Durable
        } else {
            Persistence::MemoryOnly
        }
    }
}

fn endpoint_path(endpoint: &str) -> &str {
    let end = endpoint.find(['?', '#']).unwrap_or(endpoint.len());
    endpoint[..end].trim_end_matches('/')
}

fn route_matches(route: &str, path: &str) -> bool {
    path.strip_prefix(route)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_lookups_are_durable() {
        let policy = DurablePolicy::default();
        assert_eq!(
            policy.resolve("/departements/details?dept=75", None),
            Persistence::Durable
        );
        assert_eq!(policy.resolve("/country/details", None), Persistence::Durable);
    }

    #[test]
    fn nested_series_match_their_family() {
        let policy = DurablePolicy::default();
        assert_eq!(
            policy.resolve("/departements/crime/history?dept=13", None),
            Persistence::Durable
        );
        assert_eq!(
            policy.resolve("/departements/crimes", None),
            Persistence::MemoryOnly
        );
    }

    #[test]
    fn unlisted_routes_stay_in_memory() {
        let policy = DurablePolicy::default();
        assert_eq!(
            policy.resolve("/departements/contacts?dept=75", None),
            Persistence::MemoryOnly
        );
        assert_eq!(policy.resolve("/articles/latest", None), Persistence::MemoryOnly);
    }

    #[test]
    fn explicit_choice_overrides_routes() {
        let policy = DurablePolicy::default();
        assert_eq!(
            policy.resolve("/rankings", Some(Persistence::MemoryOnly)),
            Persistence::MemoryOnly
        );
        assert_eq!(
            DurablePolicy::memory_only().resolve("/anything", Some(Persistence::Durable)),
            Persistence::Durable
        );
    }

    #[test]
    fn trailing_slashes_are_ignored() {
        let policy = DurablePolicy::new(vec!["/search/".to_string(), String::new()]);
        assert_eq!(policy.routes(), ["/search"]);
        assert_eq!(policy.resolve("/search/?q=lyon", None), Persistence::Durable);
    }
}
