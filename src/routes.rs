//! Declarative route table for the marketplace client.
//! Paths are classified by the access they require; the guard layer and the
//! resolver's navigation policy both consult this table instead of branching
//! on paths inline.

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::identity::Role;

pub const ROOT_PATH: &str = "/";
pub const AUTH_PATH: &str = "/auth";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const ADMIN_HOME_PATH: &str = "/admin/dashboard";
pub const CONTRIBUTOR_HOME_PATH: &str = "/contributor/dashboard";

/// Landing view for a resolved role, used by the post-auth redirect.
pub fn home_path(role: Role) -> &'static str {
    match role {
        Role::Admin => ADMIN_HOME_PATH,
        Role::Contributor => CONTRIBUTOR_HOME_PATH,
        Role::User => DASHBOARD_PATH,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Reachable without a session.
    Public,
    /// Requires a session, any role.
    Authenticated,
    /// Requires a session with exactly this role.
    Role(Role),
}

#[derive(Debug, Clone)]
enum PathPattern {
    Exact(String),
    /// Matches the prefix itself and anything nested beneath it.
    Subtree(String),
}

impl PathPattern {
    fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix("/*") {
            Some(prefix) => PathPattern::Subtree(prefix.to_string()),
            None => PathPattern::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(p) => path == p,
            PathPattern::Subtree(prefix) => {
                path == prefix || path.strip_prefix(prefix.as_str()).is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<(PathPattern, RouteAccess)>,
    /// Applied when no rule matches. The marketplace treats unknown paths as
    /// requiring a session, mirroring the redirect-everything-else behavior.
    fallback: RouteAccess,
}

impl RouteTable {
    pub fn new(fallback: RouteAccess) -> Self {
        Self { rules: Vec::new(), fallback }
    }

    /// Append a rule. Patterns are exact paths or `/subtree/*` wildcards;
    /// first matching rule wins.
    pub fn rule(mut self, pattern: &str, access: RouteAccess) -> Self {
        self.rules.push((PathPattern::parse(pattern), access));
        self
    }

    pub fn access_for(&self, path: &str) -> RouteAccess {
        for (pattern, access) in &self.rules {
            if pattern.matches(path) {
                return *access;
            }
        }
        self.fallback
    }

    /// The route inventory of the marketplace application.
    pub fn marketplace() -> &'static RouteTable {
        static MARKETPLACE: Lazy<RouteTable> = Lazy::new(|| {
            RouteTable::new(RouteAccess::Authenticated)
                .rule(ROOT_PATH, RouteAccess::Public)
                .rule(AUTH_PATH, RouteAccess::Public)
                .rule(DASHBOARD_PATH, RouteAccess::Authenticated)
                .rule("/designs", RouteAccess::Authenticated)
                .rule("/pricing", RouteAccess::Authenticated)
                .rule("/contact", RouteAccess::Authenticated)
                .rule("/about", RouteAccess::Authenticated)
                .rule("/features", RouteAccess::Authenticated)
                .rule("/profile", RouteAccess::Authenticated)
                .rule("/orders", RouteAccess::Authenticated)
                .rule("/chatbot", RouteAccess::Authenticated)
                .rule("/admin/*", RouteAccess::Role(Role::Admin))
                .rule("/contributor/*", RouteAccess::Role(Role::Contributor))
        });
        &MARKETPLACE
    }
}

/// A computed instruction to change the visible route without user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationIntent {
    pub target: String,
    pub replace: bool,
}

impl NavigationIntent {
    pub fn replace<S: Into<String>>(target: S) -> Self {
        Self { target: target.into(), replace: true }
    }

    pub fn push<S: Into<String>>(target: S) -> Self {
        Self { target: target.into(), replace: false }
    }
}

/// Where the visitor currently is. The embedding router keeps this in sync
/// with its location; the resolver only ever reads it.
pub trait PathSource: Send + Sync {
    fn current_path(&self) -> String;
}

/// In-memory path holder for tests and the demo binary.
pub struct MemoryPath {
    path: RwLock<String>,
}

impl MemoryPath {
    pub fn new(initial: &str) -> Self {
        Self { path: RwLock::new(initial.to_string()) }
    }

    pub fn set<S: Into<String>>(&self, path: S) {
        *self.path.write() = path.into();
    }

    /// Apply a navigation intent the way a history-backed router would.
    pub fn apply(&self, intent: &NavigationIntent) {
        self.set(intent.target.clone());
    }
}

impl PathSource for MemoryPath {
    fn current_path(&self) -> String {
        self.path.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_subtree_matching() {
        let table = RouteTable::marketplace();
        assert_eq!(table.access_for("/"), RouteAccess::Public);
        assert_eq!(table.access_for("/auth"), RouteAccess::Public);
        assert_eq!(table.access_for("/dashboard"), RouteAccess::Authenticated);
        assert_eq!(table.access_for("/admin/dashboard"), RouteAccess::Role(Role::Admin));
        assert_eq!(table.access_for("/admin/users"), RouteAccess::Role(Role::Admin));
        assert_eq!(table.access_for("/admin"), RouteAccess::Role(Role::Admin));
        assert_eq!(table.access_for("/contributor/upload-design"), RouteAccess::Role(Role::Contributor));
    }

    #[test]
    fn subtree_does_not_match_sibling_prefixes() {
        let table = RouteTable::marketplace();
        // "/administrator" must not fall under "/admin/*"
        assert_eq!(table.access_for("/administrator"), RouteAccess::Authenticated);
    }

    #[test]
    fn unknown_paths_use_fallback() {
        let table = RouteTable::marketplace();
        assert_eq!(table.access_for("/no-such-page"), RouteAccess::Authenticated);
    }

    #[test]
    fn home_paths_per_role() {
        assert_eq!(home_path(Role::Admin), "/admin/dashboard");
        assert_eq!(home_path(Role::Contributor), "/contributor/dashboard");
        assert_eq!(home_path(Role::User), "/dashboard");
    }

    #[test]
    fn memory_path_applies_intents() {
        let p = MemoryPath::new("/");
        p.apply(&NavigationIntent::replace("/auth"));
        assert_eq!(p.current_path(), "/auth");
    }
}
