//! Pure route-guard policy over the latest resolved identity snapshot.
//! The router asks for a decision and substitutes views accordingly; a
//! denial never changes the URL and never raises an error.

use crate::routes::{RouteAccess, RouteTable};

use super::principal::Role;
use super::resolver::{AuthPhase, ResolvedIdentity};

/// Outcome of matching the current identity against a path's requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Identity still settling; show the loading view.
    Pending,
    /// The requested view may render.
    Render,
    /// Signed in but lacking the required role; render the access-denied
    /// substitute at the same URL.
    Denied { required: Role },
    /// The view requires a session and there is none.
    RedirectToAuth,
}

pub fn decide_route(identity: &ResolvedIdentity, table: &RouteTable, path: &str) -> RouteDecision {
    match identity.phase() {
        AuthPhase::Initializing | AuthPhase::ResolvingRole => RouteDecision::Pending,
        AuthPhase::Anonymous => match table.access_for(path) {
            RouteAccess::Public => RouteDecision::Render,
            RouteAccess::Authenticated | RouteAccess::Role(_) => RouteDecision::RedirectToAuth,
        },
        AuthPhase::Authenticated => match table.access_for(path) {
            RouteAccess::Public | RouteAccess::Authenticated => RouteDecision::Render,
            RouteAccess::Role(required) => {
                if identity.role == Some(required) {
                    RouteDecision::Render
                } else {
                    RouteDecision::Denied { required }
                }
            }
        },
    }
}

/// True only for a settled Authenticated snapshot whose role is exactly
/// `required` and consistent with what the route table demands for `path`.
/// False in every other state, including while a role fetch is in flight.
pub fn can_access(identity: &ResolvedIdentity, table: &RouteTable, path: &str, required: Role) -> bool {
    if identity.loading || identity.phase() != AuthPhase::Authenticated {
        return false;
    }
    if identity.role != Some(required) {
        return false;
    }
    match table.access_for(path) {
        RouteAccess::Role(r) => r == required,
        _ => true,
    }
}
