//! Session & role resolution state machine.
//!
//! A single reducer task owns every mutation of the resolved identity:
//! provider notifications and role-fetch completions funnel through one
//! event channel and are applied in arrival order. Consumers read
//! committed snapshots from a watch channel and re-render on change.
//! In-flight role fetches are tagged with the epoch and user id they were
//! issued for; a completion whose tag no longer matches is discarded, so a
//! slow response for a previous user can never clobber the current one.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ResolverConfig;
use crate::error::AppResult;
use crate::routes::{
    home_path, NavigationIntent, PathSource, RouteAccess, RouteTable, AUTH_PATH, DASHBOARD_PATH,
    ROOT_PATH,
};

use super::authorizer::{self, RouteDecision};
use super::principal::{Principal, Role};
use super::provider::{IdentityProvider, ProfileProvider};
use super::session::{AuthChange, Session, UserId};

/// Coarse resolver phase, derivable from the (session, role, loading) tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Initializing,
    Anonymous,
    ResolvingRole,
    Authenticated,
}

/// The committed (session, role, loading) snapshot.
/// Invariants: role is Some iff session is Some and its fetch completed;
/// loading is true exactly during Initializing and ResolvingRole; a role is
/// never observable without its session.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub session: Option<Session>,
    pub role: Option<Role>,
    pub loading: bool,
}

impl ResolvedIdentity {
    fn initializing() -> Self {
        Self { session: None, role: None, loading: true }
    }

    fn anonymous() -> Self {
        Self { session: None, role: None, loading: false }
    }

    fn resolving(session: Session) -> Self {
        Self { session: Some(session), role: None, loading: true }
    }

    pub fn phase(&self) -> AuthPhase {
        match (&self.session, &self.role, self.loading) {
            (None, _, true) => AuthPhase::Initializing,
            (None, _, false) => AuthPhase::Anonymous,
            (Some(_), None, _) => AuthPhase::ResolvingRole,
            (Some(_), Some(_), _) => AuthPhase::Authenticated,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }

    /// The resolved (user, role) pair, available only once authenticated.
    pub fn principal(&self) -> Option<Principal> {
        let session = self.session.as_ref()?;
        let role = self.role?;
        Some(Principal { user_id: session.user_id.clone(), role, email: session.email.clone() })
    }
}

enum Event {
    RoleResolved { epoch: u64, user_id: UserId, role: Role },
}

/// Owns the resolver's reducer task. Dropping the handle aborts the task,
/// which releases the provider subscription with it.
pub struct SessionResolver {
    identity: Arc<dyn IdentityProvider>,
    routes: Arc<RouteTable>,
    state_rx: watch::Receiver<ResolvedIdentity>,
    nav_rx: watch::Receiver<Option<NavigationIntent>>,
    task: JoinHandle<()>,
}

impl SessionResolver {
    pub fn spawn(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileProvider>,
        paths: Arc<dyn PathSource>,
        routes: RouteTable,
        cfg: ResolverConfig,
    ) -> Self {
        let routes = Arc::new(routes);
        let (state_tx, state_rx) = watch::channel(ResolvedIdentity::initializing());
        let (nav_tx, nav_rx) = watch::channel(None::<NavigationIntent>);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        // Subscribe before the initial session fetch so a change arriving
        // mid-fetch is queued rather than lost.
        let changes = identity.subscribe();
        let core = Core {
            state: ResolvedIdentity::initializing(),
            epoch: 0,
            state_tx,
            nav_tx,
            events_tx,
            profiles,
            paths,
            routes: routes.clone(),
            cfg,
        };
        let task = tokio::spawn(run_loop(core, identity.clone(), changes, events_rx));
        Self { identity, routes, state_rx, nav_rx, task }
    }

    /// Latest committed snapshot.
    pub fn snapshot(&self) -> ResolvedIdentity {
        self.state_rx.borrow().clone()
    }

    /// Reactive snapshot feed for route guards and the navigation header.
    pub fn watch_identity(&self) -> watch::Receiver<ResolvedIdentity> {
        self.state_rx.clone()
    }

    /// Navigation intent feed for the router. The channel holds the latest
    /// intent only: a not-yet-applied intent is superseded by a newer one.
    pub fn watch_navigation(&self) -> watch::Receiver<Option<NavigationIntent>> {
        self.nav_rx.clone()
    }

    pub async fn sign_out(&self) -> AppResult<()> {
        self.identity.sign_out().await
    }

    pub fn can_access(&self, path: &str, required: Role) -> bool {
        authorizer::can_access(&self.snapshot(), &self.routes, path, required)
    }

    pub fn decide_route(&self, path: &str) -> RouteDecision {
        authorizer::decide_route(&self.snapshot(), &self.routes, path)
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for SessionResolver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Core {
    state: ResolvedIdentity,
    /// Bumped on every session transition; tags in-flight role fetches.
    epoch: u64,
    state_tx: watch::Sender<ResolvedIdentity>,
    nav_tx: watch::Sender<Option<NavigationIntent>>,
    events_tx: mpsc::UnboundedSender<Event>,
    profiles: Arc<dyn ProfileProvider>,
    paths: Arc<dyn PathSource>,
    routes: Arc<RouteTable>,
    cfg: ResolverConfig,
}

async fn run_loop(
    mut core: Core,
    identity: Arc<dyn IdentityProvider>,
    mut changes: broadcast::Receiver<AuthChange>,
    mut events: mpsc::UnboundedReceiver<Event>,
) {
    // Bounded wait for the persisted session; an unreachable provider
    // degrades to Anonymous so unauthenticated pages stay usable.
    match tokio::time::timeout(core.cfg.init_timeout, identity.current_session()).await {
        Ok(Ok(Some(session))) => {
            debug!(target: "texloom::resolver", "startup session for user {}", session.user_id);
            core.begin_resolving(session);
        }
        Ok(Ok(None)) => core.to_anonymous(),
        Ok(Err(e)) => {
            error!(target: "texloom::resolver", "identity provider failed at startup: {}; continuing unauthenticated", e);
            core.to_anonymous();
        }
        Err(_) => {
            error!(target: "texloom::resolver", "identity provider gave no answer within {:?}; continuing unauthenticated", core.cfg.init_timeout);
            core.to_anonymous();
        }
    }

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => core.on_change(change),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(target: "texloom::resolver", "session-change feed lagged, {} notifications dropped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(event) = events.recv() => core.on_event(event),
        }
    }
}

impl Core {
    /// Commit the working state if it differs from the last committed
    /// snapshot. Returns whether a transition actually happened; navigation
    /// intents are only emitted on true transitions.
    fn commit(&mut self) -> bool {
        let snap = self.state.clone();
        self.state_tx.send_if_modified(move |cur| {
            if *cur != snap {
                *cur = snap;
                true
            } else {
                false
            }
        })
    }

    fn push_nav(&self, intent: NavigationIntent) {
        debug!(target: "texloom::resolver", "navigation intent: {} (replace={})", intent.target, intent.replace);
        let _ = self.nav_tx.send(Some(intent));
    }

    fn on_change(&mut self, change: AuthChange) {
        match change {
            AuthChange::SignedIn(session) => {
                if self.state.user_id() == Some(session.user_id.as_str()) {
                    // Same principal: refresh the cached copy, keep the
                    // resolved role and any in-flight fetch.
                    self.state.session = Some(session);
                    self.commit();
                } else {
                    self.begin_resolving(session);
                }
            }
            AuthChange::TokenRefreshed(session) => {
                if self.state.user_id() == Some(session.user_id.as_str()) {
                    self.state.session = Some(session);
                    self.commit();
                } else {
                    // Refresh for a user we are not tracking: account switch
                    self.begin_resolving(session);
                }
            }
            AuthChange::SignedOut => self.to_anonymous(),
        }
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::RoleResolved { epoch, user_id, role } => {
                if epoch != self.epoch || self.state.user_id() != Some(user_id.as_str()) {
                    debug!(target: "texloom::resolver", "discarding stale role fetch for user {}", user_id);
                    return;
                }
                self.state.role = Some(role);
                self.state.loading = false;
                if self.commit() {
                    info!(target: "texloom::resolver", "user {} authenticated as {}", user_id, role);
                    self.nav_after_authenticated(role);
                }
            }
        }
    }

    /// Enter ResolvingRole for a fresh session and start its tagged fetch.
    fn begin_resolving(&mut self, session: Session) {
        self.epoch += 1;
        let epoch = self.epoch;
        let user_id = session.user_id.clone();
        self.state = ResolvedIdentity::resolving(session);
        self.commit();

        let profiles = self.profiles.clone();
        let events = self.events_tx.clone();
        let cfg = self.cfg.clone();
        tokio::spawn(async move {
            let role = resolve_role(profiles.as_ref(), &user_id, &cfg).await;
            let _ = events.send(Event::RoleResolved { epoch, user_id, role });
        });
    }

    fn to_anonymous(&mut self) {
        // Bump the epoch so an in-flight role fetch cannot resurrect a role
        // for a now-anonymous visitor.
        self.epoch += 1;
        self.state = ResolvedIdentity::anonymous();
        if self.commit() {
            let path = self.paths.current_path();
            if !matches!(self.routes.access_for(&path), RouteAccess::Public) {
                self.push_nav(NavigationIntent::replace(AUTH_PATH));
            }
        }
    }

    fn nav_after_authenticated(&self, role: Role) {
        let path = self.paths.current_path();
        if path == ROOT_PATH || path == DASHBOARD_PATH || path == AUTH_PATH {
            let home = home_path(role);
            if home != path {
                self.push_nav(NavigationIntent::replace(home));
            }
        }
    }
}

/// Fetch and normalize the user's role, retrying transient failures with
/// capped exponential backoff. Every failure mode lands on a concrete role:
/// definitive misses (no row, RLS denial) and exhausted retries both
/// default to the least-privileged User, never an elevated role and never
/// a blocking error.
async fn resolve_role(profiles: &dyn ProfileProvider, user_id: &str, cfg: &ResolverConfig) -> Role {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match tokio::time::timeout(cfg.fetch_timeout, profiles.fetch_role(user_id)).await {
            Ok(Ok(raw)) => return Role::from_profile(raw.as_deref()),
            Ok(Err(e)) if !e.retryable() => {
                warn!(target: "texloom::resolver", "role fetch for user {} denied or missing ({}); defaulting to user", user_id, e);
                return Role::User;
            }
            Ok(Err(e)) => {
                warn!(target: "texloom::resolver", "role fetch attempt {}/{} for user {} failed: {}", attempt, cfg.fetch_attempts, user_id, e);
            }
            Err(_) => {
                warn!(target: "texloom::resolver", "role fetch attempt {}/{} for user {} timed out after {:?}", attempt, cfg.fetch_attempts, user_id, cfg.fetch_timeout);
            }
        }
        if attempt >= cfg.fetch_attempts {
            warn!(target: "texloom::resolver", "role fetch for user {} exhausted {} attempts; defaulting to user", user_id, cfg.fetch_attempts);
            return Role::User;
        }
        tokio::time::sleep(cfg.backoff_delay(attempt)).await;
    }
}
