use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use texloom::config::ResolverConfig;
use texloom::identity::{
    AuthPhase, LocalIdentityProvider, MemoryProfileStore, ResolvedIdentity, Role, SessionResolver,
};
use texloom::routes::{MemoryPath, PathSource, RouteTable};

/// Wait until the resolver settles into the expected phase.
async fn wait_for_phase(
    rx: &mut tokio::sync::watch::Receiver<ResolvedIdentity>,
    phase: AuthPhase,
) -> anyhow::Result<ResolvedIdentity> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            {
                let snap = rx.borrow_and_update();
                if snap.phase() == phase {
                    return Ok::<ResolvedIdentity, anyhow::Error>(snap.clone());
                }
            }
            rx.changed().await?;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("resolver did not reach {:?} within {:?}", phase, deadline))?
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let session_file =
        std::env::var("TEXLOOM_SESSION_FILE").unwrap_or_else(|_| ".texloom-session.json".to_string());
    info!(
        target: "texloom",
        "texloom demo starting: RUST_LOG='{}', session_file='{}'",
        rust_log, session_file
    );

    let cfg = ResolverConfig::from_env();
    let identity = Arc::new(LocalIdentityProvider::with_persistence(&session_file));
    let profiles = Arc::new(MemoryProfileStore::new());
    let paths = Arc::new(MemoryPath::new("/"));

    // Seed a profile table: one contributor, one admin; anyone else defaults
    profiles.set_role("carla", "contributor");
    profiles.set_role("ada", "admin");

    let resolver = SessionResolver::spawn(
        identity.clone(),
        profiles.clone(),
        paths.clone(),
        RouteTable::marketplace().clone(),
        cfg,
    );
    let mut identities = resolver.watch_identity();
    let mut navs = resolver.watch_navigation();

    // Startup settles either on a restored session or on Anonymous
    loop {
        let phase = identities.borrow_and_update().phase();
        if phase == AuthPhase::Anonymous || phase == AuthPhase::Authenticated {
            info!(target: "texloom", "startup settled in {:?}", phase);
            break;
        }
        identities.changed().await?;
    }

    // Walk: contributor signs in, lands on their dashboard
    identity.sign_in("carla", Some("carla@example.com"));
    let resolved = wait_for_phase(&mut identities, AuthPhase::Authenticated).await?;
    info!(target: "texloom", "signed in: {:?}", resolved.principal());
    if tokio::time::timeout(Duration::from_millis(500), navs.changed()).await.is_ok() {
        if let Some(intent) = navs.borrow_and_update().clone() {
            paths.apply(&intent);
            info!(target: "texloom", "router applied {:?}, now at {}", intent, paths.current_path());
        }
    }

    // Account switch without reload: admin takes over the same client
    identity.sign_in("ada", Some("ada@example.com"));
    let resolved = wait_for_phase(&mut identities, AuthPhase::Authenticated).await?;
    info!(target: "texloom", "switched account: {:?}", resolved.principal());

    info!(
        target: "texloom",
        "guards: admin dashboard accessible={}, contributor dashboard accessible={}",
        resolver.can_access("/admin/dashboard", Role::Admin),
        resolver.can_access("/contributor/dashboard", Role::Contributor),
    );
    info!(target: "texloom", "decision for /contributor/dashboard: {:?}", resolver.decide_route("/contributor/dashboard"));

    // Sign out: back to Anonymous, guarded paths redirect to /auth
    resolver.sign_out().await?;
    let resolved = wait_for_phase(&mut identities, AuthPhase::Anonymous).await?;
    info!(target: "texloom", "signed out, phase {:?}", resolved.phase());
    info!(target: "texloom", "decision for /dashboard: {:?}", resolver.decide_route("/dashboard"));

    Ok(())
}
