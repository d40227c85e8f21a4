use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::error::AppResult;
use crate::tprintln;

use super::session::{gen_token, AuthChange, Session, UserId};

/// Narrow contract over the hosted identity service. The provider owns
/// session issuance, refresh and revocation; the resolver only observes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Latest valid session, if any (async, one-shot).
    async fn current_session(&self) -> AppResult<Option<Session>>;
    /// Destroy the current session; subscribers see a SignedOut change.
    async fn sign_out(&self) -> AppResult<()>;
    /// Session-change feed. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

/// Narrow contract over the profile table. Idempotent and safe to retry.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Role column of the user's profile row. Ok(None) covers both a
    /// missing row and a null column; callers default the role either way.
    async fn fetch_role(&self, user_id: &str) -> AppResult<Option<String>>;
}

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// In-process identity provider: issues opaque tokens, keeps at most one
/// live session, and optionally persists it to disk so a restart restores
/// the signed-in state the way the hosted provider's local storage does.
pub struct LocalIdentityProvider {
    current: RwLock<Option<Session>>,
    changes: broadcast::Sender<AuthChange>,
    persist: Option<PathBuf>,
    ttl: chrono::Duration,
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            current: RwLock::new(None),
            changes,
            persist: None,
            ttl: chrono::Duration::hours(1),
        }
    }

    /// Like `new`, but restores a previously persisted session (if still
    /// valid) and keeps the file in sync on every change.
    pub fn with_persistence<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let restored = load_persisted(&path);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            current: RwLock::new(restored),
            changes,
            persist: Some(path),
            ttl: chrono::Duration::hours(1),
        }
    }

    /// Issue a session for the given user and notify subscribers.
    pub fn sign_in(&self, user_id: &str, email: Option<&str>) -> Session {
        let now = Utc::now();
        let sess = Session {
            user_id: user_id.to_string(),
            email: email.map(|e| e.to_string()),
            access_token: gen_token(),
            issued_at: now,
            expires_at: Some(now + self.ttl),
        };
        *self.current.write() = Some(sess.clone());
        self.save(Some(&sess));
        let _ = self.changes.send(AuthChange::SignedIn(sess.clone()));
        tprintln!("auth.sign_in user={}", sess.user_id);
        sess
    }

    /// Issue a session for a brand new user id.
    pub fn sign_in_new(&self, email: Option<&str>) -> Session {
        let user_id = uuid::Uuid::new_v4().to_string();
        self.sign_in(&user_id, email)
    }

    /// Rotate the access token of the live session, keeping the same user.
    pub fn refresh_token(&self) -> Option<Session> {
        let refreshed = {
            let mut guard = self.current.write();
            let sess = guard.as_mut()?;
            let now = Utc::now();
            sess.access_token = gen_token();
            sess.issued_at = now;
            sess.expires_at = Some(now + self.ttl);
            sess.clone()
        };
        self.save(Some(&refreshed));
        let _ = self.changes.send(AuthChange::TokenRefreshed(refreshed.clone()));
        Some(refreshed)
    }

    /// Simulate provider-side expiry: the session disappears and
    /// subscribers see a SignedOut change, as on token revocation.
    pub fn expire_session(&self) {
        let had = self.current.write().take();
        if let Some(sess) = had {
            self.save(None);
            let _ = self.changes.send(AuthChange::SignedOut);
            tprintln!("auth.expire user={}", sess.user_id);
        }
    }

    fn save(&self, sess: Option<&Session>) {
        let Some(path) = &self.persist else { return };
        // Persistence is best-effort, matching browser-local storage: a
        // failed write degrades to an unrestored session, never an error.
        let outcome = match sess {
            Some(s) => serde_json::to_vec(s)
                .map_err(std::io::Error::other)
                .and_then(|bytes| std::fs::write(path, bytes)),
            None => match std::fs::remove_file(path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        };
        if let Err(e) = outcome {
            tracing::debug!(target: "texloom::identity", "session persistence failed at {:?}: {}", path, e);
        }
    }
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn load_persisted(path: &std::path::Path) -> Option<Session> {
    let bytes = std::fs::read(path).ok()?;
    let sess: Session = serde_json::from_slice(&bytes).ok()?;
    if sess.is_expired() {
        return None;
    }
    Some(sess)
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn current_session(&self) -> AppResult<Option<Session>> {
        // Prune an expired session on read rather than holding it live
        let expired = matches!(&*self.current.read(), Some(s) if s.is_expired());
        if expired {
            *self.current.write() = None;
            self.save(None);
            return Ok(None);
        }
        Ok(self.current.read().clone())
    }

    async fn sign_out(&self) -> AppResult<()> {
        let had = self.current.write().take();
        if let Some(sess) = had {
            self.save(None);
            let _ = self.changes.send(AuthChange::SignedOut);
            tprintln!("auth.sign_out user={}", sess.user_id);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}

/// In-memory profile table keyed by user id, storing the raw role strings
/// the persisted schema uses (including the legacy `general_user`).
pub struct MemoryProfileStore {
    roles: RwLock<HashMap<UserId, String>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self { roles: RwLock::new(HashMap::new()) }
    }

    pub fn set_role(&self, user_id: &str, role: &str) {
        self.roles.write().insert(user_id.to_string(), role.to_string());
    }

    pub fn remove(&self, user_id: &str) {
        self.roles.write().remove(user_id);
    }
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileProvider for MemoryProfileStore {
    async fn fetch_role(&self, user_id: &str) -> AppResult<Option<String>> {
        Ok(self.roles.read().get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_broadcasts_and_is_current() {
        let provider = LocalIdentityProvider::new();
        let mut rx = provider.subscribe();
        let sess = provider.sign_in("user-1", Some("one@example.com"));
        assert_eq!(provider.current_session().await.unwrap(), Some(sess.clone()));
        match rx.try_recv().unwrap() {
            AuthChange::SignedIn(s) => assert_eq!(s.user_id, "user-1"),
            other => panic!("unexpected change: {:?}", other),
        }
    }

    #[tokio::test]
    async fn sign_out_clears_and_broadcasts() {
        let provider = LocalIdentityProvider::new();
        let _ = provider.sign_in("user-1", None);
        let mut rx = provider.subscribe();
        provider.sign_out().await.unwrap();
        assert_eq!(provider.current_session().await.unwrap(), None);
        assert!(matches!(rx.try_recv().unwrap(), AuthChange::SignedOut));
        // A second sign-out has nothing to do and stays silent
        provider.sign_out().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn refresh_keeps_user_and_rotates_token() {
        let provider = LocalIdentityProvider::new();
        let first = provider.sign_in("user-1", None);
        let refreshed = provider.refresh_token().unwrap();
        assert_eq!(refreshed.user_id, "user-1");
        assert_ne!(refreshed.access_token, first.access_token);
    }

    #[tokio::test]
    async fn persisted_session_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let provider = LocalIdentityProvider::with_persistence(&path);
        let sess = provider.sign_in("user-1", Some("one@example.com"));
        drop(provider);

        let restored = LocalIdentityProvider::with_persistence(&path);
        assert_eq!(restored.current_session().await.unwrap(), Some(sess));

        restored.sign_out().await.unwrap();
        assert!(!path.exists());
        let after = LocalIdentityProvider::with_persistence(&path);
        assert_eq!(after.current_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_profiles_return_raw_strings() {
        let store = MemoryProfileStore::new();
        store.set_role("u1", "general_user");
        assert_eq!(store.fetch_role("u1").await.unwrap().as_deref(), Some("general_user"));
        assert_eq!(store.fetch_role("missing").await.unwrap(), None);
    }
}
