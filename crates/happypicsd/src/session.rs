//! Per-session state: auth, chart toggles and the in-memory history.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use happypics_auth::AuthState;
use happypics_store::VolatileHistory;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which charts the page renders. Each toggles independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartToggles {
    #[serde(default)]
    pub confidence: bool,
    #[serde(default)]
    pub proportions: bool,
    #[serde(default)]
    pub trends: bool,
}

/// Everything one browser/CLI session owns between requests.
///
/// Created when the session starts, dropped when it ends or sits idle past
/// the registry's TTL.
#[derive(Debug)]
pub struct SessionContext {
    pub auth: AuthState,
    pub toggles: ChartToggles,
    /// History of the unauthenticated variant, including its last-upload cache.
    pub history: VolatileHistory,
    last_seen: Instant,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            auth: AuthState::default(),
            toggles: ChartToggles::default(),
            history: VolatileHistory::default(),
            last_seen: Instant::now(),
        }
    }
}

impl SessionContext {
    /// Back to Anonymous with toggles and the last-upload cache reset.
    ///
    /// Records are untouched: only an explicit clear deletes history.
    pub fn logout(&mut self) {
        self.auth.logout();
        self.toggles = ChartToggles::default();
        self.history.forget_last_upload();
    }
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, SessionContext>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    /// Sessions untouched for longer than `idle_ttl` are dropped.
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, SessionContext>> {
        // A panic while holding the lock leaves plain data behind; keep serving.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock the map after dropping every session idle as of `now`.
    fn lock_live(&self, now: Instant) -> MutexGuard<'_, HashMap<Uuid, SessionContext>> {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, ctx| now.saturating_duration_since(ctx.last_seen) <= self.idle_ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "idle sessions expired");
        }
        sessions
    }

    /// Drop idle sessions, returning how many were removed.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    fn evict_idle_at(&self, now: Instant) -> usize {
        let before = self.lock().len();
        let after = self.lock_live(now).len();
        before.saturating_sub(after)
    }

    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.lock_live(Instant::now()).insert(id, SessionContext::default());
        tracing::info!(session = %id, "session started");
        id
    }

    /// End a session, dropping its context. Returns whether it existed.
    pub fn remove(&self, id: &Uuid) -> bool {
        let existed = self.lock().remove(id).is_some();
        if existed {
            tracing::info!(session = %id, "session ended");
        }
        existed
    }

    /// Run `f` on the session's context, or return `None` if it doesn't
    /// exist or has expired. Counts as activity for the session.
    pub fn with<R>(&self, id: &Uuid, f: impl FnOnce(&mut SessionContext) -> R) -> Option<R> {
        let now = Instant::now();
        self.lock_live(now).get_mut(id).map(|ctx| {
            ctx.last_seen = now;
            f(ctx)
        })
    }

    pub fn len(&self) -> usize {
        self.lock_live(Instant::now()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use happypics_auth::Identity;
    use happypics_core::{EmotionLabel, EmotionScore};
    use happypics_store::HistoryStore;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_create_and_remove() {
        let registry = SessionRegistry::new(HOUR);
        let id = registry.create();
        assert_eq!(registry.len(), 1);
        assert!(registry.with(&id, |_| ()).is_some());
        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(registry.with(&id, |_| ()).is_none());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let registry = SessionRegistry::new(HOUR);
        let a = registry.create();
        let b = registry.create();
        registry.with(&a, |s| s.toggles.trends = true);
        assert_eq!(registry.with(&b, |s| s.toggles), Some(ChartToggles::default()));
    }

    #[test]
    fn test_idle_session_evicted() {
        let registry = SessionRegistry::new(Duration::from_secs(60));
        let id = registry.create();
        assert_eq!(registry.evict_idle_at(Instant::now() + Duration::from_secs(30)), 0);
        assert_eq!(registry.evict_idle_at(Instant::now() + Duration::from_secs(61)), 1);
        assert!(registry.with(&id, |_| ()).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_expired_sessions_swept_on_create() {
        let registry = SessionRegistry::new(Duration::from_millis(20));
        let stale = registry.create();
        std::thread::sleep(Duration::from_millis(60));
        let fresh = registry.create();
        assert!(registry.with(&stale, |_| ()).is_none());
        assert!(registry.with(&fresh, |_| ()).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_activity_keeps_session_alive() {
        let registry = SessionRegistry::new(Duration::from_millis(500));
        let id = registry.create();
        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(100));
            assert!(registry.with(&id, |_| ()).is_some());
        }
    }

    #[test]
    fn test_logout_keeps_records() {
        let mut ctx = SessionContext::default();
        ctx.auth
            .finish_login(Ok(Identity::new("alice@example.com")))
            .unwrap();
        ctx.toggles = ChartToggles { confidence: true, proportions: true, trends: true };
        let sad = EmotionScore::new(EmotionLabel::Sad, 0.4).unwrap();
        ctx.history.append(None, vec![1], sad).unwrap();

        ctx.logout();

        assert_eq!(ctx.auth, AuthState::Anonymous);
        assert_eq!(ctx.toggles, ChartToggles::default());
        assert_eq!(ctx.history.count(None).unwrap(), 1);
        // The last-upload cache is gone, so the same bytes are stored again
        ctx.history.append(None, vec![1], sad).unwrap();
        assert_eq!(ctx.history.count(None).unwrap(), 2);
    }

    #[test]
    fn test_toggles_partial_json() {
        let toggles: ChartToggles = serde_json::from_str(r#"{"trends":true}"#).unwrap();
        assert_eq!(toggles, ChartToggles { confidence: false, proportions: false, trends: true });
    }
}
