//! # Session Manager
//!
//! Decides on every start whether the stored session is usable, and owns
//! login, register and logout.
//!
//! ## Bootstrap Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  initialize()                                                           │
//! │    │  in-flight guard: a concurrent caller waits for the running check  │
//! │    ▼                                                                    │
//! │  flags ← Checking (is_loading = true)       ┐                           │
//! │    │                                        │ LoadingGuard resets       │
//! │  read token, refreshToken                   │ is_loading on every exit, │
//! │    │                                        │ including panic and drop  │
//! │  GET /auth/profile (5 s)                    │                           │
//! │    ├── 2xx ─────────────────► Authenticated │                           │
//! │    ├── 401 + refreshToken                   │                           │
//! │    │     POST /auth/refresh (once)          │                           │
//! │    │       ├── ok ──► persist ► Authenticated                           │
//! │    │       └── fail ──────────► purge ► Unauthenticated                 │
//! │    └── anything else ─────────► purge ► Unauthenticated                 │
//! │                                             ┘                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing escapes `initialize()`: every failure, panics included, ends
//! signed out with `token`, `refreshToken` and `user` removed.

use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use shopbill_core::session::{
    AuthGrant, BootstrapOutcome, RefreshedTokens, SessionFlags, REFRESH_TOKEN_KEY, SESSION_KEYS, TOKEN_KEY,
    USER_KEY,
};
use shopbill_core::types::{LoginRequest, Profile, RegisterRequest};
use shopbill_core::validation::{validate_email, validate_password, validate_person_name, validate_phone};
use shopbill_core::ValidationError;

use crate::error::{ClientError, ClientResult};
use crate::storage::SessionStore;

// =============================================================================
// Backend Seam
// =============================================================================

/// The auth routes the session manager needs.
///
/// Implemented by [`ApiClient`](crate::api::ApiClient); tests script it.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// `GET /auth/profile` with the probe deadline. `Ok` means the token was
    /// accepted; the profile is absent when the body was unusable.
    async fn probe_profile(&self, token: &str) -> ClientResult<Option<Profile>>;

    /// `POST /auth/refresh`.
    async fn refresh(&self, refresh_token: &str) -> ClientResult<RefreshedTokens>;

    async fn login(&self, credentials: &LoginRequest) -> ClientResult<AuthGrant>;

    async fn register(&self, registration: &RegisterRequest) -> ClientResult<AuthGrant>;

    async fn logout(&self, token: &str) -> ClientResult<()>;
}

// =============================================================================
// Loading Guard
// =============================================================================

/// Holds `is_loading = true` for its lifetime.
struct LoadingGuard<'a> {
    flags: &'a watch::Sender<SessionFlags>,
}

impl<'a> LoadingGuard<'a> {
    fn enter(flags: &'a watch::Sender<SessionFlags>) -> Self {
        flags.send_modify(|f| *f = f.checking());
        LoadingGuard { flags }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.flags.send_if_modified(|f| {
            if f.is_loading {
                *f = f.abandoned();
                true
            } else {
                false
            }
        });
    }
}

// =============================================================================
// SessionManager
// =============================================================================

/// One per process, shared by `Arc`.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    backend: Arc<dyn AuthBackend>,
    flags: watch::Sender<SessionFlags>,
    /// Serialises bootstrap, login and logout. Holds the last bootstrap
    /// outcome for callers that waited on a running check; login and logout
    /// clear it so a waiter queued behind them checks again.
    in_flight: Mutex<Option<BootstrapOutcome>>,
    completed_runs: AtomicU64,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, backend: Arc<dyn AuthBackend>) -> Self {
        let (flags, _) = watch::channel(SessionFlags::initial());
        SessionManager {
            store,
            backend,
            flags,
            in_flight: Mutex::new(None),
            completed_runs: AtomicU64::new(0),
        }
    }

    /// Current flags.
    pub fn flags(&self) -> SessionFlags {
        *self.flags.borrow()
    }

    /// Receiver that observes every flag change.
    pub fn subscribe(&self) -> watch::Receiver<SessionFlags> {
        self.flags.subscribe()
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    /// Startup session check. Never fails; read the result from [`flags`](Self::flags).
    pub async fn initialize(&self) {
        self.bootstrap().await;
    }

    /// Same as [`initialize`](Self::initialize), returning how it ended.
    ///
    /// A call that overlaps a running bootstrap waits for it and returns its
    /// outcome instead of probing again.
    pub async fn bootstrap(&self) -> BootstrapOutcome {
        let seen = self.completed_runs.load(Ordering::Acquire);
        let mut last = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Session check already running, waiting for it");
                let guard = self.in_flight.lock().await;
                if self.completed_runs.load(Ordering::Acquire) != seen {
                    if let Some(outcome) = *guard {
                        return outcome;
                    }
                }
                guard
            }
        };

        let outcome = self.run_bootstrap().await;
        *last = Some(outcome);
        self.completed_runs.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    async fn run_bootstrap(&self) -> BootstrapOutcome {
        let _loading = LoadingGuard::enter(&self.flags);

        let outcome = match AssertUnwindSafe(self.check_session()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Session check panicked, signing out");
                BootstrapOutcome::ProbeFailedOther
            }
        };

        if !outcome.is_authenticated() && AssertUnwindSafe(self.purge()).catch_unwind().await.is_err() {
            error!("Session purge panicked");
        }

        self.flags.send_replace(outcome.flags());
        info!(outcome = %outcome, "Session check finished");
        outcome
    }

    async fn check_session(&self) -> BootstrapOutcome {
        let token = match self.store.get(TOKEN_KEY).await {
            Ok(Some(token)) if !token.trim().is_empty() => token,
            Ok(_) => {
                debug!("No stored access token");
                return BootstrapOutcome::NoCredentials;
            }
            Err(e) => {
                warn!(error = %e, "Could not read stored access token");
                return BootstrapOutcome::NoCredentials;
            }
        };

        let refresh_token = match self.store.get(REFRESH_TOKEN_KEY).await {
            Ok(value) => value.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                warn!(error = %e, "Could not read stored refresh token");
                None
            }
        };

        match self.backend.probe_profile(&token).await {
            Ok(profile) => {
                if let Some(profile) = profile {
                    self.cache_user(&profile).await;
                }
                BootstrapOutcome::ProbeSucceeded
            }
            Err(e) if e.is_unauthorized() => match refresh_token {
                Some(refresh_token) => self.try_refresh(&refresh_token).await,
                None => {
                    info!("Access token rejected and no refresh token stored");
                    BootstrapOutcome::ProbeFailedAuth
                }
            },
            Err(e) => {
                warn!(error = %e, "Profile probe failed");
                BootstrapOutcome::ProbeFailedOther
            }
        }
    }

    /// The one refresh attempt of a bootstrap.
    async fn try_refresh(&self, refresh_token: &str) -> BootstrapOutcome {
        debug!("Access token rejected, trying refresh");

        let tokens = match self.backend.refresh(refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                return BootstrapOutcome::RefreshFailed;
            }
        };

        match self.persist_tokens(&tokens).await {
            Ok(()) => BootstrapOutcome::RefreshSucceeded,
            Err(e) => {
                warn!(error = %e, "Could not store refreshed tokens");
                BootstrapOutcome::RefreshFailed
            }
        }
    }

    async fn persist_tokens(&self, tokens: &RefreshedTokens) -> ClientResult<()> {
        self.store.set(TOKEN_KEY, &tokens.access_token).await?;
        if let Some(refresh_token) = &tokens.refresh_token {
            self.store.set(REFRESH_TOKEN_KEY, refresh_token).await?;
        }
        Ok(())
    }

    async fn cache_user(&self, profile: &Profile) {
        let stored = match serde_json::to_string(profile) {
            Ok(json) => self.store.set(USER_KEY, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = stored {
            warn!(error = %e, "Could not cache user profile");
        }
    }

    async fn purge(&self) {
        if let Err(e) = self.store.remove_many(&SESSION_KEYS).await {
            warn!(error = %e, "Could not clear stored session");
        }
    }

    // =========================================================================
    // User-Initiated Lifecycle
    // =========================================================================

    /// Signs in. Errors are returned for the screen to show.
    pub async fn login(&self, credentials: &LoginRequest) -> ClientResult<Option<Profile>> {
        if credentials.email.trim().is_empty() {
            return Err(ValidationError::Required { field: "email".into() }.into());
        }
        if credentials.password.is_empty() {
            return Err(ValidationError::Required { field: "password".into() }.into());
        }

        let mut serial = self.in_flight.lock().await;
        *serial = None;
        let grant = self.backend.login(credentials).await?;
        self.accept_grant(grant).await
    }

    /// Creates an account and signs in.
    pub async fn register(&self, registration: &RegisterRequest) -> ClientResult<Option<Profile>> {
        validate_person_name(&registration.name)?;
        validate_email(&registration.email)?;
        validate_password(&registration.password)?;
        if let Some(phone) = registration.phone.as_deref() {
            validate_phone(phone)?;
        }

        let mut serial = self.in_flight.lock().await;
        *serial = None;
        let grant = self.backend.register(registration).await?;
        self.accept_grant(grant).await
    }

    async fn accept_grant(&self, grant: AuthGrant) -> ClientResult<Option<Profile>> {
        if let Err(e) = self.persist_tokens(&grant.tokens).await {
            self.purge().await;
            return Err(e);
        }
        if grant.tokens.refresh_token.is_none() {
            // A stale refresh token from an earlier account must not survive.
            if let Err(e) = self.store.remove_many(&[REFRESH_TOKEN_KEY]).await {
                warn!(error = %e, "Could not clear old refresh token");
            }
        }
        if let Some(user) = &grant.user {
            self.cache_user(user).await;
        }

        self.flags.send_replace(SessionFlags::authenticated());
        info!("Signed in");
        Ok(grant.user)
    }

    /// Signs out. The backend call is best effort; local state is always
    /// cleared.
    pub async fn logout(&self) {
        let mut serial = self.in_flight.lock().await;
        *serial = None;

        if let Ok(Some(token)) = self.store.get(TOKEN_KEY).await {
            if let Err(e) = self.backend.logout(&token).await {
                warn!(error = %e, "Backend logout failed, clearing local session anyway");
            }
        }

        self.purge().await;
        self.flags.send_replace(SessionFlags::unauthenticated());
        info!("Signed out");
    }

    // =========================================================================
    // Token Supply
    // =========================================================================

    /// Current access token for authenticated calls.
    pub async fn access_token(&self) -> ClientResult<String> {
        match self.store.get(TOKEN_KEY).await? {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(ClientError::NotAuthenticated),
        }
    }

    /// The user cached at the last successful probe or login.
    pub async fn cached_user(&self) -> Option<Profile> {
        let json = self.store.get(USER_KEY).await.ok().flatten()?;
        serde_json::from_str(&json).ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use shopbill_core::session::SessionPhase;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    // -------------------------------------------------------------------------
    // Scripted backend
    // -------------------------------------------------------------------------

    #[derive(Clone, Copy)]
    enum Probe {
        Ok,
        /// 200 whose body is not a profile.
        OkUnreadable,
        Unauthorized,
        ServerError,
        Timeout,
        Network,
        /// Waits for `release` and then answers 200.
        Gated,
        /// Never answers.
        Hang,
    }

    #[derive(Clone, Copy)]
    enum Refresh {
        Ok(&'static str, Option<&'static str>),
        MissingToken,
        Rejected,
    }

    struct ScriptedBackend {
        probe: Probe,
        refresh: Refresh,
        probes: AtomicUsize,
        refreshes: AtomicUsize,
        logouts: AtomicUsize,
        release: Notify,
    }

    impl ScriptedBackend {
        fn new(probe: Probe, refresh: Refresh) -> Arc<Self> {
            Arc::new(ScriptedBackend {
                probe,
                refresh,
                probes: AtomicUsize::new(0),
                refreshes: AtomicUsize::new(0),
                logouts: AtomicUsize::new(0),
                release: Notify::new(),
            })
        }

        fn probes(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }

        fn refreshes(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }
    }

    fn profile() -> Profile {
        Profile {
            id: "u1".into(),
            name: "Asha".into(),
            ..Profile::default()
        }
    }

    #[async_trait]
    impl AuthBackend for ScriptedBackend {
        async fn probe_profile(&self, _token: &str) -> ClientResult<Option<Profile>> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            match self.probe {
                Probe::Ok => Ok(Some(profile())),
                Probe::OkUnreadable => Ok(None),
                Probe::Unauthorized => Err(ClientError::from_status(401, "expired")),
                Probe::ServerError => Err(ClientError::from_status(500, "boom")),
                Probe::Timeout => Err(ClientError::Timeout),
                Probe::Network => Err(ClientError::Network("refused".into())),
                Probe::Gated => {
                    self.release.notified().await;
                    Ok(Some(profile()))
                }
                Probe::Hang => std::future::pending().await,
            }
        }

        async fn refresh(&self, _refresh_token: &str) -> ClientResult<RefreshedTokens> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            match self.refresh {
                Refresh::Ok(access, refresh) => Ok(RefreshedTokens {
                    access_token: access.to_string(),
                    refresh_token: refresh.map(str::to_string),
                }),
                Refresh::MissingToken => Err(shopbill_core::CoreError::MissingAccessToken.into()),
                Refresh::Rejected => Err(ClientError::from_status(401, "revoked")),
            }
        }

        async fn login(&self, credentials: &LoginRequest) -> ClientResult<AuthGrant> {
            if credentials.password == "secret" {
                Ok(AuthGrant {
                    tokens: RefreshedTokens {
                        access_token: "T1".into(),
                        refresh_token: Some("R1".into()),
                    },
                    user: Some(profile()),
                })
            } else {
                Err(ClientError::from_status(401, "Invalid credentials"))
            }
        }

        async fn register(&self, _registration: &RegisterRequest) -> ClientResult<AuthGrant> {
            Ok(AuthGrant {
                tokens: RefreshedTokens {
                    access_token: "T-new".into(),
                    refresh_token: None,
                },
                user: None,
            })
        }

        async fn logout(&self, _token: &str) -> ClientResult<()> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::Network("offline".into()))
        }
    }

    // -------------------------------------------------------------------------
    // Misbehaving stores
    // -------------------------------------------------------------------------

    struct BrokenStore {
        panic: bool,
    }

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn get(&self, _key: &str) -> ClientResult<Option<String>> {
            if self.panic {
                panic!("storage exploded");
            }
            Err(ClientError::Storage("disk I/O error".into()))
        }

        async fn set(&self, _key: &str, _value: &str) -> ClientResult<()> {
            Err(ClientError::Storage("disk I/O error".into()))
        }

        async fn remove_many(&self, _keys: &[&str]) -> ClientResult<()> {
            Err(ClientError::Storage("disk I/O error".into()))
        }
    }

    fn stored(entries: &[(&'static str, &'static str)]) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_entries(entries.iter().copied()))
    }

    fn manager(store: Arc<MemoryStore>, backend: Arc<ScriptedBackend>) -> SessionManager {
        SessionManager::new(store, backend)
    }

    fn assert_signed_out(flags: SessionFlags) {
        assert!(!flags.is_authenticated);
        assert!(!flags.token_valid);
        assert!(!flags.is_loading);
        assert_eq!(flags.phase, SessionPhase::Unauthenticated);
    }

    fn assert_signed_in(flags: SessionFlags) {
        assert!(flags.is_authenticated);
        assert!(flags.token_valid);
        assert!(!flags.is_loading);
        assert_eq!(flags.phase, SessionPhase::Authenticated);
    }

    async fn assert_purged(store: &MemoryStore) {
        let entries = store.snapshot().await;
        for key in SESSION_KEYS {
            assert!(!entries.contains_key(key), "{} should be purged", key);
        }
    }

    // -------------------------------------------------------------------------
    // Bootstrap
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_no_token_signs_out_without_probing() {
        let store = stored(&[("user", "{}")]);
        let backend = ScriptedBackend::new(Probe::Ok, Refresh::Rejected);
        let session = manager(store.clone(), backend.clone());

        assert_eq!(session.flags(), SessionFlags::initial());
        session.initialize().await;

        assert_signed_out(session.flags());
        assert_eq!(backend.probes(), 0);
        assert_purged(&store).await;
    }

    #[tokio::test]
    async fn test_valid_token_probe_ok() {
        let store = stored(&[("token", "T1"), ("refreshToken", "R1")]);
        let backend = ScriptedBackend::new(Probe::Ok, Refresh::Rejected);
        let session = manager(store.clone(), backend.clone());

        assert_eq!(session.bootstrap().await, BootstrapOutcome::ProbeSucceeded);

        assert_signed_in(session.flags());
        assert_eq!(backend.probes(), 1);
        assert_eq!(backend.refreshes(), 0);
        assert_eq!(session.access_token().await.unwrap(), "T1");
        assert_eq!(session.cached_user().await.map(|u| u.id), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn test_accepted_token_with_unreadable_profile_stays_signed_in() {
        let store = stored(&[("token", "T1"), ("refreshToken", "R1")]);
        let backend = ScriptedBackend::new(Probe::OkUnreadable, Refresh::Rejected);
        let session = manager(store.clone(), backend.clone());

        assert_eq!(session.bootstrap().await, BootstrapOutcome::ProbeSucceeded);

        assert_signed_in(session.flags());
        assert_eq!(backend.refreshes(), 0);
        let entries = store.snapshot().await;
        assert_eq!(entries.get("token").map(String::as_str), Some("T1"));
        assert_eq!(entries.get("refreshToken").map(String::as_str), Some("R1"));
        assert!(session.cached_user().await.is_none());
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once() {
        let store = stored(&[("token", "T1"), ("refreshToken", "R1")]);
        let backend = ScriptedBackend::new(Probe::Unauthorized, Refresh::Ok("T2", None));
        let session = manager(store.clone(), backend.clone());

        assert_eq!(session.bootstrap().await, BootstrapOutcome::RefreshSucceeded);

        assert_signed_in(session.flags());
        assert_eq!(backend.refreshes(), 1);
        let entries = store.snapshot().await;
        assert_eq!(entries.get("token").map(String::as_str), Some("T2"));
        assert_eq!(entries.get("refreshToken").map(String::as_str), Some("R1"));
    }

    #[tokio::test]
    async fn test_refresh_rotates_refresh_token() {
        let store = stored(&[("token", "T1"), ("refreshToken", "R1")]);
        let backend = ScriptedBackend::new(Probe::Unauthorized, Refresh::Ok("T2", Some("R2")));
        let session = manager(store.clone(), backend);

        session.initialize().await;

        let entries = store.snapshot().await;
        assert_eq!(entries.get("refreshToken").map(String::as_str), Some("R2"));
    }

    #[tokio::test]
    async fn test_failed_refresh_purges() {
        for refresh in [Refresh::Rejected, Refresh::MissingToken] {
            let store = stored(&[("token", "T1"), ("refreshToken", "R1"), ("user", "{}")]);
            let backend = ScriptedBackend::new(Probe::Unauthorized, refresh);
            let session = manager(store.clone(), backend.clone());

            assert_eq!(session.bootstrap().await, BootstrapOutcome::RefreshFailed);

            assert_signed_out(session.flags());
            assert_eq!(backend.refreshes(), 1);
            assert_purged(&store).await;
        }
    }

    #[tokio::test]
    async fn test_401_without_refresh_token_purges() {
        let store = stored(&[("token", "T1"), ("user", "{}")]);
        let backend = ScriptedBackend::new(Probe::Unauthorized, Refresh::Ok("T2", None));
        let session = manager(store.clone(), backend.clone());

        assert_eq!(session.bootstrap().await, BootstrapOutcome::ProbeFailedAuth);

        assert_signed_out(session.flags());
        assert_eq!(backend.refreshes(), 0);
        assert_purged(&store).await;
    }

    #[tokio::test]
    async fn test_other_probe_failures_fail_closed() {
        for probe in [Probe::ServerError, Probe::Timeout, Probe::Network] {
            let store = stored(&[("token", "T1"), ("refreshToken", "R1"), ("user", "{}")]);
            let backend = ScriptedBackend::new(probe, Refresh::Ok("T2", None));
            let session = manager(store.clone(), backend.clone());

            assert_eq!(session.bootstrap().await, BootstrapOutcome::ProbeFailedOther);

            assert_signed_out(session.flags());
            assert_eq!(backend.refreshes(), 0);
            assert_purged(&store).await;
        }
    }

    #[tokio::test]
    async fn test_repeated_initialize_is_stable() {
        for probe in [Probe::Ok, Probe::ServerError] {
            let backend = ScriptedBackend::new(probe, Refresh::Rejected);

            let first = manager(stored(&[("token", "T1")]), backend.clone());
            first.initialize().await;

            let second = manager(stored(&[("token", "T1")]), backend.clone());
            second.initialize().await;
            second.initialize().await;

            assert_eq!(first.flags(), second.flags());
        }
    }

    #[tokio::test]
    async fn test_loading_only_while_running() {
        let store = stored(&[("token", "T1")]);
        let backend = ScriptedBackend::new(Probe::Gated, Refresh::Rejected);
        let session = Arc::new(manager(store, backend.clone()));
        let mut rx = session.subscribe();
        assert!(!session.flags().is_loading);

        let running = tokio::spawn({
            let session = session.clone();
            async move { session.bootstrap().await }
        });

        rx.wait_for(|f| f.is_loading).await.unwrap();
        assert_eq!(session.flags().phase, SessionPhase::Checking);

        // The probe is parked; let it go once it has started.
        while backend.probes() == 0 {
            tokio::task::yield_now().await;
        }
        backend.release.notify_one();

        assert_eq!(running.await.unwrap(), BootstrapOutcome::ProbeSucceeded);
        assert_signed_in(session.flags());
    }

    #[tokio::test]
    async fn test_overlapping_calls_share_one_probe() {
        let store = stored(&[("token", "T1")]);
        let backend = ScriptedBackend::new(Probe::Gated, Refresh::Rejected);
        let session = Arc::new(manager(store, backend.clone()));

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.bootstrap().await }
        });
        while backend.probes() == 0 {
            tokio::task::yield_now().await;
        }
        let second = tokio::spawn({
            let session = session.clone();
            async move { session.bootstrap().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.release.notify_one();

        assert_eq!(first.await.unwrap(), BootstrapOutcome::ProbeSucceeded);
        assert_eq!(second.await.unwrap(), BootstrapOutcome::ProbeSucceeded);
        assert_eq!(backend.probes(), 1);
    }

    #[tokio::test]
    async fn test_waiter_behind_logout_does_not_reuse_old_outcome() {
        let store = stored(&[("token", "T1"), ("refreshToken", "R1")]);
        let backend = ScriptedBackend::new(Probe::Gated, Refresh::Rejected);
        let session = Arc::new(manager(store.clone(), backend.clone()));

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.bootstrap().await }
        });
        while backend.probes() == 0 {
            tokio::task::yield_now().await;
        }
        let logout = tokio::spawn({
            let session = session.clone();
            async move { session.logout().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let waiter = tokio::spawn({
            let session = session.clone();
            async move { session.bootstrap().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.release.notify_one();

        assert_eq!(first.await.unwrap(), BootstrapOutcome::ProbeSucceeded);
        logout.await.unwrap();
        assert_eq!(waiter.await.unwrap(), BootstrapOutcome::NoCredentials);
        assert_signed_out(session.flags());
        assert_purged(&store).await;
        assert_eq!(backend.probes(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_bootstrap_clears_loading() {
        let store = stored(&[("token", "T1")]);
        let backend = ScriptedBackend::new(Probe::Hang, Refresh::Rejected);
        let session = manager(store, backend);

        let timed_out = tokio::time::timeout(Duration::from_millis(50), session.initialize()).await;
        assert!(timed_out.is_err());

        let flags = session.flags();
        assert!(!flags.is_loading);
        assert!(!flags.is_authenticated);
    }

    #[tokio::test]
    async fn test_storage_errors_fail_closed() {
        let backend = ScriptedBackend::new(Probe::Ok, Refresh::Rejected);
        let session = SessionManager::new(Arc::new(BrokenStore { panic: false }), backend.clone());

        assert_eq!(session.bootstrap().await, BootstrapOutcome::NoCredentials);
        assert_signed_out(session.flags());
        assert_eq!(backend.probes(), 0);
    }

    #[tokio::test]
    async fn test_storage_panic_is_contained() {
        let backend = ScriptedBackend::new(Probe::Ok, Refresh::Rejected);
        let session = SessionManager::new(Arc::new(BrokenStore { panic: true }), backend);

        session.initialize().await;
        assert_signed_out(session.flags());
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_and_logout() {
        let store = stored(&[]);
        let backend = ScriptedBackend::new(Probe::Ok, Refresh::Rejected);
        let session = manager(store.clone(), backend.clone());

        let bad = LoginRequest {
            email: "asha@example.com".into(),
            password: "wrong".into(),
        };
        assert!(session.login(&bad).await.unwrap_err().is_unauthorized());
        assert!(!session.flags().is_authenticated);

        let good = LoginRequest {
            email: "asha@example.com".into(),
            password: "secret".into(),
        };
        let user = session.login(&good).await.unwrap();
        assert_eq!(user.map(|u| u.name), Some("Asha".to_string()));
        assert_signed_in(session.flags());
        assert_eq!(session.access_token().await.unwrap(), "T1");

        // Backend logout fails; local state is still cleared.
        session.logout().await;
        assert_eq!(backend.logouts.load(Ordering::SeqCst), 1);
        assert_signed_out(session.flags());
        assert_purged(&store).await;
        assert!(matches!(session.access_token().await, Err(ClientError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_login_validates_input() {
        let backend = ScriptedBackend::new(Probe::Ok, Refresh::Rejected);
        let session = manager(stored(&[]), backend);
        let err = session
            .login(&LoginRequest {
                email: " ".into(),
                password: "secret".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Core(_)));
    }

    #[tokio::test]
    async fn test_register_drops_stale_refresh_token() {
        let store = stored(&[("refreshToken", "R-old")]);
        let backend = ScriptedBackend::new(Probe::Ok, Refresh::Rejected);
        let session = manager(store.clone(), backend);

        let registration = RegisterRequest {
            name: "Bina".into(),
            shop_name: Some("Bina Kirana".into()),
            email: "bina@example.com".into(),
            phone: None,
            password: "hunter22".into(),
        };
        session.register(&registration).await.unwrap();

        let entries = store.snapshot().await;
        assert_eq!(entries.get("token").map(String::as_str), Some("T-new"));
        assert!(!entries.contains_key("refreshToken"));
        assert_signed_in(session.flags());

        let short = RegisterRequest {
            password: "123".into(),
            ..registration
        };
        assert!(session.register(&short).await.is_err());
    }
}
