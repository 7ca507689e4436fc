//! # Session Model
//!
//! The pure half of session bootstrap: storage keys, the phase machine, the
//! flags screens observe, and normalisation of auth responses. The I/O half
//! lives in `shopbill-client::session`.
//!
//! ## Bootstrap State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Unknown ──initialize()──► Checking                                    │
//! │                               │                                         │
//! │          no token ────────────┤──► Unauthenticated   (NoCredentials)    │
//! │                               │                                         │
//! │          GET /auth/profile    │                                         │
//! │            2xx ───────────────┤──► Authenticated     (ProbeSucceeded)   │
//! │            401 + refresh ─────┤                                         │
//! │               POST /auth/refresh                                        │
//! │                 ok ───────────┤──► Authenticated     (RefreshSucceeded) │
//! │                 fail ─────────┤──► Unauthenticated   (RefreshFailed)    │
//! │            401, no refresh ───┤──► Unauthenticated   (ProbeFailedAuth)  │
//! │            other / timeout ───┘──► Unauthenticated   (ProbeFailedOther) │
//! │                                                                         │
//! │   Every Unauthenticated exit purges token, refreshToken and user.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::Profile;

// =============================================================================
// Storage Keys
// =============================================================================

/// Persisted access token.
pub const TOKEN_KEY: &str = "token";

/// Persisted refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Persisted JSON of the signed-in user.
pub const USER_KEY: &str = "user";

/// Everything removed when a session is purged.
pub const SESSION_KEYS: [&str; 3] = [TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

// =============================================================================
// Phase & Flags
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Unknown,
    Checking,
    Authenticated,
    Unauthenticated,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Unknown => write!(f, "unknown"),
            SessionPhase::Checking => write!(f, "checking"),
            SessionPhase::Authenticated => write!(f, "authenticated"),
            SessionPhase::Unauthenticated => write!(f, "unauthenticated"),
        }
    }
}

/// What screens observe while and after the session is checked.
///
/// `is_loading` is true only in [`SessionPhase::Checking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SessionFlags {
    pub phase: SessionPhase,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub token_valid: bool,
}

impl SessionFlags {
    /// Flags before the first bootstrap.
    pub const fn initial() -> Self {
        SessionFlags {
            phase: SessionPhase::Unknown,
            is_authenticated: false,
            is_loading: false,
            token_valid: false,
        }
    }

    /// Enters `Checking`. The previous auth flags are kept so a re-check
    /// does not flash the signed-out screen.
    pub const fn checking(self) -> Self {
        SessionFlags {
            phase: SessionPhase::Checking,
            is_loading: true,
            ..self
        }
    }

    pub const fn authenticated() -> Self {
        SessionFlags {
            phase: SessionPhase::Authenticated,
            is_authenticated: true,
            is_loading: false,
            token_valid: true,
        }
    }

    pub const fn unauthenticated() -> Self {
        SessionFlags {
            phase: SessionPhase::Unauthenticated,
            is_authenticated: false,
            is_loading: false,
            token_valid: false,
        }
    }

    /// Leaves `Checking` without a verdict (the bootstrap was dropped or
    /// panicked). Only the loading flag changes.
    pub const fn abandoned(self) -> Self {
        let phase = match self.phase {
            SessionPhase::Checking if self.is_authenticated => SessionPhase::Authenticated,
            SessionPhase::Checking => SessionPhase::Unauthenticated,
            other => other,
        };
        SessionFlags {
            phase,
            is_loading: false,
            ..self
        }
    }
}

// =============================================================================
// Bootstrap Outcome
// =============================================================================

/// How a bootstrap ended. Logged, and returned to tests and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// No access token was stored.
    NoCredentials,
    /// Profile probe accepted the stored token.
    ProbeSucceeded,
    /// Probe returned 401 and there was no refresh token to try.
    ProbeFailedAuth,
    /// Probe failed for any reason other than 401.
    ProbeFailedOther,
    /// The single refresh attempt failed.
    RefreshFailed,
    /// The single refresh attempt produced a new access token.
    RefreshSucceeded,
}

impl BootstrapOutcome {
    pub const fn is_authenticated(&self) -> bool {
        matches!(
            self,
            BootstrapOutcome::ProbeSucceeded | BootstrapOutcome::RefreshSucceeded
        )
    }

    /// Final flags for this outcome.
    pub const fn flags(&self) -> SessionFlags {
        if self.is_authenticated() {
            SessionFlags::authenticated()
        } else {
            SessionFlags::unauthenticated()
        }
    }
}

impl std::fmt::Display for BootstrapOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BootstrapOutcome::NoCredentials => "no_credentials",
            BootstrapOutcome::ProbeSucceeded => "probe_succeeded",
            BootstrapOutcome::ProbeFailedAuth => "probe_failed_auth",
            BootstrapOutcome::ProbeFailedOther => "probe_failed_other",
            BootstrapOutcome::RefreshFailed => "refresh_failed",
            BootstrapOutcome::RefreshSucceeded => "refresh_succeeded",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Token Normalisation
// =============================================================================

/// Tokens pulled out of a refresh or login response.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Absent when the backend keeps the old refresh token valid.
    pub refresh_token: Option<String>,
}

/// Tokens never reach logs through `Debug`.
impl std::fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Responses may be bare or wrapped in `{ "data": ... }`.
fn unwrap_envelope(body: &Value) -> &Value {
    match body.get("data") {
        Some(inner) if inner.is_object() => inner,
        _ => body,
    }
}

fn first_string<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

impl RefreshedTokens {
    /// Reads `access_token` or `token`, and `refresh_token` or
    /// `refreshToken`. An absent or empty access token is an error.
    ///
    /// ```rust
    /// use shopbill_core::session::RefreshedTokens;
    ///
    /// let body = serde_json::json!({ "token": "T2", "refreshToken": "R2" });
    /// let tokens = RefreshedTokens::from_response(&body).unwrap();
    /// assert_eq!(tokens.access_token, "T2");
    /// assert_eq!(tokens.refresh_token.as_deref(), Some("R2"));
    /// ```
    pub fn from_response(body: &Value) -> CoreResult<Self> {
        let body = unwrap_envelope(body);
        let access_token = first_string(body, &["access_token", "accessToken", "token"])
            .ok_or(CoreError::MissingAccessToken)?
            .to_string();
        let refresh_token = first_string(body, &["refresh_token", "refreshToken"]).map(str::to_string);

        Ok(RefreshedTokens {
            access_token,
            refresh_token,
        })
    }
}

/// A login or register response: tokens plus the user, when sent.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthGrant {
    pub tokens: RefreshedTokens,
    pub user: Option<Profile>,
}

impl AuthGrant {
    pub fn from_response(body: &Value) -> CoreResult<Self> {
        let tokens = RefreshedTokens::from_response(body)?;
        // A malformed user object is dropped rather than failing the login.
        let user = unwrap_envelope(body)
            .get("user")
            .filter(|u| u.is_object())
            .and_then(|u| serde_json::from_value::<Profile>(u.clone()).ok());

        Ok(AuthGrant { tokens, user })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
