//! Per-key authentication window.
//!
//! The window decides whether a private-key operation may run immediately or
//! must first pass a user-authentication challenge.
//!
//! ```text
//!   no auth policy ──> NoAuthRequired (never checks time)
//!
//!   auth policy ──> AwaitingAuthentication ──success──> Valid { until }
//!                                                         │  now >= until
//!                   Expired <─────────────────────────────┘
//!                      │ success
//!                      └──> Valid { now + timeout }
//! ```
//!
//! Expiry is fixed at the moment of authentication; signing inside the window
//! does not extend it. A timeout of zero makes every window stale on arrival,
//! so each use challenges.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::types::{AccessPolicy, AuthContext};

/// Observable window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowState {
    /// The key is not gated on authentication.
    NoAuthRequired,
    /// No authentication has happened since the key was created or loaded.
    AwaitingAuthentication,
    /// Operations may proceed until `until`.
    Valid {
        /// Fixed end of the window.
        until: DateTime<Utc>,
    },
    /// A previous authentication has lapsed.
    Expired,
}

/// What a signing operation must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    /// Run the operation.
    Proceed,
    /// Run exactly one challenge first.
    Challenge,
}

/// Authentication state for a single key.
#[derive(Debug, Clone)]
pub struct AuthenticationWindow {
    policy: AccessPolicy,
    state: WindowState,
    cached_context: Option<AuthContext>,
}

impl AuthenticationWindow {
    /// Fresh window for a key protected by `policy`.
    #[must_use]
    pub fn new(policy: AccessPolicy) -> Self {
        let state = if policy.requires_user_authentication {
            WindowState::AwaitingAuthentication
        } else {
            WindowState::NoAuthRequired
        };

        Self {
            policy,
            state,
            cached_context: None,
        }
    }

    /// Policy this window enforces.
    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Stored state, without applying the clock.
    #[must_use]
    pub fn state(&self) -> WindowState {
        self.state
    }

    /// State as seen at `now`: a lapsed `Valid` reads as `Expired`.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> WindowState {
        match self.state {
            WindowState::Valid { until } if now >= until => WindowState::Expired,
            state => state,
        }
    }

    /// Context from the last successful challenge.
    #[must_use]
    pub fn cached_context(&self) -> Option<&AuthContext> {
        self.cached_context.as_ref()
    }

    /// Decide whether an operation at `now` may proceed, moving a lapsed
    /// `Valid` window to `Expired`.
    pub fn check(&mut self, now: DateTime<Utc>) -> WindowDecision {
        match self.state {
            WindowState::NoAuthRequired => WindowDecision::Proceed,
            WindowState::Valid { until } if now < until => WindowDecision::Proceed,
            WindowState::Valid { .. } => {
                tracing::debug!(timeout = self.policy.auth_timeout_seconds, "Authentication window expired");
                self.state = WindowState::Expired;
                WindowDecision::Challenge
            },
            WindowState::AwaitingAuthentication | WindowState::Expired => WindowDecision::Challenge,
        }
    }

    /// Record a successful challenge at `now` and cache its context.
    ///
    /// Has no effect on a window that requires no authentication.
    pub fn record_success(&mut self, context: AuthContext, now: DateTime<Utc>) {
        if !self.policy.requires_user_authentication {
            return;
        }

        let until = now + chrono::Duration::seconds(i64::from(self.policy.auth_timeout_seconds));
        self.state = WindowState::Valid { until };
        self.cached_context = Some(context);
    }

    /// Start over with `policy`, dropping any cached context.
    pub fn reset(&mut self, policy: AccessPolicy) {
        *self = Self::new(policy);
    }
}

/// Shared per-key guard.
///
/// Every handle to a key shares one guard. The window lock is held across
/// decide, challenge and update, so at most one challenge runs per key.
#[derive(Debug)]
pub struct KeyGuard {
    alias: String,
    policy: AccessPolicy,
    window: Mutex<AuthenticationWindow>,
    challenge_in_flight: AtomicBool,
    retired: AtomicBool,
}

impl KeyGuard {
    /// Create a guard for `alias` with a fresh window.
    #[must_use]
    pub fn new(alias: impl Into<String>, policy: AccessPolicy) -> Self {
        Self {
            alias: alias.into(),
            policy,
            window: Mutex::new(AuthenticationWindow::new(policy)),
            challenge_in_flight: AtomicBool::new(false),
            retired: AtomicBool::new(false),
        }
    }

    /// Key alias.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Policy the key was created with.
    #[must_use]
    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    /// Whether the key behind this guard was deleted or replaced.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Detach every handle sharing this guard from the alias.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// The window lock.
    pub fn window(&self) -> &Mutex<AuthenticationWindow> {
        &self.window
    }

    /// Whether a challenge is currently running.
    #[must_use]
    pub fn challenge_in_flight(&self) -> bool {
        self.challenge_in_flight.load(Ordering::Acquire)
    }

    /// Mark a challenge as running until the returned marker drops.
    pub(crate) fn begin_challenge(&self) -> ChallengeMarker<'_> {
        self.challenge_in_flight.store(true, Ordering::Release);
        ChallengeMarker { guard: self }
    }
}

/// Clears the in-flight flag on drop, including on cancellation.
pub(crate) struct ChallengeMarker<'a> {
    guard: &'a KeyGuard,
}

impl Drop for ChallengeMarker<'_> {
    fn drop(&mut self) {
        self.guard.challenge_in_flight.store(false, Ordering::Release);
    }
}
