//! Biometric prompt orchestration.
//!
//! The controller does not draw anything. The host installs a
//! [`PromptPresenter`] (Android `BiometricPrompt`, `LAContext.evaluatePolicy`,
//! a terminal prompt) which receives a [`PromptRequest`] and a
//! [`PromptResponder`]. The responder is the only way to resolve the
//! challenge and resolves it exactly once. Dropping it counts as a cancel.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::clock::Clock;
use crate::error::KeyringError;
use crate::types::{AccessPolicy, AuthContext, BiometricStrength};

/// User-visible prompt strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptText {
    /// Prompt title.
    pub title: String,
    /// Line under the title.
    pub subtitle: String,
    /// Label of the dismiss button.
    pub negative_button: String,
}

impl Default for PromptText {
    fn default() -> Self {
        Self {
            title: "Biometric Auth".to_string(),
            subtitle: "Authenticate private key usage".to_string(),
            negative_button: "Abort".to_string(),
        }
    }
}

/// Everything a presenter needs to show one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    /// Key being unlocked.
    pub alias: String,
    /// Prompt title.
    pub title: String,
    /// Line under the title.
    pub subtitle: String,
    /// Label of the dismiss button.
    pub negative_button: String,
    /// Biometric class to accept.
    pub strength: BiometricStrength,
    /// How long the resulting authentication may be reused.
    pub reuse_seconds: u32,
}

/// Outcome of one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    /// The user authenticated.
    Success(AuthContext),
    /// Authentication failed with a platform error.
    Failure {
        /// Platform error code.
        code: i32,
        /// Platform error message.
        message: String,
    },
    /// The user dismissed the prompt, or it was abandoned.
    Cancelled,
}

impl AuthResult {
    /// Convert into the context or the matching error.
    ///
    /// # Errors
    ///
    /// [`KeyringError::AuthenticationFailed`] or [`KeyringError::Cancelled`].
    pub fn into_context(self) -> Result<AuthContext, KeyringError> {
        match self {
            Self::Success(context) => Ok(context),
            Self::Failure { code, message } => {
                Err(KeyringError::AuthenticationFailed { code, message })
            },
            Self::Cancelled => Err(KeyringError::Cancelled),
        }
    }
}

#[derive(Debug)]
enum PromptOutcome {
    Succeeded,
    Failed { code: i32, message: String },
    Cancelled,
}

/// Single-use handle that resolves a pending challenge.
#[derive(Debug)]
#[must_use = "dropping the responder cancels the challenge"]
pub struct PromptResponder {
    tx: oneshot::Sender<PromptOutcome>,
}

impl PromptResponder {
    fn channel() -> (Self, oneshot::Receiver<PromptOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    fn resolve(self, outcome: PromptOutcome) {
        // The controller may have timed out and stopped listening.
        let _ = self.tx.send(outcome);
    }

    /// The user authenticated.
    pub fn succeed(self) {
        self.resolve(PromptOutcome::Succeeded);
    }

    /// Authentication failed.
    pub fn fail(self, code: i32, message: impl Into<String>) {
        self.resolve(PromptOutcome::Failed {
            code,
            message: message.into(),
        });
    }

    /// The user dismissed the prompt.
    pub fn cancel(self) {
        self.resolve(PromptOutcome::Cancelled);
    }

    /// Whether the controller is still waiting.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// UI side of a biometric challenge.
///
/// `present` must return promptly; the responder may be resolved later from
/// any thread.
pub trait PromptPresenter: Send + Sync + fmt::Debug {
    /// Show the prompt described by `request`.
    fn present(&self, request: PromptRequest, responder: PromptResponder);
}

/// Runs biometric challenges through the installed presenter.
#[derive(Debug, Clone)]
pub struct BiometricPromptController {
    presenter: Option<Arc<dyn PromptPresenter>>,
    text: PromptText,
    timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl BiometricPromptController {
    /// Create a controller.
    ///
    /// Without a presenter every challenge fails with
    /// [`KeyringError::AuthenticationRequired`].
    pub fn new(
        presenter: Option<Arc<dyn PromptPresenter>>,
        text: PromptText,
        timeout: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            presenter,
            text,
            timeout,
            clock,
        }
    }

    /// Whether a presenter is installed.
    #[must_use]
    pub fn has_presenter(&self) -> bool {
        self.presenter.is_some()
    }

    /// Ask the user to authenticate for `alias` under `policy`.
    ///
    /// `pending` is the fresh, not yet evaluated context; on success it comes
    /// back stamped with the time the user authenticated.
    ///
    /// # Errors
    ///
    /// [`KeyringError::AuthenticationRequired`] if no presenter is installed.
    /// User-driven outcomes are reported through [`AuthResult`].
    pub async fn challenge(
        &self,
        alias: &str,
        policy: &AccessPolicy,
        pending: AuthContext,
    ) -> Result<AuthResult, KeyringError> {
        let presenter = self
            .presenter
            .as_ref()
            .ok_or(KeyringError::AuthenticationRequired)?;

        let request = PromptRequest {
            alias: alias.to_string(),
            title: self.text.title.clone(),
            subtitle: self.text.subtitle.clone(),
            negative_button: self.text.negative_button.clone(),
            strength: policy.biometric_strength,
            reuse_seconds: policy.auth_timeout_seconds,
        };

        tracing::debug!(alias = %alias, strength = ?policy.biometric_strength, "Presenting biometric prompt");

        let (responder, rx) = PromptResponder::channel();
        presenter.present(request, responder);

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received.ok(),
                Err(_) => {
                    tracing::warn!(alias = %alias, timeout_secs = limit.as_secs(), "Biometric prompt timed out");
                    None
                },
            },
            None => rx.await.ok(),
        };

        let result = match outcome {
            Some(PromptOutcome::Succeeded) => AuthResult::Success(pending.authenticated(self.clock.now())),
            Some(PromptOutcome::Failed { code, message }) => {
                tracing::warn!(alias = %alias, code, "Biometric authentication failed");
                AuthResult::Failure { code, message }
            },
            Some(PromptOutcome::Cancelled) | None => {
                tracing::info!(alias = %alias, "Biometric prompt cancelled");
                AuthResult::Cancelled
            },
        };

        Ok(result)
    }
}

/// Scripted answer for [`ScriptedPresenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// Succeed immediately.
    Succeed,
    /// Fail immediately.
    Fail {
        /// Error code.
        code: i32,
        /// Error message.
        message: String,
    },
    /// Cancel immediately.
    Cancel,
    /// Drop the responder without answering.
    Abandon,
    /// Keep the responder until [`ScriptedPresenter::release`] is called.
    Hold,
}

/// Presenter that answers from a script, for tests and headless hosts.
///
/// Once the script is exhausted every prompt succeeds.
#[derive(Debug, Default)]
pub struct ScriptedPresenter {
    script: Mutex<VecDeque<ScriptedResponse>>,
    held: Mutex<Vec<PromptResponder>>,
    requests: Mutex<Vec<PromptRequest>>,
    presented: AtomicUsize,
}

impl ScriptedPresenter {
    /// Presenter that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Presenter that answers with `responses` in order.
    #[must_use]
    pub fn with_script(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Queue another response.
    pub fn push(&self, response: ScriptedResponse) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    /// Number of prompts shown so far.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.presented.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<PromptRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of prompts currently held open.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Resolve all held prompts with `response`. Returns how many were held.
    pub fn release(&self, response: ScriptedResponse) -> usize {
        let held: Vec<_> = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let count = held.len();
        for responder in held {
            Self::answer(responder, response.clone());
        }
        count
    }

    fn answer(responder: PromptResponder, response: ScriptedResponse) {
        match response {
            ScriptedResponse::Succeed | ScriptedResponse::Hold => responder.succeed(),
            ScriptedResponse::Fail { code, message } => responder.fail(code, message),
            ScriptedResponse::Cancel => responder.cancel(),
            ScriptedResponse::Abandon => drop(responder),
        }
    }
}

impl PromptPresenter for ScriptedPresenter {
    fn present(&self, request: PromptRequest, responder: PromptResponder) {
        self.presented.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let response = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(ScriptedResponse::Succeed);

        match response {
            ScriptedResponse::Hold => self
                .held
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(responder),
            other => Self::answer(responder, other),
        }
    }
}
