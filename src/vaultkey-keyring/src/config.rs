//! Provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::KeyringError;
use crate::prompt::PromptText;

/// What a second signing request does while a challenge for the same key
/// is already on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeConcurrency {
    /// Wait for the running challenge and reuse its window.
    #[default]
    Queue,
    /// Fail with [`KeyringError::ChallengeInProgress`].
    FailFast,
}

/// Configuration for a [`crate::KeyProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Prompt strings.
    pub prompt: PromptText,

    /// Abandon an unanswered prompt after this long. `None` waits forever.
    #[serde(with = "duration_secs")]
    pub challenge_timeout: Option<Duration>,

    /// Behaviour of concurrent signs during a challenge.
    pub concurrency: ChallengeConcurrency,

    /// Ask for StrongBox on Android devices that have one.
    pub prefer_strongbox: bool,

    /// Invalidate strong-biometric keys when enrollment changes.
    pub invalidate_on_biometric_enrollment: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            prompt: PromptText::default(),
            challenge_timeout: Some(Duration::from_secs(120)),
            concurrency: ChallengeConcurrency::Queue,
            prefer_strongbox: true,
            invalidate_on_biometric_enrollment: true,
        }
    }
}

impl ProviderConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidConfiguration`] on malformed JSON or a
    /// zero challenge timeout.
    pub fn from_json(json: &str) -> Result<Self, KeyringError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KeyringError::invalid_configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the type system cannot.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidConfiguration`] for a zero challenge
    /// timeout.
    pub fn validate(&self) -> Result<(), KeyringError> {
        if self.challenge_timeout == Some(Duration::ZERO) {
            return Err(KeyringError::invalid_configuration(
                "challenge_timeout must be positive; use null to wait forever",
            ));
        }
        Ok(())
    }

    /// Set prompt strings.
    #[must_use]
    pub fn prompt(mut self, prompt: PromptText) -> Self {
        self.prompt = prompt;
        self
    }

    /// Set the prompt timeout.
    #[must_use]
    pub fn challenge_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.challenge_timeout = timeout;
        self
    }

    /// Set the concurrency mode.
    #[must_use]
    pub fn concurrency(mut self, concurrency: ChallengeConcurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set StrongBox preference.
    #[must_use]
    pub fn prefer_strongbox(mut self, prefer: bool) -> Self {
        self.prefer_strongbox = prefer;
        self
    }

    /// Set biometric enrollment invalidation.
    #[must_use]
    pub fn invalidate_on_biometric_enrollment(mut self, invalidate: bool) -> Self {
        self.invalidate_on_biometric_enrollment = invalidate;
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
