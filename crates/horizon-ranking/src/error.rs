//! Error types for the ranking engine.

use thiserror::Error;

use horizon_ranking_core::AsyncRuntimeError;

/// Errors raised synchronously by the column registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A column with this id is already attached.
    #[error("a column with id '{id}' is already attached")]
    DuplicateColumn {
        /// The colliding column id.
        id: String,
    },
    /// The handle does not refer to an attached column.
    #[error("column is not attached")]
    UnknownColumn,
}

/// Errors a score capability can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreError {
    /// The request was rejected because one or more tokens are no longer valid.
    ///
    /// Retryable: the pipeline invalidates the tokens and re-authorizes.
    #[error("invalid token ({}): {message}", token_ids.join(", "))]
    InvalidToken {
        /// The offending token ids.
        token_ids: Vec<String>,
        /// Server-provided message.
        message: String,
    },
    /// Any other computation failure. Terminal for the current cycle.
    #[error("score computation failed: {0}")]
    Computation(String),
    /// The cycle was abandoned (column removed, superseded, cancelled, or the
    /// attempt limit was reached).
    #[error("score computation cancelled: {0}")]
    Cancelled(String),
}

impl ScoreError {
    /// Create an invalid-token error.
    pub fn invalid_token<I, S>(token_ids: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::InvalidToken {
            token_ids: token_ids.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }

    /// Returns true for errors the pipeline retries after re-authorization.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::InvalidToken { .. })
    }
}

/// An authorization flow failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// The user or the identity provider refused access.
    #[error("authorization denied: {0}")]
    Denied(String),
    /// The flow could not be completed.
    #[error("authorization failed: {0}")]
    Failed(String),
}

/// Options could not be parsed.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// Malformed TOML.
    #[error("invalid TOML options: {0}")]
    Toml(#[from] toml::de::Error),
    /// Malformed JSON.
    #[error("invalid JSON options: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error of the ranking facade.
#[derive(Debug, Error)]
pub enum RankingError {
    /// Column registry error.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Options error.
    #[error(transparent)]
    Options(#[from] OptionsError),
    /// Async runtime error.
    #[error(transparent)]
    Runtime(#[from] AsyncRuntimeError),
    /// No score plugin is registered under this id.
    #[error("no score plugin registered with id '{0}'")]
    UnknownScore(String),
    /// Adding score columns is disabled by the ranking options.
    #[error("adding score columns is disabled")]
    ScoresDisabled,
    /// The ranking has already been built.
    #[error("the ranking has already been built")]
    AlreadyBuilt,
}

/// A specialized Result type for ranking operations.
pub type Result<T> = std::result::Result<T, RankingError>;
