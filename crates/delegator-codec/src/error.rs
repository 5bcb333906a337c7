//! The single error taxonomy shared by every wallet component.
//!
//! Every component (codec, Key Holder, Authority Store, Chain Gateway,
//! Coordinator) returns [`WalletError`] rather than inventing its own error
//! type per crate. Each variant corresponds to one of the kinds named in the
//! design's error taxonomy; [`WalletError::kind`] exposes that kind as a
//! stable tag independent of the human-readable detail, and `Display`
//! renders the `<kind>: <detail>` form callers are guaranteed to see.

use std::fmt;

use alloy_primitives::B256;

/// A stable tag for a [`WalletError`], independent of its formatted detail.
///
/// Useful for callers that want to branch on error category (e.g. retry on
/// `NetworkTransient` surfaced past the gateway's own retry budget) without
/// string-matching a `Display` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotInitialised,
    NotFound,
    InvalidState,
    ValidationFailed,
    NoAuthority,
    NetworkTransient,
    NetworkFatal,
    BundlerRejected,
    Timeout,
    ConfigurationInvalid,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotInitialised => "NotInitialised",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::ValidationFailed => "ValidationFailed",
            ErrorKind::NoAuthority => "NoAuthority",
            ErrorKind::NetworkTransient => "NetworkTransient",
            ErrorKind::NetworkFatal => "NetworkFatal",
            ErrorKind::BundlerRejected => "BundlerRejected",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ConfigurationInvalid => "ConfigurationInvalid",
        };
        write!(f, "{s}")
    }
}

/// The error type returned by every operation in this workspace.
///
/// `Display` always renders as `<kind>: <detail>` per the design's
/// user-visible error contract -- the Coordinator never swallows an error,
/// it only ever passes one of these up to the caller.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("NotInitialised: {0}")]
    NotInitialised(String),

    #[error("NotFound: {0}")]
    NotFound(String),

    /// Attempted transition out of a terminal state, or any other
    /// state-machine violation (e.g. redeeming a pending delegation).
    #[error("InvalidState: {0}")]
    InvalidState(String),

    /// A caveat, signature, or id mismatch was detected before any network
    /// call was made.
    #[error("ValidationFailed: {0}")]
    ValidationFailed(String),

    /// No signing strategy (local key, external signer, peer) could satisfy
    /// the request.
    #[error("NoAuthority: no authority for {0}")]
    NoAuthority(String),

    /// A transient network condition (retryable HTTP status, connect/timeout
    /// failure) still within its retry budget. Retried in place; never
    /// surfaces to a caller on its own -- once the budget is exhausted it is
    /// promoted to `NetworkFatal` or `Timeout` (design §7 policy).
    #[error("NetworkTransient: {0}")]
    NetworkTransient(String),

    /// A non-retryable network or HTTP failure, including a retryable
    /// condition whose retry budget is exhausted.
    #[error("NetworkFatal: {0}")]
    NetworkFatal(String),

    /// The bundler rejected the UserOperation; `code`/`message` are
    /// preserved verbatim from its JSON-RPC error object.
    #[error("BundlerRejected: code={code}, message={message}")]
    BundlerRejected { code: i64, message: String },

    /// A caller-specified deadline (typically receipt polling) elapsed. Not
    /// itself a bug -- callers decide whether to re-poll.
    #[error("Timeout: not included after {0} ms")]
    Timeout(u64),

    #[error("ConfigurationInvalid: {0}")]
    ConfigurationInvalid(String),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::NotInitialised(_) => ErrorKind::NotInitialised,
            WalletError::NotFound(_) => ErrorKind::NotFound,
            WalletError::InvalidState(_) => ErrorKind::InvalidState,
            WalletError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            WalletError::NoAuthority(_) => ErrorKind::NoAuthority,
            WalletError::NetworkTransient(_) => ErrorKind::NetworkTransient,
            WalletError::NetworkFatal(_) => ErrorKind::NetworkFatal,
            WalletError::BundlerRejected { .. } => ErrorKind::BundlerRejected,
            WalletError::Timeout(_) => ErrorKind::Timeout,
            WalletError::ConfigurationInvalid(_) => ErrorKind::ConfigurationInvalid,
        }
    }

    pub fn invalid_state(found: impl fmt::Display, expected: impl fmt::Display) -> Self {
        WalletError::InvalidState(format!("found '{found}', expected {expected}"))
    }

    pub fn not_found_id(id: B256) -> Self {
        WalletError::NotFound(format!("delegation {id}"))
    }
}

pub type WalletResult<T> = Result<T, WalletError>;
