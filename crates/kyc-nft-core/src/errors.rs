//! The closed error taxonomy every public operation surfaces.

use std::fmt::Display;

use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};

use crate::types::BoxError;

/// Coarse error family.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// SDK or provider misconfigured. Fatal.
    Configuration,
    /// A precondition is not met. User-actionable.
    Status,
    /// The wallet refused or failed. Carries the wallet's numeric code.
    Wallet,
    /// An on-chain transaction was not found, failed or was rejected.
    Transaction,
    /// An SDK invariant was violated or a third party answered unexpectedly.
    Internal,
    Unknown,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Status => "StatusError",
            ErrorKind::Wallet => "WalletError",
            ErrorKind::Transaction => "TransactionError",
            ErrorKind::Internal => "InternalError",
            ErrorKind::Unknown => "UnknownError",
        };
        write!(f, "{name}")
    }
}

/// Stable error codes.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration
    InvalidConfiguration,
    ContractNotConfigured,

    // Status
    UserNotLoggedIn,
    EmailInvalid,
    TermsNotAccepted,
    WalletNotConnected,
    InvalidAddress,
    UserNotVerified,
    NetworkNotSupported,
    NetworkNotEnabled,
    NetworkPriceTooHigh,

    // Wallet
    UserRejectedRequest,
    AccountUnauthorized,
    WalletNotConnectedToChain,
    ChainMissing,
    InsufficientFunds,
    WalletInternal,

    // Transaction
    TransactionNotFound,
    TransactionFailed,
    TransactionRejectedByContract,
    CostEstimationTimeout,

    // Internal
    Internal,
    BackendError,
    NetworkRequestFailed,
    UnexpectedResponse,
    MetadataInvalid,
    Timeout,
}

impl ErrorCode {
    /// The family a code belongs to.
    pub fn kind(&self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            InvalidConfiguration | ContractNotConfigured => ErrorKind::Configuration,
            UserNotLoggedIn
            | EmailInvalid
            | TermsNotAccepted
            | WalletNotConnected
            | InvalidAddress
            | UserNotVerified
            | NetworkNotSupported
            | NetworkNotEnabled
            | NetworkPriceTooHigh => ErrorKind::Status,
            UserRejectedRequest
            | AccountUnauthorized
            | WalletNotConnectedToChain
            | ChainMissing
            | InsufficientFunds
            | WalletInternal => ErrorKind::Wallet,
            TransactionNotFound
            | TransactionFailed
            | TransactionRejectedByContract
            | CostEstimationTimeout => ErrorKind::Transaction,
            Internal
            | BackendError
            | NetworkRequestFailed
            | UnexpectedResponse
            | MetadataInvalid
            | Timeout => ErrorKind::Internal,
        }
    }
}

/// A classified error.
///
/// Every error carries a short random reference id so a user-facing report can be
/// correlated with telemetry.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message} (reference id: {reference_id})")]
pub struct Error {
    kind: ErrorKind,
    code: Option<ErrorCode>,
    message: String,
    reference_id: String,
    wallet_code: Option<i64>,
    #[source]
    source: Option<BoxError>,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Generate a fresh correlation token.
pub fn reference_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

impl Error {
    pub fn new(kind: ErrorKind, code: Option<ErrorCode>, message: impl Into<String>) -> Self {
        Error {
            kind,
            code,
            message: message.into(),
            reference_id: reference_id(),
            wallet_code: None,
            source: None,
        }
    }

    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::new(code.kind(), Some(code), message)
    }

    pub fn configuration(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Configuration, Some(code), message)
    }

    pub fn status(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Status, Some(code), message)
    }

    /// A wallet error keeping the raw numeric code reported by the wallet.
    pub fn wallet(code: ErrorCode, wallet_code: Option<i64>, message: impl Into<String>) -> Self {
        Error {
            wallet_code,
            ..Error::new(ErrorKind::Wallet, Some(code), message)
        }
    }

    pub fn transaction(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Transaction, Some(code), message)
    }

    pub fn internal(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, Some(code), message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Unknown, None, message)
    }

    /// Keep a reference id issued elsewhere, e.g. by the backend.
    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = reference_id.into();
        self
    }

    /// Chain the original failure beneath this one.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    pub fn wallet_code(&self) -> Option<i64> {
        self.wallet_code
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == Some(code)
    }

    /// Callers may abort silently on a user rejection instead of surfacing it.
    pub fn is_rejected_by_user(&self) -> bool {
        self.is(ErrorCode::UserRejectedRequest)
    }
}
