//! Chain and backend specific error transformers.
//!
//! Each transformer recognizes one family of raw failures and maps it into the
//! taxonomy. [`default_transformers`] returns them in the order they are tried.

use std::error::Error as StdError;

use kyc_nft_core::{
    Error, ErrorCode,
    classifier::{Classifier, ErrorTransformer, error_chain},
    types::BoxError,
};

use crate::{
    api_client::{ApiError, ApiErrorBody},
    rpc::{JsonRpcError, RpcCallError, TransportError},
};

/// An error raised by an injected Solana wallet adapter.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{name}: {message}")]
pub struct SolanaWalletError {
    pub name: String,
    pub message: String,
    /// The JSON-RPC error the adapter wraps, if any.
    #[source]
    pub inner: Option<JsonRpcError>,
}

impl SolanaWalletError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        SolanaWalletError {
            name: name.into(),
            message: message.into(),
            inner: None,
        }
    }

    pub fn with_inner(mut self, inner: JsonRpcError) -> Self {
        self.inner = Some(inner);
        self
    }
}

pub struct SolanaWalletTransformer;

impl ErrorTransformer for SolanaWalletTransformer {
    fn transform(&self, err: &(dyn StdError + 'static)) -> Option<Error> {
        let wallet = error_chain(err).find_map(|e| e.downcast_ref::<SolanaWalletError>())?;

        if wallet.name == "WalletNotConnectedError" {
            return Some(Error::status(
                ErrorCode::WalletNotConnected,
                "Solana wallet is not connected",
            ));
        }
        if wallet.message.contains("User rejected") {
            return Some(Error::wallet(
                ErrorCode::UserRejectedRequest,
                wallet.inner.as_ref().map(|e| e.code),
                wallet.message.clone(),
            ));
        }
        match &wallet.inner {
            Some(inner) => Some(map_rpc_error(inner)),
            None => Some(Error::wallet(
                ErrorCode::WalletInternal,
                None,
                format!("{}: {}", wallet.name, wallet.message),
            )),
        }
    }
}

/// Recognizes EIP-1193 and JSON-RPC errors anywhere in the source chain.
pub struct EvmRpcTransformer;

impl ErrorTransformer for EvmRpcTransformer {
    fn transform(&self, err: &(dyn StdError + 'static)) -> Option<Error> {
        let rpc = error_chain(err).find_map(|e| e.downcast_ref::<JsonRpcError>())?;
        Some(map_rpc_error(&unwrap_internal(rpc)))
    }
}

/// Some wallets wrap the real error as `data` of an internal error.
fn unwrap_internal(err: &JsonRpcError) -> JsonRpcError {
    if err.code == -32603 {
        let nested = err.data.as_ref().and_then(|data| {
            let code = data.get("code")?.as_i64()?;
            let message = data.get("message")?.as_str()?;
            Some(JsonRpcError::new(code, message))
        });
        if let Some(nested) = nested {
            return nested;
        }
    }
    err.clone()
}

/// Map a wallet or node JSON-RPC error code.
pub fn map_rpc_error(err: &JsonRpcError) -> Error {
    let code = Some(err.code);
    let message = err.message.clone();

    match err.code {
        4001 => Error::wallet(ErrorCode::UserRejectedRequest, code, message),
        4100 => Error::wallet(ErrorCode::AccountUnauthorized, code, message),
        4900 | 4901 => Error::wallet(ErrorCode::WalletNotConnectedToChain, code, message),
        4902 => Error::wallet(ErrorCode::ChainMissing, code, message),
        -32000 if message.to_lowercase().contains("insufficient funds") => {
            Error::wallet(ErrorCode::InsufficientFunds, code, message)
        }
        3 => Error::transaction(ErrorCode::TransactionRejectedByContract, message),
        -32700 | -32600 | -32601 | -32602 | -32603 | -32000 | -32001 | -32002 | -32003
        | -32004 | -32005 | 4200 => Error::wallet(ErrorCode::WalletInternal, code, message),
        _ => Error::wallet(
            ErrorCode::WalletInternal,
            code,
            format!("Unrecognized wallet error: {message}"),
        ),
    }
}

/// Recognizes backend and transport failures.
pub struct ApiErrorTransformer;

impl ErrorTransformer for ApiErrorTransformer {
    fn transform(&self, err: &(dyn StdError + 'static)) -> Option<Error> {
        for cause in error_chain(err) {
            if let Some(api) = cause.downcast_ref::<ApiError>() {
                return Some(map_api_error(api));
            }
            if let Some(transport) = cause.downcast_ref::<TransportError>() {
                if let Some(mapped) = map_transport_error(transport) {
                    return Some(mapped);
                }
            }
            #[cfg(feature = "http-client")]
            if let Some(http) = cause.downcast_ref::<reqwest::Error>() {
                return Some(Error::internal(
                    ErrorCode::NetworkRequestFailed,
                    format!("Network request failed: {http}"),
                ));
            }
        }
        None
    }
}

fn map_api_error(api: &ApiError) -> Error {
    if api.status == 401 {
        return Error::status(ErrorCode::UserNotLoggedIn, "User is not logged in");
    }

    match &api.body {
        ApiErrorBody::Detailed {
            reference_id,
            message,
            ..
        } => Error::internal(ErrorCode::BackendError, message.clone())
            .with_reference_id(reference_id.clone()),
        ApiErrorBody::Simple { code, description } => Error::internal(
            ErrorCode::BackendError,
            format!("Backend error {code}: {description}"),
        ),
        ApiErrorBody::Text(text) => Error::internal(
            ErrorCode::BackendError,
            format!("Backend error {}: {text}", api.status),
        ),
    }
}

fn map_transport_error(err: &TransportError) -> Option<Error> {
    match err {
        TransportError::Status { status, body } => Some(Error::internal(
            ErrorCode::NetworkRequestFailed,
            format!("Request failed with HTTP {status}: {body}"),
        )),
        TransportError::Request(message) => Some(Error::internal(
            ErrorCode::NetworkRequestFailed,
            format!("Network request failed: {message}"),
        )),
        TransportError::Decode(_) => None,
        #[cfg(feature = "http-client")]
        TransportError::Http(http) => Some(Error::internal(
            ErrorCode::NetworkRequestFailed,
            format!("Network request failed: {http}"),
        )),
    }
}

/// The transformers the SDK installs, in the order they are tried.
pub fn default_transformers() -> Vec<Box<dyn ErrorTransformer>> {
    vec![
        Box::new(SolanaWalletTransformer),
        Box::new(EvmRpcTransformer),
        Box::new(ApiErrorTransformer),
    ]
}

/// Classify `err` with the default transformers without reporting it.
pub fn classify(err: impl Into<BoxError>) -> Error {
    Classifier::silent(default_transformers()).classify(err.into())
}

impl From<RpcCallError> for Error {
    fn from(err: RpcCallError) -> Self {
        classify(err)
    }
}
