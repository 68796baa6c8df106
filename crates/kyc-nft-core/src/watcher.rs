//! Waits for a submitted transaction to reach a terminal status.

use std::time::Duration;

use bon::Builder;

use crate::{
    errors::{Error, ErrorCode},
    polling::{PollError, PollOptions, poll},
    types::{Transaction, TransactionStatus},
};

/// Failure of a single status lookup.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The node does not know the transaction yet. Expected right after submission.
    #[error("Transaction {0} doesn't exist yet")]
    DoesNotExist(String),
    #[error(transparent)]
    Other(#[from] Error),
}

/// Chain-specific status lookup of a transaction.
pub trait TransactionLookup {
    fn transaction_status(
        &self,
        tx_hash: &str,
    ) -> impl Future<Output = Result<Transaction, LookupError>>;
}

/// Polling schedule of the watcher.
#[derive(Builder, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    #[builder(default = Duration::from_secs(3))]
    pub interval: Duration,
    #[builder(default = 40)]
    pub max_retries: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig::builder().build()
    }
}

/// Poll `lookup` until `tx_hash` succeeds or fails.
///
/// `Started`, `NotStarted` and `Unknown` keep polling. A lookup reporting the
/// transaction as not indexed yet is retried; any other lookup error is fatal.
/// On success the chain-native payload is handed back for downstream
/// extraction.
pub async fn wait_for_transaction<L: TransactionLookup>(
    lookup: &L,
    tx_hash: &str,
    config: &WatchConfig,
) -> Result<Transaction, Error> {
    #[cfg(feature = "tracing")]
    tracing::debug!("Waiting for transaction {tx_hash}");

    let result = poll(
        || lookup.transaction_status(tx_hash),
        config.interval,
        config.max_retries,
        PollOptions::builder()
            .resolve_predicate(Box::new(|tx: &Transaction| tx.status.is_terminal()))
            .retry_on_error_predicate(Box::new(|err: &LookupError| {
                matches!(err, LookupError::DoesNotExist(_))
            }))
            .build(),
    )
    .await;

    let transaction = match result {
        Ok(transaction) => transaction,
        Err(PollError::TimeOut(timeout)) => {
            let err = Error::transaction(
                ErrorCode::TransactionNotFound,
                format!(
                    "Transaction {tx_hash} not found after {} attempts",
                    timeout.attempts
                ),
            );
            return Err(match timeout.wrapped_error {
                Some(last) => err.with_source(last),
                None => err,
            });
        }
        Err(PollError::Operation(LookupError::Other(err))) => return Err(err),
        Err(PollError::Operation(err @ LookupError::DoesNotExist(_))) => {
            return Err(Error::transaction(
                ErrorCode::TransactionNotFound,
                err.to_string(),
            ));
        }
    };

    match transaction.status {
        TransactionStatus::Success => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Transaction {tx_hash} succeeded");

            Ok(transaction)
        }
        _ => Err(Error::transaction(
            ErrorCode::TransactionFailed,
            format!("Transaction {tx_hash} failed"),
        )),
    }
}
