use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    time::Duration,
};

use kyc_nft_core::{
    ErrorCode, ErrorKind,
    types::{Transaction, TransactionStatus},
    watcher::{LookupError, TransactionLookup, WatchConfig, wait_for_transaction},
};
use serde_json::json;

/// Replays a scripted sequence of lookup outcomes, repeating the last one.
struct ScriptedLookup {
    script: RefCell<VecDeque<Result<Transaction, LookupError>>>,
    calls: Cell<u32>,
}

enum Step {
    Missing,
    Status(TransactionStatus),
    Broken,
}

impl ScriptedLookup {
    fn new(steps: Vec<Step>) -> Self {
        ScriptedLookup {
            script: RefCell::new(steps.into_iter().map(Self::outcome).collect()),
            calls: Cell::new(0),
        }
    }

    fn outcome(step: Step) -> Result<Transaction, LookupError> {
        match step {
            Step::Missing => Err(LookupError::DoesNotExist("0xabc".to_string())),
            Step::Status(TransactionStatus::Success) => {
                Ok(Transaction::success(json!({ "logs": [] })))
            }
            Step::Status(status) => Ok(Transaction::new(status, None)),
            Step::Broken => Err(LookupError::Other(kyc_nft_core::Error::internal(
                ErrorCode::UnexpectedResponse,
                "node answered garbage",
            ))),
        }
    }
}

impl TransactionLookup for ScriptedLookup {
    async fn transaction_status(&self, _tx_hash: &str) -> Result<Transaction, LookupError> {
        self.calls.set(self.calls.get() + 1);
        let mut script = self.script.borrow_mut();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            match script.front().unwrap() {
                Ok(tx) => Ok(tx.clone()),
                Err(LookupError::DoesNotExist(h)) => Err(LookupError::DoesNotExist(h.clone())),
                Err(LookupError::Other(e)) => Err(LookupError::Other(
                    kyc_nft_core::Error::from_code(e.code().unwrap(), e.message()),
                )),
            }
        }
    }
}

fn config(max_retries: u32) -> WatchConfig {
    WatchConfig::builder()
        .interval(Duration::from_secs(3))
        .max_retries(max_retries)
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_not_indexed_then_success_resolves_with_payload() {
    let lookup = ScriptedLookup::new(vec![
        Step::Missing,
        Step::Missing,
        Step::Missing,
        Step::Status(TransactionStatus::Success),
    ]);

    let tx = wait_for_transaction(&lookup, "0xabc", &config(5))
        .await
        .unwrap();

    assert_eq!(tx.status, TransactionStatus::Success);
    assert_eq!(tx.data, Some(json!({ "logs": [] })));
    assert_eq!(lookup.calls.get(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_pending_and_unknown_keep_polling() {
    let lookup = ScriptedLookup::new(vec![
        Step::Status(TransactionStatus::Started),
        Step::Status(TransactionStatus::Unknown),
        Step::Status(TransactionStatus::NotStarted),
        Step::Status(TransactionStatus::Success),
    ]);

    wait_for_transaction(&lookup, "0xabc", &config(10))
        .await
        .unwrap();
    assert_eq!(lookup.calls.get(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_is_transaction_not_found() {
    let lookup = ScriptedLookup::new(vec![Step::Missing]);

    let err = wait_for_transaction(&lookup, "0xabc", &config(3))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transaction);
    assert_eq!(err.code(), Some(ErrorCode::TransactionNotFound));
    assert!(err.has_source());
    assert_eq!(lookup.calls.get(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_failure_status_is_transaction_failed() {
    let lookup = ScriptedLookup::new(vec![
        Step::Status(TransactionStatus::Started),
        Step::Status(TransactionStatus::Failure),
    ]);

    let err = wait_for_transaction(&lookup, "0xabc", &config(10))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::TransactionFailed));
}

#[tokio::test(start_paused = true)]
async fn test_other_lookup_errors_are_fatal_immediately() {
    let lookup = ScriptedLookup::new(vec![Step::Broken]);

    let err = wait_for_transaction(&lookup, "0xabc", &config(10))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::UnexpectedResponse));
    assert_eq!(lookup.calls.get(), 1);
}
