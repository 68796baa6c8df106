use serde::{Deserialize, Serialize};

use crate::types::AnyJson;

/// Uniform status of an on-chain transaction, whatever chain it lives on.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    NotStarted,
    Started,
    Success,
    Failure,
    /// A lookup answered but carried no recognizable outcome. Not terminal.
    Unknown,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failure)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub status: TransactionStatus,
    /// Protocol-native receipt or outcome payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AnyJson>,
}

impl Transaction {
    pub fn new(status: TransactionStatus, data: Option<AnyJson>) -> Self {
        Transaction { status, data }
    }

    pub fn started() -> Self {
        Transaction::new(TransactionStatus::Started, None)
    }

    pub fn success(data: AnyJson) -> Self {
        Transaction::new(TransactionStatus::Success, Some(data))
    }

    pub fn failure(data: AnyJson) -> Self {
        Transaction::new(TransactionStatus::Failure, Some(data))
    }

    pub fn unknown(data: Option<AnyJson>) -> Self {
        Transaction::new(TransactionStatus::Unknown, data)
    }
}
