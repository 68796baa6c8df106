use serde::{Deserialize, Serialize};

use crate::types::{Blockchain, BlockchainNetwork, ChainAndAddress};

/// Server-issued session record. The client only ever holds a cached copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub expires: Option<String>,
    pub nonce: String,
    #[serde(default)]
    pub chain_and_address: Option<ChainAndAddress>,
    #[serde(default)]
    pub user: Option<UserDetails>,
}

impl Session {
    /// Whether this session was opened for `connected`.
    pub fn belongs_to(&self, connected: &ChainAndAddress) -> bool {
        self.chain_and_address
            .as_ref()
            .is_some_and(|own| own.same_wallet(connected))
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationType {
    #[serde(rename = "KYC")]
    Kyc,
    AccreditedInvestor,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    NotVerified,
    InReview,
    Verified,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub verification_type: VerificationType,
    pub status: VerificationStatus,
}

/// A credential token record as tracked by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub authorization_code: String,
    #[serde(default)]
    pub authorization_tx_id: Option<String>,
    #[serde(default)]
    pub minted_at: Option<String>,
    #[serde(default)]
    pub network: Option<BlockchainNetwork>,
    #[serde(default)]
    pub token_id: Option<String>,
}

impl Token {
    /// An authorization that exists on chain but has not been consumed by a mint yet.
    pub fn is_reusable_authorization(&self) -> bool {
        self.authorization_tx_id.is_some() && self.minted_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainAccount {
    pub id: u64,
    pub blockchain: Blockchain,
    pub address: String,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

impl BlockchainAccount {
    pub fn matches(&self, wallet: &ChainAndAddress) -> bool {
        self.blockchain == wallet.blockchain
            && self.blockchain.addresses_match(&self.address, &wallet.address)
    }
}

/// Server-owned user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDetails {
    pub id: u64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed: Option<String>,
    #[serde(default)]
    pub disclaimer_accepted: Option<String>,
    #[serde(default)]
    pub blockchain_accounts: Vec<BlockchainAccount>,
    #[serde(default)]
    pub verification_requests: Vec<VerificationRequest>,
}

impl UserDetails {
    pub fn account_for(&self, wallet: &ChainAndAddress) -> Option<&BlockchainAccount> {
        self.blockchain_accounts.iter().find(|a| a.matches(wallet))
    }

    /// Whether any of the user's accounts is the connected wallet.
    pub fn owns_wallet(&self, wallet: &ChainAndAddress) -> bool {
        self.account_for(wallet).is_some()
    }

    pub fn has_accepted_disclaimer(&self) -> bool {
        self.disclaimer_accepted.is_some()
    }

    pub fn is_verified_for(&self, verification_type: VerificationType) -> bool {
        self.verification_requests.iter().any(|r| {
            r.verification_type == verification_type && r.status == VerificationStatus::Verified
        })
    }
}
