use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::types::{ChainAndAddress, VerificationType};

/// What the caller asks to mint.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MintingData {
    pub disclaimer_accepted: bool,
    pub verification_type: VerificationType,
    #[builder(into)]
    pub image_id: Option<String>,
    pub subscription_years: Option<u32>,
}

/// Backend answer to `POST authorize_minting`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintAuthResponse {
    /// Code redeemed by the mint call on chain.
    pub authorization_code: String,
    /// On-chain authorization transaction, for chains that pre-stage authorization.
    #[serde(default)]
    pub authorization_tx_id: Option<String>,
    /// Backend-prepared serialized mint transaction (base64), where the chain needs one.
    #[serde(default)]
    pub mint_transaction: Option<String>,
    /// Mint price in the chain's smallest unit, when the backend quotes it.
    #[serde(default)]
    pub price: Option<String>,
}

/// Client-local memo of an authorization obtained for one `(wallet, minting data)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintingState {
    pub chain_and_address: ChainAndAddress,
    pub minting_data: MintingData,
    pub mint_auth_response: MintAuthResponse,
}

impl MintingState {
    /// The memo is only reusable for exactly the inputs it was created for.
    pub fn matches(&self, chain_and_address: &ChainAndAddress, minting_data: &MintingData) -> bool {
        &self.chain_and_address == chain_and_address && &self.minting_data == minting_data
    }
}

/// Steps of the minting state machine.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintingStep {
    NotAuthorized,
    AuthorizationPending,
    Authorized,
    SubmissionPending,
    Confirming,
    Reconciled,
    Failed,
}

impl MintingStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MintingStep::Reconciled | MintingStep::Failed)
    }
}

/// A mint attempt persisted across a page navigation or process restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMint {
    pub attempt_id: String,
    pub chain_and_address: ChainAndAddress,
    pub minting_data: MintingData,
    pub mint_auth_response: MintAuthResponse,
    pub step: MintingStep,
    #[serde(default)]
    pub tx_hash: Option<String>,
}
