//! Session guard, minting state machine and the [`KycNft`] facade.
//!
//! A typical integration builds [`KycNft`] from an [`SdkConfig`], connects the
//! user's wallet, logs in and then checks or mints credentials:
//!
//! ```no_run
//! # async fn run<W: kyc_nft_flow::kit::concepts::Wallet>(wallet: W) -> Result<(), kyc_nft_flow::core::Error> {
//! use kyc_nft_flow::{KycNft, MintOutcome, SdkConfig};
//! use kyc_nft_flow::core::types::{BlockchainNetwork, MintingData, VerificationType};
//!
//! let config = SdkConfig::from_json(
//!     r#"{
//!         "api_base_url": "https://staging.kycnft.example/api/",
//!         "enabled_networks": ["NearTestnet"],
//!         "contracts": [
//!             { "network": "NearTestnet", "verification_type": "KYC", "address": "kyc.testnet" }
//!         ]
//!     }"#,
//! )?;
//! let mut sdk = KycNft::from_config(config)?;
//! sdk.initialize().await?;
//! sdk.connect_wallet(BlockchainNetwork::NearTestnet, "alice.testnet", wallet).await?;
//! sdk.register_or_login().await?;
//!
//! let data = MintingData::builder()
//!     .disclaimer_accepted(true)
//!     .verification_type(VerificationType::Kyc)
//!     .build();
//! match sdk.start_minting(data).await? {
//!     MintOutcome::Minted(result) => println!("minted {}", result.transaction_url),
//!     MintOutcome::Redirect { url } => println!("continue at {url}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod guard;
pub mod minting;
pub mod sdk;
pub mod storage;

pub use kyc_nft_core as core;
pub use kyc_nft_kit as kit;

pub use config::SdkConfig;
pub use minting::MintResult;
pub use sdk::{KycNft, MintOutcome};
pub use storage::{FileStore, InMemoryStore, PendingMintStore};

#[cfg(test)]
pub(crate) mod test_utils;
