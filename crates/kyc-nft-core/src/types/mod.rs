//! Core types used across the KYC NFT kit.

mod chain;
mod common;
mod minting;
mod nft;
mod session;
mod transaction;

pub use chain::*;
pub use common::*;
pub use minting::*;
pub use nft::*;
pub use session::*;
pub use transaction::*;
