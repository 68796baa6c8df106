pub mod api_client;
pub mod concepts;
pub mod errors;
pub mod explorer;
pub mod metadata;
pub mod networks;
pub mod rpc;

pub use kyc_nft_core as core;

#[cfg(test)]
pub(crate) mod test_utils;
