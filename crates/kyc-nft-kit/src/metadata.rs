//! Off-chain token metadata.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use url::Url;

use kyc_nft_core::{Error, ErrorCode, types::TokenDetails};

use crate::{errors::classify, rpc::HttpTransport};

pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

const JSON_DATA_URI: &str = "data:application/json;base64,";

/// The JSON document a token URI points to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl NftMetadata {
    pub fn into_token_details(self, token_id: impl Into<String>, gateway: &str) -> TokenDetails {
        TokenDetails {
            token_id: Some(token_id.into()),
            name: self.name,
            description: self.description,
            image: self.image.map(|image| resolve_uri(&image, gateway)),
        }
    }
}

/// Rewrite `ipfs://` URIs to `gateway`. Other URIs are returned unchanged.
pub fn resolve_uri(uri: &str, gateway: &str) -> String {
    match uri.strip_prefix("ipfs://") {
        Some(path) => {
            let path = path.strip_prefix("ipfs/").unwrap_or(path);
            format!("{}/{}", gateway.trim_end_matches('/'), path)
        }
        None => uri.to_string(),
    }
}

/// Dereference `uri` into its metadata document.
///
/// Inline `data:application/json;base64,` URIs are decoded without a request.
pub async fn fetch_metadata<T: HttpTransport>(
    transport: &T,
    uri: &str,
    gateway: &str,
) -> Result<NftMetadata, Error> {
    if let Some(encoded) = uri.strip_prefix(JSON_DATA_URI) {
        let bytes = STANDARD.decode(encoded).map_err(|e| {
            Error::internal(ErrorCode::MetadataInvalid, format!("Invalid inline metadata: {e}"))
        })?;
        return serde_json::from_slice(&bytes).map_err(|e| {
            Error::internal(ErrorCode::MetadataInvalid, format!("Invalid inline metadata: {e}"))
        });
    }

    let url = Url::parse(&resolve_uri(uri, gateway)).map_err(|e| {
        Error::internal(
            ErrorCode::MetadataInvalid,
            format!("Invalid metadata URI {uri}: {e}"),
        )
    })?;

    #[cfg(feature = "tracing")]
    tracing::debug!("Fetching token metadata from {url}");

    let document = transport.get_json(&url).await.map_err(classify)?;
    serde_json::from_value(document).map_err(|e| {
        Error::internal(ErrorCode::MetadataInvalid, format!("Invalid metadata document: {e}"))
    })
}
