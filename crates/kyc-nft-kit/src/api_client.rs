//! The backend REST surface.

use serde::{Deserialize, Serialize};

use kyc_nft_core::types::{
    AnyJson, Blockchain, BlockchainNetwork, MintAuthResponse, Session, UserDetails,
    VerificationType,
};

/// A non-success backend response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Backend responded with HTTP {status}: {body}")]
pub struct ApiError {
    pub status: u16,
    pub body: ApiErrorBody,
}

impl ApiError {
    pub fn new(status: u16, body: ApiErrorBody) -> Self {
        ApiError { status, body }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == http::StatusCode::UNAUTHORIZED.as_u16()
    }
}

/// The three error body shapes the backend produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorBody {
    Text(String),
    /// `{ "error": { "code", "description" } }`
    Simple { code: String, description: String },
    Detailed {
        reference_id: String,
        status_code: u16,
        error_code: String,
        message: String,
    },
}

#[derive(Deserialize)]
struct DetailedBody {
    reference_id: String,
    status_code: u16,
    error_code: String,
    message: String,
}

#[derive(Deserialize)]
struct SimpleBody {
    error: SimpleInner,
}

#[derive(Deserialize)]
struct SimpleInner {
    code: AnyJson,
    description: String,
}

impl ApiErrorBody {
    pub fn parse(text: &str) -> Self {
        if let Ok(d) = serde_json::from_str::<DetailedBody>(text) {
            return ApiErrorBody::Detailed {
                reference_id: d.reference_id,
                status_code: d.status_code,
                error_code: d.error_code,
                message: d.message,
            };
        }
        if let Ok(s) = serde_json::from_str::<SimpleBody>(text) {
            let code = match s.error.code {
                AnyJson::String(code) => code,
                other => other.to_string(),
            };
            return ApiErrorBody::Simple {
                code,
                description: s.error.description,
            };
        }
        ApiErrorBody::Text(text.to_string())
    }

    /// The backend's machine readable code, if the body carries one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            ApiErrorBody::Text(_) => None,
            ApiErrorBody::Simple { code, .. } => Some(code),
            ApiErrorBody::Detailed { error_code, .. } => Some(error_code),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiErrorBody::Text(text) => text,
            ApiErrorBody::Simple { description, .. } => description,
            ApiErrorBody::Detailed { message, .. } => message,
        }
    }
}

impl std::fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiErrorBody::Text(text) => write!(f, "{text}"),
            ApiErrorBody::Simple { code, description } => write!(f, "{code}: {description}"),
            ApiErrorBody::Detailed {
                reference_id,
                error_code,
                message,
                ..
            } => write!(f, "{error_code}: {message} (reference id: {reference_id})"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub current_time: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// A network as listed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendNetwork {
    pub id: BlockchainNetwork,
    pub blockchain: Blockchain,
    #[serde(default)]
    pub native_coin_symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub blockchain: Blockchain,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserRequest {
    /// The session nonce signed by the wallet.
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeMintingRequest {
    pub blockchain_account_id: u64,
    pub network: BlockchainNetwork,
    pub verification_type: VerificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeTokenRequest {
    pub authorization_code: String,
    pub minting_tx_id: String,
    pub token_id: String,
}

/// Backend operations the SDK depends on.
pub trait BackendApi {
    type Error: std::error::Error + Send + Sync + 'static;

    fn get_status(&self) -> impl Future<Output = Result<ApiStatus, Self::Error>>;

    fn get_networks(&self) -> impl Future<Output = Result<Vec<BackendNetwork>, Self::Error>>;

    /// The current session, or `None` when the backend has none for this client.
    fn get_session(&self) -> impl Future<Output = Result<Option<Session>, Self::Error>>;

    fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> impl Future<Output = Result<Session, Self::Error>>;

    fn create_user(
        &self,
        request: &CreateUserRequest,
    ) -> impl Future<Output = Result<UserDetails, Self::Error>>;

    fn update_user(
        &self,
        request: &UpdateUserRequest,
    ) -> impl Future<Output = Result<UserDetails, Self::Error>>;

    fn accept_disclaimer(&self) -> impl Future<Output = Result<(), Self::Error>>;

    fn authorize_minting(
        &self,
        request: &AuthorizeMintingRequest,
    ) -> impl Future<Output = Result<MintAuthResponse, Self::Error>>;

    fn finalize_token(
        &self,
        request: &FinalizeTokenRequest,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}

#[cfg(feature = "http-client")]
pub use client::*;

#[cfg(feature = "http-client")]
mod client {
    use http::{HeaderMap, HeaderName, HeaderValue, Method, header::AUTHORIZATION};
    use serde::{Serialize, de::DeserializeOwned};
    use url::Url;

    use super::*;

    /// A backend client over HTTP.
    ///
    /// The session lives in a cookie, so every clone shares one cookie store.
    /// `base_url` must end with `/` for paths to join below it.
    #[derive(Debug, Clone)]
    pub struct BackendClient {
        pub base_url: Url,
        pub client: reqwest::Client,
        pub headers: HeaderMap,
    }

    #[derive(Debug, thiserror::Error)]
    pub enum BackendClientError {
        #[error("URL parse error: {0}")]
        UrlParseError(#[from] url::ParseError),
        #[error("HTTP request error: {0}")]
        HttpRequestError(#[from] reqwest::Error),
        #[error("Serialization/Deserialization error: {0}")]
        SerdeError(#[from] serde_json::Error),
        #[error("Invalid header value: {0}")]
        InvalidHeader(#[from] http::header::InvalidHeaderValue),
        #[error("{0}")]
        Api(#[from] ApiError),
    }

    impl BackendClient {
        pub fn new(base_url: Url) -> Result<Self, BackendClientError> {
            let client = reqwest::Client::builder().cookie_store(true).build()?;
            Ok(BackendClient {
                base_url,
                client,
                headers: HeaderMap::new(),
            })
        }

        /// Authenticate every request with a bearer API key.
        pub fn with_api_key(self, api_key: &str) -> Result<Self, BackendClientError> {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))?;
            Ok(self.header(&AUTHORIZATION, &value))
        }

        pub fn header(mut self, key: &HeaderName, value: &HeaderValue) -> Self {
            self.headers.insert(key, value.to_owned());
            self
        }

        async fn send<B: Serialize, R: DeserializeOwned>(
            &self,
            method: Method,
            path: &str,
            body: Option<&B>,
        ) -> Result<R, BackendClientError> {
            let url = self.base_url.join(path)?;

            #[cfg(feature = "tracing")]
            tracing::debug!("{method} {url}");

            let mut request = self
                .client
                .request(method, url)
                .headers(self.headers.clone());
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;

            if !status.is_success() {
                return Err(ApiError::new(status.as_u16(), ApiErrorBody::parse(&text)).into());
            }
            let text = if text.trim().is_empty() { "null" } else { &text };
            Ok(serde_json::from_str(text)?)
        }

        async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, BackendClientError> {
            self.send::<(), R>(Method::GET, path, None).await
        }
    }

    impl BackendApi for BackendClient {
        type Error = BackendClientError;

        async fn get_status(&self) -> Result<ApiStatus, Self::Error> {
            self.get("status").await
        }

        async fn get_networks(&self) -> Result<Vec<BackendNetwork>, Self::Error> {
            self.get("networks").await
        }

        async fn get_session(&self) -> Result<Option<Session>, Self::Error> {
            match self.get("session").await {
                Ok(session) => Ok(Some(session)),
                Err(BackendClientError::Api(api)) if api.is_unauthorized() => Ok(None),
                Err(err) => Err(err),
            }
        }

        async fn create_session(
            &self,
            request: &CreateSessionRequest,
        ) -> Result<Session, Self::Error> {
            self.send(Method::POST, "session", Some(request)).await
        }

        async fn create_user(&self, request: &CreateUserRequest) -> Result<UserDetails, Self::Error> {
            self.send(Method::POST, "user", Some(request)).await
        }

        async fn update_user(&self, request: &UpdateUserRequest) -> Result<UserDetails, Self::Error> {
            self.send(Method::PUT, "user", Some(request)).await
        }

        async fn accept_disclaimer(&self) -> Result<(), Self::Error> {
            self.send::<(), AnyJson>(Method::POST, "disclaimer", None)
                .await
                .map(|_| ())
        }

        async fn authorize_minting(
            &self,
            request: &AuthorizeMintingRequest,
        ) -> Result<MintAuthResponse, Self::Error> {
            self.send(Method::POST, "authorize_minting", Some(request))
                .await
        }

        async fn finalize_token(&self, request: &FinalizeTokenRequest) -> Result<(), Self::Error> {
            self.send::<_, AnyJson>(Method::POST, "token", Some(request))
                .await
                .map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_bodies() {
        let detailed = ApiErrorBody::parse(
            r#"{"reference_id":"R1","status_code":400,"error_code":"PriceTooHigh","message":"Gas price too high"}"#,
        );
        assert_eq!(detailed.error_code(), Some("PriceTooHigh"));
        assert_eq!(detailed.message(), "Gas price too high");

        let simple = ApiErrorBody::parse(r#"{"error":{"code":42,"description":"bad input"}}"#);
        assert_eq!(
            simple,
            ApiErrorBody::Simple {
                code: "42".into(),
                description: "bad input".into()
            }
        );

        let text = ApiErrorBody::parse("Service Unavailable");
        assert_eq!(text, ApiErrorBody::Text("Service Unavailable".into()));
        assert_eq!(text.error_code(), None);
    }

    #[test]
    fn test_unauthorized() {
        assert!(ApiError::new(401, ApiErrorBody::Text(String::new())).is_unauthorized());
        assert!(!ApiError::new(403, ApiErrorBody::Text(String::new())).is_unauthorized());
    }
}
