use std::{cell::RefCell, collections::VecDeque};

use url::Url;

use kyc_nft_core::types::AnyJson;

use crate::{
    concepts::Wallet,
    rpc::{HttpTransport, JsonRpcError, TransportError},
};

/// Replays canned answers and records every request.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub answers: RefCell<VecDeque<Result<AnyJson, TransportError>>>,
    pub requests: RefCell<Vec<(String, Option<AnyJson>)>>,
}

impl MockTransport {
    pub fn with(answers: Vec<Result<AnyJson, TransportError>>) -> Self {
        MockTransport {
            answers: RefCell::new(answers.into()),
            requests: RefCell::default(),
        }
    }

    /// Wrap each value as a successful JSON-RPC response.
    pub fn rpc(results: Vec<AnyJson>) -> Self {
        MockTransport::with(
            results
                .into_iter()
                .map(|result| Ok(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": result })))
                .collect(),
        )
    }

    pub fn bodies(&self) -> Vec<AnyJson> {
        self.requests
            .borrow()
            .iter()
            .filter_map(|(_, body)| body.clone())
            .collect()
    }

    fn next(&self) -> Result<AnyJson, TransportError> {
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(TransportError::Request("no more answers".into())))
    }
}

impl HttpTransport for MockTransport {
    async fn get_json(&self, url: &Url) -> Result<AnyJson, TransportError> {
        self.requests.borrow_mut().push((url.to_string(), None));
        self.next()
    }

    async fn post_json(&self, url: &Url, body: &AnyJson) -> Result<AnyJson, TransportError> {
        self.requests
            .borrow_mut()
            .push((url.to_string(), Some(body.clone())));
        self.next()
    }
}

/// A wallet answering from a script.
#[derive(Debug, Default)]
pub struct MockWallet {
    pub answers: RefCell<VecDeque<Result<AnyJson, JsonRpcError>>>,
    pub requests: RefCell<Vec<(String, AnyJson)>>,
}

impl MockWallet {
    pub fn with(answers: Vec<Result<AnyJson, JsonRpcError>>) -> Self {
        MockWallet {
            answers: RefCell::new(answers.into()),
            requests: RefCell::default(),
        }
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|(m, _)| m.clone()).collect()
    }
}

impl Wallet for MockWallet {
    type Error = JsonRpcError;

    async fn request(&self, method: &str, params: AnyJson) -> Result<AnyJson, Self::Error> {
        self.requests.borrow_mut().push((method.to_string(), params));
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(JsonRpcError::new(-32603, "no more answers")))
    }
}
