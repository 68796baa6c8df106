//! Normalizes any failure into the closed error taxonomy.
//!
//! A [`Classifier`] is built once with an ordered list of chain specific
//! [`ErrorTransformer`]s and an injected [`TelemetrySink`]. Public entry points
//! run their work through [`Classifier::catch`], so callers only ever observe
//! [`Error`]. The classifier never swallows a failure, it only re-shapes it.

use std::{error::Error as StdError, sync::Arc};

use crate::{
    errors::{Error, ErrorCode, ErrorKind},
    polling::TimeOutError,
    types::BoxError,
};

/// Recognizes one family of raw errors.
pub trait ErrorTransformer: Send + Sync {
    /// Return a classified error, or `None` to let the next transformer try.
    fn transform(&self, err: &(dyn StdError + 'static)) -> Option<Error>;
}

/// Receives every classified error that crosses the public boundary.
pub trait TelemetrySink: Send + Sync {
    fn report(&self, operation: &str, error: &Error);
}

/// Drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn report(&self, _operation: &str, _error: &Error) {}
}

/// Emits every report as a structured `tracing` event.
#[cfg(feature = "tracing")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

#[cfg(feature = "tracing")]
impl TelemetrySink for TracingTelemetry {
    fn report(&self, operation: &str, error: &Error) {
        tracing::error!(
            target: "kyc_nft::telemetry",
            operation,
            kind = %error.kind(),
            code = ?error.code(),
            reference_id = error.reference_id(),
            wallet_code = ?error.wallet_code(),
            "{}",
            error.message()
        );
    }
}

/// Iterate over an error and all of its sources.
pub fn error_chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |e| (*e).source())
}

pub struct Classifier {
    transformers: Vec<Box<dyn ErrorTransformer>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Classifier {
    pub fn new(
        transformers: Vec<Box<dyn ErrorTransformer>>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Classifier {
            transformers,
            telemetry,
        }
    }

    /// A classifier that reports nowhere; used where errors are folded into results.
    pub fn silent(transformers: Vec<Box<dyn ErrorTransformer>>) -> Self {
        Classifier::new(transformers, Arc::new(NoopTelemetry))
    }

    /// Shape any error into the taxonomy without reporting it.
    pub fn classify(&self, err: BoxError) -> Error {
        let err = match err.downcast::<Error>() {
            Ok(domain) => return *domain,
            Err(raw) => raw,
        };

        let classified = self
            .transformers
            .iter()
            .find_map(|t| t.transform(&*err))
            .unwrap_or_else(|| classify_by_shape(&*err));

        if classified.has_source() {
            classified
        } else {
            classified.with_source(err)
        }
    }

    /// Await `future`, classify its failure, report and log it, and re-raise it.
    pub async fn catch<T, E, Fut>(&self, operation: &str, future: Fut) -> Result<T, Error>
    where
        E: Into<BoxError>,
        Fut: Future<Output = Result<T, E>>,
    {
        match future.await {
            Ok(value) => Ok(value),
            Err(err) => Err(self.report(operation, err.into())),
        }
    }

    /// Classify, report and log a failure of `operation`.
    pub fn report(&self, operation: &str, err: BoxError) -> Error {
        let classified = self.classify(err);
        self.telemetry.report(operation, &classified);
        log_failure(operation, &classified);
        classified
    }
}

#[cfg(feature = "tracing")]
fn log_failure(operation: &str, error: &Error) {
    if error.is_rejected_by_user() {
        tracing::debug!("{operation} aborted by the user: {error}");
    } else {
        tracing::warn!("{operation} failed: {error}");
    }
}

#[cfg(not(feature = "tracing"))]
fn log_failure(_operation: &str, _error: &Error) {}

/// Last resort classification by the error's concrete type.
fn classify_by_shape(err: &(dyn StdError + 'static)) -> Error {
    for cause in error_chain(err) {
        if let Some(timeout) = cause.downcast_ref::<TimeOutError>() {
            return Error::internal(
                ErrorCode::Timeout,
                format!("Gave up after {} attempts", timeout.attempts),
            );
        }
        if cause.is::<serde_json::Error>() {
            return Error::internal(
                ErrorCode::UnexpectedResponse,
                format!("Unexpected response shape: {cause}"),
            );
        }
        if cause.is::<url::ParseError>() {
            return Error::configuration(
                ErrorCode::InvalidConfiguration,
                format!("Invalid URL: {cause}"),
            );
        }
    }

    Error::new(ErrorKind::Unknown, None, err.to_string())
}
