use lodeupnp::http::{HttpClientError, HttpError};
use lodeupnp::soap::{SoapFault, SoapParseError};
use thiserror::Error;

/// Errors surfaced by user-initiated control point operations.
///
/// Passive paths (discovery, event reception) log and continue; these
/// reach callers only from `invoke`, `subscribe`, `unsubscribe`,
/// description loading and lifecycle calls.
#[derive(Debug, Error)]
pub enum ControlPointError {
    /// Socket or HTTP level failure.
    #[error("transport error: {0}")]
    Transport(#[from] HttpClientError),

    /// Bad HTTP or XML framing.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Missing or inconsistent UPnP headers/elements: no SID on a
    /// subscription response, mismatched SID on renewal, unexpected
    /// HTTP status on a control exchange.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The device answered an invocation with a SOAP fault.
    #[error("{0}")]
    Fault(SoapFault),

    /// A description document misses required fields or declares an
    /// Argument whose related StateVariable does not exist.
    #[error("description build error: {0}")]
    Build(String),

    /// Lifecycle misuse, e.g. `start()` before `initialize()` or any
    /// call after `terminate()`.
    #[error("invalid state: {0}")]
    State(String),
}

impl From<HttpError> for ControlPointError {
    fn from(e: HttpError) -> Self {
        ControlPointError::Malformed(e.to_string())
    }
}

impl From<SoapParseError> for ControlPointError {
    fn from(e: SoapParseError) -> Self {
        ControlPointError::Malformed(e.to_string())
    }
}

impl ControlPointError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        ControlPointError::Protocol(message.into())
    }

    pub(crate) fn build(message: impl Into<String>) -> Self {
        ControlPointError::Build(message.into())
    }
}
