//! Client-side SOAP for UPnP action invocation.
//!
//! Covers the three things a control point does with SOAP:
//!
//! - build the request envelope for an action and its ordered
//!   arguments ([`build_action_request`]);
//! - parse a 200 response into the `argument name → value` map the
//!   caller gets back ([`parse_action_response`]);
//! - parse a 500 Fault envelope, including the
//!   `UPnPError/errorCode` detail ([`parse_fault`], [`SoapFault`]).
//!
//! Element matching is by local name throughout; devices use a variety
//! of namespace prefixes and some none at all.

mod builder;
mod envelope;
mod fault;
mod parser;

pub use builder::build_action_request;
pub use envelope::{SoapBody, SoapEnvelope, SoapHeader};
pub use fault::{parse_fault, SoapFault, ERROR_CODE_KEY, ERROR_DESCRIPTION_KEY, FAULT_CODE_KEY, FAULT_STRING_KEY};
pub use parser::{parse_action_response, parse_envelope, SoapParseError};

/// Standard UPnP action error codes, for interpreting faults.
pub mod error_codes {
    pub const INVALID_ACTION: u32 = 401;
    pub const INVALID_ARGS: u32 = 402;
    pub const ACTION_FAILED: u32 = 501;
    pub const ARGUMENT_VALUE_INVALID: u32 = 600;
    pub const ARGUMENT_VALUE_OUT_OF_RANGE: u32 = 601;
    pub const OPTIONAL_ACTION_NOT_IMPLEMENTED: u32 = 602;
    pub const OUT_OF_MEMORY: u32 = 603;
    pub const HUMAN_INTERVENTION_REQUIRED: u32 = 604;
    pub const STRING_ARGUMENT_TOO_LONG: u32 = 605;
}
