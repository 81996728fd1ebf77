//! SOAP Fault parsing.

use std::collections::HashMap;

use super::parser::{child_by_local_name, element_children, SoapParseError};
use super::SoapEnvelope;

pub const FAULT_CODE_KEY: &str = "faultcode";
pub const FAULT_STRING_KEY: &str = "faultstring";
pub const ERROR_CODE_KEY: &str = "UPnPError/errorCode";
pub const ERROR_DESCRIPTION_KEY: &str = "UPnPError/errorDescription";

/// A parsed SOAP fault.
///
/// The raw key/value view keeps everything the device sent:
/// `faultcode`, `faultstring`, and each `<detail>/<UPnPError>` child as
/// `UPnPError/<name>`. Typed accessors cover the fields every fault
/// must carry.
#[derive(Debug, Clone)]
pub struct SoapFault {
    values: HashMap<String, String>,
}

impl SoapFault {
    pub fn fault_code(&self) -> &str {
        self.values.get(FAULT_CODE_KEY).map(String::as_str).unwrap_or("")
    }

    pub fn fault_string(&self) -> &str {
        self.values
            .get(FAULT_STRING_KEY)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// The UPnP error code. Always present in a fault that passed
    /// parsing, `None` only if it was non-numeric.
    pub fn error_code(&self) -> Option<u32> {
        self.values.get(ERROR_CODE_KEY)?.trim().parse().ok()
    }

    pub fn error_description(&self) -> Option<&str> {
        self.values.get(ERROR_DESCRIPTION_KEY).map(String::as_str)
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    pub fn into_values(self) -> HashMap<String, String> {
        self.values
    }
}

impl std::fmt::Display for SoapFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.values.get(ERROR_CODE_KEY) {
            Some(code) => write!(f, "UPnP error {}: {}", code, self.fault_string()),
            None => write!(f, "SOAP fault: {}", self.fault_string()),
        }
    }
}

/// Parses the `<s:Fault>` element out of an envelope.
///
/// A fault without `UPnPError/errorCode` does not follow the UPnP
/// error convention and is rejected as malformed.
pub fn parse_fault(envelope: &SoapEnvelope) -> Result<SoapFault, SoapParseError> {
    let fault = child_by_local_name(&envelope.body.content, "Fault")
        .ok_or(SoapParseError::MissingFault)?;

    let mut values = HashMap::new();
    for child in element_children(fault) {
        if child.name == "detail" || child.name.ends_with(":detail") {
            if let Some(upnp_error) = child_by_local_name(child, "UPnPError") {
                for entry in element_children(upnp_error) {
                    let value = entry
                        .get_text()
                        .map(|t| t.trim().to_string())
                        .unwrap_or_default();
                    values.insert(format!("UPnPError/{}", entry.name), value);
                }
            }
            continue;
        }
        let value = child
            .get_text()
            .map(|t| t.into_owned())
            .unwrap_or_default();
        values.insert(child.name.clone(), value);
    }

    if !values.contains_key(ERROR_CODE_KEY) {
        return Err(SoapParseError::MissingErrorCode);
    }
    Ok(SoapFault { values })
}
