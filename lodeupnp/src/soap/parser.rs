//! SOAP response envelope parsing.

use std::collections::HashMap;
use std::io::BufReader;

use tracing::trace;
use xmltree::Element;

use super::{SoapBody, SoapEnvelope, SoapHeader};

#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("missing SOAP Envelope")]
    MissingEnvelope,

    #[error("missing SOAP Body")]
    MissingBody,

    #[error("no {0} element in SOAP Body")]
    MissingResponse(String),

    #[error("no Fault element in SOAP Body")]
    MissingFault,

    #[error("fault carries no UPnPError/errorCode")]
    MissingErrorCode,
}

/// Parses a complete SOAP envelope from XML bytes.
pub fn parse_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    if !root.name.ends_with("Envelope") {
        return Err(SoapParseError::MissingEnvelope);
    }

    let header = child_by_local_name(&root, "Header").map(|e| SoapHeader { content: e.clone() });

    let body = child_by_local_name(&root, "Body")
        .map(|e| SoapBody { content: e.clone() })
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope { header, body })
}

/// Extracts the result map from the `<ActionName>Response` element.
///
/// Every child element contributes its local name as key and its text
/// content as value. Children not declared as OUT arguments are kept;
/// devices routinely return extra information.
pub fn parse_action_response(
    envelope: &SoapEnvelope,
    action: &str,
) -> Result<HashMap<String, String>, SoapParseError> {
    let response_tag = format!("{}Response", action);
    let response = child_by_local_name(&envelope.body.content, &response_tag)
        .ok_or_else(|| SoapParseError::MissingResponse(response_tag.clone()))?;

    let mut result = HashMap::new();
    for child in element_children(response) {
        let value = child
            .get_text()
            .map(|t| t.into_owned())
            .unwrap_or_default();
        trace!(name = child.name.as_str(), "response argument");
        result.insert(child.name.clone(), value);
    }
    Ok(result)
}

/// Finds a direct child whose local name matches exactly, tolerating
/// prefixed names left unsplit by hand-built documents.
pub(crate) fn child_by_local_name<'a>(parent: &'a Element, local: &str) -> Option<&'a Element> {
    element_children(parent).find(|e| {
        e.name == local || e.name.rsplit(':').next() == Some(local)
    })
}

pub(crate) fn element_children(parent: &Element) -> impl Iterator<Item = &Element> {
    parent.children.iter().filter_map(|node| node.as_element())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_browse_response() {
        let xml = br#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:BrowseResponse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
      <Result>XYZ</Result>
      <NumberReturned>1</NumberReturned>
    </u:BrowseResponse>
  </s:Body>
</s:Envelope>"#;

        let envelope = parse_envelope(xml).unwrap();
        let result = parse_action_response(&envelope, "Browse").unwrap();
        assert_eq!(result.get("Result"), Some(&"XYZ".to_string()));
        assert_eq!(result.get("NumberReturned"), Some(&"1".to_string()));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn undeclared_arguments_are_kept() {
        let xml = br#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:PlayResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
      <VendorExtra>yes</VendorExtra>
    </u:PlayResponse>
  </s:Body>
</s:Envelope>"#;
        let envelope = parse_envelope(xml).unwrap();
        let result = parse_action_response(&envelope, "Play").unwrap();
        assert_eq!(result.get("VendorExtra"), Some(&"yes".to_string()));
    }

    #[test]
    fn missing_body_is_an_error() {
        let xml = br#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"/>"#;
        match parse_envelope(xml) {
            Err(SoapParseError::MissingBody) => {}
            other => panic!("expected MissingBody, got {:?}", other),
        }
    }

    #[test]
    fn missing_response_element_is_an_error() {
        let xml = br#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body/>
</s:Envelope>"#;
        let envelope = parse_envelope(xml).unwrap();
        match parse_action_response(&envelope, "Browse") {
            Err(SoapParseError::MissingResponse(tag)) => assert_eq!(tag, "BrowseResponse"),
            other => panic!("expected MissingResponse, got {:?}", other),
        }
    }
}
