//! SOAP request envelope construction.

use xmltree::{Element, EmitterConfig, XMLNode};

const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SOAP_STYLE: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Builds the SOAP envelope for invoking `action` on a service of type
/// `service_type` with the given ordered arguments.
///
/// The output carries no XML declaration and the exact shape UPnP
/// devices expect:
///
/// ```text
/// <s:Envelope xmlns:s="..." s:encodingStyle="...">
///  <s:Body>
///   <u:ActionName xmlns:u="serviceType">
///    <argName>value</argName> ...
///   </u:ActionName>
///  </s:Body>
/// </s:Envelope>
/// ```
pub fn build_action_request(
    service_type: &str,
    action: &str,
    args: &[(String, String)],
) -> Result<String, xmltree::Error> {
    let mut action_elem = Element::new(&format!("u:{}", action));
    action_elem
        .attributes
        .insert("xmlns:u".to_string(), service_type.to_string());
    for (name, value) in args {
        let mut child = Element::new(name);
        if !value.is_empty() {
            child.children.push(XMLNode::Text(value.clone()));
        }
        action_elem.children.push(XMLNode::Element(child));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(action_elem));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_STYLE.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new().write_document_declaration(false);
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8(buf).expect("emitted XML is UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_browse_request() {
        let args = [
            ("ObjectID".to_string(), "0".to_string()),
            ("BrowseFlag".to_string(), "BrowseDirectChildren".to_string()),
            ("Filter".to_string(), "*".to_string()),
            ("StartingIndex".to_string(), "0".to_string()),
            ("RequestedCount".to_string(), "0".to_string()),
            ("SortCriteria".to_string(), String::new()),
        ];
        let xml = build_action_request(
            "urn:schemas-upnp-org:service:ContentDirectory:1",
            "Browse",
            &args,
        )
        .unwrap();

        assert!(!xml.starts_with("<?xml"));
        assert!(xml.contains(
            r#"<u:Browse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">"#
        ));
        assert!(xml.contains("<ObjectID>0</ObjectID>"));
        assert!(xml.contains("<BrowseFlag>BrowseDirectChildren</BrowseFlag>"));
        assert!(xml.contains(r#"xmlns:s="http://schemas.xmlsoap.org/soap/envelope/""#));
        assert!(xml.contains(r#"s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/""#));
    }

    #[test]
    fn empty_argument_is_an_empty_element() {
        let args = [("SortCriteria".to_string(), String::new())];
        let xml = build_action_request(
            "urn:schemas-upnp-org:service:ContentDirectory:1",
            "Browse",
            &args,
        )
        .unwrap();
        assert!(xml.contains("<SortCriteria />") || xml.contains("<SortCriteria/>"));
    }

    #[test]
    fn no_argument_action() {
        let xml = build_action_request(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "GetMediaInfo",
            &[],
        )
        .unwrap();
        assert!(xml.contains("u:GetMediaInfo"));
        assert!(xml.contains("s:Body"));
    }
}
