//! SOAP envelope structure.

use xmltree::Element;

/// A parsed SOAP envelope.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// Optional SOAP header.
    pub header: Option<SoapHeader>,

    /// Body holding the response or fault element.
    pub body: SoapBody,
}

#[derive(Debug, Clone)]
pub struct SoapHeader {
    pub content: Element,
}

#[derive(Debug, Clone)]
pub struct SoapBody {
    pub content: Element,
}

impl SoapEnvelope {
    pub fn new(body: SoapBody) -> Self {
        Self { header: None, body }
    }
}
