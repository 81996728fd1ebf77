//! Fetching and parsing device and service descriptions.
//!
//! The device document is parsed as a tree (descriptions nest:
//! embedded devices, icon and service lists); the flat action and
//! state variable tables of an SCPD are streamed.

use std::collections::HashMap;
use std::io::BufReader;
use std::sync::Arc;

use lodeupnp::http::HttpClient;
use lodeupnp::ssdp::SsdpMessage;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;
use url::Url;
use xmltree::Element;

use crate::action::{Action, ArgumentBuilder};
use crate::device::{Device, DeviceFields, Icon};
use crate::errors::ControlPointError;
use crate::service::Service;
use crate::state_variable::{StateVariable, StateVariableBuilder};
use crate::subscription::GenaContext;

/// Fetches description documents and assembles the entity graph.
///
/// `http` is the pooled keep-alive client (one description fetch means
/// one device document plus one SCPD per service, usually from the
/// same host); `soap` is the one-shot client actions invoke through.
pub(crate) struct DeviceLoader {
    http: Arc<HttpClient>,
    soap: Arc<HttpClient>,
    gena: Arc<GenaContext>,
}

impl DeviceLoader {
    pub fn new(http: Arc<HttpClient>, soap: Arc<HttpClient>, gena: Arc<GenaContext>) -> Self {
        Self { http, soap, gena }
    }

    /// GETs the LOCATION of `message` and builds the device it
    /// describes, services and embedded devices included.
    pub fn load(&self, message: &SsdpMessage) -> Result<Arc<Device>, ControlPointError> {
        let location = message
            .location()
            .ok_or_else(|| ControlPointError::protocol("advertisement without LOCATION"))?;
        let location = Url::parse(location)
            .map_err(|e| ControlPointError::build(format!("bad LOCATION {:?}: {}", location, e)))?;
        debug!(url = location.as_str(), "fetching device description");

        let body = self.fetch(&location)?;
        let parsed = parse_device_description(&body)?;
        self.build_device(parsed, &location, message)
    }

    fn fetch(&self, url: &Url) -> Result<Vec<u8>, ControlPointError> {
        let response = self.http.get(url)?;
        if response.status() != 200 {
            return Err(ControlPointError::protocol(format!(
                "GET {} returned HTTP {} {}",
                url,
                response.status(),
                response.reason()
            )));
        }
        if response.body().is_empty() {
            return Err(ControlPointError::protocol(format!("GET {} returned an empty body", url)));
        }
        Ok(response.body().to_vec())
    }

    fn build_device(
        &self,
        parsed: ParsedDevice,
        location: &Url,
        message: &SsdpMessage,
    ) -> Result<Arc<Device>, ControlPointError> {
        let base = parsed.url_base.clone();
        self.build_device_inner(parsed, location, base.as_ref(), message)
    }

    fn build_device_inner(
        &self,
        parsed: ParsedDevice,
        location: &Url,
        url_base: Option<&Url>,
        message: &SsdpMessage,
    ) -> Result<Arc<Device>, ControlPointError> {
        let mut services = Vec::with_capacity(parsed.services.len());
        for declaration in parsed.services {
            services.push(self.build_service(
                &parsed.fields.udn,
                declaration,
                location,
                url_base,
                message,
            )?);
        }

        let mut embedded = Vec::with_capacity(parsed.embedded.len());
        for child in parsed.embedded {
            embedded.push(self.build_device_inner(child, location, url_base, message)?);
        }

        let icons = parsed
            .icons
            .into_iter()
            .filter_map(|icon| {
                let url = resolve_url(location, url_base, &icon.url).ok()?;
                Some(Icon {
                    mime_type: icon.mime_type,
                    width: icon.width,
                    height: icon.height,
                    depth: icon.depth,
                    url,
                })
            })
            .collect();

        Ok(Arc::new(Device::new(
            parsed.fields,
            location.clone(),
            parsed.url_base,
            icons,
            services,
            embedded,
            message.clone(),
        )))
    }

    fn build_service(
        &self,
        udn: &str,
        declaration: ParsedServiceDecl,
        location: &Url,
        url_base: Option<&Url>,
        message: &SsdpMessage,
    ) -> Result<Arc<Service>, ControlPointError> {
        let scpd_url = resolve_url(location, url_base, &declaration.scpd_url)?;
        let control_url = resolve_url(location, url_base, &declaration.control_url)?;
        let event_sub_url = resolve_url(location, url_base, &declaration.event_sub_url)?;

        debug!(url = scpd_url.as_str(), service = declaration.service_id.as_str(), "fetching SCPD");
        let scpd = parse_scpd(&self.fetch(&scpd_url)?)?;

        let mut state_variables: HashMap<String, Arc<StateVariable>> = HashMap::new();
        for builder in scpd.variables {
            let variable = Arc::new(builder.build()?);
            state_variables.insert(variable.name().to_string(), variable);
        }

        let mut actions = HashMap::new();
        for (name, argument_builders) in scpd.actions {
            if name.is_empty() {
                return Err(ControlPointError::build(format!(
                    "service {} declares an action without a name",
                    declaration.service_id
                )));
            }
            let mut arguments = Vec::with_capacity(argument_builders.len());
            for builder in argument_builders {
                let related_name = builder
                    .related_state_variable_name()
                    .ok_or_else(|| {
                        ControlPointError::build(format!(
                            "action {} has an argument without relatedStateVariable",
                            name
                        ))
                    })?
                    .to_string();
                let related = state_variables.get(&related_name).cloned().ok_or_else(|| {
                    ControlPointError::build(format!(
                        "action {} references unknown state variable {}",
                        name, related_name
                    ))
                })?;
                arguments.push(builder.build(related)?);
            }
            let action = Action::new(
                name.clone(),
                arguments,
                declaration.service_type.clone(),
                control_url.clone(),
                Arc::clone(&self.soap),
            );
            actions.insert(name, Arc::new(action));
        }

        // The service needs a handle to its own Arc for subscription
        // registration.
        Ok(Arc::new_cyclic(|weak| {
            Service::new(
                udn.to_string(),
                message.local_address(),
                declaration.service_type,
                declaration.service_id,
                scpd_url,
                control_url,
                event_sub_url,
                actions,
                state_variables,
                Arc::clone(&self.gena),
                weak.clone(),
            )
        }))
    }
}

/// A declared URL resolved against URLBase when the description has
/// one, else against the document's own location.
fn resolve_url(location: &Url, url_base: Option<&Url>, raw: &str) -> Result<Url, ControlPointError> {
    let base = url_base.unwrap_or(location);
    base.join(raw.trim())
        .map_err(|e| ControlPointError::build(format!("cannot resolve URL {:?}: {}", raw, e)))
}

// ---------------------------------------------------------------------
// Device document (tree parse)
// ---------------------------------------------------------------------

#[derive(Debug)]
struct ParsedDevice {
    fields: DeviceFields,
    url_base: Option<Url>,
    icons: Vec<ParsedIcon>,
    services: Vec<ParsedServiceDecl>,
    embedded: Vec<ParsedDevice>,
}

#[derive(Debug)]
struct ParsedIcon {
    mime_type: String,
    width: Option<u32>,
    height: Option<u32>,
    depth: Option<u32>,
    url: String,
}

#[derive(Debug)]
struct ParsedServiceDecl {
    service_type: String,
    service_id: String,
    scpd_url: String,
    control_url: String,
    event_sub_url: String,
}

fn parse_device_description(xml: &[u8]) -> Result<ParsedDevice, ControlPointError> {
    let root = Element::parse(BufReader::new(xml))
        .map_err(|e| ControlPointError::Malformed(e.to_string()))?;
    let url_base = child_text(&root, "URLBase").and_then(|s| Url::parse(s.trim()).ok());
    let device = root
        .get_child("device")
        .ok_or_else(|| ControlPointError::build("description has no device element"))?;
    let mut parsed = parse_device_element(device)?;
    parsed.url_base = url_base;
    Ok(parsed)
}

fn parse_device_element(device: &Element) -> Result<ParsedDevice, ControlPointError> {
    let required = |name: &str| {
        child_text(device, name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ControlPointError::build(format!("device without {}", name)))
    };
    let fields = DeviceFields {
        udn: required("UDN")?,
        device_type: required("deviceType")?,
        friendly_name: required("friendlyName")?,
        manufacturer: child_text(device, "manufacturer").unwrap_or_default(),
        manufacturer_url: child_text(device, "manufacturerURL"),
        model_name: child_text(device, "modelName").unwrap_or_default(),
        model_number: child_text(device, "modelNumber"),
        model_description: child_text(device, "modelDescription"),
        model_url: child_text(device, "modelURL"),
        serial_number: child_text(device, "serialNumber"),
        upc: child_text(device, "UPC"),
        presentation_url: child_text(device, "presentationURL"),
    };

    let mut icons = Vec::new();
    if let Some(icon_list) = device.get_child("iconList") {
        for icon in element_children(icon_list).filter(|e| e.name == "icon") {
            let Some(url) = child_text(icon, "url") else { continue };
            icons.push(ParsedIcon {
                mime_type: child_text(icon, "mimetype").unwrap_or_default(),
                width: child_text(icon, "width").and_then(|v| v.trim().parse().ok()),
                height: child_text(icon, "height").and_then(|v| v.trim().parse().ok()),
                depth: child_text(icon, "depth").and_then(|v| v.trim().parse().ok()),
                url,
            });
        }
    }

    let mut services = Vec::new();
    if let Some(service_list) = device.get_child("serviceList") {
        for service in element_children(service_list).filter(|e| e.name == "service") {
            let required = |name: &str| {
                child_text(service, name)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| ControlPointError::build(format!("service without {}", name)))
            };
            services.push(ParsedServiceDecl {
                service_type: required("serviceType")?,
                service_id: required("serviceId")?,
                scpd_url: required("SCPDURL")?,
                control_url: required("controlURL")?,
                event_sub_url: required("eventSubURL")?,
            });
        }
    }

    let mut embedded = Vec::new();
    if let Some(device_list) = device.get_child("deviceList") {
        for child in element_children(device_list).filter(|e| e.name == "device") {
            embedded.push(parse_device_element(child)?);
        }
    }

    Ok(ParsedDevice {
        fields,
        url_base: None,
        icons,
        services,
        embedded,
    })
}

fn child_text(element: &Element, name: &str) -> Option<String> {
    element
        .get_child(name)
        .and_then(|c| c.get_text())
        .map(|t| t.trim().to_string())
}

fn element_children(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|n| n.as_element())
}

// ---------------------------------------------------------------------
// SCPD (stream parse)
// ---------------------------------------------------------------------

struct ScpdDocument {
    actions: Vec<(String, Vec<ArgumentBuilder>)>,
    variables: Vec<StateVariableBuilder>,
}

fn parse_scpd(xml: &[u8]) -> Result<ScpdDocument, ControlPointError> {
    let mut reader = Reader::from_reader(BufReader::new(xml));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut actions: Vec<(String, Vec<ArgumentBuilder>)> = Vec::new();
    let mut variables: Vec<StateVariableBuilder> = Vec::new();
    let mut current_action: Option<(String, Vec<ArgumentBuilder>)> = None;
    let mut current_argument: Option<ArgumentBuilder> = None;
    let mut current_variable: Option<StateVariableBuilder> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ControlPointError::Malformed(e.to_string()))?;
        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "action" => current_action = Some((String::new(), Vec::new())),
                    "argument" => current_argument = Some(ArgumentBuilder::new()),
                    "stateVariable" => {
                        let mut builder = StateVariableBuilder::new();
                        if let Ok(Some(attr)) = e.try_get_attribute("sendEvents") {
                            builder.set_send_events(&String::from_utf8_lossy(&attr.value));
                        }
                        current_variable = Some(builder);
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Event::End(_) => {
                match stack.pop().as_deref() {
                    Some("argument") => {
                        if let (Some(action), Some(argument)) =
                            (current_action.as_mut(), current_argument.take())
                        {
                            action.1.push(argument);
                        }
                    }
                    Some("action") => {
                        if let Some(action) = current_action.take() {
                            actions.push(action);
                        }
                    }
                    Some("stateVariable") => {
                        if let Some(variable) = current_variable.take() {
                            variables.push(variable);
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| ControlPointError::Malformed(err.to_string()))?
                    .into_owned();
                let current = stack.last().map(String::as_str).unwrap_or("");
                let parent = stack
                    .len()
                    .checked_sub(2)
                    .and_then(|i| stack.get(i))
                    .map(String::as_str)
                    .unwrap_or("");
                match (parent, current) {
                    ("action", "name") => {
                        if let Some(action) = current_action.as_mut() {
                            action.0 = text;
                        }
                    }
                    ("argument", "name") => {
                        if let Some(argument) = current_argument.as_mut() {
                            argument.set_name(&text);
                        }
                    }
                    ("argument", "direction") => {
                        if let Some(argument) = current_argument.as_mut() {
                            argument.set_direction(&text);
                        }
                    }
                    ("argument", "relatedStateVariable") => {
                        if let Some(argument) = current_argument.as_mut() {
                            argument.set_related_state_variable(&text);
                        }
                    }
                    ("stateVariable", "name") => {
                        if let Some(variable) = current_variable.as_mut() {
                            variable.set_name(&text);
                        }
                    }
                    ("stateVariable", "dataType") => {
                        if let Some(variable) = current_variable.as_mut() {
                            variable.set_data_type(&text);
                        }
                    }
                    ("stateVariable", "defaultValue") => {
                        if let Some(variable) = current_variable.as_mut() {
                            variable.set_default_value(&text);
                        }
                    }
                    ("allowedValueList", "allowedValue") => {
                        if let Some(variable) = current_variable.as_mut() {
                            variable.add_allowed_value(&text);
                        }
                    }
                    ("allowedValueRange", "minimum") => {
                        if let Some(variable) = current_variable.as_mut() {
                            variable.set_minimum(&text);
                        }
                    }
                    ("allowedValueRange", "maximum") => {
                        if let Some(variable) = current_variable.as_mut() {
                            variable.set_maximum(&text);
                        }
                    }
                    ("allowedValueRange", "step") => {
                        if let Some(variable) = current_variable.as_mut() {
                            variable.set_step(&text);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(ScpdDocument { actions, variables })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{Ipv4Addr, SocketAddr, TcpListener};
    use std::thread;

    use lodeupnp::http::HttpRequest;

    const DEVICE_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
    <friendlyName>Music Box</friendlyName>
    <manufacturer>Example Corp</manufacturer>
    <modelName>MB-1</modelName>
    <modelNumber>1.0</modelNumber>
    <UDN>uuid:11111111-1111-1111-1111-111111111111</UDN>
    <iconList>
      <icon>
        <mimetype>image/png</mimetype>
        <width>48</width>
        <height>48</height>
        <depth>24</depth>
        <url>/icon.png</url>
      </icon>
    </iconList>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>
        <SCPDURL>/cd.xml</SCPDURL>
        <controlURL>/cd/control</controlURL>
        <eventSubURL>/cd/event</eventSubURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:Printer:1</deviceType>
        <friendlyName>Embedded Printer</friendlyName>
        <UDN>uuid:22222222-2222-2222-2222-222222222222</UDN>
      </device>
    </deviceList>
  </device>
</root>"#;

    const SCPD_XML: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <actionList>
    <action>
      <name>Browse</name>
      <argumentList>
        <argument>
          <name>ObjectID</name>
          <direction>in</direction>
          <relatedStateVariable>A_ARG_TYPE_ObjectID</relatedStateVariable>
        </argument>
        <argument>
          <name>Filter</name>
          <direction>in</direction>
          <relatedStateVariable>A_ARG_TYPE_Filter</relatedStateVariable>
        </argument>
        <argument>
          <name>Result</name>
          <direction>out</direction>
          <relatedStateVariable>A_ARG_TYPE_Result</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="no">
      <name>A_ARG_TYPE_ObjectID</name>
      <dataType>string</dataType>
    </stateVariable>
    <stateVariable sendEvents="no">
      <name>A_ARG_TYPE_Filter</name>
      <dataType>string</dataType>
      <defaultValue>*</defaultValue>
    </stateVariable>
    <stateVariable sendEvents="no">
      <name>A_ARG_TYPE_Result</name>
      <dataType>string</dataType>
    </stateVariable>
    <stateVariable sendEvents="yes">
      <name>SystemUpdateID</name>
      <dataType>ui4</dataType>
      <allowedValueRange>
        <minimum>0</minimum>
        <maximum>4294967295</maximum>
        <step>1</step>
      </allowedValueRange>
    </stateVariable>
    <stateVariable sendEvents="yes">
      <name>TransportState</name>
      <dataType>string</dataType>
      <allowedValueList>
        <allowedValue>STOPPED</allowedValue>
        <allowedValue>PLAYING</allowedValue>
      </allowedValueList>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

    #[test]
    fn parses_device_document() {
        let parsed = parse_device_description(DEVICE_XML.as_bytes()).unwrap();
        assert_eq!(parsed.fields.udn, "uuid:11111111-1111-1111-1111-111111111111");
        assert_eq!(parsed.fields.friendly_name, "Music Box");
        assert_eq!(parsed.fields.manufacturer, "Example Corp");
        assert_eq!(parsed.fields.model_number.as_deref(), Some("1.0"));
        assert_eq!(parsed.icons.len(), 1);
        assert_eq!(parsed.icons[0].width, Some(48));
        assert_eq!(parsed.services.len(), 1);
        assert_eq!(parsed.services[0].scpd_url, "/cd.xml");
        assert_eq!(parsed.embedded.len(), 1);
        assert_eq!(parsed.embedded[0].fields.friendly_name, "Embedded Printer");
    }

    #[test]
    fn device_without_udn_fails() {
        let xml = r#"<root><device>
            <deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
            <friendlyName>No Identity</friendlyName>
        </device></root>"#;
        match parse_device_description(xml.as_bytes()) {
            Err(ControlPointError::Build(message)) => assert!(message.contains("UDN")),
            other => panic!("expected Build error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn service_missing_control_url_fails() {
        let xml = r#"<root><device>
            <deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
            <friendlyName>Broken</friendlyName>
            <UDN>uuid:1</UDN>
            <serviceList><service>
              <serviceType>urn:x:service:Foo:1</serviceType>
              <serviceId>urn:x:serviceId:Foo</serviceId>
              <SCPDURL>/s.xml</SCPDURL>
              <eventSubURL>/e</eventSubURL>
            </service></serviceList>
        </device></root>"#;
        match parse_device_description(xml.as_bytes()) {
            Err(ControlPointError::Build(message)) => assert!(message.contains("controlURL")),
            other => panic!("expected Build error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn parses_scpd_actions_and_variables() {
        let scpd = parse_scpd(SCPD_XML.as_bytes()).unwrap();
        assert_eq!(scpd.actions.len(), 1);
        let (name, arguments) = &scpd.actions[0];
        assert_eq!(name, "Browse");
        assert_eq!(arguments.len(), 3);
        assert_eq!(
            arguments[0].related_state_variable_name(),
            Some("A_ARG_TYPE_ObjectID")
        );

        assert_eq!(scpd.variables.len(), 5);
        let variables: Vec<StateVariable> = scpd
            .variables
            .into_iter()
            .map(|b| b.build().unwrap())
            .collect();
        let filter = variables.iter().find(|v| v.name() == "A_ARG_TYPE_Filter").unwrap();
        assert_eq!(filter.default_value(), Some("*"));
        assert!(!filter.sends_events());
        let update_id = variables.iter().find(|v| v.name() == "SystemUpdateID").unwrap();
        assert!(update_id.sends_events());
        let range = update_id.allowed_value_range().unwrap();
        assert_eq!(range.minimum, "0");
        assert_eq!(range.step.as_deref(), Some("1"));
        let transport = variables.iter().find(|v| v.name() == "TransportState").unwrap();
        assert_eq!(transport.allowed_values(), ["STOPPED", "PLAYING"]);
    }

    #[test]
    fn url_resolution_prefers_url_base() {
        let location = Url::parse("http://192.0.2.10:2869/desc.xml").unwrap();
        let base = Url::parse("http://192.0.2.10:8080/").unwrap();
        assert_eq!(
            resolve_url(&location, None, "/cd/control").unwrap().as_str(),
            "http://192.0.2.10:2869/cd/control"
        );
        assert_eq!(
            resolve_url(&location, Some(&base), "/cd/control").unwrap().as_str(),
            "http://192.0.2.10:8080/cd/control"
        );
        assert_eq!(
            resolve_url(&location, None, "http://192.0.2.99/abs").unwrap().as_str(),
            "http://192.0.2.99/abs"
        );
    }

    /// Serves the device document and SCPD over loopback, then loads
    /// the device end to end.
    #[test]
    fn loads_device_over_http() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            // One connection per request is enough; the keep-alive
            // client reconnects when the server closes.
            for _ in 0..4 {
                let Ok((mut stream, _)) = listener.accept() else { return };
                let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
                let Ok(request) = HttpRequest::read_from(&mut reader) else { return };
                let body = match request.uri() {
                    "/desc.xml" => DEVICE_XML,
                    "/cd.xml" => SCPD_XML,
                    other => panic!("unexpected request for {}", other),
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        let datagram = format!(
            "NOTIFY * HTTP/1.1\r\n\
             HOST: 239.255.255.250:1900\r\n\
             CACHE-CONTROL: max-age=1800\r\n\
             LOCATION: http://127.0.0.1:{}/desc.xml\r\n\
             NT: upnp:rootdevice\r\n\
             NTS: ssdp:alive\r\n\
             USN: uuid:11111111-1111-1111-1111-111111111111::upnp:rootdevice\r\n\
             \r\n",
            port
        );
        let peer: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        let message = SsdpMessage::parse(
            Ipv4Addr::LOCALHOST,
            peer,
            datagram.as_bytes(),
        )
        .unwrap();

        let http = Arc::new(HttpClient::new(true));
        let soap = Arc::new(HttpClient::new(false));
        let gena = GenaContext::new(Arc::clone(&soap));
        let loader = DeviceLoader::new(http, soap, gena);

        let device = loader.load(&message).unwrap();
        assert_eq!(device.udn(), "uuid:11111111-1111-1111-1111-111111111111");
        assert_eq!(device.friendly_name(), "Music Box");
        assert_eq!(device.services().len(), 1);
        assert_eq!(device.embedded_devices().len(), 1);

        let service = device
            .find_service("urn:upnp-org:serviceId:ContentDirectory")
            .unwrap();
        assert_eq!(
            service.control_url().as_str(),
            format!("http://127.0.0.1:{}/cd/control", port)
        );
        let browse = service.find_action("Browse").unwrap();
        assert_eq!(browse.arguments().len(), 3);
        assert_eq!(
            browse.find_argument("Filter").unwrap().related_state_variable().default_value(),
            Some("*")
        );
        assert!(device
            .find_service_by_type("urn:schemas-upnp-org:service:ContentDirectory:1")
            .is_some());
    }
}
