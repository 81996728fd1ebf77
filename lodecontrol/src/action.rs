//! Actions and their invocation over SOAP.

use std::collections::HashMap;
use std::sync::Arc;

use lodeupnp::http::{HttpClient, HttpRequest};
use lodeupnp::soap::{build_action_request, parse_action_response, parse_envelope, parse_fault};
use lodeupnp::SERVER_TOKEN;
use tracing::debug;
use url::Url;

use crate::errors::ControlPointError;
use crate::state_variable::StateVariable;

/// Declared direction of an [`Argument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub(crate) fn parse(value: &str) -> Result<Self, ControlPointError> {
        if value.eq_ignore_ascii_case("in") {
            Ok(Direction::In)
        } else if value.eq_ignore_ascii_case("out") {
            Ok(Direction::Out)
        } else {
            Err(ControlPointError::build(format!(
                "argument direction {:?} is neither in nor out",
                value
            )))
        }
    }
}

/// One declared argument of an action. Holds a shared handle to the
/// state variable named by `relatedStateVariable`.
#[derive(Debug, Clone)]
pub struct Argument {
    name: String,
    direction: Direction,
    related: Arc<StateVariable>,
}

impl Argument {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::In
    }

    pub fn related_state_variable(&self) -> &Arc<StateVariable> {
        &self.related
    }
}

/// Accumulates one `<argument>` during the SCPD parse; the related
/// state variable is resolved by name when the service is assembled.
#[derive(Debug, Default)]
pub struct ArgumentBuilder {
    name: Option<String>,
    direction: Option<String>,
    related_name: Option<String>,
}

impl ArgumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
    }

    pub fn set_direction(&mut self, direction: &str) {
        self.direction = Some(direction.to_string());
    }

    pub fn set_related_state_variable(&mut self, name: &str) {
        self.related_name = Some(name.to_string());
    }

    pub fn related_state_variable_name(&self) -> Option<&str> {
        self.related_name.as_deref()
    }

    pub fn build(self, related: Arc<StateVariable>) -> Result<Argument, ControlPointError> {
        let name = self
            .name
            .ok_or_else(|| ControlPointError::build("argument without name"))?;
        let direction = self
            .direction
            .ok_or_else(|| ControlPointError::build(format!("argument {} without direction", name)))?;
        Ok(Argument {
            name,
            direction: Direction::parse(&direction)?,
            related,
        })
    }
}

/// An invocable action of a service, immutable after the description
/// parse.
///
/// Invocation is string-in/string-out: no validation against the
/// related state variables' data types or allowed values happens here.
pub struct Action {
    name: String,
    arguments: Vec<Argument>,
    service_type: String,
    control_url: Url,
    client: Arc<HttpClient>,
}

impl Action {
    pub(crate) fn new(
        name: String,
        arguments: Vec<Argument>,
        service_type: String,
        control_url: Url,
        client: Arc<HttpClient>,
    ) -> Self {
        Self {
            name,
            arguments,
            service_type,
            control_url,
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared arguments in declaration order.
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn find_argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }

    /// Invokes the action with the given argument values. A SOAP fault
    /// surfaces as [`ControlPointError::Fault`].
    pub fn invoke(
        &self,
        values: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, ControlPointError> {
        self.invoke_with_options(values, false)
    }

    /// Like [`invoke`](Self::invoke); with `return_fault_map` set, a
    /// well-formed fault is returned as the result map (keys
    /// `faultcode`, `faultstring`, `UPnPError/...`) instead of an
    /// error.
    pub fn invoke_with_options(
        &self,
        values: &HashMap<String, String>,
        return_fault_map: bool,
    ) -> Result<HashMap<String, String>, ControlPointError> {
        let arguments = self.build_input_arguments(values);
        let soap = build_action_request(&self.service_type, &self.name, &arguments)
            .map_err(|e| ControlPointError::Malformed(e.to_string()))?;

        let mut request = HttpRequest::new("POST", self.control_url.path());
        request.set_header("SOAPACTION", &format!("\"{}#{}\"", self.service_type, self.name));
        request.set_header("User-Agent", SERVER_TOKEN);
        request.set_header("Connection", "close");
        request.set_header("Content-Type", "text/xml; charset=\"utf-8\"");
        request.set_body(soap.into_bytes(), true);

        let response = self.client.post(&request, &self.control_url)?;
        let body = response.body();

        if response.status() == 500 && !body.is_empty() {
            let envelope = parse_envelope(body)?;
            let fault = parse_fault(&envelope)?;
            return if return_fault_map {
                Ok(fault.into_values())
            } else {
                Err(ControlPointError::Fault(fault))
            };
        }
        if response.status() != 200 || body.is_empty() {
            return Err(ControlPointError::protocol(format!(
                "{} returned HTTP {} {}",
                self.name,
                response.status(),
                response.reason()
            )));
        }

        let envelope = parse_envelope(body)?;
        let result = parse_action_response(&envelope, &self.name)?;
        for name in result.keys() {
            if self.find_argument(name).is_none() {
                // Devices routinely return extra values; keep them.
                debug!(action = self.name.as_str(), argument = name.as_str(), "undeclared response argument");
            }
        }
        Ok(result)
    }

    /// Assembles the ordered IN-argument list: the caller's value, else
    /// the related state variable's default, else empty.
    fn build_input_arguments(&self, values: &HashMap<String, String>) -> Vec<(String, String)> {
        self.arguments
            .iter()
            .filter(|a| a.is_input())
            .map(|a| {
                let value = values
                    .get(&a.name)
                    .map(String::as_str)
                    .or_else(|| a.related.default_value())
                    .unwrap_or("");
                (a.name.clone(), value.to_string())
            })
            .collect()
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .field("service_type", &self.service_type)
            .field("control_url", &self.control_url.as_str())
            .finish()
    }
}
