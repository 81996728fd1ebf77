//! Service state variables.

use crate::errors::ControlPointError;

/// Numeric bounds declared by `<allowedValueRange>`. Values stay
/// string-tagged; interpretation is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedValueRange {
    pub minimum: String,
    pub maximum: String,
    pub step: Option<String>,
}

/// One `<stateVariable>` of a service description, immutable after the
/// description parse.
#[derive(Debug, Clone)]
pub struct StateVariable {
    name: String,
    data_type: String,
    send_events: bool,
    default_value: Option<String>,
    allowed_values: Vec<String>,
    allowed_value_range: Option<AllowedValueRange>,
}

impl StateVariable {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// UPnP data type tag (`string`, `ui4`, ...), kept as declared.
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Whether changes of this variable are evented.
    pub fn sends_events(&self) -> bool {
        self.send_events
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    pub fn allowed_values(&self) -> &[String] {
        &self.allowed_values
    }

    pub fn allowed_value_range(&self) -> Option<&AllowedValueRange> {
        self.allowed_value_range.as_ref()
    }
}

/// Accumulates one `<stateVariable>` during the SCPD parse.
#[derive(Debug, Default)]
pub struct StateVariableBuilder {
    name: Option<String>,
    data_type: Option<String>,
    send_events: Option<bool>,
    default_value: Option<String>,
    allowed_values: Vec<String>,
    minimum: Option<String>,
    maximum: Option<String>,
    step: Option<String>,
}

impl StateVariableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
    }

    pub fn set_data_type(&mut self, data_type: &str) {
        self.data_type = Some(data_type.to_string());
    }

    /// `sendEvents` attribute; anything but `no` means evented, which
    /// is also the UPnP default.
    pub fn set_send_events(&mut self, value: &str) {
        self.send_events = Some(!value.eq_ignore_ascii_case("no"));
    }

    pub fn set_default_value(&mut self, value: &str) {
        self.default_value = Some(value.to_string());
    }

    pub fn add_allowed_value(&mut self, value: &str) {
        self.allowed_values.push(value.to_string());
    }

    pub fn set_minimum(&mut self, value: &str) {
        self.minimum = Some(value.to_string());
    }

    pub fn set_maximum(&mut self, value: &str) {
        self.maximum = Some(value.to_string());
    }

    pub fn set_step(&mut self, value: &str) {
        self.step = Some(value.to_string());
    }

    pub fn build(self) -> Result<StateVariable, ControlPointError> {
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ControlPointError::build("stateVariable without name"))?;
        let data_type = self
            .data_type
            .ok_or_else(|| ControlPointError::build(format!("stateVariable {} without dataType", name)))?;
        let allowed_value_range = match (self.minimum, self.maximum) {
            (Some(minimum), Some(maximum)) => Some(AllowedValueRange {
                minimum,
                maximum,
                step: self.step,
            }),
            _ => None,
        };
        Ok(StateVariable {
            name,
            data_type,
            send_events: self.send_events.unwrap_or(true),
            default_value: self.default_value,
            allowed_values: self.allowed_values,
            allowed_value_range,
        })
    }
}
