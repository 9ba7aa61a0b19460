//! Command-related data models.
//!
//! A [`Command`] carries everything needed to run one database call: how the
//! command text is interpreted, the text itself, an optional timeout and the
//! bound parameters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Maximum command timeout in seconds.
pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 3600;

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// Raw SQL text
    #[default]
    Text,
    /// Name of a stored procedure
    StoredProcedure,
    /// Name of a table, read in full
    TableDirect,
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::StoredProcedure => write!(f, "stored_procedure"),
            Self::TableDirect => write!(f, "table_direct"),
        }
    }
}

/// Direction of a command parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
}

impl ParameterDirection {
    /// True when the database sends a value back through this parameter.
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Output | Self::InputOutput)
    }

    /// True when this parameter carries a value to the database.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }
}

/// A parameter value for parameterized commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    /// Structured JSON value
    Json(serde_json::Value),
}

impl ParamValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }

    /// Parse a value typed on a command line: `null`, `true`/`false`,
    /// integers and floats are recognised, everything else is a string.
    pub fn parse_literal(s: &str) -> Self {
        if s.eq_ignore_ascii_case("null") {
            Self::Null
        } else if s.eq_ignore_ascii_case("true") {
            Self::Bool(true)
        } else if s.eq_ignore_ascii_case("false") {
            Self::Bool(false)
        } else if let Ok(v) = s.parse::<i64>() {
            Self::Int(v)
        } else if let Ok(v) = s.parse::<f64>() {
            Self::Float(v)
        } else {
            Self::String(s.to_string())
        }
    }
}

macro_rules! impl_param_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )+
    };
}

impl_param_from!(
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    serde_json::Value => Json,
);

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A command parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Optional name, with or without the leading `@`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: ParamValue,
    #[serde(default)]
    pub direction: ParameterDirection,
}

impl Parameter {
    /// Positional input parameter.
    pub fn input(value: impl Into<ParamValue>) -> Self {
        Self {
            name: None,
            value: value.into(),
            direction: ParameterDirection::Input,
        }
    }

    /// Named input parameter.
    pub fn named(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
            direction: ParameterDirection::Input,
        }
    }

    /// Output parameter; its value is filled in by the database.
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: ParamValue::Null,
            direction: ParameterDirection::Output,
        }
    }

    /// Parameter that both sends and receives a value.
    pub fn input_output(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
            direction: ParameterDirection::InputOutput,
        }
    }

    /// Name without the leading `@`.
    pub fn bare_name(&self) -> Option<&str> {
        self.name.as_deref().map(|n| n.trim_start_matches('@'))
    }

    /// Case-insensitive name match; `@` prefixes are ignored on both sides.
    pub fn matches_name(&self, name: &str) -> bool {
        self.bare_name()
            .is_some_and(|n| n.eq_ignore_ascii_case(name.trim_start_matches('@')))
    }
}

/// A database command: text, interpretation, timeout and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default)]
    pub command_type: CommandType,
    pub text: String,
    /// Default: 30, max: 3600
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl Command {
    /// Create a command of the given type.
    pub fn new(command_type: CommandType, text: impl Into<String>) -> Self {
        Self {
            command_type,
            text: text.into(),
            timeout_secs: None,
            parameters: Vec::new(),
        }
    }

    /// Raw SQL command.
    pub fn text(sql: impl Into<String>) -> Self {
        Self::new(CommandType::Text, sql)
    }

    /// Stored procedure call.
    pub fn procedure(name: impl Into<String>) -> Self {
        Self::new(CommandType::StoredProcedure, name)
    }

    /// Full read of a table.
    pub fn table(name: impl Into<String>) -> Self {
        Self::new(CommandType::TableDirect, name)
    }

    /// Add a parameter.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Add a positional input parameter.
    pub fn param(self, value: impl Into<ParamValue>) -> Self {
        self.with_parameter(Parameter::input(value))
    }

    /// Add a named input parameter.
    pub fn named(self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.with_parameter(Parameter::named(name, value))
    }

    /// Add an output parameter.
    pub fn output(self, name: impl Into<String>) -> Self {
        self.with_parameter(Parameter::output(name))
    }

    /// Add an input/output parameter.
    pub fn input_output(self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.with_parameter(Parameter::input_output(name, value))
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Get the effective timeout (with bounds checking).
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout_secs
            .map(|t| Duration::from_secs(t.clamp(1, MAX_COMMAND_TIMEOUT_SECS)))
            .unwrap_or(default)
    }

    /// Parameters the database writes back, in declaration order.
    pub fn output_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.direction.is_output())
    }

    /// True when at least one parameter is OUTPUT or INPUT/OUTPUT.
    pub fn has_output_parameters(&self) -> bool {
        self.output_parameters().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_value_types() {
        assert!(ParamValue::Null.is_null());
        assert!(!ParamValue::Bool(true).is_null());
        assert_eq!(ParamValue::Int(42).type_name(), "int");
        assert_eq!(ParamValue::from("hello").type_name(), "string");
        assert_eq!(ParamValue::from(None::<i32>), ParamValue::Null);
        assert_eq!(ParamValue::from(Some(7i32)), ParamValue::Int(7));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(ParamValue::parse_literal("NULL"), ParamValue::Null);
        assert_eq!(ParamValue::parse_literal("true"), ParamValue::Bool(true));
        assert_eq!(ParamValue::parse_literal("-12"), ParamValue::Int(-12));
        assert_eq!(ParamValue::parse_literal("1.5"), ParamValue::Float(1.5));
        assert_eq!(
            ParamValue::parse_literal("abc"),
            ParamValue::String("abc".to_string())
        );
    }

    #[test]
    fn test_param_value_json_untagged() {
        let values: Vec<ParamValue> = serde_json::from_str(r#"[null, true, 3, 2.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Null,
                ParamValue::Bool(true),
                ParamValue::Int(3),
                ParamValue::Float(2.5),
                ParamValue::String("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_parameter_name_matching() {
        let p = Parameter::named("@IdGerencia", 4);
        assert!(p.matches_name("idgerencia"));
        assert!(p.matches_name("@IDGERENCIA"));
        assert!(!p.matches_name("activo"));
        assert_eq!(p.bare_name(), Some("IdGerencia"));
        assert!(!Parameter::input(1).matches_name("x"));
    }

    #[test]
    fn test_direction_flags() {
        assert!(ParameterDirection::Input.is_input());
        assert!(!ParameterDirection::Input.is_output());
        assert!(ParameterDirection::Output.is_output());
        assert!(!ParameterDirection::Output.is_input());
        assert!(ParameterDirection::InputOutput.is_input());
        assert!(ParameterDirection::InputOutput.is_output());
    }

    #[test]
    fn test_command_builder() {
        let cmd = Command::procedure("add_user")
            .param("alice")
            .output("new_id")
            .with_timeout(5);
        assert_eq!(cmd.command_type, CommandType::StoredProcedure);
        assert_eq!(cmd.parameters.len(), 2);
        assert!(cmd.has_output_parameters());
        assert_eq!(cmd.output_parameters().count(), 1);
    }

    #[test]
    fn test_effective_timeout_bounds() {
        let default = Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS);
        assert_eq!(Command::text("SELECT 1").effective_timeout(default), default);
        assert_eq!(
            Command::text("SELECT 1")
                .with_timeout(999_999)
                .effective_timeout(default),
            Duration::from_secs(MAX_COMMAND_TIMEOUT_SECS)
        );
        assert_eq!(
            Command::text("SELECT 1")
                .with_timeout(0)
                .effective_timeout(default),
            Duration::from_secs(1)
        );
    }
}
