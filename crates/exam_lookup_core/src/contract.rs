use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const EXAM_TABLE: &str = "tb_exame";
pub const INTEGRATION_TABLE: &str = "tb_integracao";
pub const QUERY_FIELD_PARAM: &str = "queryField";
pub const QUERY_VALUE_PARAM: &str = "queryValue";

/// A row passed through unmodified, keyed by column name.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Exam,
    Integration,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exam => EXAM_TABLE,
            Self::Integration => INTEGRATION_TABLE,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Columns callers may filter on. Both tables carry every one of them, so a
/// single field selects the matching rows on each side of the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryField {
    Cpf,
    ExamId,
    Protocol,
    OrderNumber,
    IntegrationCode,
}

impl QueryField {
    pub const ALL: [QueryField; 5] = [
        Self::Cpf,
        Self::ExamId,
        Self::Protocol,
        Self::OrderNumber,
        Self::IntegrationCode,
    ];

    /// External name accepted in `queryField`, which is also the column name.
    pub fn column(self) -> &'static str {
        match self {
            Self::Cpf => "cpf",
            Self::ExamId => "id_exame",
            Self::Protocol => "protocolo",
            Self::OrderNumber => "numero_pedido",
            Self::IntegrationCode => "cod_integracao",
        }
    }
}

impl fmt::Display for QueryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for QueryField {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.column() == s)
            .ok_or_else(|| KeyError::InvalidField(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LookupValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl LookupValue {
    /// Reads a scalar out of a JSON parameter. `Ok(None)` means the caller did
    /// not supply a usable value (absent, `null` or empty string).
    pub fn from_json(value: Option<&Value>) -> Result<Option<Self>, KeyError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) if text.is_empty() => Ok(None),
            Some(Value::String(text)) => Ok(Some(Self::Text(text.clone()))),
            Some(Value::Number(number)) => {
                if let Some(integer) = number.as_i64() {
                    Ok(Some(Self::Integer(integer)))
                } else if let Some(float) = number.as_f64() {
                    Ok(Some(Self::Float(float)))
                } else {
                    Err(KeyError::InvalidValue)
                }
            }
            Some(_) => Err(KeyError::InvalidValue),
        }
    }
}

impl fmt::Display for LookupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Integer(integer) => write!(f, "{integer}"),
            Self::Float(float) => write!(f, "{float}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupKey {
    pub field: QueryField,
    pub value: LookupValue,
}

impl LookupKey {
    pub fn new(field: QueryField, value: LookupValue) -> Self {
        Self { field, value }
    }

    /// Builds a key from raw JSON parameters. Missing parameters are reported
    /// before the field is checked against the allow-list.
    pub fn parse(field: Option<&Value>, value: Option<&Value>) -> Result<Self, KeyError> {
        let field = match field {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) if name.is_empty() => None,
            Some(other) => Some(other),
        };
        let value = LookupValue::from_json(value);
        if field.is_none() || matches!(value, Ok(None)) {
            return Err(KeyError::MissingParameters);
        }

        let field = match field {
            Some(Value::String(name)) => name.parse::<QueryField>()?,
            Some(other) => return Err(KeyError::InvalidField(other.to_string())),
            None => return Err(KeyError::MissingParameters),
        };
        let Some(value) = value? else {
            return Err(KeyError::MissingParameters);
        };

        Ok(Self::new(field, value))
    }
}

/// `queryField`/`queryValue` as they arrive in a request body, a query string
/// or a queue message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LookupParameters {
    #[serde(rename = "queryField", default)]
    pub query_field: Option<Value>,
    #[serde(rename = "queryValue", default)]
    pub query_value: Option<Value>,
}

impl LookupParameters {
    pub fn new(query_field: Option<Value>, query_value: Option<Value>) -> Self {
        Self {
            query_field,
            query_value,
        }
    }

    /// Fills each blank parameter from `fallback`, field by field.
    pub fn or(self, fallback: LookupParameters) -> Self {
        Self {
            query_field: pick(self.query_field, fallback.query_field),
            query_value: pick(self.query_value, fallback.query_value),
        }
    }

    pub fn into_key(self) -> Result<LookupKey, KeyError> {
        LookupKey::parse(self.query_field.as_ref(), self.query_value.as_ref())
    }
}

fn pick(primary: Option<Value>, fallback: Option<Value>) -> Option<Value> {
    match primary {
        Some(value) if !is_blank(&value) => Some(value),
        _ => fallback,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupResult {
    #[serde(rename = "tb_exame")]
    pub exam: Vec<Record>,
    #[serde(rename = "tb_integracao")]
    pub integration: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("missing query parameters")]
    MissingParameters,
    #[error("query field '{0}' is not allowed")]
    InvalidField(String),
    #[error("query value must be a string or a number")]
    InvalidValue,
}
