use std::collections::BTreeMap;
use std::fmt;

/// A value manipulated by embedded code.
#[derive(Debug, Clone, Default)]
pub enum RuntimeValue {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    /// Markup that is already escaped and is written as is.
    Html(String),
    Array(Vec<RuntimeValue>),
    Object(BTreeMap<String, RuntimeValue>),
    /// The `Html` helper object exposed to templates.
    Host,
}

impl RuntimeValue {
    pub fn is_truthy(&self) -> bool {
        !self.is_falsy()
    }

    pub fn is_falsy(&self) -> bool {
        match self {
            RuntimeValue::Undefined | RuntimeValue::Null => true,
            RuntimeValue::Boolean(b) => !b,
            RuntimeValue::Number(n) => *n == 0.0 || n.is_nan(),
            RuntimeValue::String(s) | RuntimeValue::Html(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, RuntimeValue::Undefined | RuntimeValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RuntimeValue::Undefined => "undefined",
            RuntimeValue::Null => "null",
            RuntimeValue::Boolean(_) => "boolean",
            RuntimeValue::Number(_) => "number",
            RuntimeValue::String(_) => "string",
            RuntimeValue::Html(_) => "html",
            RuntimeValue::Array(_) => "array",
            RuntimeValue::Object(_) => "object",
            RuntimeValue::Host => "Html",
        }
    }

    /// Result of the `typeof` operator.
    pub fn type_of(&self) -> &'static str {
        match self {
            RuntimeValue::Undefined => "undefined",
            RuntimeValue::Boolean(_) => "boolean",
            RuntimeValue::Number(_) => "number",
            RuntimeValue::String(_) => "string",
            _ => "object",
        }
    }

    /// Numeric conversion (`+value`).
    pub fn to_number(&self) -> f64 {
        match self {
            RuntimeValue::Undefined => f64::NAN,
            RuntimeValue::Null => 0.0,
            RuntimeValue::Boolean(b) => f64::from(u8::from(*b)),
            RuntimeValue::Number(n) => *n,
            RuntimeValue::String(s) | RuntimeValue::Html(s) => {
                let s = s.trim();
                if s.is_empty() {
                    0.0
                } else {
                    s.parse().unwrap_or(f64::NAN)
                }
            }
            RuntimeValue::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            RuntimeValue::Object(_) | RuntimeValue::Host => f64::NAN,
        }
    }

    /// Property lookup; `None` when the value has no such property.
    pub fn property(&self, name: &str) -> Option<RuntimeValue> {
        match self {
            RuntimeValue::Object(map) => map.get(name).cloned(),
            RuntimeValue::Array(items) if name == "length" => {
                Some(RuntimeValue::Number(items.len() as f64))
            }
            RuntimeValue::Array(items) => name
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned()),
            RuntimeValue::String(s) | RuntimeValue::Html(s) if name == "length" => {
                Some(RuntimeValue::Number(s.chars().count() as f64))
            }
            RuntimeValue::String(s) => name
                .parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| RuntimeValue::String(c.to_string())),
            _ => None,
        }
    }

    /// Loose equality (`==`).
    pub fn loose_eq(&self, other: &RuntimeValue) -> bool {
        use RuntimeValue::*;
        match (self, other) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (Number(_), String(_) | Html(_) | Boolean(_))
            | (String(_) | Html(_) | Boolean(_), Number(_))
            | (Boolean(_), String(_) | Html(_))
            | (String(_) | Html(_), Boolean(_)) => self.to_number() == other.to_number(),
            (String(a) | Html(a), String(b) | Html(b)) => a == b,
            _ => self == other,
        }
    }
}

/// Format a number the way JavaScript prints it.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.floor() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Undefined => write!(f, "undefined"),
            RuntimeValue::Null => write!(f, "null"),
            RuntimeValue::Boolean(b) => write!(f, "{}", b),
            RuntimeValue::Number(n) => write!(f, "{}", format_number(*n)),
            RuntimeValue::String(s) | RuntimeValue::Html(s) => write!(f, "{}", s),
            RuntimeValue::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{}", item)?;
                    }
                }
                Ok(())
            }
            RuntimeValue::Object(_) | RuntimeValue::Host => write!(f, "[object Object]"),
        }
    }
}

/// Strict equality (`===`); arrays and objects compare structurally.
impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::Undefined, RuntimeValue::Undefined) => true,
            (RuntimeValue::Null, RuntimeValue::Null) => true,
            (RuntimeValue::Boolean(a), RuntimeValue::Boolean(b)) => a == b,
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => a == b,
            (RuntimeValue::String(a), RuntimeValue::String(b)) => a == b,
            (RuntimeValue::Html(a), RuntimeValue::Html(b)) => a == b,
            (RuntimeValue::Array(a), RuntimeValue::Array(b)) => a == b,
            (RuntimeValue::Object(a), RuntimeValue::Object(b)) => a == b,
            (RuntimeValue::Host, RuntimeValue::Host) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Value> for RuntimeValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RuntimeValue::Null,
            serde_json::Value::Bool(b) => RuntimeValue::Boolean(b),
            serde_json::Value::Number(n) => RuntimeValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => RuntimeValue::String(s),
            serde_json::Value::Array(items) => {
                RuntimeValue::Array(items.into_iter().map(RuntimeValue::from).collect())
            }
            serde_json::Value::Object(map) => RuntimeValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, RuntimeValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for RuntimeValue {
    fn from(s: &str) -> Self {
        RuntimeValue::String(s.to_string())
    }
}

impl From<String> for RuntimeValue {
    fn from(s: String) -> Self {
        RuntimeValue::String(s)
    }
}

impl From<f64> for RuntimeValue {
    fn from(n: f64) -> Self {
        RuntimeValue::Number(n)
    }
}

impl From<bool> for RuntimeValue {
    fn from(b: bool) -> Self {
        RuntimeValue::Boolean(b)
    }
}
