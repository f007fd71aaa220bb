use std::path::Path;

use interpreter::RuntimeValue;

/// Convert a TOML value into a template model value.
pub fn from_toml(value: &toml::Value) -> RuntimeValue {
    match value {
        toml::Value::Integer(n) => RuntimeValue::Number(*n as f64),
        toml::Value::Float(f) => RuntimeValue::Number(*f),
        toml::Value::Boolean(b) => RuntimeValue::Boolean(*b),
        toml::Value::String(s) => RuntimeValue::String(s.clone()),
        toml::Value::Array(items) => RuntimeValue::Array(items.iter().map(from_toml).collect()),
        toml::Value::Table(table) => RuntimeValue::Object(
            table
                .iter()
                .map(|(key, value)| (key.clone(), from_toml(value)))
                .collect(),
        ),
        other => RuntimeValue::String(other.to_string()),
    }
}

/// Load a model file: `.toml` files are read as TOML, everything else as JSON.
pub fn load(path: &Path) -> Result<RuntimeValue, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;

    if path.extension().is_some_and(|ext| ext == "toml") {
        let value: toml::Value = toml::from_str(&content)
            .map_err(|e| format!("invalid TOML in '{}': {}", path.display(), e))?;
        Ok(from_toml(&value))
    } else {
        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| format!("invalid JSON in '{}': {}", path.display(), e))?;
        Ok(value.into())
    }
}
