use crate::error::RuntimeError;
use crate::runtime_value::{RuntimeValue, format_number};

/// Call a built-in method on a string, number or array receiver.
pub fn call_method(
    receiver: &RuntimeValue,
    method: &str,
    args: &[RuntimeValue],
) -> Result<RuntimeValue, RuntimeError> {
    match receiver {
        RuntimeValue::String(s) | RuntimeValue::Html(s) => string_method(receiver, s, method, args),
        RuntimeValue::Number(n) => number_method(receiver, *n, method, args),
        RuntimeValue::Array(items) => array_method(receiver, items, method, args),
        RuntimeValue::Boolean(_) | RuntimeValue::Object(_) if method == "toString" => {
            Ok(RuntimeValue::String(receiver.to_string()))
        }
        RuntimeValue::Undefined | RuntimeValue::Null => Err(RuntimeError::UndefinedProperty {
            target: receiver.type_name().to_string(),
            property: method.to_string(),
        }),
        _ => Err(unknown(receiver, method)),
    }
}

fn unknown(receiver: &RuntimeValue, method: &str) -> RuntimeError {
    RuntimeError::UnknownMethod {
        receiver: receiver.type_name().to_string(),
        method: method.to_string(),
    }
}

fn arg(args: &[RuntimeValue], index: usize) -> RuntimeValue {
    args.get(index).cloned().unwrap_or_default()
}

fn string_arg(args: &[RuntimeValue], index: usize) -> String {
    arg(args, index).to_string()
}

/// Clamp a numeric argument to a char index in `0..=len`.
fn char_index(value: &RuntimeValue, len: usize, default: usize) -> usize {
    if value.is_nullish() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() || n <= 0.0 {
        0
    } else {
        (n as usize).min(len)
    }
}

fn string_method(
    receiver: &RuntimeValue,
    s: &str,
    method: &str,
    args: &[RuntimeValue],
) -> Result<RuntimeValue, RuntimeError> {
    let value = match method {
        "toUpperCase" => RuntimeValue::String(s.to_uppercase()),
        "toLowerCase" => RuntimeValue::String(s.to_lowercase()),
        "trim" => RuntimeValue::String(s.trim().to_string()),
        "toString" => RuntimeValue::String(s.to_string()),
        "includes" => RuntimeValue::Boolean(s.contains(&string_arg(args, 0))),
        "startsWith" => RuntimeValue::Boolean(s.starts_with(&string_arg(args, 0))),
        "endsWith" => RuntimeValue::Boolean(s.ends_with(&string_arg(args, 0))),
        "indexOf" => {
            let needle = string_arg(args, 0);
            let index = s
                .find(&needle)
                .map(|byte| s[..byte].chars().count() as f64)
                .unwrap_or(-1.0);
            RuntimeValue::Number(index)
        }
        "split" => {
            let separator = arg(args, 0);
            let parts = match separator {
                RuntimeValue::Undefined => vec![RuntimeValue::String(s.to_string())],
                _ => {
                    let separator = separator.to_string();
                    if separator.is_empty() {
                        s.chars().map(|c| RuntimeValue::String(c.to_string())).collect()
                    } else {
                        s.split(separator.as_str())
                            .map(|part| RuntimeValue::String(part.to_string()))
                            .collect()
                    }
                }
            };
            RuntimeValue::Array(parts)
        }
        "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let start = char_index(&arg(args, 0), chars.len(), 0);
            let end = char_index(&arg(args, 1), chars.len(), chars.len());
            let (start, end) = if start > end { (end, start) } else { (start, end) };
            RuntimeValue::String(chars[start..end].iter().collect())
        }
        "replace" => {
            RuntimeValue::String(s.replacen(&string_arg(args, 0), &string_arg(args, 1), 1))
        }
        _ => return Err(unknown(receiver, method)),
    };
    Ok(value)
}

fn number_method(
    receiver: &RuntimeValue,
    n: f64,
    method: &str,
    args: &[RuntimeValue],
) -> Result<RuntimeValue, RuntimeError> {
    match method {
        "toString" => Ok(RuntimeValue::String(format_number(n))),
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
            if n.is_finite() {
                Ok(RuntimeValue::String(format!("{:.*}", digits, n)))
            } else {
                Ok(RuntimeValue::String(format_number(n)))
            }
        }
        _ => Err(unknown(receiver, method)),
    }
}

fn array_method(
    receiver: &RuntimeValue,
    items: &[RuntimeValue],
    method: &str,
    args: &[RuntimeValue],
) -> Result<RuntimeValue, RuntimeError> {
    match method {
        "join" => {
            let separator = match arg(args, 0) {
                RuntimeValue::Undefined => ",".to_string(),
                other => other.to_string(),
            };
            let joined = items
                .iter()
                .map(|item| if item.is_nullish() { String::new() } else { item.to_string() })
                .collect::<Vec<_>>()
                .join(&separator);
            Ok(RuntimeValue::String(joined))
        }
        "includes" => {
            let needle = arg(args, 0);
            Ok(RuntimeValue::Boolean(items.contains(&needle)))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            let index = items
                .iter()
                .position(|item| *item == needle)
                .map(|i| i as f64)
                .unwrap_or(-1.0);
            Ok(RuntimeValue::Number(index))
        }
        "toString" => Ok(RuntimeValue::String(receiver.to_string())),
        _ => Err(unknown(receiver, method)),
    }
}
