use crate::protocol::{LogEntry, NetworkLogEntry, ResponseHeaders, ResponseStatus};

/// A value handed to a page logging primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Objects and arrays in structured form.
    Object(serde_json::Value),
    /// An object the structured encoder rejects (cyclic graph, host object).
    /// Carries its generic string conversion.
    Opaque(String),
}

impl From<&str> for JsValue {
    fn from(value: &str) -> Self {
        JsValue::String(value.to_string())
    }
}

impl From<String> for JsValue {
    fn from(value: String) -> Self {
        JsValue::String(value)
    }
}

impl From<bool> for JsValue {
    fn from(value: bool) -> Self {
        JsValue::Bool(value)
    }
}

impl From<f64> for JsValue {
    fn from(value: f64) -> Self {
        JsValue::Number(value)
    }
}

impl From<i64> for JsValue {
    fn from(value: i64) -> Self {
        JsValue::Number(value as f64)
    }
}

impl From<serde_json::Value> for JsValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => JsValue::Null,
            serde_json::Value::Bool(b) => JsValue::Bool(b),
            serde_json::Value::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => JsValue::String(s),
            other => JsValue::Object(other),
        }
    }
}

#[derive(Debug)]
struct EncodeError;

impl JsValue {
    fn is_object_like(&self) -> bool {
        matches!(self, JsValue::Null | JsValue::Object(_) | JsValue::Opaque(_))
    }

    fn encode_structured(&self) -> Result<String, EncodeError> {
        match self {
            JsValue::Null => Ok("null".to_string()),
            JsValue::Object(value) => serde_json::to_string(value).map_err(|_| EncodeError),
            _ => Err(EncodeError),
        }
    }

    /// Generic string conversion, never fails.
    pub fn to_display_string(&self) -> String {
        match self {
            JsValue::Undefined => "undefined".to_string(),
            JsValue::Null => "null".to_string(),
            JsValue::Bool(b) => b.to_string(),
            JsValue::Number(n) => format_number(*n),
            JsValue::String(s) => s.clone(),
            JsValue::Object(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::Null => String::new(),
                    other => JsValue::from(other.clone()).to_display_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            JsValue::Object(_) => "[object Object]".to_string(),
            JsValue::Opaque(text) => text.clone(),
        }
    }

    /// Object-like values go through the structured encoder, everything else
    /// through string conversion. Encoder failures fall back to string conversion.
    pub fn to_log_text(&self) -> String {
        if self.is_object_like() {
            self.encode_structured()
                .unwrap_or_else(|_| self.to_display_string())
        } else {
            self.to_display_string()
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// Space-joined text form of a logging call's arguments.
pub fn format_console_args(args: &[JsValue]) -> String {
    args.iter()
        .map(JsValue::to_log_text)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_log_entry(entry: &LogEntry) -> String {
    format!(
        "[{}] {:<5} {}",
        entry
            .timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        entry.level.as_str().to_uppercase(),
        entry.message
    )
}

pub fn format_network_entry(entry: &NetworkLogEntry) -> String {
    let status = match entry.status {
        ResponseStatus::Code(code) => code.to_string(),
        ResponseStatus::Error => "ERR".to_string(),
    };
    let elapsed = entry
        .response_time
        .signed_duration_since(entry.request_time)
        .num_milliseconds();
    let header_count = match &entry.headers {
        ResponseHeaders::Map(map) => map.len(),
        ResponseHeaders::Raw(raw) => raw.lines().filter(|l| !l.trim().is_empty()).count(),
    };
    format!(
        "{:?} {} {} -> {} ({}ms, {} headers, {} bytes)",
        entry.transport,
        entry.method,
        entry.url,
        status,
        elapsed,
        header_count,
        entry.response_body.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitives_use_string_conversion() {
        let args = vec![
            JsValue::from("count:"),
            JsValue::from(3i64),
            JsValue::from(1.5),
            JsValue::from(true),
            JsValue::Undefined,
        ];
        assert_eq!(format_console_args(&args), "count: 3 1.5 true undefined");
    }

    #[test]
    fn test_objects_use_structured_encoding() {
        let args = vec![
            JsValue::from("user"),
            JsValue::from(json!({"id": 1, "name": "ann"})),
            JsValue::from(json!([1, 2])),
            JsValue::Null,
        ];
        assert_eq!(
            format_console_args(&args),
            r#"user {"id":1,"name":"ann"} [1,2] null"#
        );
    }

    #[test]
    fn test_object_keys_keep_insertion_order() {
        let args = vec![JsValue::from(json!({"z": 1, "a": 2, "m": {"y": true, "b": null}}))];
        assert_eq!(
            format_console_args(&args),
            r#"{"z":1,"a":2,"m":{"y":true,"b":null}}"#
        );
    }

    #[test]
    fn test_encoder_failure_falls_back() {
        let args = vec![
            JsValue::from("cyclic"),
            JsValue::Opaque("[object Object]".into()),
        ];
        assert_eq!(format_console_args(&args), "cyclic [object Object]");
    }

    #[test]
    fn test_special_numbers() {
        assert_eq!(JsValue::Number(f64::NAN).to_log_text(), "NaN");
        assert_eq!(JsValue::Number(f64::NEG_INFINITY).to_log_text(), "-Infinity");
        assert_eq!(JsValue::Number(-0.0).to_log_text(), "0");
        assert_eq!(JsValue::Number(42.0).to_log_text(), "42");
    }

    #[test]
    fn test_empty_args() {
        assert_eq!(format_console_args(&[]), "");
    }
}
