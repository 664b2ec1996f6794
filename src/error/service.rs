use std::fmt;

use serde_json::Value;

/// Structured error information extracted from a search-service error body.
///
/// Elasticsearch reports failures as
/// `{"error": {"type": ..., "reason": ..., "root_cause": [...]}, "status": N}`,
/// older releases sometimes as `{"error": "text"}`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub(crate) error_type: Option<String>,
    pub(crate) reason: Option<String>,
    pub(crate) root_cause: Option<String>,
}

impl ErrorInfo {
    /// Extract error information from a decoded response body.
    pub fn from_body(body: &Value) -> Self {
        let mut info = ErrorInfo::default();

        match body.get("error") {
            Some(Value::String(text)) => {
                info.reason = Some(text.clone());
            }
            Some(err @ Value::Object(_)) => {
                info.error_type = str_at(err, "/type");
                info.reason = str_at(err, "/reason");
                // Prefer the deepest explanation the service offers.
                info.root_cause = str_at(err, "/root_cause/0/reason")
                    .or_else(|| str_at(err, "/caused_by/reason"));
            }
            _ => {}
        }

        if info.root_cause.as_deref() == info.reason.as_deref() {
            info.root_cause = None;
        }

        info
    }

    /// Error information for a response body that is not JSON, such as
    /// an HTML page from a proxy.
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        Self {
            reason: (!text.is_empty()).then(|| text.to_string()),
            ..Self::default()
        }
    }

    /// Error type reported by the service, if any.
    pub fn error_type(&self) -> Option<&str> {
        self.error_type.as_deref()
    }

    /// Human-readable reason, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error_type, &self.reason) {
            (Some(t), Some(r)) => write!(f, "{t}: {r}")?,
            (Some(t), None) => write!(f, "{t}")?,
            (None, Some(r)) => write!(f, "{r}")?,
            (None, None) => write!(f, "unknown error")?,
        }
        if let Some(cause) = &self.root_cause {
            write!(f, " ({cause})")?;
        }
        Ok(())
    }
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_owned)
}
