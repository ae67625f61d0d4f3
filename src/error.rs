use serde::Serialize;
use thiserror::Error;

/// Failures raised by the pure grade/ordering core.
///
/// Zero total weight and an empty graded subset are not errors; they produce a
/// `None` grade instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid sort criterion: {criterion}")]
    InvalidCriterion { criterion: String },

    #[error("malformed {kind} {id}: missing or invalid {field}")]
    MalformedRecord {
        kind: RecordKind,
        id: String,
        field: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    Course,
    Assignment,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Course => f.write_str("course"),
            RecordKind::Assignment => f.write_str("assignment"),
        }
    }
}

impl CoreError {
    pub fn invalid_criterion(criterion: impl Into<String>) -> Self {
        Self::InvalidCriterion {
            criterion: criterion.into(),
        }
    }

    pub fn malformed(kind: RecordKind, id: impl Into<String>, field: &'static str) -> Self {
        Self::MalformedRecord {
            kind,
            id: id.into(),
            field,
        }
    }

    /// Wire code used by the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidCriterion { .. } => "invalid_criterion",
            CoreError::MalformedRecord { .. } => "malformed_record",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            CoreError::InvalidCriterion { criterion } => {
                serde_json::json!({ "criterion": criterion })
            }
            CoreError::MalformedRecord { kind, id, field } => serde_json::json!({
                "kind": kind,
                "id": id,
                "field": field,
            }),
        }
    }

    /// Shape used in `skipped` lists next to batch results.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
            "details": self.details(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_record_message_names_kind_and_field() {
        let e = CoreError::malformed(RecordKind::Assignment, "a-1", "dueDate");
        assert_eq!(e.to_string(), "malformed assignment a-1: missing or invalid dueDate");
        assert_eq!(e.code(), "malformed_record");
        assert_eq!(e.to_json()["details"]["kind"], "assignment");
    }
}
