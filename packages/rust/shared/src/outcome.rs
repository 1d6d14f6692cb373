//! Soft outcomes for lookups that may legitimately miss.
//!
//! Status updates and generation completion are safe to repeat: a second call
//! finds nothing to change and reports that as a [`Miss`], not as an error.
//! Storage calls return `Result<Outcome<T>>` so a caller sees hard failures
//! and soft misses as distinct types.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Successful value or a soft miss.
pub type Outcome<T> = std::result::Result<T, Miss>;

/// Why a soft operation found nothing to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    OrganizationNotFound,
    MembershipNotFound,
    RelationNotFound,
    ThesisNotFound,
    AlreadyInProgress,
    NotInProgress,
}

/// A soft miss, echoing the identifiers the caller passed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct Miss {
    pub reason: MissReason,
    pub message: String,
    /// Identifiers echoed back to the caller (`organization_id`, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub echo: BTreeMap<&'static str, String>,
}

impl Miss {
    pub fn new(reason: MissReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            echo: BTreeMap::new(),
        }
    }

    /// Attach an echoed identifier.
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.echo.insert(key, value.into());
        self
    }
}

/// Success payloads that can describe themselves in one line.
pub trait Reportable: Serialize {
    fn message(&self) -> String;
}

/// Render an outcome as `{"success": bool, "message": ..., ...fields}`.
pub fn outcome_report<T: Reportable>(outcome: &Outcome<T>) -> Value {
    let mut obj = Map::new();
    match outcome {
        Ok(value) => {
            if let Ok(Value::Object(fields)) = serde_json::to_value(value) {
                obj.extend(fields);
            }
            obj.insert("success".into(), Value::Bool(true));
            obj.insert("message".into(), Value::String(value.message()));
        }
        Err(miss) => {
            for (key, value) in &miss.echo {
                obj.insert((*key).to_string(), Value::String(value.clone()));
            }
            obj.insert("success".into(), Value::Bool(false));
            obj.insert("message".into(), Value::String(miss.message.clone()));
            if let Ok(reason) = serde_json::to_value(miss.reason) {
                obj.insert("reason".into(), reason);
            }
        }
    }
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Done {
        organization_id: String,
    }

    impl Reportable for Done {
        fn message(&self) -> String {
            format!("finished {}", self.organization_id)
        }
    }

    #[test]
    fn success_report_flattens_fields() {
        let outcome: Outcome<Done> = Ok(Done {
            organization_id: "org-1".into(),
        });
        let report = outcome_report(&outcome);
        assert_eq!(report["success"], true);
        assert_eq!(report["organization_id"], "org-1");
        assert_eq!(report["message"], "finished org-1");
    }

    #[test]
    fn miss_report_echoes_identifiers() {
        let outcome: Outcome<Done> = Err(Miss::new(
            MissReason::MembershipNotFound,
            "no membership for individual",
        )
        .with("organization_id", "org-1")
        .with("individual_id", "ind-9"));

        let report = outcome_report(&outcome);
        assert_eq!(report["success"], false);
        assert_eq!(report["reason"], "membership_not_found");
        assert_eq!(report["individual_id"], "ind-9");
        assert_eq!(report["organization_id"], "org-1");
    }
}
