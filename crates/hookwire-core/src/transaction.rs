//! Transaction model shared by hooks, the hook handler wire protocol, and the
//! pipeline.
//!
//! Only the fields the core reads or writes are modelled. Anything else a
//! compiler or a hook puts on a transaction is kept in [`Transaction::extra`]
//! so it survives the trip to the handler and back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Outcome status of a transaction's test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Not evaluated yet.
    #[default]
    Pending,
    /// The response matched the expectation.
    Pass,
    /// The response did not match, or a hook failed the transaction.
    Fail,
    /// The request was not performed.
    Skip,
    /// Performing the request errored.
    Error,
}

impl TestStatus {
    /// Returns the string name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-transaction test record that reporters consume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    /// Current status.
    #[serde(default)]
    pub status: TestStatus,
    /// Title (the transaction id).
    #[serde(default)]
    pub title: String,
    /// Human-readable message; a failure reason once the test fails.
    #[serde(default)]
    pub message: String,
    /// Validation verdict from the request executor, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
}

/// Severity of a general transaction message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Contributes to a failure.
    Error,
    /// Informational, e.g. a skip reason.
    Warning,
}

/// A general message attached to a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionError {
    /// Severity.
    pub severity: Severity,
    /// Message text.
    pub message: String,
}

/// One HTTP request/expected-response pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique name; key into the per-name hook maps.
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    /// Display identifier, e.g. `GET (200) /machines`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Where in the API description the transaction came from.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub origin: Value,
    /// Request payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub request: Value,
    /// Expected response payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub expected: Value,
    /// Actual response, filled in by the request executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real: Option<Value>,
    /// When `true` the request is not performed.
    #[serde(default, deserialize_with = "null_as_default")]
    pub skip: bool,
    /// Set by a hook to fail the transaction with a message.
    #[serde(
        default,
        deserialize_with = "deserialize_fail",
        skip_serializing_if = "Option::is_none"
    )]
    pub fail: Option<String>,
    /// General messages collected while processing.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub errors: Vec<TransactionError>,
    /// Test record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<TestRecord>,
    /// When the request stage started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Fields not modelled by the core.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields a reply may not unset; a `null` patch value keeps the current one.
const NON_NULLABLE_FIELDS: [&str; 4] = ["name", "id", "skip", "errors"];

/// Reads `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts a string, `true` (message `"true"`), `false` or `null` (unset).
fn deserialize_fail<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::Bool(true)) => Some("true".to_string()),
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

impl Transaction {
    /// Creates a transaction with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            ..Default::default()
        }
    }

    /// Returns the HTTP method of the request, if present.
    pub fn method(&self) -> Option<&str> {
        self.request.get("method").and_then(Value::as_str)
    }

    /// Returns the test record, creating it from the transaction if absent.
    pub fn ensure_test(&mut self) -> &mut TestRecord {
        let title = self.id.clone();
        let message = self.name.clone();
        self.test.get_or_insert_with(|| TestRecord {
            status: TestStatus::Pending,
            title,
            message,
            valid: None,
        })
    }

    /// Returns the current test status.
    pub fn status(&self) -> TestStatus {
        self.test.as_ref().map(|t| t.status).unwrap_or_default()
    }

    /// Marks the test as failed, recording `reason` as an error message.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.errors.push(TransactionError {
            severity: Severity::Error,
            message: reason.clone(),
        });
        let test = self.ensure_test();
        test.status = TestStatus::Fail;
        test.message = reason;
    }

    /// Marks the transaction skipped, with an optional reason.
    pub fn mark_skipped(&mut self, reason: Option<&str>) {
        self.skip = true;
        if let Some(reason) = reason {
            self.errors.push(TransactionError {
                severity: Severity::Warning,
                message: reason.to_string(),
            });
        }
        let test = self.ensure_test();
        test.status = TestStatus::Skip;
        if let Some(reason) = reason {
            test.message = reason.to_string();
        }
    }

    /// Marks the test as errored.
    pub fn mark_errored(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.errors.push(TransactionError {
            severity: Severity::Error,
            message: message.clone(),
        });
        let test = self.ensure_test();
        test.status = TestStatus::Error;
        test.message = message;
    }

    /// Overlays the keys of a JSON object onto this transaction in place.
    ///
    /// Keys absent from `patch` keep their current values, as do the
    /// non-optional fields a patch sets to `null`. A `null` patch changes
    /// nothing.
    pub fn merge_json(&mut self, patch: Value) -> Result<(), serde_json::Error> {
        if patch.is_null() {
            return Ok(());
        }
        let Value::Object(patch) = patch else {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "transaction patch must be a JSON object",
            ));
        };

        let mut current = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            if value.is_null() && NON_NULLABLE_FIELDS.contains(&key.as_str()) {
                continue;
            }
            current.insert(key, value);
        }

        *self = serde_json::from_value(Value::Object(current))?;
        Ok(())
    }
}
