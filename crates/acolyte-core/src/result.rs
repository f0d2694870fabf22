//! Uniform result returned by every public engine operation.
//!
//! Failures are values: a [`ServiceResult`] is either success-with-data or
//! failure-with-reason. Internally the engine short-circuits with
//! [`Rejection`] and `?`, and converts at the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binding::ArgumentError;
use crate::error::EngineError;

/// Coarse outcome class of a [`ServiceResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
    ServiceError,
}

impl StatusCode {
    /// HTTP-compatible numeric code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::ServiceError => 500,
        }
    }
}

/// Result of `start_flow`, `handle_job_action` and the service queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResult {
    pub status: StatusCode,
    /// Machine-readable reason code on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable detail, never used for control flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Payload on success; structured context (field, expect) on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ServiceResult {
    pub fn ok(data: impl Into<Value>) -> Self {
        Self {
            status: StatusCode::Ok,
            reason: None,
            message: None,
            data: Some(data.into()),
        }
    }

    /// Successful result without payload.
    pub fn ok_empty() -> Self {
        Self {
            status: StatusCode::Ok,
            reason: None,
            message: None,
            data: None,
        }
    }

    /// Serialize `view` into the payload.
    ///
    /// A view that fails to serialize yields a `ServiceError` result.
    pub fn ok_view<T: Serialize>(view: &T) -> Self {
        match serde_json::to_value(view) {
            Ok(data) => Self::ok(data),
            Err(e) => Self::service_error("serialization_error", Some(e.to_string())),
        }
    }

    pub fn bad_request(reason: impl Into<String>, message: Option<String>) -> Self {
        Self::failure(StatusCode::BadRequest, reason, message)
    }

    pub fn forbidden(reason: impl Into<String>, message: Option<String>) -> Self {
        Self::failure(StatusCode::Forbidden, reason, message)
    }

    pub fn not_found(reason: impl Into<String>, message: Option<String>) -> Self {
        Self::failure(StatusCode::NotFound, reason, message)
    }

    pub fn service_error(reason: impl Into<String>, message: Option<String>) -> Self {
        Self::failure(StatusCode::ServiceError, reason, message)
    }

    fn failure(status: StatusCode, reason: impl Into<String>, message: Option<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
            message,
            data: None,
        }
    }

    /// Attach a payload to the result.
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusCode::Ok
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// A recognized failure raised inside the engine.
///
/// Converted into a [`ServiceResult`] before leaving the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub status: StatusCode,
    pub reason: String,
    pub message: Option<String>,
    pub detail: Option<Value>,
}

impl Rejection {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BadRequest,
            reason: reason.into(),
            message: None,
            detail: None,
        }
    }

    pub fn service_error(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::ServiceError,
            reason: reason.into(),
            message: Some(message.into()),
            detail: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl From<Rejection> for ServiceResult {
    fn from(r: Rejection) -> Self {
        ServiceResult {
            status: r.status,
            reason: Some(r.reason),
            message: r.message,
            data: r.detail,
        }
    }
}

impl From<EngineError> for Rejection {
    fn from(err: EngineError) -> Self {
        let reason = match &err {
            EngineError::Storage(_) | EngineError::Conflict(_) | EngineError::NotFound(_) => {
                "storage_error"
            }
            EngineError::Lock(_) => "lock_error",
            EngineError::Hook(_) => "hook_failed",
            EngineError::Handler(_) => "handler_failed",
            _ => "internal_error",
        };
        Rejection::service_error(reason, err.to_string())
    }
}

impl From<ArgumentError> for Rejection {
    fn from(err: ArgumentError) -> Self {
        let detail = serde_json::json!({
            "field": err.qualified_field(),
            "reason": err.error.reason.as_str(),
            "expect": err.error.expect,
        });
        Rejection::bad_request(err.reason_code())
            .with_message(err.to_string())
            .with_detail(detail)
    }
}
