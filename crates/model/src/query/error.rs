use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    UserError,
    InternalError,
    InsufficientResources,
    External,
}

/// Stable failure classification reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardErrorCode {
    GenericUserError,
    AbandonedQuery,
    UserCanceled,
    GenericInternalError,
    PageTransportError,
    SerializationError,
}

impl StandardErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            StandardErrorCode::GenericUserError => 0,
            StandardErrorCode::AbandonedQuery => 2,
            StandardErrorCode::UserCanceled => 3,
            StandardErrorCode::GenericInternalError => 65536,
            StandardErrorCode::PageTransportError => 65538,
            StandardErrorCode::SerializationError => 65540,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StandardErrorCode::GenericUserError => "GENERIC_USER_ERROR",
            StandardErrorCode::AbandonedQuery => "ABANDONED_QUERY",
            StandardErrorCode::UserCanceled => "USER_CANCELED",
            StandardErrorCode::GenericInternalError => "GENERIC_INTERNAL_ERROR",
            StandardErrorCode::PageTransportError => "PAGE_TRANSPORT_ERROR",
            StandardErrorCode::SerializationError => "SERIALIZATION_ERROR",
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            StandardErrorCode::GenericUserError
            | StandardErrorCode::AbandonedQuery
            | StandardErrorCode::UserCanceled => ErrorType::UserError,
            StandardErrorCode::GenericInternalError | StandardErrorCode::SerializationError => {
                ErrorType::InternalError
            }
            StandardErrorCode::PageTransportError => ErrorType::External,
        }
    }
}

impl fmt::Display for StandardErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// Cause chain of a failure, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    pub message: String,
    pub causes: Vec<String>,
}

/// Terminal error carried inside a result batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryError {
    pub message: String,
    pub error_code: i32,
    pub error_name: String,
    pub error_type: ErrorType,
    pub failure_info: Option<FailureInfo>,
}

impl QueryError {
    pub fn new(code: StandardErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            failure_info: Some(FailureInfo {
                message: message.clone(),
                causes: Vec::new(),
            }),
            message,
            error_code: code.code(),
            error_name: code.name().to_string(),
            error_type: code.error_type(),
        }
    }

    /// Builds an error from a Rust error, walking its `source()` chain.
    pub fn from_error(code: StandardErrorCode, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        let message = error.to_string();
        Self {
            failure_info: Some(FailureInfo {
                message: message.clone(),
                causes,
            }),
            message,
            error_code: code.code(),
            error_name: code.name().to_string(),
            error_type: code.error_type(),
        }
    }

    pub fn user_canceled() -> Self {
        Self::new(StandardErrorCode::UserCanceled, "Query was canceled")
    }

    pub fn abandoned(idle: std::time::Duration) -> Self {
        Self::new(
            StandardErrorCode::AbandonedQuery,
            format!(
                "Query was abandoned by the client: no heartbeat for {}ms",
                idle.as_millis()
            ),
        )
    }

    /// Used when a query is FAILED but the lifecycle recorded no cause.
    pub fn unknown_failure(state: impl fmt::Display) -> Self {
        Self::new(
            StandardErrorCode::GenericInternalError,
            format!("Query is {state} (reason unknown)"),
        )
    }

    pub fn is(&self, code: StandardErrorCode) -> bool {
        self.error_code == code.code()
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.message, self.error_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer")]
    struct Outer(#[source] Inner);

    #[derive(Debug, thiserror::Error)]
    #[error("inner")]
    struct Inner;

    #[test]
    fn from_error_records_cause_chain() {
        let err = QueryError::from_error(StandardErrorCode::SerializationError, &Outer(Inner));

        assert_eq!(err.message, "outer");
        assert_eq!(err.error_code, 65540);
        assert_eq!(err.error_name, "SERIALIZATION_ERROR");
        assert_eq!(err.error_type, ErrorType::InternalError);
        assert_eq!(
            err.failure_info.unwrap().causes,
            vec!["inner".to_string()]
        );
    }

    #[test]
    fn canceled_is_a_user_error() {
        let err = QueryError::user_canceled();
        assert!(err.is(StandardErrorCode::UserCanceled));
        assert_eq!(err.error_type, ErrorType::UserError);
    }
}
