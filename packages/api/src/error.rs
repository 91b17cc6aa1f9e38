use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{
    extraction::AdmissionError, inference::InferenceError, mail::MailError, otp::OtpError,
    store::StoreError, token::TokenError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportPolicy {
    Ignore,
    Report,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    public_code: &'static str,
    public_message: Option<String>,
    report_policy: ReportPolicy,
    report_details: Option<String>,
}

impl ApiError {
    fn new(
        status: StatusCode,
        public_code: &'static str,
        public_message: Option<String>,
        report_policy: ReportPolicy,
    ) -> Self {
        Self {
            status,
            public_code,
            public_message,
            report_policy,
            report_details: None,
        }
    }

    fn with_report(mut self, details: impl Into<String>) -> Self {
        self.report_details = Some(details.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.public_code
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Internal error: {}", msg);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            None,
            ReportPolicy::Report,
        )
        .with_report(msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Not found: {}", msg);
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Bad request: {}", msg);
        Self::new(
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Unauthorized: {}", msg);
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Forbidden: {}", msg);
        Self::new(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Conflict: {}", msg);
        Self::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    /// The extraction backend is held by another request. Callers retry later.
    pub fn busy(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::info!("Busy: {}", msg);
        Self::new(
            StatusCode::CONFLICT,
            "EXTRACTION_BUSY",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    /// Remote procedure failures keep their detail in the public message.
    pub fn upstream(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Upstream error: {}", msg);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "UPSTREAM_ERROR",
            Some(msg.clone()),
            ReportPolicy::Report,
        )
        .with_report(msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Service unavailable: {}", msg);
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            Some("Service unavailable".to_string()),
            ReportPolicy::Report,
        )
        .with_report(msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorEnvelope<'a> {
            success: bool,
            message: &'a str,
            error: ErrorBody<'a>,
        }

        #[derive(Serialize)]
        struct ErrorBody<'a> {
            code: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            id: Option<&'a str>,
        }

        let public_message = self
            .public_message
            .as_deref()
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or("Error"));

        let error_id = (self.report_policy == ReportPolicy::Report)
            .then(|| uuid::Uuid::new_v4().to_string());

        if let Some(id) = error_id.as_deref() {
            tracing::error!(
                error_id = id,
                status = self.status.as_u16(),
                code = self.public_code,
                details = self.report_details.as_deref().unwrap_or(public_message),
                "Reported error"
            );
        }

        let mut response = (
            self.status,
            Json(ErrorEnvelope {
                success: false,
                message: public_message,
                error: ErrorBody {
                    code: self.public_code,
                    id: error_id.as_deref(),
                },
            }),
        )
            .into_response();

        if let Some(id) = error_id.as_deref()
            && let Ok(v) = HeaderValue::from_str(id)
        {
            response.headers_mut().insert("x-error-id", v);
        }

        response
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        tracing::error!("Database error: {:?}", err);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "DATABASE_ERROR",
            None,
            ReportPolicy::Report,
        )
        .with_report(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::not_found("Record not found"),
            StoreError::Database(details) => {
                tracing::error!("Store error: {}", details);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    None,
                    ReportPolicy::Report,
                )
                .with_report(details)
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::warn!("JSON error: {:?}", err);
        Self::bad_request(format!("JSON error: {}", err))
    }
}

impl From<std::num::ParseIntError> for ApiError {
    fn from(err: std::num::ParseIntError) -> Self {
        tracing::warn!("Parse error: {:?}", err);
        Self::bad_request(format!("Invalid number format: {}", err))
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken(_) => Self::unauthorized("Invalid or expired token"),
            TokenError::MissingSecret | TokenError::Signing(_) => {
                Self::internal(format!("Could not generate token: {}", err))
            }
        }
    }
}

impl From<OtpError> for ApiError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::Expired => {
                tracing::warn!("OTP expired");
                Self::new(
                    StatusCode::BAD_REQUEST,
                    "OTP_EXPIRED",
                    Some("OTP expired".to_string()),
                    ReportPolicy::Ignore,
                )
            }
            OtpError::Mismatch => {
                tracing::warn!("OTP mismatch");
                Self::new(
                    StatusCode::BAD_REQUEST,
                    "OTP_MISMATCH",
                    Some("OTP does not match".to_string()),
                    ReportPolicy::Ignore,
                )
            }
            OtpError::Hashing(details) => Self::internal(format!("Hashing failed: {}", details)),
        }
    }
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        Self::upstream(err.to_string())
    }
}

impl<E: Into<ApiError>> From<AdmissionError<E>> for ApiError {
    fn from(err: AdmissionError<E>) -> Self {
        match err {
            AdmissionError::Busy => Self::busy("extraction resource currently in use"),
            AdmissionError::Failed(inner) => inner.into(),
            AdmissionError::Aborted(details) => {
                Self::internal(format!("Extraction task failed: {}", details))
            }
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        tracing::error!("Mail error: {}", err);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "MAIL_ERROR",
            Some("Failed to send OTP".to_string()),
            ReportPolicy::Report,
        )
        .with_report(err.to_string())
    }
}

impl std::error::Error for ApiError {}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.public_code)
    }
}

#[macro_export]
macro_rules! internal {
    ($($arg:tt)*) => { $crate::error::ApiError::internal(format!($($arg)*)) };
}

#[macro_export]
macro_rules! not_found {
    ($($arg:tt)*) => { $crate::error::ApiError::not_found(format!($($arg)*)) };
}

#[macro_export]
macro_rules! bad_request {
    ($($arg:tt)*) => { $crate::error::ApiError::bad_request(format!($($arg)*)) };
}
