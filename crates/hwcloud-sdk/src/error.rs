//! SDK error types

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Details of an HTTP exchange that ended with a non-accepted status code
#[derive(Debug, Clone)]
pub struct ResponseDetail {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl ResponseDetail {
    /// Service error code carried in the response body, if any.
    ///
    /// HuaweiCloud services are not consistent about the field name:
    /// `error_code`, `errCode`, `code` and a nested `error.code` all occur.
    ///
    /// Numeric codes are returned in their decimal form.
    pub fn error_code(&self) -> Option<String> {
        body_field(&self.body, CODE_FIELDS)
    }

    /// Service error message carried in the response body, if any.
    pub fn error_message(&self) -> Option<String> {
        body_field(&self.body, MESSAGE_FIELDS)
    }
}

const CODE_FIELDS: &[&[&str]] = &[&["error_code"], &["errCode"], &["code"], &["error", "code"]];

const MESSAGE_FIELDS: &[&[&str]] = &[
    &["error_msg"],
    &["errMsg"],
    &["externalMessage"],
    &["message"],
    &["error", "message"],
];

/// First non-empty string or number found at one of `paths` in a JSON body
fn body_field(body: &str, paths: &[&[&str]]) -> Option<String> {
    let body: Value = serde_json::from_str(body).ok()?;
    paths.iter().find_map(|path| {
        match path.iter().try_fold(&body, |value, key| value.get(key))? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

impl fmt::Display for ResponseDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} returned {}", self.method, self.url, self.status)?;
        if !self.body.is_empty() {
            write!(f, ": {}", self.body)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("resource not found: {0}")]
    NotFound(ResponseDetail),

    #[error("bad request: {0}")]
    BadRequest(ResponseDetail),

    #[error("authentication failed: {0}")]
    Unauthorized(ResponseDetail),

    #[error("action forbidden: {0}")]
    Forbidden(ResponseDetail),

    #[error("conflict: {0}")]
    Conflict(ResponseDetail),

    #[error("too many requests: {0}")]
    TooManyRequests(ResponseDetail),

    #[error("internal server error: {0}")]
    ServerError(ResponseDetail),

    #[error("unexpected response code (expected {expected:?}): {detail}")]
    UnexpectedResponseCode {
        detail: ResponseDetail,
        expected: Vec<u16>,
    },

    #[error("missing path parameter: {0}")]
    MissingPathParam(String),

    #[error("invalid value for path parameter {name}: {value:?}")]
    InvalidPathParam { name: String, value: String },

    #[error("missing input for argument [{0}]")]
    MissingRequiredField(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid query parameters: {0}")]
    InvalidQuery(String),

    #[error("pagination over {url} exceeded {max_pages} pages")]
    PageLimitExceeded { url: String, max_pages: usize },

    #[error("key {0:?} not found in response body")]
    MissingKey(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SdkError {
    /// Classify a non-accepted response by its status code.
    pub fn from_response(detail: ResponseDetail, expected: Vec<u16>) -> Self {
        match detail.status {
            400 => SdkError::BadRequest(detail),
            401 => SdkError::Unauthorized(detail),
            403 => SdkError::Forbidden(detail),
            404 => SdkError::NotFound(detail),
            409 => SdkError::Conflict(detail),
            429 => SdkError::TooManyRequests(detail),
            500..=599 => SdkError::ServerError(detail),
            _ => SdkError::UnexpectedResponseCode { detail, expected },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SdkError::NotFound(_))
    }

    /// The HTTP exchange behind this error, when there was one.
    pub fn response(&self) -> Option<&ResponseDetail> {
        match self {
            SdkError::NotFound(d)
            | SdkError::BadRequest(d)
            | SdkError::Unauthorized(d)
            | SdkError::Forbidden(d)
            | SdkError::Conflict(d)
            | SdkError::TooManyRequests(d)
            | SdkError::ServerError(d) => Some(d),
            SdkError::UnexpectedResponseCode { detail, .. } => Some(detail),
            _ => None,
        }
    }

    /// Re-label a 400 response as not-found when its service error code is
    /// one of `codes`. Some services answer lookups of missing resources with
    /// a 400 and a dedicated error code instead of a 404.
    pub fn not_found_on_codes(self, codes: &[&str]) -> Self {
        match self {
            SdkError::BadRequest(detail)
                if detail
                    .error_code()
                    .is_some_and(|code| codes.contains(&code.as_str())) =>
            {
                SdkError::NotFound(detail)
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(status: u16, body: &str) -> ResponseDetail {
        ResponseDetail {
            method: "GET".to_string(),
            url: "https://cdm.cn-north-4.myhuaweicloud.com/v1.1/p/clusters/c/cdm/job/j".to_string(),
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(SdkError::from_response(detail(404, ""), vec![200]).is_not_found());
        assert!(matches!(
            SdkError::from_response(detail(503, ""), vec![200]),
            SdkError::ServerError(_)
        ));
        assert!(matches!(
            SdkError::from_response(detail(204, ""), vec![200]),
            SdkError::UnexpectedResponseCode { .. }
        ));
    }

    #[test]
    fn test_error_code_variants() {
        assert_eq!(
            detail(400, r#"{"errCode":"Cdm.0100","externalMessage":"Job not exist"}"#).error_code(),
            Some("Cdm.0100".to_string())
        );
        assert_eq!(
            detail(400, r#"{"error":{"code":"GA.0001","message":"bad"}}"#).error_code(),
            Some("GA.0001".to_string())
        );
        assert_eq!(detail(400, "not json").error_code(), None);
    }

    #[test]
    fn test_error_code_tolerates_mixed_bodies() {
        let both = detail(
            400,
            r#"{"error_code":"DCS.4096","errCode":"DCS.4096","error_msg":"busy"}"#,
        );
        assert_eq!(both.error_code(), Some("DCS.4096".to_string()));
        assert_eq!(both.error_message(), Some("busy".to_string()));

        let numeric = detail(400, r#"{"code":400,"message":"invalid"}"#);
        assert_eq!(numeric.error_code(), Some("400".to_string()));

        let empty_then_nested = detail(400, r#"{"error_code":"","error":{"code":"GA.0001"}}"#);
        assert_eq!(empty_then_nested.error_code(), Some("GA.0001".to_string()));
        assert_eq!(detail(400, r#"{"error_code":null}"#).error_code(), None);
    }

    #[test]
    fn test_not_found_on_codes() {
        let err = SdkError::BadRequest(detail(400, r#"{"errCode":"Cdm.0054"}"#));
        assert!(err.not_found_on_codes(&["Cdm.0100", "Cdm.0054"]).is_not_found());

        let err = SdkError::BadRequest(detail(400, r#"{"errCode":"Cdm.0001"}"#));
        assert!(!err.not_found_on_codes(&["Cdm.0100", "Cdm.0054"]).is_not_found());
    }
}
