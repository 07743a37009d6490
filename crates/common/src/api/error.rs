use reqwest::StatusCode;

/// Errors surfaced by a node's control API
///
/// Transport failures and the status classes the node reports are kept
/// distinct so callers can tell an unreachable node from a refused request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("bad request: {}", .0.join("; "))]
    BadRequest(Vec<String>),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("too many requests")]
    TooManyRequests,
    #[error("internal server error")]
    InternalServerError,
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify a non-success status that carries no decodable body
    pub fn from_status(status: StatusCode, text: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ApiError::BadRequest(vec!["bad request".to_string()]),
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::FORBIDDEN => ApiError::Forbidden,
            StatusCode::NOT_FOUND => ApiError::NotFound,
            StatusCode::TOO_MANY_REQUESTS => ApiError::TooManyRequests,
            StatusCode::INTERNAL_SERVER_ERROR => ApiError::InternalServerError,
            StatusCode::SERVICE_UNAVAILABLE => ApiError::ServiceUnavailable,
            _ => ApiError::HttpStatus(status, text.to_lowercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, String::new()),
            ApiError::NotFound
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ApiError::TooManyRequests
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, "Teapot".into()),
            ApiError::HttpStatus(StatusCode::IM_A_TEAPOT, ref t) if t == "teapot"
        ));
    }

    #[test]
    fn test_bad_request_lists_details() {
        let err = ApiError::BadRequest(vec!["invalid span".into(), "missing body".into()]);
        assert_eq!(err.to_string(), "bad request: invalid span; missing body");
    }
}
