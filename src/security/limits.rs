use thiserror::Error;

/// Default ceiling for request and response bodies (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeError {
    #[error("request body of {actual} bytes exceeds the limit of {limit} bytes")]
    Request { actual: usize, limit: usize },
    #[error("request body exceeds the limit of {limit} bytes")]
    RequestStream { limit: usize },
    #[error("response body of {actual} bytes exceeds the limit of {limit} bytes")]
    Response { actual: usize, limit: usize },
}

pub fn check_request_size(actual: usize, limit: usize) -> Result<(), SizeError> {
    if actual > limit {
        return Err(SizeError::Request { actual, limit });
    }
    Ok(())
}

pub fn check_response_size(actual: usize, limit: usize) -> Result<(), SizeError> {
    if actual > limit {
        return Err(SizeError::Response { actual, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_at_limit_is_accepted() {
        assert!(check_request_size(DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_BODY_BYTES).is_ok());
        assert!(check_response_size(10, 10).is_ok());
    }

    #[test]
    fn body_over_limit_is_rejected() {
        let error = check_request_size(DEFAULT_MAX_BODY_BYTES + 1, DEFAULT_MAX_BODY_BYTES)
            .expect_err("oversized request");
        assert_eq!(
            error,
            SizeError::Request {
                actual: DEFAULT_MAX_BODY_BYTES + 1,
                limit: DEFAULT_MAX_BODY_BYTES,
            }
        );
        assert!(error.to_string().contains("exceeds the limit"));
        assert!(matches!(
            check_response_size(11, 10),
            Err(SizeError::Response { .. })
        ));
    }
}
