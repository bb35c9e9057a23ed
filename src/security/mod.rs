//! Defense-in-depth checks applied to every request and response
//!
//! Size ceilings, prototype-pollution key stripping, URI scheme and path
//! validation, secret redaction for outgoing error text, and the fixed set of
//! security response headers.

pub mod headers;
pub mod limits;
pub mod redact;
pub mod sanitize;
pub mod uri;

pub use limits::{check_request_size, check_response_size, SizeError, DEFAULT_MAX_BODY_BYTES};
pub use redact::{redact_secrets, sanitize_error_message};
pub use sanitize::sanitize_input;
pub use uri::{canonicalize_path, validate_uri_scheme, UriError};
