use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Schemes that are refused regardless of the allow-list.
pub const DENIED_SCHEMES: [&str; 5] = ["file", "javascript", "data", "vbscript", "about"];

pub const DEFAULT_ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

const MAX_DECODE_PASSES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("Invalid URI scheme: missing scheme in `{uri}`")]
    MissingScheme { uri: String },
    #[error("Invalid URI scheme: `{scheme}` is not permitted")]
    DeniedScheme { scheme: String },
    #[error("Invalid URI scheme: `{scheme}` is not in the allowed list")]
    SchemeNotAllowed { scheme: String },
    #[error("Path traversal detected in `{uri}`")]
    Traversal { uri: String },
    #[error("Null byte detected in `{uri}`")]
    NullByte { uri: String },
}

fn scheme_regex() -> &'static Regex {
    static SCHEME: OnceLock<Regex> = OnceLock::new();
    SCHEME.get_or_init(|| Regex::new(r"(?i)^([a-z][a-z0-9+.\-]*):").expect("valid scheme regex"))
}

/// Lowercased scheme of `uri`, if it has one.
pub fn uri_scheme(uri: &str) -> Option<String> {
    scheme_regex()
        .captures(uri)
        .and_then(|captures| captures.get(1))
        .map(|scheme| scheme.as_str().to_ascii_lowercase())
}

/// Returns the lowercased scheme when it is present, not denied and allowed.
pub fn validate_uri_scheme<S: AsRef<str>>(uri: &str, allowed: &[S]) -> Result<String, UriError> {
    let Some(scheme) = uri_scheme(uri) else {
        return Err(UriError::MissingScheme {
            uri: uri.to_string(),
        });
    };

    if DENIED_SCHEMES.contains(&scheme.as_str()) {
        return Err(UriError::DeniedScheme { scheme });
    }

    if !allowed
        .iter()
        .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(&scheme))
    {
        return Err(UriError::SchemeNotAllowed { scheme });
    }

    Ok(scheme)
}

fn decode_repeatedly(input: &str) -> String {
    let mut current = input.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        let decoded = String::from_utf8_lossy(&urlencoding::decode_binary(current.as_bytes()))
            .into_owned();
        if decoded == current {
            break;
        }
        current = decoded;
    }
    current
}

fn contains_traversal(lowered: &str) -> bool {
    const MARKERS: [&str; 10] = [
        "../",
        "..\\",
        "%2e%2e%2f",
        "%2e%2e/",
        "..%2f",
        "%2e%2e%5c",
        "%2e%2e\\",
        "..%5c",
        "\\u002e\\u002e\\u002f",
        "\\u002e\\u002e/",
    ];
    MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn contains_null_byte(lowered: &str) -> bool {
    lowered.contains('\0') || lowered.contains("%00") || lowered.contains("\\u0000")
}

fn collapse_slashes(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut previous_slash = false;
    for character in path.chars() {
        if character == '/' {
            if !previous_slash {
                collapsed.push(character);
            }
            previous_slash = true;
        } else {
            collapsed.push(character);
            previous_slash = false;
        }
    }
    collapsed
}

/// Decodes `uri`, rejects traversal and null-byte payloads, then normalizes
/// separators. A leading `scheme://` keeps its double slash.
pub fn canonicalize_path(uri: &str) -> Result<String, UriError> {
    let decoded = decode_repeatedly(uri);
    let lowered = decoded.to_ascii_lowercase();

    if contains_null_byte(&lowered) {
        return Err(UriError::NullByte {
            uri: uri.to_string(),
        });
    }
    if contains_traversal(&lowered) {
        return Err(UriError::Traversal {
            uri: uri.to_string(),
        });
    }

    let normalized = decoded.replace('\\', "/");
    let scheme_len = scheme_regex()
        .find(&normalized)
        .map(|found| found.end())
        .unwrap_or(0);
    let (prefix, rest) = normalized.split_at(scheme_len);

    if scheme_len > 0 && rest.starts_with("//") {
        let authority = rest.trim_start_matches('/');
        return Ok(format!("{prefix}//{}", collapse_slashes(authority)));
    }

    Ok(format!("{prefix}{}", collapse_slashes(rest)))
}
