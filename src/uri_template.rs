//! Resource URI classification and template matching
//!
//! A registered resource key is a template iff it contains at least one
//! `{identifier}` placeholder. Templates compile to an anchored regex where each
//! placeholder captures one or more non-`/` characters.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

pub type UriParams = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("invalid template variable `{{{variable}}}` in `{uri}`: only [A-Za-z0-9_] is allowed")]
    InvalidVariable { uri: String, variable: String },
    #[error("template `{uri}` could not be compiled: {message}")]
    Compile { uri: String, message: String },
}

#[derive(Debug, Clone)]
pub enum UriPattern {
    Static(String),
    Template(CompiledTemplate),
}

#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    source: String,
    regex: Regex,
    variables: Vec<String>,
    literal_prefix_len: usize,
    literal_len: usize,
}

enum Segment<'a> {
    Literal(&'a str),
    Variable(&'a str),
}

fn is_identifier(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_')
}

/// Splits a key into literal and `{...}` segments. An unmatched brace, or a
/// pair of empty braces, stays literal.
fn segments(uri: &str) -> Vec<Segment<'_>> {
    let mut parts = Vec::new();
    let mut rest = uri;
    let mut literal_start = 0;
    let mut offset = 0;

    while let Some(open) = rest.find('{') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            break;
        };
        let inner = &after_open[..close];
        let consumed = open + 1 + close + 1;

        if inner.is_empty() {
            offset += consumed;
            rest = &rest[consumed..];
            continue;
        }

        let open_abs = offset + open;
        if open_abs > literal_start {
            parts.push(Segment::Literal(&uri[literal_start..open_abs]));
        }
        parts.push(Segment::Variable(inner));
        offset += consumed;
        literal_start = offset;
        rest = &rest[consumed..];
    }

    if literal_start < uri.len() {
        parts.push(Segment::Literal(&uri[literal_start..]));
    }
    parts
}

pub fn is_template(uri: &str) -> bool {
    segments(uri)
        .iter()
        .any(|segment| matches!(segment, Segment::Variable(_)))
}

impl UriPattern {
    pub fn parse(uri: &str) -> Result<Self, TemplateError> {
        let parts = segments(uri);
        if !parts
            .iter()
            .any(|segment| matches!(segment, Segment::Variable(_)))
        {
            return Ok(Self::Static(uri.to_string()));
        }

        let mut pattern = String::from("^");
        let mut variables = Vec::new();
        let mut literal_prefix_len = 0;
        let mut literal_len = 0;
        let mut seen_variable = false;

        for segment in parts {
            match segment {
                Segment::Literal(text) => {
                    pattern.push_str(&regex::escape(text));
                    literal_len += text.len();
                    if !seen_variable {
                        literal_prefix_len += text.len();
                    }
                }
                Segment::Variable(name) => {
                    if !is_identifier(name) {
                        return Err(TemplateError::InvalidVariable {
                            uri: uri.to_string(),
                            variable: name.to_string(),
                        });
                    }
                    pattern.push_str("([^/]+)");
                    variables.push(name.to_string());
                    seen_variable = true;
                }
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|err| TemplateError::Compile {
            uri: uri.to_string(),
            message: err.to_string(),
        })?;

        Ok(Self::Template(CompiledTemplate {
            source: uri.to_string(),
            regex,
            variables,
            literal_prefix_len,
            literal_len,
        }))
    }

    pub fn source(&self) -> &str {
        match self {
            Self::Static(uri) => uri,
            Self::Template(template) => &template.source,
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(self, Self::Template(_))
    }

    pub fn variables(&self) -> &[String] {
        match self {
            Self::Static(_) => &[],
            Self::Template(template) => &template.variables,
        }
    }

    pub fn matches(&self, uri: &str) -> Option<UriParams> {
        match self {
            Self::Static(registered) => (registered == uri).then(UriParams::new),
            Self::Template(template) => template.matches(uri),
        }
    }

    /// Ordering key used to pick a winner among overlapping templates:
    /// longer literal prefix first, then more literal characters overall.
    pub fn specificity(&self) -> (usize, usize) {
        match self {
            Self::Static(uri) => (uri.len(), uri.len()),
            Self::Template(template) => (template.literal_prefix_len, template.literal_len),
        }
    }
}

impl CompiledTemplate {
    fn matches(&self, uri: &str) -> Option<UriParams> {
        let captures = self.regex.captures(uri)?;
        Some(
            self.variables
                .iter()
                .zip(captures.iter().skip(1))
                .filter_map(|(name, value)| {
                    value.map(|value| (name.clone(), value.as_str().to_string()))
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_uri_matches_only_itself() {
        let pattern = UriPattern::parse("docs://readme").expect("static uri");
        assert!(!pattern.is_template());
        assert_eq!(pattern.matches("docs://readme"), Some(UriParams::new()));
        assert_eq!(pattern.matches("docs://readme2"), None);
        assert_eq!(pattern.matches("docs://READme"), None);
    }

    #[test]
    fn template_extracts_variables_in_declaration_order() {
        let pattern = UriPattern::parse("repo://{owner}/{name}/issues").expect("template");
        assert_eq!(pattern.variables(), ["owner".to_string(), "name".to_string()]);

        let params = pattern
            .matches("repo://acme/widgets/issues")
            .expect("should match");
        assert_eq!(params.len(), 2);
        assert_eq!(params["owner"], "acme");
        assert_eq!(params["name"], "widgets");
    }

    #[test]
    fn template_values_never_span_slashes() {
        let pattern = UriPattern::parse("user://{id}").expect("template");
        assert_eq!(pattern.matches("user://42").expect("match")["id"], "42");
        assert!(pattern.matches("user://42/profile").is_none());
        assert!(pattern.matches("user://").is_none());
    }

    #[test]
    fn literal_regex_metacharacters_are_escaped() {
        let pattern = UriPattern::parse("calc://v1.0/{expr}?q=(x)").expect("template");
        assert!(pattern.matches("calc://v1.0/sum?q=(x)").is_some());
        assert!(pattern.matches("calc://v1x0/sum?q=(x)").is_none());
    }

    #[test]
    fn values_are_not_type_coerced() {
        let pattern = UriPattern::parse("item://{n}").expect("template");
        assert_eq!(pattern.matches("item://007").expect("match")["n"], "007");
    }

    #[test]
    fn invalid_variable_fails_at_parse_time() {
        let error = UriPattern::parse("user://{user-id}").expect_err("invalid variable");
        assert_eq!(
            error,
            TemplateError::InvalidVariable {
                uri: "user://{user-id}".to_string(),
                variable: "user-id".to_string(),
            }
        );
    }

    #[test]
    fn unmatched_and_empty_braces_stay_literal() {
        assert!(!is_template("weird://{"));
        assert!(!is_template("weird://{}"));
        let pattern = UriPattern::parse("weird://{}").expect("static");
        assert_eq!(pattern.matches("weird://{}"), Some(UriParams::new()));
    }

    #[test]
    fn specificity_prefers_longer_literal_prefix() {
        let generic = UriPattern::parse("files://{path}").expect("template");
        let specific = UriPattern::parse("files://docs/{path}").expect("template");
        assert!(specific.specificity() > generic.specificity());
    }
}
