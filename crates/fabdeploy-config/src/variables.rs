//! Variable bag and `$placeholder` templates.
//!
//! Templates use the following syntax:
//! - `$name` or `${name}` - value of `name` from the [`VariableBag`]
//! - `$$` - a literal `$`
//! - `\1` .. `\9` - text captured by a group of the rule's pattern
//! - `\\` - a literal backslash
//!
//! Rendering is strict: a placeholder that is not in the bag is an error,
//! never left in the output.

use regex::{Captures, Regex, Replacer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::{ConfigError, ConfigResult};

/// Well-known variable names filled in while deploying.
pub mod keys {
    pub const WORKSPACE_NAME: &str = "workspace_name";
    pub const WORKSPACE_ID: &str = "workspace_id";
    pub const CONNECTION_ID: &str = "connection_id";
    pub const LAKEHOUSE_ID: &str = "lakehouse_id";
    pub const LAKEHOUSE_NAME: &str = "lakehouse_name";
    pub const SQL_ENDPOINT: &str = "sql_endpoint";
    pub const SEMANTICMODEL_ID: &str = "semanticmodel_id";
    pub const SQL_CONNECTION_ID: &str = "sql_connection_id";
}

/// Values resolved so far during a deployment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VariableBag {
    values: BTreeMap<String, String>,
}

impl VariableBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a variable, returning the value it replaced.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Strictly resolve a single name.
    pub fn require(&self, name: &str) -> ConfigResult<&str> {
        self.get(name)
            .ok_or_else(|| ConfigError::MissingPlaceholder(name.to_string()))
    }
}

// `$` forms first, then backslash forms. A bare `$` (no alternative
// matched) is invalid; a bare `\` is literal.
static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(\$)|([A-Za-z_][A-Za-z0-9_]*)|\{([A-Za-z_][A-Za-z0-9_]*)\})?|\\([0-9\\])?")
        .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Variable(String),
    Group(usize),
}

/// A parsed replacement template.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    pieces: Vec<Piece>,
}

impl Template {
    /// Parse a replacement template, recognising group references.
    pub fn parse(source: &str) -> ConfigResult<Self> {
        Self::parse_with(source, true)
    }

    /// Parse a plain-text template; backslashes are kept as written.
    pub fn parse_plain(source: &str) -> ConfigResult<Self> {
        Self::parse_with(source, false)
    }

    fn parse_with(source: &str, groups: bool) -> ConfigResult<Self> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in TOKEN_REGEX.captures_iter(source) {
            let whole = caps.get(0).unwrap();
            literal.push_str(&source[last..whole.start()]);
            last = whole.end();

            let token = whole.as_str();
            if token.starts_with('$') {
                if caps.get(1).is_some() {
                    literal.push('$');
                } else if let Some(name) = caps.get(2).or_else(|| caps.get(3)) {
                    flush(&mut literal, &mut pieces);
                    pieces.push(Piece::Variable(name.as_str().to_string()));
                } else {
                    return Err(ConfigError::InvalidTemplate {
                        template: source.to_string(),
                        message: format!("invalid placeholder at offset {}", whole.start()),
                    });
                }
            } else if !groups {
                literal.push_str(token);
            } else {
                match caps.get(4).map(|m| m.as_str()) {
                    Some("\\") => literal.push('\\'),
                    Some(digit) => {
                        flush(&mut literal, &mut pieces);
                        // single ASCII digit, always parses
                        pieces.push(Piece::Group(digit.parse().unwrap_or_default()));
                    }
                    None => literal.push('\\'),
                }
            }
        }
        literal.push_str(&source[last..]);
        flush(&mut literal, &mut pieces);

        Ok(Self {
            source: source.to_string(),
            pieces,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Highest group number referenced, if any.
    pub fn max_group(&self) -> Option<usize> {
        self.pieces
            .iter()
            .filter_map(|p| match p {
                Piece::Group(n) => Some(*n),
                _ => None,
            })
            .max()
    }

    /// Resolve every placeholder against `bag`, producing a replacement
    /// that can be handed to [`Regex::replace_all`].
    pub fn render(&self, bag: &VariableBag) -> ConfigResult<Replacement> {
        let mut segments = Vec::new();
        let mut text = String::new();

        for piece in &self.pieces {
            match piece {
                Piece::Literal(s) => text.push_str(s),
                Piece::Variable(name) => text.push_str(bag.require(name)?),
                Piece::Group(n) => {
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Group(*n));
                }
            }
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Replacement { segments })
    }

    /// Render to a plain string. Group references, if any, are written
    /// back as `\N`.
    pub fn render_plain(&self, bag: &VariableBag) -> ConfigResult<String> {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(s) => out.push_str(s),
                Piece::Variable(name) => out.push_str(bag.require(name)?),
                Piece::Group(n) => {
                    out.push('\\');
                    out.push_str(&n.to_string());
                }
            }
        }
        Ok(out)
    }
}

fn flush(literal: &mut String, pieces: &mut Vec<Piece>) {
    if !literal.is_empty() {
        pieces.push(Piece::Literal(std::mem::take(literal)));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Group(usize),
}

/// A fully resolved template. Values taken from the bag are inserted
/// verbatim; only group references are expanded per match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    segments: Vec<Segment>,
}

impl Replacer for &Replacement {
    fn replace_append(&mut self, caps: &Captures<'_>, dst: &mut String) {
        for segment in &self.segments {
            match segment {
                Segment::Text(s) => dst.push_str(s),
                Segment::Group(n) => {
                    if let Some(m) = caps.get(*n) {
                        dst.push_str(m.as_str());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_plain(template: &str, bag: &VariableBag) -> ConfigResult<String> {
        Template::parse(template)?.render_plain(bag)
    }

    #[test]
    fn test_basic_render() {
        let bag = VariableBag::new()
            .with("workspace_id", "ws-123")
            .with("lakehouse_id", "lh-456");

        let result = render_plain("ws=$workspace_id lh=${lakehouse_id}", &bag).unwrap();
        assert_eq!(result, "ws=ws-123 lh=lh-456");
    }

    #[test]
    fn test_missing_placeholder_names_key() {
        let bag = VariableBag::new().with("workspace_id", "ws-123");

        let err = render_plain(r#"{"pbiModelDatabaseName": "$semanticmodel_id"}"#, &bag)
            .unwrap_err();
        assert!(matches!(&err, ConfigError::MissingPlaceholder(k) if k == "semanticmodel_id"));
        assert_eq!(
            err.to_string(),
            "missing template value for '$semanticmodel_id'"
        );
    }

    #[test]
    fn test_missing_placeholder_in_render() {
        let template = Template::parse(r#"\1"$lakehouse_id""#).unwrap();
        let err = template.render(&VariableBag::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPlaceholder(k) if k == "lakehouse_id"));
    }

    #[test]
    fn test_escaped_dollar() {
        let result = render_plain("cost: $$5", &VariableBag::new()).unwrap();
        assert_eq!(result, "cost: $5");
    }

    #[test]
    fn test_invalid_placeholder() {
        assert!(matches!(
            Template::parse("price $ 5"),
            Err(ConfigError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            Template::parse("${unterminated"),
            Err(ConfigError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_identifier_boundary() {
        let bag = VariableBag::new().with("lakehouse_id", "abc");
        let result = render_plain("${lakehouse_id}_suffix", &bag).unwrap();
        assert_eq!(result, "abc_suffix");

        // `$lakehouse_id_suffix` is a different (missing) name
        assert!(render_plain("$lakehouse_id_suffix", &bag).is_err());
    }

    #[test]
    fn test_group_references() {
        let template = Template::parse(r#"\1"$workspace_id""#).unwrap();
        assert_eq!(template.max_group(), Some(1));

        let bag = VariableBag::new().with("workspace_id", "new-ws");
        let replacement = template.render(&bag).unwrap();

        let re = Regex::new(r#"("workspaceId"\s*:\s*)".*""#).unwrap();
        let out = re.replace_all(r#""workspaceId": "old""#, &replacement);
        assert_eq!(out, r#""workspaceId": "new-ws""#);
    }

    #[test]
    fn test_values_are_not_expanded() {
        // Values containing `$1` or `\1` must be inserted literally
        let bag = VariableBag::new().with("secret", r"a$1b\1c");
        let replacement = Template::parse("$secret").unwrap().render(&bag).unwrap();

        let re = Regex::new("(x)").unwrap();
        assert_eq!(re.replace_all("x", &replacement), r"a$1b\1c");
    }

    #[test]
    fn test_escaped_backslash() {
        let template = Template::parse(r"a\\1").unwrap();
        assert_eq!(template.max_group(), None);
        assert_eq!(template.render_plain(&VariableBag::new()).unwrap(), r"a\1");
    }

    #[test]
    fn test_plain_keeps_backslashes() {
        let template = Template::parse_plain(r"C:\data\1").unwrap();
        assert_eq!(template.max_group(), None);
        assert_eq!(
            template.render_plain(&VariableBag::new()).unwrap(),
            r"C:\data\1"
        );
    }

    #[test]
    fn test_bag_overwrite_returns_previous() {
        let mut bag = VariableBag::new();
        assert_eq!(bag.set("lakehouse_id", "first"), None);
        assert_eq!(bag.set("lakehouse_id", "second"), Some("first".to_string()));
        assert_eq!(bag.get("lakehouse_id"), Some("second"));
        assert_eq!(bag.len(), 1);
    }
}
