//! Path template compilation: matching and reverse generation.

use std::borrow::Cow;
use std::collections::BTreeMap;

use regex::Regex;

use crate::{ConfigError, RouteError};

/// Captured, percent-decoded parameter values keyed by name.
pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Rest(String),
    Wildcard,
}

/// A compiled path template.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
    regex: Regex,
}

impl PathPattern {
    pub fn compile(template: &str) -> Result<Self, ConfigError> {
        let segments = parse(template)?;

        let mut source = String::from("^");
        for segment in &segments {
            match segment {
                Segment::Literal(lit) => {
                    source.push('/');
                    source.push_str(&regex::escape(lit));
                }
                Segment::Param(name) => {
                    source.push_str(&format!("/(?P<{name}>[^/?]+)"));
                }
                // Lazy so a trailing slash is not swallowed into the capture.
                Segment::Rest(name) => {
                    source.push_str(&format!("(?:/(?P<{name}>[^?]*?))?"));
                }
                Segment::Wildcard => source.push_str("(?:/[^?]*)?"),
            }
        }
        if segments.is_empty() {
            source.push('/');
        } else {
            source.push_str("/?");
        }
        source.push_str(r"(?:\?.*)?$");

        let regex = Regex::new(&source)
            .map_err(|e| ConfigError::invalid_template(template, e.to_string()))?;

        Ok(Self {
            template: template.to_string(),
            segments,
            regex,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Parameter names in template order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) | Segment::Rest(name) => Some(name.as_str()),
            Segment::Literal(_) | Segment::Wildcard => None,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match `path` (optionally carrying a `?query`) and return its parameters.
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        let mut params = Params::new();
        for name in self.param_names() {
            if let Some(m) = caps.name(name) {
                params.insert(name.to_string(), decode(m.as_str()).into_owned());
            }
        }
        Some(params)
    }

    /// Build a concrete path from named arguments.
    pub fn generate(&self, args: &RouteArgs) -> Result<String, RouteError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => {
                    out.push('/');
                    out.push_str(lit);
                }
                Segment::Param(name) => match args.get(name) {
                    Some(ParamValue::One(value)) if value.is_empty() => {
                        return Err(RouteError::EmptyParam {
                            template: self.template.clone(),
                            param: name.clone(),
                        });
                    }
                    Some(ParamValue::One(value)) => {
                        out.push('/');
                        out.push_str(&urlencoding::encode(value));
                    }
                    Some(ParamValue::Many(_)) => {
                        return Err(RouteError::ArgumentKind {
                            template: self.template.clone(),
                            param: name.clone(),
                        });
                    }
                    None => return Err(self.missing(name)),
                },
                Segment::Rest(name) => {
                    let parts: Vec<&str> = match args.get(name) {
                        Some(ParamValue::One(value)) => {
                            value.split('/').filter(|s| !s.is_empty()).collect()
                        }
                        Some(ParamValue::Many(values)) => {
                            values.iter().map(String::as_str).collect()
                        }
                        None => return Err(self.missing(name)),
                    };
                    if !parts.is_empty() {
                        out.push('/');
                        let encoded: Vec<Cow<'_, str>> =
                            parts.iter().map(|p| urlencoding::encode(p)).collect();
                        out.push_str(&encoded.join("/"));
                    }
                }
                Segment::Wildcard => return Err(RouteError::NotGeneratable(self.template.clone())),
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        Ok(out)
    }

    fn missing(&self, name: &str) -> RouteError {
        RouteError::MissingParam {
            template: self.template.clone(),
            param: name.to_string(),
        }
    }
}

fn parse(template: &str) -> Result<Vec<Segment>, ConfigError> {
    if template == "*" {
        return Ok(vec![Segment::Wildcard]);
    }
    let Some(body) = template.strip_prefix('/') else {
        return Err(ConfigError::invalid_template(
            template,
            "must start with '/' or be '*'",
        ));
    };

    let mut segments = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    for raw in body.split('/').filter(|s| !s.is_empty()) {
        if let Some(Segment::Rest(name)) = segments.last() {
            return Err(ConfigError::invalid_template(
                template,
                format!("':{name}*' must be the last segment"),
            ));
        }

        let segment = if raw == "*" {
            Segment::Wildcard
        } else if let Some(token) = raw.strip_prefix(':') {
            let (name, rest) = match token.strip_suffix('*') {
                Some(name) => (name, true),
                None => (token, false),
            };
            if !is_identifier(name) {
                return Err(ConfigError::invalid_template(
                    template,
                    format!("invalid parameter name '{name}'"),
                ));
            }
            if seen.contains(&name) {
                return Err(ConfigError::invalid_template(
                    template,
                    format!("duplicate parameter '{name}'"),
                ));
            }
            seen.push(name);
            if rest {
                Segment::Rest(name.to_string())
            } else {
                Segment::Param(name.to_string())
            }
        } else if is_path_literal(raw) {
            Segment::Literal(raw.to_string())
        } else {
            return Err(ConfigError::invalid_template(
                template,
                format!("literal '{raw}' must be percent-encoded printable ASCII"),
            ));
        };
        segments.push(segment);
    }
    Ok(segments)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Literals are emitted verbatim in generated URLs and `Location` headers.
fn is_path_literal(raw: &str) -> bool {
    raw.chars()
        .all(|c| c.is_ascii_graphic() && c != '?' && c != '#')
}

fn decode(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

/// Argument value for reverse generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    One(String),
    /// Segments for a `:param*` token; joined with `/`.
    Many(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        Self::Many(value)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(value: Vec<&str>) -> Self {
        Self::Many(value.into_iter().map(str::to_string).collect())
    }
}

/// Named arguments for [`PathPattern::generate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteArgs(BTreeMap<String, ParamValue>);

impl RouteArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pattern(template: &str) -> PathPattern {
        PathPattern::compile(template).unwrap()
    }

    #[test]
    fn single_segment_param() {
        let p = pattern("/users/:id");
        let params = p.captures("/users/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(p.captures("/users").is_none());
        assert!(p.captures("/users/42/edit").is_none());
    }

    #[test]
    fn rest_param_consumes_remaining_segments() {
        let p = pattern("/files/:path*");
        let params = p.captures("/files/a/b/c").unwrap();
        assert_eq!(params.get("path").map(String::as_str), Some("a/b/c"));
        assert!(p.is_match("/files"));
        assert!(!p.is_match("/filesystem"));
    }

    #[test]
    fn query_and_trailing_slash_are_tolerated() {
        let p = pattern("/users/:id");
        let params = p.captures("/users/7?tab=roles&x=/y").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("7"));
        assert!(p.is_match("/users/7/"));

        let rest = pattern("/files/:path*");
        let params = rest.captures("/files/a/b/?download=1").unwrap();
        assert_eq!(params.get("path").map(String::as_str), Some("a/b"));
    }

    #[test]
    fn wildcard_matches_anything() {
        assert!(pattern("*").is_match("/"));
        assert!(pattern("*").is_match("/deep/nested/path?q=1"));
        let api = pattern("/api/*");
        assert!(api.is_match("/api"));
        assert!(api.is_match("/api/v1/things"));
        assert!(!api.is_match("/apis"));
    }

    #[test]
    fn root_template_matches_only_root() {
        let root = pattern("/");
        assert!(root.is_match("/"));
        assert!(root.is_match("/?from=x"));
        assert!(!root.is_match("/users"));
    }

    #[test]
    fn literals_are_escaped() {
        let p = pattern("/v1.0/status");
        assert!(p.is_match("/v1.0/status"));
        assert!(!p.is_match("/v1x0/status"));
    }

    #[test]
    fn captured_values_are_decoded() {
        let p = pattern("/users/:id");
        let params = p.captures("/users/j%C3%B6rg%20m").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("jörg m"));
    }

    #[test]
    fn invalid_templates_are_rejected() {
        for template in [
            "users",
            "/users/:",
            "/users/:1id",
            "/a/:x/:x",
            "/files/:p*/tail",
        ] {
            assert!(
                matches!(
                    PathPattern::compile(template),
                    Err(ConfigError::InvalidTemplate { .. })
                ),
                "{template} should be rejected"
            );
        }
    }

    #[test]
    fn literals_must_be_url_safe() {
        for template in ["/café", "/status page", "/login?next", "/a#b"] {
            assert!(
                matches!(
                    PathPattern::compile(template),
                    Err(ConfigError::InvalidTemplate { .. })
                ),
                "{template} should be rejected"
            );
        }

        let encoded = pattern("/caf%C3%A9");
        assert_eq!(encoded.generate(&RouteArgs::new()).unwrap(), "/caf%C3%A9");
        assert!(encoded.is_match("/caf%C3%A9?x=1"));
    }

    #[test]
    fn generate_encodes_each_segment() {
        let p = pattern("/files/:path*");
        let url = p
            .generate(&RouteArgs::new().with("path", vec!["my docs", "a/b", "c"]))
            .unwrap();
        assert_eq!(url, "/files/my%20docs/a%2Fb/c");

        let single = pattern("/users/:id/edit");
        assert_eq!(
            single
                .generate(&RouteArgs::new().with("id", "a b"))
                .unwrap(),
            "/users/a%20b/edit"
        );
    }

    #[test]
    fn generate_reports_bad_arguments() {
        let p = pattern("/users/:id");
        assert!(matches!(
            p.generate(&RouteArgs::new()),
            Err(RouteError::MissingParam { .. })
        ));
        assert!(matches!(
            p.generate(&RouteArgs::new().with("id", "")),
            Err(RouteError::EmptyParam { .. })
        ));
        assert!(matches!(
            p.generate(&RouteArgs::new().with("id", vec!["a", "b"])),
            Err(RouteError::ArgumentKind { .. })
        ));
        assert!(matches!(
            pattern("/api/*").generate(&RouteArgs::new()),
            Err(RouteError::NotGeneratable(_))
        ));
    }

    #[test]
    fn empty_rest_generates_prefix() {
        let p = pattern("/files/:path*");
        let empty: Vec<String> = Vec::new();
        assert_eq!(
            p.generate(&RouteArgs::new().with("path", empty)).unwrap(),
            "/files"
        );
    }

    proptest! {
        /// Property: generated paths match their own template and capture
        /// the arguments they were generated from.
        #[test]
        fn generated_paths_capture_their_arguments(
            id in "[^/?]{1,12}",
            parts in prop::collection::vec("[a-zA-Z0-9 ._~%-]{1,8}", 0..5),
        ) {
            let p = pattern("/orgs/:id/files/:path*");
            let url = p
                .generate(&RouteArgs::new().with("id", id.clone()).with("path", parts.clone()))
                .unwrap();
            let params = p.captures(&url).unwrap();
            prop_assert_eq!(params.get("id"), Some(&id));
            if parts.is_empty() {
                prop_assert!(params.get("path").is_none());
            } else {
                prop_assert_eq!(params.get("path"), Some(&parts.join("/")));
            }
        }
    }
}
