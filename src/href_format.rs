//! Asset href templates.
//!
//! A template is a string with named `{field}` placeholders, for example
//! `s3://bucket/GLCLU2000-2020/{version}/{year}/{loc}.tif`. The same template
//! is used both ways: to pull the tile identifiers out of an existing href and
//! to render the href of a tile from its identifiers.
use crate::error::{Error, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_HREF_FORMAT: &str =
    "https://storage.googleapis.com/earthenginepartners-hansen/GLCLU2000-2020/{version}/{year}/{loc}.tif";

const REQUIRED_PARAMETERS: [&str; 2] = ["version", "year"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

#[derive(Debug, Clone)]
pub struct HrefFormat {
    template: String,
    segments: Vec<Segment>,
    pattern: Regex,
}

/// Field values captured from an href, in template order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHref {
    fields: Vec<(String, String)>,
}

impl ParsedHref {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl HrefFormat {
    pub fn new(template: &str) -> Result<Self> {
        let segments = tokenize(template)?;

        let mut seen = HashSet::new();
        for segment in &segments {
            if let Segment::Field(name) = segment {
                if !seen.insert(name.as_str()) {
                    return Err(Error::InvalidHrefFormat(format!(
                        "duplicate field '{name}' in {template}"
                    )));
                }
            }
        }

        let mut missing = REQUIRED_PARAMETERS
            .iter()
            .filter(|p| !seen.contains(**p))
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(Error::MissingFormatParameters {
                missing: missing.join(", "),
                required: REQUIRED_PARAMETERS.join(", "),
            });
        }

        let mut pattern = String::from("^");
        for segment in &segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::Field(name) => pattern.push_str(&format!("(?P<{name}>.+?)")),
            }
        }
        pattern.push('$');
        let pattern = Regex::new(&pattern)
            .map_err(|e| Error::InvalidHrefFormat(format!("{template}: {e}")))?;

        Ok(Self {
            template: template.to_string(),
            segments,
            pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn parse(&self, href: &str) -> Result<ParsedHref> {
        let captures = self.pattern.captures(href).ok_or_else(|| Error::HrefMismatch {
            href: href.to_string(),
            format: self.template.clone(),
        })?;

        let fields = self
            .fields()
            .map(|name| {
                let value = captures
                    .name(name)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                (name.to_string(), value)
            })
            .collect();
        Ok(ParsedHref { fields })
    }

    pub fn render(&self, params: &BTreeMap<String, String>) -> Result<String> {
        let mut href = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => href.push_str(text),
                Segment::Field(name) => {
                    let value = params
                        .get(name)
                        .ok_or_else(|| Error::MissingParameter(name.clone()))?;
                    href.push_str(value);
                }
            }
        }
        Ok(href)
    }
}

impl Default for HrefFormat {
    fn default() -> Self {
        Self::new(DEFAULT_HREF_FORMAT).expect("default href format is valid")
    }
}

impl FromStr for HrefFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for HrefFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn tokenize(template: &str) -> Result<Vec<Segment>> {
    let invalid = |reason: &str| Error::InvalidHrefFormat(format!("{reason} in {template}"));

    let mut segments = vec![];
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(invalid("unbalanced '{'")),
                        Some(c) => name.push(c),
                    }
                }
                if !is_identifier(&name) {
                    return Err(invalid(&format!("invalid field name '{name}'")));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(name));
            }
            '}' => return Err(invalid("unbalanced '}'")),
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_default_format() {
        let format = HrefFormat::default();
        let parsed = format
            .parse("https://storage.googleapis.com/earthenginepartners-hansen/GLCLU2000-2020/v2/2000/50N_090W.tif")
            .unwrap();
        assert_eq!(parsed.get("version"), Some("v2"));
        assert_eq!(parsed.get("year"), Some("2000"));
        assert_eq!(parsed.get("loc"), Some("50N_090W"));
        assert_eq!(
            parsed.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec!["version", "year", "loc"]
        );
    }

    #[test]
    fn test_render_s3_format() {
        let format = HrefFormat::new("s3://bucket/{version}/{year}/{loc}.tif").unwrap();
        let href = format
            .render(&params(&[("version", "v2"), ("year", "2020"), ("loc", "40N_080W")]))
            .unwrap();
        assert_eq!(href, "s3://bucket/v2/2020/40N_080W.tif");

        let parsed = format.parse(&href).unwrap();
        assert_eq!(parsed.get("loc"), Some("40N_080W"));
    }

    #[test]
    fn test_render_missing_parameter() {
        let format = HrefFormat::new("s3://bucket/{version}/{year}/{loc}.tif").unwrap();
        let err = format
            .render(&params(&[("version", "v2"), ("year", "2020")]))
            .unwrap_err();
        assert!(matches!(err, Error::MissingParameter(name) if name == "loc"));
    }

    #[test]
    fn test_missing_required_parameters() {
        let err = HrefFormat::new("test/{ver}/{year}/{loc}.tif").unwrap_err();
        assert!(err.to_string().contains("missing required parameters: version"));

        let err = HrefFormat::new("test/{version}/{yeer}/{loc}.tif").unwrap_err();
        assert!(err.to_string().contains("missing required parameters: year"));

        let err = HrefFormat::new("test/{loc}.tif").unwrap_err();
        assert!(err
            .to_string()
            .contains("missing required parameters: version, year"));
    }

    #[test]
    fn test_malformed_templates() {
        for template in [
            "test/{version/{year}.tif",
            "test/{version}}/{year}.tif",
            "test/{version}/{year}/{}.tif",
            "test/{version}/{year}/{1loc}.tif",
            "test/{version}/{year}/{year}.tif",
        ] {
            assert!(
                matches!(HrefFormat::new(template), Err(Error::InvalidHrefFormat(_))),
                "{template} should be rejected"
            );
        }
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let format = HrefFormat::new("s3://b/{{raw}}/{version}/{year}.tif").unwrap();
        let parsed = format.parse("s3://b/{raw}/v2/2000.tif").unwrap();
        assert_eq!(parsed.get("year"), Some("2000"));
        assert_eq!(format.fields().count(), 2);
    }

    #[test]
    fn test_href_not_matching_format() {
        let format = HrefFormat::new("test/{version}/{year}/{loc}.tif").unwrap();
        let err = format.parse("10N_050W.tif").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("could not parse the provided href (10N_050W.tif)"));
    }
}
