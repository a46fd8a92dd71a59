//! 📎 Document id templates: `"{host}-{uuid}"` in, `"web01-8c1f..."` out.
//!
//! Parsed once at construction into literal and field segments, rendered per event.
//! A stable `_id` turns repeated posts of the same event into overwrites, which is
//! how the engine's `_version` climbs from 1 to 2 and beyond.
//!
//! Rules of the road:
//! - `{name}` is a placeholder for field `name`.
//! - `{{` and `}}` are literal braces, for the three people who need them.
//! - An unclosed `{`, a stray `}`, or an empty `{}` is a configuration error.
//! - A placeholder whose field is missing on the event is an error at render time.
//!   It is NEVER left as the literal text `{name}`. Every event sharing the id
//!   `"{uuid}"` would be a very quiet disaster.

use anyhow::Result;

use crate::error::BulkError;
use crate::event::Event;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// 📎 A parsed document id template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentIdTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl DocumentIdTemplate {
    /// 🔧 Parse a template. Fails with `InvalidConfig { key: "document_id" }` on bad syntax.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: String| BulkError::InvalidConfig {
            key: "document_id",
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();
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
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => {
                                return Err(invalid(format!("nested '{{' in template '{}'", raw)).into());
                            }
                            Some(other) => field.push(other),
                            None => {
                                return Err(invalid(format!("unclosed '{{' in template '{}'", raw)).into());
                            }
                        }
                    }
                    let field = field.trim();
                    if field.is_empty() {
                        return Err(invalid(format!("empty placeholder in template '{}'", raw)).into());
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field.to_string()));
                }
                '}' => {
                    return Err(invalid(format!("unmatched '}}' in template '{}'", raw)).into());
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        if segments.is_empty() {
            return Err(invalid("template is empty".to_string()).into());
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// 🏷️ The template as written in the config.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 🔄 Render the id for one event.
    pub fn render(&self, event: &Event) -> Result<String> {
        let mut id = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => id.push_str(text),
                Segment::Field(name) => {
                    let value = event.value_as_string(name).ok_or_else(|| {
                        BulkError::UnresolvedPlaceholder {
                            field: name.clone(),
                        }
                    })?;
                    id.push_str(&value);
                }
            }
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_placeholders_become_field_values() -> Result<()> {
        let template = DocumentIdTemplate::parse("{host}-{seq}")?;
        let event = Event::new().with_field("host", "web01").with_field("seq", 7);
        assert_eq!(template.render(&event)?, "web01-7");
        Ok(())
    }

    #[test]
    fn the_one_where_a_bare_field_is_the_whole_id() -> Result<()> {
        let template = DocumentIdTemplate::parse("{uuid}")?;
        let event = Event::new().with_field("uuid", "8c1f");
        assert_eq!(template.render(&event)?, "8c1f");
        Ok(())
    }

    #[test]
    fn the_one_where_double_braces_are_just_braces() -> Result<()> {
        let template = DocumentIdTemplate::parse("{{literal}}-{id}")?;
        let event = Event::new().with_field("id", "x");
        assert_eq!(template.render(&event)?, "{literal}-x");
        Ok(())
    }

    #[test]
    fn the_one_where_missing_fields_are_an_error_not_literal_text() -> Result<()> {
        let template = DocumentIdTemplate::parse("{uuid}")?;
        let err = template
            .render(&Event::new().with_field("other", "x"))
            .expect_err("no uuid, no id");
        match BulkError::find(&err) {
            Some(BulkError::UnresolvedPlaceholder { field }) => assert_eq!(field, "uuid"),
            other => panic!("💀 expected UnresolvedPlaceholder, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn the_one_where_broken_templates_fail_at_parse_time() {
        for broken in ["{uuid", "uuid}", "{}", "{a{b}}", ""] {
            let err = DocumentIdTemplate::parse(broken)
                .expect_err("broken templates should not parse");
            assert!(
                matches!(
                    BulkError::find(&err),
                    Some(BulkError::InvalidConfig { key: "document_id", .. })
                ),
                "template {:?} should be an InvalidConfig error",
                broken
            );
        }
    }
}
