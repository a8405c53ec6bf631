//! Placeholder tokenizer for `${[type:]name[.key][:subtype]}` markers

use regex::Regex;
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{(?:([^{}:]+?):)?([^{}:.]+?)(?:\.([^{}:]+?))?(?::([^{}:]+?))?\}")
            .expect("placeholder regex is valid")
    })
}

/// Placeholder type prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Normal,
    Table,
    Image,
    ImageInCell,
}

impl PlaceholderKind {
    fn from_prefix(prefix: Option<&str>) -> Self {
        match prefix.map(|p| p.trim().to_ascii_lowercase()).as_deref() {
            Some("table") => Self::Table,
            Some("image") => Self::Image,
            Some("imageincell") => Self::ImageInCell,
            _ => Self::Normal,
        }
    }
}

/// One `${...}` occurrence inside a cell string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// The literal token, `${...}` included
    pub placeholder: String,
    pub kind: PlaceholderKind,
    pub name: String,
    pub key: Option<String>,
    pub sub_type: Option<String>,
    /// The token is the whole cell string
    pub full: bool,
}

impl Placeholder {
    /// Sub-type requests image rendering (`:image`)
    pub fn sub_type_is(&self, expected: &str) -> bool {
        self.sub_type
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(expected))
    }
}

/// Extract placeholders left to right
pub fn extract_placeholders(text: &str) -> Vec<Placeholder> {
    placeholder_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Placeholder {
                placeholder: whole.as_str().to_string(),
                kind: PlaceholderKind::from_prefix(caps.get(1).map(|m| m.as_str())),
                name: caps.get(2)?.as_str().to_string(),
                key: caps.get(3).map(|m| m.as_str().to_string()),
                sub_type: caps.get(4).map(|m| m.as_str().to_string()),
                full: whole.len() == text.len(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_full_placeholder() {
        let found = extract_placeholders("${foo}");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, PlaceholderKind::Normal);
        assert_eq!(found[0].name, "foo");
        assert_eq!(found[0].key, None);
        assert!(found[0].full);
    }

    #[test]
    fn test_table_placeholder_with_key() {
        let found = extract_placeholders("${table:foo.bar}");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, PlaceholderKind::Table);
        assert_eq!(found[0].name, "foo");
        assert_eq!(found[0].key.as_deref(), Some("bar"));
        assert!(found[0].full);
    }

    #[test]
    fn test_multiple_partial_placeholders() {
        let found = extract_placeholders("A ${foo} ${bar}");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "foo");
        assert_eq!(found[1].name, "bar");
        assert!(found.iter().all(|p| !p.full));
        assert_eq!(found[1].placeholder, "${bar}");
    }

    #[test]
    fn test_plain_text() {
        assert!(extract_placeholders("plain text").is_empty());
        assert!(extract_placeholders("${}").is_empty());
    }

    #[test]
    fn test_image_and_subtype() {
        let found = extract_placeholders("${image:logo}");
        assert_eq!(found[0].kind, PlaceholderKind::Image);
        assert_eq!(found[0].name, "logo");

        let found = extract_placeholders("${table:people.photo:image}");
        assert_eq!(found[0].kind, PlaceholderKind::Table);
        assert_eq!(found[0].key.as_deref(), Some("photo"));
        assert!(found[0].sub_type_is("image"));

        let found = extract_placeholders("${imageincell:badge}");
        assert_eq!(found[0].kind, PlaceholderKind::ImageInCell);
    }

    #[test]
    fn test_nested_key_path() {
        let found = extract_placeholders("${user.address.city}");
        assert_eq!(found[0].name, "user");
        assert_eq!(found[0].key.as_deref(), Some("address.city"));
    }
}
