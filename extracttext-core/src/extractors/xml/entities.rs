//! General entities declared in a document's internal DTD subset.
//!
//! Only internal parsed entities (`<!ENTITY name "value">`) are picked up.
//! External and parameter entities stay unresolved, so references to them
//! are still reported by the well-formedness check.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static ENTITY_DECL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!ENTITY\s+([A-Za-z_:][-\w.:]*)\s+(?:"([^"]*)"|'([^']*)')\s*>"#).unwrap()
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InternalEntities(HashMap<String, String>);

impl InternalEntities {
    /// Collect declarations from the content of a DOCTYPE event
    pub fn from_doctype(content: &str) -> Self {
        let mut entities = HashMap::new();
        for cap in ENTITY_DECL_REGEX.captures_iter(content) {
            let (Some(name), Some(value)) = (cap.get(1), cap.get(2).or_else(|| cap.get(3))) else {
                continue;
            };
            // First declaration is binding
            entities
                .entry(name.as_str().to_string())
                .or_insert_with(|| value.as_str().to_string());
        }
        Self(entities)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_declarations() {
        let entities = InternalEntities::from_doctype(
            " doc [\n  <!ENTITY org \"Acme\">\n  <!ENTITY motto 'Built to last'>\n]",
        );
        assert_eq!(entities.get("org"), Some("Acme"));
        assert_eq!(entities.get("motto"), Some("Built to last"));
        assert_eq!(entities.get("missing"), None);
    }

    #[test]
    fn test_first_declaration_wins() {
        let entities =
            InternalEntities::from_doctype(" doc [<!ENTITY v \"one\"><!ENTITY v \"two\">]");
        assert_eq!(entities.get("v"), Some("one"));
    }

    #[test]
    fn test_external_and_parameter_entities_are_ignored() {
        let entities = InternalEntities::from_doctype(
            " doc [<!ENTITY % common \"x\"><!ENTITY logo SYSTEM \"logo.txt\">]",
        );
        assert!(entities.is_empty());
        assert!(InternalEntities::from_doctype(" html").is_empty());
    }
}
