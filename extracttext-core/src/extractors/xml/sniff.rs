//! XML media type sniffing
//!
//! Looks at the head of a document, in document order, for the first thing
//! that says what kind of XML it is:
//!
//! 1. a DOCTYPE declaration (its name)
//! 2. a processing instruction outside the denylist carrying `href`/`progid`
//! 3. the root element: OpenDocument `mimetype` attribute, then its
//!    namespace, then its bare name
//!
//! The raw identifier found is translated through the identifier table.

use crate::extractors::xml::identifiers::IdentifierTable;
use crate::types::MediaType;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::LazyLock;

/// PIs that describe tooling, not the document type
const IGNORED_PI_TARGETS: [&str; 3] = ["xml-model", "xml-stylesheet", "oxygen"];

/// Pseudo-attributes of a PI that can carry a type identifier, by priority
const PI_IDENTIFIER_ATTRIBUTES: [&str; 2] = ["href", "progid"];

pub const OPENDOCUMENT_OFFICE_NS: &str = "urn:oasis:names:tc:opendocument:xmlns:office:1.0";

static PSEUDO_ATTRIBUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][-\w.:]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// Where the identifier came from, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierSource {
    Doctype,
    ProcessingInstruction,
    OpenDocumentMimetype,
    Namespace,
    ElementName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIdentifier {
    pub value: String,
    pub source: IdentifierSource,
}

/// Find the raw type identifier of the document at `path`.
///
/// `Ok(None)` when the document ends (or breaks) before anything usable.
pub fn sniff_identifier(path: &Path) -> io::Result<Option<RawIdentifier>> {
    let file = File::open(path)?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::DocType(e)) => {
                let content = String::from_utf8_lossy(&e);
                if let Some(name) = content
                    .split(|c: char| c.is_whitespace() || c == '[')
                    .find(|part| !part.is_empty())
                {
                    return Ok(Some(RawIdentifier {
                        value: name.to_string(),
                        source: IdentifierSource::Doctype,
                    }));
                }
            }
            Ok(Event::PI(e)) => {
                let content = String::from_utf8_lossy(&e);
                if let Some(value) = processing_instruction_identifier(&content) {
                    return Ok(Some(RawIdentifier {
                        value,
                        source: IdentifierSource::ProcessingInstruction,
                    }));
                }
            }
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => return Ok(Some(root_identifier(&e))),
            Ok(Event::Eof) | Err(_) => return Ok(None),
            Ok(_) => {}
        }
        buf.clear();
    }
}

/// Sniff and translate through `table`. Unknown identifiers give `None`.
pub fn sniff_media_type(path: &Path, table: &IdentifierTable) -> io::Result<Option<MediaType>> {
    Ok(sniff_identifier(path)?.and_then(|raw| table.lookup(&raw.value).cloned()))
}

fn processing_instruction_identifier(content: &str) -> Option<String> {
    let content = content.trim();
    let (target, rest) = content
        .split_once(char::is_whitespace)
        .unwrap_or((content, ""));
    if IGNORED_PI_TARGETS.contains(&target) {
        return None;
    }

    let attributes: HashMap<&str, &str> = PSEUDO_ATTRIBUTE_REGEX
        .captures_iter(rest)
        .filter_map(|cap| {
            let name = cap.get(1)?.as_str();
            let value = cap.get(2).or_else(|| cap.get(3))?.as_str();
            Some((name, value))
        })
        .collect();

    PI_IDENTIFIER_ATTRIBUTES
        .iter()
        .find_map(|key| attributes.get(key))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn root_identifier(e: &BytesStart<'_>) -> RawIdentifier {
    let mut default_ns: Option<String> = None;
    let mut prefixes: HashMap<String, String> = HashMap::new();
    let mut attributes: Vec<(String, String)> = Vec::new();

    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        if key == "xmlns" {
            default_ns = Some(value);
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            prefixes.insert(prefix.to_string(), value);
        } else {
            attributes.push((key, value));
        }
    }

    // OpenDocument flat files name their type in office:mimetype, whatever
    // prefix the office namespace is bound to.
    let office_prefixes: Vec<&String> = prefixes
        .iter()
        .filter(|(_, uri)| uri.as_str() == OPENDOCUMENT_OFFICE_NS)
        .map(|(prefix, _)| prefix)
        .collect();
    for prefix in office_prefixes {
        let wanted = format!("{prefix}:mimetype");
        if let Some((_, mimetype)) = attributes.iter().find(|(key, _)| *key == wanted) {
            return RawIdentifier {
                value: mimetype.clone(),
                source: IdentifierSource::OpenDocumentMimetype,
            };
        }
    }

    let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let (prefix, local) = match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname.as_str()),
    };
    let namespace = match prefix {
        Some(prefix) => prefixes.get(prefix).cloned(),
        None => default_ns,
    };

    match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => RawIdentifier {
            value: ns,
            source: IdentifierSource::Namespace,
        },
        None => RawIdentifier {
            value: local.to_string(),
            source: IdentifierSource::ElementName,
        },
    }
}
