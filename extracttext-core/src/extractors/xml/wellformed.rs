//! Streaming well-formedness check
//!
//! Reads the document through quick-xml with a bounded buffer and collects
//! every structural problem it can see instead of stopping at the first.
//! Byte offsets are turned into line numbers afterwards with a second
//! streaming pass, so the file is never held in memory.

use crate::extractors::xml::entities::InternalEntities;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Smallest buffer we hand to the reader
const MIN_CHUNK_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// 1-based
    pub line: usize,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Problems found so far, keyed by byte offset
#[derive(Default)]
struct Findings(Vec<(usize, String)>);

impl Findings {
    fn push(&mut self, offset: usize, message: impl Into<String>) {
        self.0.push((offset, message.into()));
    }
}

/// Check `path` for well-formedness.
///
/// Returns the accumulated syntax errors (empty when the document is
/// well-formed). `Err` is reserved for I/O failures opening or reading the file.
pub fn check_well_formed(path: &Path, chunk_size: usize) -> io::Result<Vec<SyntaxError>> {
    let file = File::open(path)?;
    let mut reader = Reader::from_reader(BufReader::with_capacity(
        chunk_size.max(MIN_CHUNK_SIZE),
        file,
    ));
    // End names are matched below so a mismatch can be reported and parsing can go on.
    reader.check_end_names(false);

    let mut findings = Findings::default();
    let mut open: Vec<(String, usize)> = Vec::new();
    let mut seen_root = false;
    let mut entities = InternalEntities::default();
    let mut buf = Vec::new();

    loop {
        let offset = reader.buffer_position();
        match reader.read_event_into(&mut buf) {
            Ok(Event::DocType(e)) => {
                entities = InternalEntities::from_doctype(&String::from_utf8_lossy(&e));
            }
            Ok(Event::Start(e)) => {
                let name = element_name(&e);
                check_attributes(&e, offset, &entities, &mut findings);
                check_root(&name, open.is_empty(), &mut seen_root, offset, &mut findings);
                open.push((name, offset));
            }
            Ok(Event::Empty(e)) => {
                let name = element_name(&e);
                check_attributes(&e, offset, &entities, &mut findings);
                check_root(&name, open.is_empty(), &mut seen_root, offset, &mut findings);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match open.iter().rposition(|(open_name, _)| *open_name == name) {
                    Some(idx) => {
                        for (unclosed, _) in open.drain(idx + 1..).rev() {
                            findings.push(
                                offset,
                                format!("opening and ending tag mismatch: <{unclosed}> and </{name}>"),
                            );
                        }
                        open.pop();
                    }
                    None => findings.push(offset, format!("unexpected end tag </{name}>")),
                }
            }
            Ok(Event::Text(e)) => {
                if open.is_empty() {
                    if !e.iter().all(u8::is_ascii_whitespace) {
                        findings.push(offset, "text content outside of the root element");
                    }
                } else if let Err(err) = e.unescape_with(|name| entities.get(name)) {
                    findings.push(offset, err.to_string());
                }
            }
            Ok(Event::CData(_)) if open.is_empty() => {
                findings.push(offset, "CDATA section outside of the root element");
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                // quick-xml can't resynchronise after a hard syntax error.
                findings.push(reader.buffer_position(), err.to_string());
                break;
            }
        }
        buf.clear();
    }

    for (name, offset) in open.into_iter().rev() {
        findings.push(offset, format!("premature end of data: <{name}> is never closed"));
    }
    if !seen_root && findings.0.is_empty() {
        findings.push(reader.buffer_position(), "document has no root element");
    }

    if findings.0.is_empty() {
        return Ok(Vec::new());
    }

    let offsets: Vec<usize> = findings.0.iter().map(|(offset, _)| *offset).collect();
    let lines = lines_for_offsets(path, &offsets)?;

    let mut errors: Vec<SyntaxError> = findings
        .0
        .into_iter()
        .zip(lines)
        .map(|((_, message), line)| SyntaxError { line, message })
        .collect();
    errors.sort_by_key(|e| e.line);
    Ok(errors)
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn check_root(name: &str, at_top: bool, seen_root: &mut bool, offset: usize, findings: &mut Findings) {
    if !at_top {
        return;
    }
    if *seen_root {
        findings.push(offset, format!("extra content at the end of the document: <{name}>"));
    }
    *seen_root = true;
}

fn check_attributes(
    e: &BytesStart<'_>,
    offset: usize,
    entities: &InternalEntities,
    findings: &mut Findings,
) {
    for attr in e.attributes() {
        match attr {
            Ok(attr) => {
                if let Err(err) = attr.unescape_value_with(|name| entities.get(name)) {
                    findings.push(offset, err.to_string());
                }
            }
            Err(err) => {
                findings.push(offset, err.to_string());
                break;
            }
        }
    }
}

/// Map byte offsets to 1-based line numbers in one streaming pass.
fn lines_for_offsets(path: &Path, offsets: &[usize]) -> io::Result<Vec<usize>> {
    let mut order: Vec<usize> = (0..offsets.len()).collect();
    order.sort_by_key(|&i| offsets[i]);

    let mut lines = vec![1; offsets.len()];
    let mut reader = BufReader::new(File::open(path)?);
    let mut chunk = vec![0u8; DEFAULT_CHUNK_SIZE];
    let mut pos = 0usize;
    let mut line = 1usize;
    let mut next = 0usize;

    'read: loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        for &byte in &chunk[..n] {
            while next < order.len() && offsets[order[next]] <= pos {
                lines[order[next]] = line;
                next += 1;
            }
            if next == order.len() {
                break 'read;
            }
            if byte == b'\n' {
                line += 1;
            }
            pos += 1;
        }
    }
    for &i in &order[next..] {
        lines[i] = line;
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn check(xml: &str) -> Vec<SyntaxError> {
        check_with_chunk(xml, DEFAULT_CHUNK_SIZE)
    }

    fn check_with_chunk(xml: &str, chunk_size: usize) -> Vec<SyntaxError> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.xml");
        std::fs::write(&path, xml).unwrap();
        check_well_formed(&path, chunk_size).unwrap()
    }

    #[test]
    fn test_well_formed_document_has_no_errors() {
        let xml = "<?xml version=\"1.0\"?>\n<!-- note -->\n<root a=\"1\">\n  <a>x &amp; y</a>\n  <b/>\n  <![CDATA[<raw>]]>\n</root>\n";
        assert!(check(xml).is_empty());
    }

    #[test]
    fn test_unbalanced_tag_reports_line() {
        let xml = "<?xml version=\"1.0\"?>\n<root>\n  <a>\n    <b>text</a>\n</root>\n";
        let errors = check(xml);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 4);
        assert!(errors[0].message.contains("<b>"));
    }

    #[test]
    fn test_unclosed_elements_at_eof() {
        let xml = "<root>\n  <chapter>\n    <p>truncated";
        let errors = check(xml);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[1].line, 2);
        assert_eq!(errors[2].line, 3);
        assert!(errors.iter().all(|e| e.message.contains("never closed")));
    }

    #[test]
    fn test_errors_accumulate() {
        let xml = "<root>\n</stray>\n<a>&bogus;</a>\n</root>\n<second/>\n";
        let errors = check(xml);
        assert!(errors.len() >= 3, "{errors:?}");
        let lines: Vec<usize> = errors.iter().map(|e| e.line).collect();
        assert!(lines.contains(&2));
        assert!(lines.contains(&3));
        assert!(lines.contains(&5));
    }

    #[test]
    fn test_internal_subset_entities_resolve() {
        let xml = "<?xml version=\"1.0\"?>\n<!DOCTYPE doc [\n  <!ENTITY org \"Acme\">\n]>\n<doc by=\"&org;\">Made by &org;</doc>\n";
        assert!(check(xml).is_empty());

        let undeclared = "<!DOCTYPE doc [<!ENTITY org \"Acme\">]>\n<doc>Made by &other;</doc>\n";
        let errors = check(undeclared);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 2);
    }

    #[test]
    fn test_duplicate_attribute() {
        let errors = check("<root>\n<a x=\"1\" x=\"2\"/>\n</root>");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 2);
    }

    #[test]
    fn test_text_outside_root() {
        let errors = check("<root/>\ntrailing words\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("outside"));
    }

    #[test]
    fn test_empty_document() {
        let errors = check("<?xml version=\"1.0\"?>\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("no root"));
    }

    #[test]
    fn test_tiny_chunks_give_same_answer() {
        let mut xml = String::from("<root>\n");
        for i in 0..500 {
            xml.push_str(&format!("  <item n=\"{i}\">value {i}</item>\n"));
        }
        xml.push_str("  <broken>\n</root>\n");
        let small = check_with_chunk(&xml, 16);
        let large = check(&xml);
        assert_eq!(small, large);
        assert_eq!(small[0].line, 503);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(check_well_formed(Path::new("/nonexistent/doc.xml"), DEFAULT_CHUNK_SIZE).is_err());
    }
}
