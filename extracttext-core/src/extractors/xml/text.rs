//! DOM-style text content: every text node under the document element,
//! concatenated in document order.

use crate::extractors::xml::entities::InternalEntities;
use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub fn document_text(path: &Path, chunk_size: usize) -> Result<String> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = Reader::from_reader(BufReader::with_capacity(chunk_size.max(64), file));
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 0usize;
    let mut entities = InternalEntities::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::DocType(e)) => {
                entities = InternalEntities::from_doctype(&String::from_utf8_lossy(&e));
            }
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Text(e)) if depth > 0 => {
                let unescaped = e
                    .unescape_with(|name| entities.get(name))
                    .with_context(|| format!("decoding text in {}", path.display()))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(e)) if depth > 0 => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("parsing {} at byte {}", path.display(), reader.buffer_position())
                })
            }
        }
        buf.clear();
    }

    Ok(text)
}
