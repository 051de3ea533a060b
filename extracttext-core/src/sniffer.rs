use crate::types::MediaType;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// How many bytes of a file are inspected
const SNIFF_LEN: usize = 512;

/// Works out a media type for a file nobody declared one for.
pub trait MediaTypeSniffer: Send + Sync {
    fn sniff(&self, path: &Path) -> Option<MediaType>;
}

/// Magic numbers first, then the file extension, then "is it text?".
pub struct MagicSniffer;

impl Default for MagicSniffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MagicSniffer {
    pub fn new() -> Self {
        Self
    }

    fn from_magic(head: &[u8], extension: Option<&str>) -> Option<&'static str> {
        const MAGIC: &[(&[u8], &str)] = &[
            (b"%PDF-", "application/pdf"),
            (b"\x89PNG\r\n\x1a\n", "image/png"),
            (b"\xff\xd8\xff", "image/jpeg"),
            (b"GIF87a", "image/gif"),
            (b"GIF89a", "image/gif"),
            (b"II*\x00", "image/tiff"),
            (b"MM\x00*", "image/tiff"),
            (b"\x00\x00\x00\x0cjP  \r\n\x87\n", "image/jp2"),
            (b"{\\rtf", "application/rtf"),
            (b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", "application/msword"),
        ];

        if let Some((_, media_type)) = MAGIC.iter().find(|(magic, _)| head.starts_with(magic)) {
            return Some(*media_type);
        }
        if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
            return Some("image/webp");
        }
        if Self::is_bmp(head) {
            return Some("image/bmp");
        }
        if head.starts_with(b"PK\x03\x04") {
            // A zip container says nothing by itself
            return match extension {
                Some("docx") => {
                    Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
                }
                _ => Some("application/zip"),
            };
        }

        let text = head.strip_prefix(b"\xef\xbb\xbf").unwrap_or(head);
        let start = text.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(text.len());
        let text = &text[start..];
        if text.starts_with(b"<?xml") {
            return Some("application/xml");
        }
        let lower: Vec<u8> = text.iter().take(16).map(u8::to_ascii_lowercase).collect();
        if lower.starts_with(b"<!doctype html") || lower.starts_with(b"<html") {
            return Some("text/html");
        }
        None
    }

    /// `BM`, zero reserved fields, and a known DIB header size
    fn is_bmp(head: &[u8]) -> bool {
        const DIB_HEADER_SIZES: [u32; 6] = [12, 40, 52, 56, 108, 124];
        if head.len() < 18 || !head.starts_with(b"BM") {
            return false;
        }
        if head[6..10].iter().any(|&b| b != 0) {
            return false;
        }
        let dib_size = u32::from_le_bytes([head[14], head[15], head[16], head[17]]);
        DIB_HEADER_SIZES.contains(&dib_size)
    }

    fn from_extension(extension: &str) -> Option<&'static str> {
        let media_type = match extension {
            "txt" | "text" => "text/plain",
            "htm" | "html" => "text/html",
            "xhtml" => "application/xhtml+xml",
            "xml" | "fodt" | "tei" => "application/xml",
            "pdf" => "application/pdf",
            "doc" => "application/msword",
            "rtf" => "application/rtf",
            "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "tif" | "tiff" => "image/tiff",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            "webp" => "image/webp",
            "jp2" => "image/jp2",
            _ => return None,
        };
        Some(media_type)
    }

    /// Valid UTF-8 without NULs; a character cut at the end of the window is fine
    fn looks_like_text(head: &[u8]) -> bool {
        if head.contains(&0) {
            return false;
        }
        match std::str::from_utf8(head) {
            Ok(_) => true,
            Err(e) => e.error_len().is_none(),
        }
    }
}

impl MediaTypeSniffer for MagicSniffer {
    fn sniff(&self, path: &Path) -> Option<MediaType> {
        let mut head = Vec::with_capacity(SNIFF_LEN);
        let file = File::open(path).ok()?;
        file.take(SNIFF_LEN as u64).read_to_end(&mut head).ok()?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        Self::from_magic(&head, extension.as_deref())
            .or_else(|| extension.as_deref().and_then(Self::from_extension))
            .or_else(|| Self::looks_like_text(&head).then_some("text/plain"))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sniff(name: &str, content: &[u8]) -> Option<MediaType> {
        let dir = tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        MagicSniffer::new().sniff(&path)
    }

    #[test]
    fn test_magic_numbers_beat_extension() {
        assert_eq!(sniff("report.txt", b"%PDF-1.7\n...").as_deref(), Some("application/pdf"));
        assert_eq!(sniff("scan", b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR").as_deref(), Some("image/png"));
        assert_eq!(sniff("letter", b"{\\rtf1\\ansi hello}").as_deref(), Some("application/rtf"));
    }

    #[test]
    fn test_bmp_needs_a_real_header() {
        let mut bmp = b"BM".to_vec();
        bmp.extend_from_slice(&70u32.to_le_bytes()); // file size
        bmp.extend_from_slice(&[0, 0, 0, 0]); // reserved
        bmp.extend_from_slice(&54u32.to_le_bytes()); // pixel data offset
        bmp.extend_from_slice(&40u32.to_le_bytes()); // BITMAPINFOHEADER
        bmp.extend_from_slice(&[0; 16]);
        assert_eq!(sniff("scan", &bmp).as_deref(), Some("image/bmp"));

        assert_eq!(
            sniff("README", b"BMI report for the quarter: all teams within range.\n").as_deref(),
            Some("text/plain")
        );
    }

    #[test]
    fn test_zip_needs_extension() {
        let zip = b"PK\x03\x04\x14\x00\x06\x00";
        assert_eq!(
            sniff("report.docx", zip).as_deref(),
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        );
        assert_eq!(sniff("archive.bin", zip).as_deref(), Some("application/zip"));
    }

    #[test]
    fn test_markup_detection() {
        assert_eq!(
            sniff("doc", b"\xef\xbb\xbf\n  <?xml version=\"1.0\"?><a/>").as_deref(),
            Some("application/xml")
        );
        assert_eq!(sniff("page", b"<!DOCTYPE html><html></html>").as_deref(), Some("text/html"));
    }

    #[test]
    fn test_extension_then_text_fallback() {
        assert_eq!(sniff("data.xml", b"<inventory/>").as_deref(), Some("application/xml"));
        assert_eq!(sniff("README", "Plain words, ünïcode".as_bytes()).as_deref(), Some("text/plain"));
        assert_eq!(sniff("empty", b"").as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_binary_without_hints_is_unknown() {
        assert_eq!(sniff("blob", &[0x00, 0x01, 0x02, 0xff, 0xfe]), None);
    }

    #[test]
    fn test_missing_file_is_unknown() {
        assert_eq!(MagicSniffer::new().sniff(Path::new("/nonexistent/file")), None);
    }
}
