//! Content-type detection for bodies sent without a `Content-Type` header.
//!
//! Implements the subset of the WHATWG MIME sniffing algorithm that matters
//! for deciding compressibility: markup, a handful of binary signatures and
//! the text/binary split.

/// Number of leading bytes considered.
pub(crate) const SNIFF_LEN: usize = 512;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Tags whose presence at the start of a body marks it as HTML.
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Exact prefixes and the content type they imply.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", TEXT_PLAIN),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
];

/// Returns the content type of `data`, always a valid `Content-Type` value.
///
/// Falls back to `text/plain; charset=utf-8` for anything without binary
/// bytes and to `application/octet-stream` otherwise.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    let markup = skip_whitespace(data);
    if let Some(ct) = sniff_markup(markup) {
        return ct;
    }

    if let Some(&(_, ct)) = SIGNATURES.iter().find(|(sig, _)| data.starts_with(sig)) {
        return ct;
    }

    if let Some(ct) = sniff_riff(data) {
        return ct;
    }

    if is_mp4(data) {
        return "video/mp4";
    }

    if data.iter().copied().any(is_binary_byte) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn sniff_markup(data: &[u8]) -> Option<&'static str> {
    for tag in HTML_TAGS {
        if data.len() > tag.len() && data[..tag.len()].eq_ignore_ascii_case(tag) {
            // the tag must be terminated
            if matches!(data[tag.len()], b' ' | b'>') {
                return Some("text/html; charset=utf-8");
            }
        }
    }

    data.starts_with(b"<?xml")
        .then_some("text/xml; charset=utf-8")
}

fn sniff_riff(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 || &data[..4] != b"RIFF" {
        return None;
    }
    match &data[8..12] {
        b"WEBP" if data.len() >= 14 && &data[12..14] == b"VP" => Some("image/webp"),
        b"WAVE" => Some("audio/wave"),
        b"AVI " => Some("video/avi"),
        _ => None,
    }
}

fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if box_size < 12 || box_size % 4 != 0 || data.len() < box_size {
        return false;
    }
    if &data[4..8] != b"ftyp" {
        return false;
    }
    // major brand, then compatible brands after the minor version
    std::iter::once(8)
        .chain((16..box_size).step_by(4))
        .any(|i| data.len() >= i + 3 && &data[i..i + 3] == b"mp4")
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_text() {
        assert_eq!(detect_content_type(b""), TEXT_PLAIN);
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(detect_content_type(b"aaabbbccc hello"), TEXT_PLAIN);
    }

    #[test]
    fn test_html_after_whitespace() {
        assert_eq!(
            detect_content_type(b"  \n<!doctype html><html>"),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            detect_content_type(b"<html><body>hi</body></html>"),
            "text/html; charset=utf-8"
        );
        // "<a" must be a tag, not a prefix of something else
        assert_eq!(detect_content_type(b"<abc>"), TEXT_PLAIN);
    }

    #[test]
    fn test_xml() {
        assert_eq!(
            detect_content_type(b"<?xml version=\"1.0\"?><a/>"),
            "text/xml; charset=utf-8"
        );
    }

    #[test]
    fn test_binary_signatures() {
        assert_eq!(detect_content_type(b"\x89PNG\x0D\x0A\x1A\x0A...."), "image/png");
        assert_eq!(detect_content_type(b"GIF89a...."), "image/gif");
        assert_eq!(detect_content_type(b"\x1F\x8B\x08\x00\x00"), "application/x-gzip");
        assert_eq!(detect_content_type(b"%PDF-1.7"), "application/pdf");
        assert_eq!(detect_content_type(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "image/webp");
    }

    #[test]
    fn test_mp4() {
        let mut data = Vec::new();
        data.extend_from_slice(&16u32.to_be_bytes());
        data.extend_from_slice(b"ftypisom\x00\x00\x02\x00");
        data.extend_from_slice(b"more");
        assert_eq!(detect_content_type(&data), OCTET_STREAM);

        let mut data = Vec::new();
        data.extend_from_slice(&16u32.to_be_bytes());
        data.extend_from_slice(b"ftypmp42\x00\x00\x00\x00");
        assert_eq!(detect_content_type(&data), "video/mp4");
    }

    #[test]
    fn test_binary_fallback() {
        assert_eq!(detect_content_type(b"\x00\x01\x02garbage"), OCTET_STREAM);
    }

    #[test]
    fn test_only_prefix_is_inspected() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0x00);
        assert_eq!(detect_content_type(&data), TEXT_PLAIN);
    }
}
