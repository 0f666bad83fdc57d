use mime::Mime;
use std::io::{self, Read, Seek, SeekFrom};

/// Number of leading bytes inspected when classifying content.
pub const SNIFF_LEN: usize = 512;

/// Classifies the content of `source` from its first bytes and rewinds it to where it was.
///
/// A source shorter than [`SNIFF_LEN`] is fine; end of stream just ends the prefix.
pub fn detect<R: Read + Seek>(source: &mut R) -> io::Result<Mime> {
    let start = source.stream_position()?;

    let mut buf = [0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    source.seek(SeekFrom::Start(start))?;
    Ok(detect_bytes(&buf[..filled]))
}

/// Classifies an in-memory prefix. Only the first [`SNIFF_LEN`] bytes are looked at.
pub fn detect_bytes(data: &[u8]) -> Mime {
    let prefix = &data[..data.len().min(SNIFF_LEN)];

    if let Some(kind) = infer::get(prefix) {
        if let Ok(mime) = kind.mime_type().parse::<Mime>() {
            return mime;
        }
    }

    if prefix.is_empty() {
        return mime::TEXT_PLAIN;
    }
    if looks_like_text(prefix) {
        return mime::TEXT_PLAIN_UTF_8;
    }
    mime::APPLICATION_OCTET_STREAM
}

pub fn is_image(mime: &Mime) -> bool {
    mime.type_() == mime::IMAGE
}

fn looks_like_text(prefix: &[u8]) -> bool {
    // a multi-byte sequence cut at the prefix boundary is still text
    let valid = match std::str::from_utf8(prefix) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };
    valid
        && !prefix
            .iter()
            .any(|&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b))
}
