//! Plain-text extraction with best-effort charset detection

use super::ExtractedDocument;

/// Decode bytes to a UTF-8 string, sniffing a BOM first and falling back to
/// Windows-1252 for byte sequences that are not valid UTF-8.
///
/// Returns the decoded text, the encoding name, and whether any malformed
/// sequences were replaced.
pub(super) fn decode_bytes(bytes: &[u8]) -> (String, &'static str, bool) {
    if let Some((encoding, _bom_len)) = encoding_rs::Encoding::for_bom(bytes) {
        let (decoded, actual, malformed) = encoding.decode(bytes);
        return (decoded.into_owned(), actual.name(), malformed);
    }

    if let Ok(valid) = std::str::from_utf8(bytes) {
        return (valid.to_string(), "UTF-8", false);
    }

    // Not UTF-8: Windows-1252 maps every byte, so this cannot fail outright
    let (decoded, actual, malformed) = encoding_rs::WINDOWS_1252.decode(bytes);
    (decoded.into_owned(), actual.name(), malformed)
}

pub(super) fn extract(bytes: &[u8]) -> ExtractedDocument {
    let mut doc = ExtractedDocument::new("text");

    let (decoded, encoding, malformed) = decode_bytes(bytes);
    if malformed {
        doc.warn(format!(
            "Malformed byte sequences replaced while decoding as {encoding}"
        ));
    }
    doc.set_meta("encoding", encoding);
    doc.text = decoded;
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passthrough() {
        let (text, encoding, malformed) = decode_bytes("héllo".as_bytes());
        assert_eq!(text, "héllo");
        assert_eq!(encoding, "UTF-8");
        assert!(!malformed);
    }

    #[test]
    fn latin1_fallback() {
        // 0xE9 is 'é' in Windows-1252 but invalid standalone UTF-8
        let (text, encoding, _) = decode_bytes(&[b'c', b'a', b'f', 0xE9]);
        assert_eq!(text, "café");
        assert_eq!(encoding, "windows-1252");
    }

    #[test]
    fn utf16_bom_detected() {
        let mut bytes = vec![0xFF, 0xFE]; // UTF-16LE BOM
        for unit in "hi".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let (text, encoding, _) = decode_bytes(&bytes);
        assert_eq!(text, "hi");
        assert_eq!(encoding, "UTF-16LE");
    }
}
