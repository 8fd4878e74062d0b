//! Database character set tags and their text decoders.

use std::borrow::Cow;

use encoding_rs::Encoding;

/// Tag reported when the database does not say otherwise.
pub const DEFAULT_CHARSET_TAG: &str = "AL32UTF8";

/// Character set of a session's trace file.
///
/// Wraps the database tag (`NLS_CHARACTERSET`) together with the decoder
/// used for it. Tags without a decoder are read as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charset {
    tag: String,
    encoding: Option<&'static Encoding>,
}

impl Charset {
    /// Resolve a database character set tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_uppercase();
        let encoding = match tag.as_str() {
            "ZHS16GBK" => Some(encoding_rs::GBK),
            "ZHS32GB18030" => Some(encoding_rs::GB18030),
            "JA16SJIS" | "JA16SJISTILDE" => Some(encoding_rs::SHIFT_JIS),
            "KO16MSWIN949" | "KO16KSC5601" => Some(encoding_rs::EUC_KR),
            "ZHT16MSWIN950" | "ZHT16BIG5" => Some(encoding_rs::BIG5),
            "WE8MSWIN1252" | "WE8ISO8859P1" => Some(encoding_rs::WINDOWS_1252),
            "CL8MSWIN1251" => Some(encoding_rs::WINDOWS_1251),
            _ => None,
        };
        Self { tag, encoding }
    }

    /// UTF-8 passthrough.
    #[must_use]
    pub fn utf8() -> Self {
        Self::from_tag(DEFAULT_CHARSET_TAG)
    }

    /// The database tag this charset was resolved from.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Whether decoding is a plain UTF-8 passthrough.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.encoding.is_none()
    }

    /// Decode raw trace bytes. Malformed sequences become U+FFFD.
    ///
    /// Every supported encoding keeps `0x0A` out of multi-byte sequences, so
    /// callers may split raw bytes on `\n` before decoding.
    #[must_use]
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self.encoding {
            Some(encoding) => encoding.decode_without_bom_handling(bytes).0,
            None => String::from_utf8_lossy(bytes),
        }
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::utf8()
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_tags_are_identity() {
        assert!(Charset::from_tag("AL32UTF8").is_identity());
        assert!(Charset::from_tag("UTF8").is_identity());
        assert!(Charset::from_tag("SOMETHING_ELSE").is_identity());
    }

    #[test]
    fn test_gbk_decoding() {
        let charset = Charset::from_tag("zhs16gbk");
        assert!(!charset.is_identity());
        assert_eq!(charset.tag(), "ZHS16GBK");

        // "中文" in GBK
        let bytes = [0xD6, 0xD0, 0xCE, 0xC4];
        assert_eq!(charset.decode(&bytes), "中文");
    }

    #[test]
    fn test_identity_decoding_is_lossy() {
        let charset = Charset::utf8();
        let decoded = charset.decode(&[b'a', 0xFF, b'b']);
        assert_eq!(decoded, "a\u{FFFD}b");
    }

    #[test]
    fn test_default_is_utf8() {
        assert_eq!(Charset::default().tag(), DEFAULT_CHARSET_TAG);
    }
}
