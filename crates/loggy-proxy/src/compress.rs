//! Decompression for the C4 inspection copy of a request body.
//!
//! Forwarding always uses the untouched wire bytes; this module only
//! feeds a clean copy to the
//! extractor. Unknown or absent encodings pass the bytes through
//! unchanged and let the extractor attempt UTF-8 JSON directly.

use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::{self, Read};

/// Decompress `body` per `content_encoding` (case-insensitive). An
/// unrecognized encoding, or `None`, returns the bytes unchanged.
pub fn decompress(content_encoding: Option<&str>, body: &[u8]) -> io::Result<Vec<u8>> {
    match content_encoding.map(|e| e.trim().to_ascii_lowercase()) {
        Some(ref enc) if enc == "gzip" || enc == "x-gzip" => {
            let mut out = Vec::new();
            GzDecoder::new(body).read_to_end(&mut out)?;
            Ok(out)
        }
        Some(ref enc) if enc == "deflate" => {
            let mut out = Vec::new();
            ZlibDecoder::new(body).read_to_end(&mut out)?;
            Ok(out)
        }
        Some(ref enc) if enc == "br" => {
            let mut out = Vec::new();
            brotli::BrotliDecompress(&mut &body[..], &mut out)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(out)
        }
        _ => Ok(body.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn gzip_roundtrips() {
        let original = br#"{"event":"Login"}"#;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();

        let decompressed = decompress(Some("gzip"), &compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn unknown_encoding_passes_through() {
        let body = b"not actually compressed";
        let decompressed = decompress(Some("identity"), body).unwrap();
        assert_eq!(decompressed, body);
    }

    #[test]
    fn absent_encoding_passes_through() {
        let body = b"plain body";
        assert_eq!(decompress(None, body).unwrap(), body);
    }
}
