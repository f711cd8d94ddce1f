//! Minimal binary PNM (PGM `P5` / PPM `P6`) codec.
//!
//! Used for HTTP snapshots, decision artifacts, and composite tiles. Only
//! 8-bit images (maxval <= 255) are supported.

use super::Frame;
use thiserror::Error;

/// Content type recorded for PGM payloads.
pub const PGM_CONTENT_TYPE: &str = "image/x-portable-graymap";

/// PNM decoding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PnmError {
    /// Not a binary PGM or PPM.
    #[error("unsupported magic number (expected P5 or P6)")]
    UnsupportedFormat,
    /// Width, height or maxval could not be parsed.
    #[error("malformed header")]
    MalformedHeader,
    /// Maxval other than 255.
    #[error("unsupported maxval {0} (only 8-bit images)")]
    UnsupportedDepth(u32),
    /// The raster is shorter than the header declares.
    #[error("pixel data truncated: expected {expected} bytes, got {got}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes present.
        got: usize,
    },
}

/// Decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PnmImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Samples per pixel (1 or 3).
    pub channels: u8,
    /// Row-major interleaved samples.
    pub pixels: Vec<u8>,
}

impl PnmImage {
    /// Converts the image into a frame with the given sequence number.
    pub fn into_frame(self, sequence: u64) -> Frame {
        Frame::with_channels(self.pixels, self.width, self.height, self.channels, sequence)
    }
}

/// Encodes grayscale samples as a binary PGM.
pub fn encode_pgm(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
    let header = format!("P5\n{} {}\n255\n", width, height);
    let mut out = Vec::with_capacity(header.len() + pixels.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(pixels);
    out
}

/// Decodes a binary PGM or PPM.
pub fn decode(bytes: &[u8]) -> Result<PnmImage, PnmError> {
    let channels = match bytes.get(..2) {
        Some(b"P5") => 1u8,
        Some(b"P6") => 3u8,
        _ => return Err(PnmError::UnsupportedFormat),
    };

    let mut cursor = 2;
    let width = read_header_number(bytes, &mut cursor)?;
    let height = read_header_number(bytes, &mut cursor)?;
    let maxval = read_header_number(bytes, &mut cursor)?;
    if maxval == 0 || maxval > 255 {
        return Err(PnmError::UnsupportedDepth(maxval));
    }

    // exactly one whitespace byte separates the header from the raster
    match bytes.get(cursor) {
        Some(b) if b.is_ascii_whitespace() => cursor += 1,
        _ => return Err(PnmError::MalformedHeader),
    }

    let expected = width as usize * height as usize * channels as usize;
    let data = &bytes[cursor..];
    if data.len() < expected {
        return Err(PnmError::Truncated {
            expected,
            got: data.len(),
        });
    }

    Ok(PnmImage {
        width,
        height,
        channels,
        pixels: data[..expected].to_vec(),
    })
}

fn read_header_number(bytes: &[u8], cursor: &mut usize) -> Result<u32, PnmError> {
    // skip whitespace and comments
    loop {
        match bytes.get(*cursor) {
            Some(b) if b.is_ascii_whitespace() => *cursor += 1,
            Some(b'#') => {
                while let Some(&b) = bytes.get(*cursor) {
                    *cursor += 1;
                    if b == b'\n' {
                        break;
                    }
                }
            }
            Some(_) => break,
            None => return Err(PnmError::MalformedHeader),
        }
    }

    let start = *cursor;
    while bytes.get(*cursor).is_some_and(|b| b.is_ascii_digit()) {
        *cursor += 1;
    }
    if start == *cursor {
        return Err(PnmError::MalformedHeader);
    }

    std::str::from_utf8(&bytes[start..*cursor])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(PnmError::MalformedHeader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pgm_encode_then_decode() {
        let encoded = encode_pgm(4, 2, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(encoded.starts_with(b"P5\n4 2\n255\n"));

        let image = decode(&encoded).unwrap();
        assert_eq!(image.width, 4);
        assert_eq!(image.height, 2);
        assert_eq!(image.channels, 1);
        assert_eq!(image.pixels, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_ppm_with_comment() {
        let mut bytes = b"P6\n# from the roof camera\n2 1\n255\n".to_vec();
        bytes.extend_from_slice(&[10, 20, 30, 40, 50, 60]);

        let image = decode(&bytes).unwrap();
        assert_eq!(image.channels, 3);
        assert_eq!(image.into_frame(1).pixel(1, 0), &[40, 50, 60]);
    }

    #[test]
    fn test_rejects_unknown_magic() {
        assert_eq!(decode(b"P3\n1 1\n255\n0 0 0"), Err(PnmError::UnsupportedFormat));
    }

    #[test]
    fn test_rejects_truncated_raster() {
        let result = decode(b"P5\n4 4\n255\n\x00\x01");
        assert_eq!(
            result,
            Err(PnmError::Truncated {
                expected: 16,
                got: 2
            })
        );
    }

    #[test]
    fn test_rejects_sixteen_bit() {
        assert_eq!(
            decode(b"P5\n1 1\n65535\n\x00\x00"),
            Err(PnmError::UnsupportedDepth(65535))
        );
    }
}
