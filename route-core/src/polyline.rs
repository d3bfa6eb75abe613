//! Encoded polyline codec.
//!
//! Each coordinate is stored as a pair of deltas (latitude first) from the
//! previous point, in degrees × 1e5. A delta is zigzag-mapped to an unsigned
//! value and written as a little-endian base-32 varint: every output byte
//! carries 5 payload bits, bit `0x20` flags that more chunks follow, and the
//! byte is offset by 63 so the result is printable ASCII.

use crate::types::{Coordinate, Result, RouteError};

/// Added to every 6-bit chunk to land in printable ASCII.
const CHAR_OFFSET: u8 = 63;

/// Highest valid encoded byte (`'~'`).
const CHAR_MAX: u8 = CHAR_OFFSET + 0x3F;

/// Continuation flag within a chunk.
const CONTINUATION: u64 = 0x20;

/// Payload bits within a chunk.
const CHUNK_MASK: u64 = 0x1F;

/// Longest accepted varint: 35 payload bits.
const MAX_CHUNKS: u32 = 7;

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode an encoded polyline into its coordinate sequence.
///
/// Fails with [`RouteError::MalformedEncoding`] on empty input, on a
/// continuation run that reaches the end of input, on a trailing latitude
/// without its longitude, and on bytes outside `'?'..='~'`.
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>> {
    let bytes = encoded.as_bytes();
    if bytes.is_empty() {
        return Err(RouteError::MalformedEncoding("empty input".into()));
    }

    // Shortest point is two bytes; typical road geometry runs 6-10.
    let mut points = Vec::with_capacity(bytes.len() / 6 + 1);
    let mut cursor = 0usize;
    let mut lat = 0i64;
    let mut lon = 0i64;

    while cursor < bytes.len() {
        lat += read_delta(bytes, &mut cursor)?;
        if cursor >= bytes.len() {
            return Err(RouteError::MalformedEncoding(format!(
                "point {} has a latitude but no longitude",
                points.len()
            )));
        }
        lon += read_delta(bytes, &mut cursor)?;
        points.push(Coordinate::from_e5(lat, lon));
    }

    Ok(points)
}

/// Read one varint at `cursor` and zigzag-decode it into a signed delta.
fn read_delta(bytes: &[u8], cursor: &mut usize) -> Result<i64> {
    let start = *cursor;
    let mut result = 0u64;
    let mut shift = 0u32;

    loop {
        let byte = match bytes.get(*cursor) {
            Some(&b) => b,
            None => {
                return Err(RouteError::MalformedEncoding(format!(
                    "unterminated value starting at offset {start}"
                )))
            }
        };
        if !(CHAR_OFFSET..=CHAR_MAX).contains(&byte) {
            return Err(RouteError::MalformedEncoding(format!(
                "invalid character {:?} at offset {}",
                byte as char, *cursor
            )));
        }
        if shift >= 5 * MAX_CHUNKS {
            return Err(RouteError::MalformedEncoding(format!(
                "value starting at offset {start} exceeds {MAX_CHUNKS} chunks"
            )));
        }

        let chunk = (byte - CHAR_OFFSET) as u64;
        *cursor += 1;
        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;

        if chunk & CONTINUATION == 0 {
            return Ok(zigzag_decode(result));
        }
    }
}

/// Odd values are negative: the magnitude is the one's complement of `v >> 1`.
fn zigzag_decode(v: u64) -> i64 {
    let half = (v >> 1) as i64;
    if v & 1 == 1 {
        !half
    } else {
        half
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode coordinates into a polyline string (rounded to 1e-5 degrees).
///
/// Fails with [`RouteError::MalformedEncoding`] on a non-finite coordinate
/// or a delta that would need more than seven chunks, since [`decode`]
/// rejects such values.
pub fn encode(points: &[Coordinate]) -> Result<String> {
    let mut out = String::with_capacity(points.len() * 8);
    let mut prev_lat = 0i64;
    let mut prev_lon = 0i64;

    for (i, point) in points.iter().enumerate() {
        if !point.lat.is_finite() || !point.lon.is_finite() {
            return Err(RouteError::MalformedEncoding(format!(
                "point {i} is not a finite coordinate"
            )));
        }
        let (lat, lon) = point.to_e5();
        write_delta(checked_delta(lat, prev_lat, i)?, &mut out);
        write_delta(checked_delta(lon, prev_lon, i)?, &mut out);
        prev_lat = lat;
        prev_lon = lon;
    }

    Ok(out)
}

/// `value - prev`, if its zigzag form fits in [`MAX_CHUNKS`] chunks.
fn checked_delta(value: i64, prev: i64, index: usize) -> Result<i64> {
    value
        .checked_sub(prev)
        .filter(|&delta| zigzag_encode(delta) >> (5 * MAX_CHUNKS) == 0)
        .ok_or_else(|| {
            RouteError::MalformedEncoding(format!(
                "point {index} is too far from the previous point to encode"
            ))
        })
}

fn write_delta(delta: i64, out: &mut String) {
    let mut v = zigzag_encode(delta);
    while v >= CONTINUATION {
        out.push(((CONTINUATION | (v & CHUNK_MASK)) as u8 + CHAR_OFFSET) as char);
        v >>= 5;
    }
    out.push((v as u8 + CHAR_OFFSET) as char);
}

fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn is_malformed(result: Result<Vec<Coordinate>>) -> bool {
        matches!(result, Err(RouteError::MalformedEncoding(_)))
    }

    #[test]
    fn test_decode_reference_polyline() {
        let points = decode(REFERENCE).unwrap();
        assert_eq!(
            points,
            vec![
                Coordinate::new(38.5, -120.2),
                Coordinate::new(40.7, -120.95),
                Coordinate::new(43.252, -126.453),
            ]
        );
    }

    #[test]
    fn test_encode_reference_polyline() {
        let points = [
            Coordinate::new(38.5, -120.2),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(43.252, -126.453),
        ];
        assert_eq!(encode(&points).unwrap(), REFERENCE);
    }

    #[test]
    fn test_decode_empty_is_malformed() {
        assert!(is_malformed(decode("")));
    }

    #[test]
    fn test_decode_single_point() {
        let points = decode("_p~iF~ps|U").unwrap();
        assert_eq!(points, vec![Coordinate::new(38.5, -120.2)]);
    }

    #[test]
    fn test_decode_unterminated_value() {
        // Trailing '_' carries the continuation bit with nothing after it.
        assert!(is_malformed(decode("_p~iF~ps|U_")));
        assert!(is_malformed(decode("_")));
    }

    #[test]
    fn test_decode_missing_longitude() {
        assert!(is_malformed(decode("_p~iF")));
        assert!(is_malformed(decode("_p~iF~ps|U_ulL")));
    }

    #[test]
    fn test_decode_invalid_character() {
        assert!(is_malformed(decode("_p~iF ps|U")));
        assert!(is_malformed(decode("é?")));
    }

    #[test]
    fn test_decode_overlong_value() {
        // Eight continuation chunks exceed the 32-bit range.
        assert!(is_malformed(decode("~~~~~~~~?")));
    }

    #[test]
    fn test_encode_rejects_unrepresentable_points() {
        let far = [Coordinate::new(1e300, 0.0), Coordinate::new(-1e300, 0.0)];
        assert!(matches!(encode(&far), Err(RouteError::MalformedEncoding(_))));

        let nan = [Coordinate::new(f64::NAN, 0.0)];
        assert!(matches!(encode(&nan), Err(RouteError::MalformedEncoding(_))));

        // 2^34 e5 units is one past the largest seven-chunk delta.
        let edge = 171_798.691_84;
        assert!(encode(&[Coordinate::new(edge, 0.0)]).is_err());
        let fits = encode(&[Coordinate::new(-edge, 0.0)]).unwrap();
        assert_eq!(decode(&fits).unwrap(), vec![Coordinate::new(-edge, 0.0)]);
    }

    #[test]
    fn test_zero_deltas() {
        // '?' encodes a zero delta.
        let points = decode("????").unwrap();
        assert_eq!(
            points,
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.0)]
        );
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_decode(0), 0);
        assert_eq!(zigzag_decode(1), -1);
        assert_eq!(zigzag_decode(2), 1);
        assert_eq!(zigzag_decode(3), -2);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-17_998_321), 35_996_641);
    }

    #[test]
    fn test_integer_delta_sequence_roundtrip() {
        // Deltas in 1e-5 degrees, including sign flips and a full-range jump.
        let deltas: [(i64, i64); 6] = [
            (0, 0),
            (1, -1),
            (-9_000_000, 18_000_000),
            (17_999_999, -35_999_999),
            (-15, 16),
            (123_456, -654_321),
        ];
        let mut lat = 0i64;
        let mut lon = 0i64;
        let mut expected = Vec::new();
        for (dlat, dlon) in deltas {
            lat += dlat;
            lon += dlon;
            expected.push(Coordinate::from_e5(lat, lon));
        }

        let decoded = decode(&encode(&expected).unwrap()).unwrap();
        assert_eq!(decoded.len(), expected.len());
        for (got, want) in decoded.iter().zip(&expected) {
            assert!((got.lat - want.lat).abs() < 1e-5, "{got} != {want}");
            assert!((got.lon - want.lon).abs() < 1e-5, "{got} != {want}");
        }
    }
}
