//! Decoder for the encoded polyline format used by route shapes.
//!
//! Each coordinate is stored as a zig-zag encoded delta from the previous
//! point, in 1e-5 degree units, split into 5-bit groups. Every group is
//! offset by 63 so it lands in printable ASCII, and bit `0x20` marks that
//! another group follows. Latitude and longitude alternate.

use crate::{core::geo::LatLng, MapError, Result};

const PRECISION: f64 = 1e5;
const CHAR_OFFSET: u8 = 63;
const CONTINUATION_BIT: u32 = 0x20;
const CHUNK_MASK: u32 = 0x1f;

/// Decodes an encoded polyline into latitude/longitude pairs.
///
/// An empty string yields an empty path. Truncated or out-of-range input
/// yields whatever complete points precede the damage; callers treat an
/// empty result as a failure.
pub fn decode(encoded: &str) -> Vec<LatLng> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::with_capacity(bytes.len() / 4);
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while index < bytes.len() {
        let Some(d_lat) = next_value(bytes, &mut index) else {
            break;
        };
        let Some(d_lng) = next_value(bytes, &mut index) else {
            break;
        };
        // overflow and off-globe points count as damage, like truncation
        let (Some(next_lat), Some(next_lng)) = (lat.checked_add(d_lat), lng.checked_add(d_lng))
        else {
            break;
        };
        let point = LatLng::new(next_lat as f64 / PRECISION, next_lng as f64 / PRECISION);
        if !point.is_valid() {
            break;
        }
        lat = next_lat;
        lng = next_lng;
        points.push(point);
    }

    points
}

/// Like [`decode`], but reports an empty result as [`MapError::Decode`].
pub fn decode_checked(encoded: &str) -> Result<Vec<LatLng>> {
    let points = decode(encoded);
    if points.is_empty() {
        return Err(MapError::Decode(format!(
            "encoded polyline of {} bytes produced no points",
            encoded.len()
        )));
    }
    Ok(points)
}

/// Reads one zig-zag value, advancing `index`. Returns `None` when the
/// input ends mid-value or holds a byte outside the encoding's alphabet.
fn next_value(bytes: &[u8], index: &mut usize) -> Option<i64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;

    loop {
        let byte = *bytes.get(*index)?;
        *index += 1;
        let chunk = u32::from(byte.checked_sub(CHAR_OFFSET)?);
        if chunk > 0x3f || shift > 60 {
            return None;
        }
        result |= u64::from(chunk & CHUNK_MASK) << shift;
        shift += 5;
        if chunk & CONTINUATION_BIT == 0 {
            break;
        }
    }

    let value = if result & 1 == 1 {
        !((result >> 1) as i64)
    } else {
        (result >> 1) as i64
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reference_fixture() {
        let points = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@");
        let expected = [
            LatLng::new(38.5, -120.2),
            LatLng::new(40.7, -120.95),
            LatLng::new(43.252, -126.453),
        ];

        assert_eq!(points.len(), expected.len());
        for (decoded, reference) in points.iter().zip(expected.iter()) {
            assert!(
                decoded.approx_eq(reference, 1e-5),
                "{:?} != {:?}",
                decoded,
                reference
            );
        }
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode("").is_empty());
        assert!(matches!(decode_checked(""), Err(MapError::Decode(_))));
    }

    #[test]
    fn test_decode_single_point() {
        // (0, 0) encodes as one "?" per axis
        let points = decode("??");
        assert_eq!(points, vec![LatLng::new(0.0, 0.0)]);
    }

    #[test]
    fn test_truncated_input_keeps_complete_points() {
        // Second point's longitude is cut off mid-value
        let points = decode("_p~iF~ps|U_ulLnnq");
        assert_eq!(points.len(), 1);
        assert!(points[0].approx_eq(&LatLng::new(38.5, -120.2), 1e-5));
    }

    #[test]
    fn test_oversized_groups_do_not_overflow() {
        let damaged = "~~~~~~~~~~~~^".repeat(4);
        assert!(decode(&damaged).is_empty());
        assert!(decode_checked(&damaged).is_err());

        // a valid prefix survives the damage that follows it
        let points = decode(&format!("_p~iF~ps|U{damaged}"));
        assert_eq!(points.len(), 1);
        assert!(points[0].approx_eq(&LatLng::new(38.5, -120.2), 1e-5));
    }

    #[test]
    fn test_invalid_bytes_stop_decoding() {
        assert!(decode("   ").is_empty());
        assert!(decode_checked("\u{1}\u{2}").is_err());
    }
}
