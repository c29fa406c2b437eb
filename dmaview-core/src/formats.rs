//! Pixel format and modifier helpers
//!
//! Centralizes fourcc handling shared by the V4L2 and dmabuf sides.
//! V4L2 and DRM both pack four ASCII characters little-endian, so the same
//! packing code serves both namespaces.

use crate::error::{DmaviewError, Result};

/// Fourcc constants used in logs and tests
///
/// See: <https://github.com/torvalds/linux/blob/master/include/uapi/drm/drm_fourcc.h>
pub mod fourcc {
    /// NV12 - YUV 4:2:0 semi-planar
    pub const NV12: u32 = 0x3231564E; // NV12
    /// NV12M - NV12 with non-contiguous planes (V4L2 multi-plane)
    pub const NV12M: u32 = 0x32314D4E; // NM12
    /// YUYV - YUV 4:2:2 packed
    pub const YUYV: u32 = 0x56595559; // YUYV
    /// XRGB8888 - 32-bit RGB with unused alpha
    pub const XRGB8888: u32 = 0x34325258; // XR24
    /// ARGB8888 - 32-bit RGB with alpha
    pub const ARGB8888: u32 = 0x34325241; // AR24
    /// MJPG - motion JPEG, compressed
    pub const MJPG: u32 = 0x47504A4D; // MJPG
}

/// DRM_FORMAT_MOD_LINEAR: no tiling or compression
pub const MOD_LINEAR: u64 = 0;

/// Pack four ASCII characters into a fourcc code
pub const fn fourcc_code(code: [u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

/// Parse a four-character code such as `"NV12"`
///
/// Shorter codes are right-padded with spaces, matching how V4L2 spells
/// three-letter formats (`"RGB3"` vs `"BGR "`).
pub fn parse_fourcc(s: &str) -> Result<u32> {
    let bytes = s.as_bytes();
    if bytes.is_empty() || bytes.len() > 4 || !bytes.iter().all(|b| b.is_ascii_graphic()) {
        return Err(DmaviewError::InvalidFormat(format!(
            "'{}' is not a four-character code",
            s
        )));
    }

    let mut code = [b' '; 4];
    code[..bytes.len()].copy_from_slice(bytes);
    Ok(fourcc_code(code))
}

/// Render a fourcc code as its four characters
///
/// Non-printable bytes are shown as `.` so odd driver values stay readable.
pub fn fourcc_to_string(fourcc: u32) -> String {
    fourcc
        .to_le_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

/// Split a 64-bit modifier into the (hi, lo) halves carried on the wire
pub fn split_modifier(modifier: u64) -> (u32, u32) {
    ((modifier >> 32) as u32, (modifier & 0xffff_ffff) as u32)
}

/// Join the (hi, lo) halves of a modifier
pub fn join_modifier(hi: u32, lo: u32) -> u64 {
    ((hi as u64) << 32) | lo as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fourcc() {
        assert_eq!(parse_fourcc("NV12").unwrap(), fourcc::NV12);
        assert_eq!(parse_fourcc("YUYV").unwrap(), fourcc::YUYV);
        assert_eq!(parse_fourcc("XR24").unwrap(), fourcc::XRGB8888);
    }

    #[test]
    fn test_parse_fourcc_pads_short_codes() {
        assert_eq!(parse_fourcc("BGR").unwrap(), fourcc_code(*b"BGR "));
    }

    #[test]
    fn test_parse_fourcc_rejects_garbage() {
        assert!(parse_fourcc("").is_err());
        assert!(parse_fourcc("NV12X").is_err());
        assert!(parse_fourcc("N\u{7}12").is_err());
    }

    #[test]
    fn test_fourcc_to_string() {
        assert_eq!(fourcc_to_string(fourcc::NV12), "NV12");
        assert_eq!(fourcc_to_string(fourcc::NV12M), "NM12");
        assert_eq!(fourcc_to_string(0x0000_3231), "12..");
    }

    #[test]
    fn test_modifier_halves() {
        assert_eq!(split_modifier(MOD_LINEAR), (0, 0));
        assert_eq!(split_modifier(0x0100_0000_0000_0005), (0x0100_0000, 5));
        assert_eq!(join_modifier(0x0100_0000, 5), 0x0100_0000_0000_0005);
        assert_eq!(join_modifier(0x00ff_ffff, 0xffff_ffff), 0x00ff_ffff_ffff_ffff);
    }
}
