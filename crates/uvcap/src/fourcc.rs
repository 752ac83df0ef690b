// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// Adapted from https://docs.rs/crate/four-cc/latest. V4L2 packs the code
// little-endian (`v4l2_fourcc(a, b, c, d)`) on every host.
#![forbid(unsafe_code)]

use core::{fmt, result::Result, str::FromStr};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(code: &[u8; 4]) -> FourCC {
        FourCC(*code)
    }

    pub const fn from_u32(val: u32) -> FourCC {
        FourCC(val.to_le_bytes())
    }

    pub const fn as_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Display name of a well-known pixel format, `None` for codes outside
    /// the table.
    pub fn name(self) -> Option<&'static str> {
        FORMAT_NAMES
            .iter()
            .find(|(code, _)| *code == self)
            .map(|(_, name)| *name)
    }

    /// True for the compressed formats in the table (MJPG, JPEG, H264, ...).
    pub fn is_compressed(self) -> bool {
        COMPRESSED.contains(&self)
    }
}

const COMPRESSED: [FourCC; 5] = [
    FourCC(*b"MJPG"),
    FourCC(*b"JPEG"),
    FourCC(*b"H264"),
    FourCC(*b"HEVC"),
    FourCC(*b"VP80"),
];

/// Read-only lookup from pixel format code to display name.
static FORMAT_NAMES: [(FourCC, &str); 20] = [
    (FourCC(*b"YUYV"), "YUYV 4:2:2"),
    (FourCC(*b"UYVY"), "UYVY 4:2:2"),
    (FourCC(*b"YVYU"), "YVYU 4:2:2"),
    (FourCC(*b"VYUY"), "VYUY 4:2:2"),
    (FourCC(*b"NV12"), "Y/CbCr 4:2:0"),
    (FourCC(*b"NV21"), "Y/CrCb 4:2:0"),
    (FourCC(*b"NV16"), "Y/CbCr 4:2:2"),
    (FourCC(*b"YU12"), "Planar YUV 4:2:0"),
    (FourCC(*b"YV12"), "Planar YVU 4:2:0"),
    (FourCC(*b"GREY"), "8-bit Greyscale"),
    (FourCC(*b"Y16 "), "16-bit Greyscale"),
    (FourCC(*b"RGB3"), "24-bit RGB 8-8-8"),
    (FourCC(*b"BGR3"), "24-bit BGR 8-8-8"),
    (FourCC(*b"RGBP"), "16-bit RGB 5-6-5"),
    (FourCC(*b"BA24"), "32-bit ARGB 8-8-8-8"),
    (FourCC(*b"MJPG"), "Motion-JPEG"),
    (FourCC(*b"JPEG"), "JFIF JPEG"),
    (FourCC(*b"H264"), "H.264"),
    (FourCC(*b"HEVC"), "HEVC"),
    (FourCC(*b"VP80"), "VP8"),
];

impl From<&[u8; 4]> for FourCC {
    fn from(buf: &[u8; 4]) -> FourCC {
        FourCC(*buf)
    }
}

impl From<u32> for FourCC {
    fn from(val: u32) -> FourCC {
        FourCC::from_u32(val)
    }
}

impl From<FourCC> for u32 {
    fn from(val: FourCC) -> Self {
        val.as_u32()
    }
}

/// Error returned when parsing a string that is not four ASCII characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFourCCError(String);

impl fmt::Display for ParseFourCCError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FOURCC must be exactly 4 ASCII characters: {:?}", self.0)
    }
}

impl std::error::Error for ParseFourCCError {}

impl FromStr for FourCC {
    type Err = ParseFourCCError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            &[a, b, c, d] if s.is_ascii() => Ok(FourCC([a, b, c, d])),
            _ => Err(ParseFourCCError(s.to_owned())),
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match core::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => {
                // If we return fmt::Error, then for example format!() will panic, so we choose
                // an alternative representation instead
                let b = &self.0;
                f.write_fmt(format_args!(
                    "{}{}{}{}",
                    core::ascii::escape_default(b[0]),
                    core::ascii::escape_default(b[1]),
                    core::ascii::escape_default(b[2]),
                    core::ascii::escape_default(b[3])
                ))
            }
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let b = self.0;
        f.debug_tuple("FourCC")
            .field(&format_args!(
                "{}{}{}{}",
                core::ascii::escape_default(b[0]),
                core::ascii::escape_default(b[1]),
                core::ascii::escape_default(b[2]),
                core::ascii::escape_default(b[3])
            ))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4l2_packing() {
        // v4l2_fourcc('Y', 'U', 'Y', 'V')
        assert_eq!(FourCC(*b"YUYV").as_u32(), 0x5659_5559);
        assert_eq!(FourCC::from(0x4750_4a4d), FourCC(*b"MJPG"));
        assert_eq!(u32::from(FourCC(*b"NV12")), 0x3231_564e);
    }

    #[test]
    fn test_parse() {
        assert_eq!("MJPG".parse::<FourCC>(), Ok(FourCC(*b"MJPG")));
        assert_eq!("Y16 ".parse::<FourCC>(), Ok(FourCC(*b"Y16 ")));
        assert!("MJP".parse::<FourCC>().is_err());
        assert!("MJPEG".parse::<FourCC>().is_err());
        assert!("MJ\u{e9}".parse::<FourCC>().is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(FourCC(*b"MJPG").name(), Some("Motion-JPEG"));
        assert_eq!(FourCC(*b"YUYV").name(), Some("YUYV 4:2:2"));
        assert_eq!(FourCC(*b"ZZZZ").name(), None);
        assert!(FourCC(*b"MJPG").is_compressed());
        assert!(!FourCC(*b"YUYV").is_compressed());
    }

    #[test]
    fn test_display_escapes_non_utf8() {
        assert_eq!(FourCC(*b"NV12").to_string(), "NV12");
        assert_eq!(FourCC([0xff, b'A', b'B', b'C']).to_string(), "\\xffABC");
        assert_eq!(format!("{:?}", FourCC(*b"GREY")), "FourCC(GREY)");
    }
}
