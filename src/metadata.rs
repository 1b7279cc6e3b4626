//! Capture dates for the date overlay.

use crate::ImageFrame;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use image::ImageDecoder;
use std::path::{Path, PathBuf};

/// `YYYY:MM:DD HH:MM:SS`, the layout EXIF uses.
pub const CANONICAL_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const TAG_DATE_TIME: u16 = 0x0132;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TYPE_ASCII: u16 = 2;

const ACCEPTED_LAYOUTS: &[&str] = &[
    CANONICAL_FORMAT,
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y:%m:%d %H:%M",
];

/// Best-effort capture time in [`CANONICAL_FORMAT`]. Falls back to the file's
/// modification time, then to the current time.
pub fn capture_time(path: &Path) -> String {
    if let Some(stamp) = read_exif(path).as_deref().and_then(exif_capture_time) {
        return stamp;
    }
    match std::fs::metadata(path).and_then(|metadata| metadata.modified()) {
        Ok(modified) => DateTime::<Local>::from(modified)
            .format(CANONICAL_FORMAT)
            .to_string(),
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "no capture time, using now");
            Local::now().format(CANONICAL_FORMAT).to_string()
        }
    }
}

/// `2024:01:01 12:00:00` becomes `Monday, January 01, 2024 12:00PM`.
/// Input that does not parse is returned unchanged.
pub fn format_display(canonical: &str) -> String {
    if let Ok(stamp) = NaiveDateTime::parse_from_str(canonical, CANONICAL_FORMAT) {
        return stamp.format("%A, %B %d, %Y %I:%M%p").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(canonical, "%Y:%m:%d") {
        return date.format("%A, %B %d, %Y").to_string();
    }
    canonical.to_string()
}

/// Pairs each image with its formatted capture date.
pub fn dated_frames(paths: &[PathBuf]) -> Vec<ImageFrame> {
    paths
        .iter()
        .map(|path| ImageFrame {
            path: path.clone(),
            display_text: Some(format_display(&capture_time(path))),
        })
        .collect()
}

/// Rewrites any accepted date layout into [`CANONICAL_FORMAT`].
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim_matches(|character: char| character == '\0' || character.is_whitespace());
    let parsed = ACCEPTED_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|stamp| stamp.naive_local())
        })
        .or_else(|| {
            // Trailing timezone such as "+02:00".
            let prefix = raw.get(..19)?;
            NaiveDateTime::parse_from_str(prefix, CANONICAL_FORMAT).ok()
        })?;
    Some(parsed.format(CANONICAL_FORMAT).to_string())
}

fn read_exif(path: &Path) -> Option<Vec<u8>> {
    let reader = image::ImageReader::open(path).ok()?.with_guessed_format().ok()?;
    let mut decoder = reader.into_decoder().ok()?;
    decoder.exif_metadata().ok().flatten()
}

/// `DateTimeOriginal` from the Exif sub-IFD, else `DateTime` from IFD0.
pub fn exif_capture_time(exif: &[u8]) -> Option<String> {
    let tiff = Tiff::new(exif)?;
    let ifd0 = tiff.u32(4)? as usize;

    let original = tiff
        .find_entry(ifd0, TAG_EXIF_IFD)
        .and_then(|entry| tiff.u32(entry + 8))
        .and_then(|exif_ifd| tiff.find_entry(exif_ifd as usize, TAG_DATE_TIME_ORIGINAL))
        .and_then(|entry| tiff.ascii(entry));
    let modified = tiff
        .find_entry(ifd0, TAG_DATE_TIME)
        .and_then(|entry| tiff.ascii(entry));

    [original, modified]
        .into_iter()
        .flatten()
        .find_map(|raw| normalize_date(&raw))
}

/// Minimal reader for the TIFF structure that wraps EXIF data.
struct Tiff<'a> {
    data: &'a [u8],
    little_endian: bool,
}

impl<'a> Tiff<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let data = data.strip_prefix(b"Exif\0\0").unwrap_or(data);
        let little_endian = match data.get(..4)? {
            b"II*\0" => true,
            b"MM\0*" => false,
            _ => return None,
        };
        Some(Self {
            data,
            little_endian,
        })
    }

    fn u16(&self, offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = self.data.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
        Some(if self.little_endian {
            u16::from_le_bytes(bytes)
        } else {
            u16::from_be_bytes(bytes)
        })
    }

    fn u32(&self, offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = self.data.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
        Some(if self.little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }

    /// Offset of the 12-byte directory entry for `tag`.
    fn find_entry(&self, ifd: usize, tag: u16) -> Option<usize> {
        let count = self.u16(ifd)? as usize;
        (0..count)
            .map(|index| ifd + 2 + index * 12)
            .find(|&entry| self.u16(entry) == Some(tag))
    }

    fn ascii(&self, entry: usize) -> Option<String> {
        if self.u16(entry + 2)? != TYPE_ASCII {
            return None;
        }
        let count = self.u32(entry + 4)? as usize;
        let start = if count <= 4 {
            entry + 8
        } else {
            self.u32(entry + 8)? as usize
        };
        let bytes = self.data.get(start..start.checked_add(count)?)?;
        let text = bytes.split(|&byte| byte == 0).next().unwrap_or_default();
        Some(String::from_utf8_lossy(text).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// IFD0 holds DateTime and the Exif pointer; the Exif IFD holds
    /// DateTimeOriginal.
    fn exif_blob(little_endian: bool, date_time: &str, original: Option<&str>) -> Vec<u8> {
        let put16 = |buffer: &mut Vec<u8>, value: u16| {
            if little_endian {
                buffer.extend_from_slice(&value.to_le_bytes());
            } else {
                buffer.extend_from_slice(&value.to_be_bytes());
            }
        };
        let put32 = |buffer: &mut Vec<u8>, value: u32| {
            if little_endian {
                buffer.extend_from_slice(&value.to_le_bytes());
            } else {
                buffer.extend_from_slice(&value.to_be_bytes());
            }
        };

        let ifd0_offset = 8u32;
        let ifd0_len = 2 + 2 * 12 + 4;
        let exif_offset = ifd0_offset + ifd0_len;
        let exif_len = 2 + 12 + 4;
        let date_time_offset = exif_offset + exif_len;
        let original_offset = date_time_offset + 20;

        let mut buffer = Vec::new();
        buffer.extend_from_slice(if little_endian { b"II*\0" } else { b"MM\0*" });
        put32(&mut buffer, ifd0_offset);

        put16(&mut buffer, 2);
        put16(&mut buffer, TAG_DATE_TIME);
        put16(&mut buffer, TYPE_ASCII);
        put32(&mut buffer, 20);
        put32(&mut buffer, date_time_offset);
        put16(&mut buffer, TAG_EXIF_IFD);
        put16(&mut buffer, 4);
        put32(&mut buffer, 1);
        put32(&mut buffer, exif_offset);
        put32(&mut buffer, 0);

        put16(&mut buffer, if original.is_some() { 1 } else { 0 });
        put16(&mut buffer, TAG_DATE_TIME_ORIGINAL);
        put16(&mut buffer, TYPE_ASCII);
        put32(&mut buffer, 20);
        put32(&mut buffer, original_offset);
        put32(&mut buffer, 0);

        for text in [Some(date_time), original] {
            let mut field = text.unwrap_or_default().as_bytes().to_vec();
            field.resize(20, 0);
            buffer.extend_from_slice(&field);
        }
        buffer
    }

    #[test]
    fn prefers_date_time_original() {
        let blob = exif_blob(true, "2020:01:01 00:00:00", Some("2023:05:06 07:08:09"));
        assert_eq!(exif_capture_time(&blob).as_deref(), Some("2023:05:06 07:08:09"));
    }

    #[test]
    fn falls_back_to_date_time() {
        let blob = exif_blob(true, "2020:01:02 03:04:05", None);
        assert_eq!(exif_capture_time(&blob).as_deref(), Some("2020:01:02 03:04:05"));
    }

    #[test]
    fn reads_big_endian_with_exif_header() {
        let mut blob = b"Exif\0\0".to_vec();
        blob.extend(exif_blob(false, "2020:01:01 00:00:00", Some("2019:12:31 23:59:58")));
        assert_eq!(exif_capture_time(&blob).as_deref(), Some("2019:12:31 23:59:58"));
    }

    #[test]
    fn garbage_exif_is_ignored() {
        assert_eq!(exif_capture_time(b"not exif at all"), None);
        assert_eq!(exif_capture_time(b"II*\0\xff\xff\xff\xff"), None);
    }

    #[test]
    fn normalizes_common_layouts() {
        assert_eq!(normalize_date("2024-03-04 05:06:07").as_deref(), Some("2024:03:04 05:06:07"));
        assert_eq!(normalize_date("2024-03-04T05:06:07").as_deref(), Some("2024:03:04 05:06:07"));
        assert_eq!(
            normalize_date("2024:03:04 05:06:07+02:00").as_deref(),
            Some("2024:03:04 05:06:07")
        );
        assert_eq!(normalize_date("2024:03:04 05:06").as_deref(), Some("2024:03:04 05:06:00"));
        assert_eq!(normalize_date("0000:00:00 00:00:00"), None);
    }

    #[test]
    fn display_format_is_human_readable() {
        assert_eq!(
            format_display("2024:01:01 12:00:00"),
            "Monday, January 01, 2024 12:00PM"
        );
        assert_eq!(format_display("2024:01:01"), "Monday, January 01, 2024");
        assert_eq!(format_display("yesterday-ish"), "yesterday-ish");
    }

    #[test]
    fn image_without_exif_uses_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img_001.png");
        image::RgbImage::new(4, 4).save(&path).unwrap();

        let stamp = capture_time(&path);
        assert!(NaiveDateTime::parse_from_str(&stamp, CANONICAL_FORMAT).is_ok(), "{stamp}");
    }

    #[test]
    fn missing_file_still_yields_a_timestamp() {
        let stamp = capture_time(Path::new("/no/such/image.jpg"));
        assert!(NaiveDateTime::parse_from_str(&stamp, CANONICAL_FORMAT).is_ok());
    }

    #[test]
    fn dated_frames_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (1..=3)
            .map(|index| {
                let path = dir.path().join(format!("img_{index:03}.png"));
                image::RgbImage::new(2, 2).save(&path).unwrap();
                path
            })
            .collect();
        let frames = dated_frames(&paths);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().zip(&paths).all(|(frame, path)| &frame.path == path));
        assert!(frames.iter().all(|frame| frame.display_text.is_some()));
    }
}
