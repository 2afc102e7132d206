//! Media records as delivered by the scanner and enrichment stages.
//!
//! Everything here is read-only input: EXIF extraction, quality scoring and
//! face detection happen upstream and only their results land in [`Media`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type MediaId = i64;
pub type PersonId = i64;

/// Quality used when the scorer produced nothing for a file.
pub const NEUTRAL_QUALITY: f64 = 0.5;

/// Point-of-interest tags attached by the reverse geocoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoiInfo {
    /// Top-level class, e.g. `tourism`, `aeroway`, `railway`.
    #[serde(default)]
    pub class: Option<String>,

    /// Value within the class, e.g. `museum`, `aerodrome`, `station`.
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Extra free-form `key=value` tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A single photo or video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,

    #[serde(default)]
    pub path: String,

    /// Capture instant. Media without one cannot be placed on a day.
    #[serde(default)]
    pub taken_at: Option<DateTime<Utc>>,

    /// UTC offset recorded by the camera (EXIF OffsetTimeOriginal), in minutes.
    #[serde(default)]
    pub tz_offset_minutes: Option<i32>,

    /// IANA zone name from the geocoder, e.g. `Europe/Lisbon`.
    #[serde(default)]
    pub tz_identifier: Option<String>,

    #[serde(default)]
    pub gps_latitude: Option<f64>,

    #[serde(default)]
    pub gps_longitude: Option<f64>,

    #[serde(default)]
    pub country_code: Option<String>,

    #[serde(default)]
    pub poi: Option<PoiInfo>,

    /// Aggregated image quality in `[0, 1]`.
    #[serde(default)]
    pub quality_score: Option<f64>,

    /// Perceptual hash, hex or base64, optionally prefixed `hex:`/`base64:`.
    #[serde(default)]
    pub phash: Option<String>,

    #[serde(default)]
    pub person_ids: Vec<PersonId>,

    #[serde(default)]
    pub face_count: u32,

    /// Share of the frame covered by the largest detected face.
    #[serde(default)]
    pub largest_face_ratio: Option<f64>,

    #[serde(default)]
    pub is_video: bool,
}

impl Media {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.gps_latitude, self.gps_longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn has_gps(&self) -> bool {
        self.coordinates().is_some()
    }

    pub fn quality(&self) -> f64 {
        match self.quality_score {
            Some(q) if q.is_finite() => q.clamp(0.0, 1.0),
            _ => NEUTRAL_QUALITY,
        }
    }

    pub fn perceptual_hash(&self) -> Option<PerceptualHash> {
        self.phash.as_deref().and_then(PerceptualHash::parse)
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.taken_at.map(|t| t.timestamp())
    }
}

fn looks_like_hex_words(value: &str) -> bool {
    !value.is_empty() && value.len() % 16 == 0 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Decoded perceptual hash bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PerceptualHash(Box<[u8]>);

impl PerceptualHash {
    /// Parse a hash string.
    ///
    /// `hex:` and `base64:`/`b64:` prefixes force the encoding. Without one,
    /// hex is assumed only for whole 64-bit words of hex digits; anything
    /// else is read as the base64 form produced by `img_hash`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix("hex:") {
            return Self::from_hex(hex.trim());
        }
        if let Some(b64) = value
            .strip_prefix("base64:")
            .or_else(|| value.strip_prefix("b64:"))
        {
            return Self::from_base64(b64.trim());
        }

        if looks_like_hex_words(value) {
            Self::from_hex(value)
        } else {
            Self::from_base64(value)
        }
    }

    fn from_base64(value: &str) -> Option<Self> {
        use img_hash::ImageHash;

        if value.is_empty() {
            return None;
        }
        ImageHash::<Box<[u8]>>::from_base64(value)
            .ok()
            .map(|h| Self(h.as_bytes().to_vec().into_boxed_slice()))
    }

    fn from_hex(value: &str) -> Option<Self> {
        if value.is_empty() || value.len() % 2 != 0 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let bytes = (0..value.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&value[i..i + 2], 16).ok())
            .collect::<Option<Vec<u8>>>()?;
        Some(Self(bytes.into_boxed_slice()))
    }

    pub fn bits(&self) -> u32 {
        (self.0.len() * 8) as u32
    }

    /// Hamming distance. Bytes present in only one hash count as fully different.
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        let common: u32 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        let extra = self.0.len().abs_diff(other.0.len()) as u32 * 8;
        common + extra
    }

    /// Similarity in `[0, 1]` derived from the Hamming distance.
    pub fn similarity(&self, other: &PerceptualHash) -> f64 {
        let bits = self.bits().max(other.bits());
        if bits == 0 {
            return 0.0;
        }
        1.0 - (self.distance(other) as f64 / bits as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_hash_distance() {
        let a = PerceptualHash::parse("ffff000000000000").unwrap();
        let b = PerceptualHash::parse("ff00000000000000").unwrap();
        assert_eq!(a.bits(), 64);
        assert_eq!(a.distance(&b), 8);
        assert_eq!(a.distance(&a), 0);
        assert!((a.similarity(&b) - 0.875).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_hash_is_absent() {
        assert!(PerceptualHash::parse("").is_none());
        assert!(PerceptualHash::parse("   ").is_none());
        assert!(PerceptualHash::parse("hex:").is_none());
        assert!(PerceptualHash::parse("hex:abc").is_none());
        assert!(PerceptualHash::parse("hex:zz").is_none());
    }

    #[test]
    fn test_base64_made_of_hex_digits() {
        // Twelve bytes encode to sixteen base64 characters that are all hex
        // digits; the prefix settles it.
        let hashed = PerceptualHash::parse("base64:0123456789abcdef").unwrap();
        assert_eq!(hashed.bits(), 96);
        let short = PerceptualHash::parse("b64:0123456789abcdef").unwrap();
        assert_eq!(short, hashed);

        // Unprefixed, a whole 64-bit word of hex digits reads as hex.
        assert_eq!(PerceptualHash::parse("0123456789abcdef").unwrap().bits(), 64);
        assert_eq!(
            PerceptualHash::parse("hex:0123456789abcdef"),
            PerceptualHash::parse("0123456789abcdef")
        );
    }

    #[test]
    fn test_short_hex_like_string_reads_as_base64() {
        // Twelve characters is not a whole 64-bit hex word.
        let hashed = PerceptualHash::parse("abcdefabcdef").unwrap();
        assert_eq!(hashed.bits(), 72);
    }

    #[test]
    fn test_quality_defaults_to_neutral() {
        let mut media = Media::default();
        assert_eq!(media.quality(), NEUTRAL_QUALITY);
        media.quality_score = Some(f64::NAN);
        assert_eq!(media.quality(), NEUTRAL_QUALITY);
        media.quality_score = Some(1.4);
        assert_eq!(media.quality(), 1.0);
    }

    #[test]
    fn test_coordinates_require_both_axes() {
        let mut media = Media {
            gps_latitude: Some(48.1),
            ..Default::default()
        };
        assert!(!media.has_gps());
        media.gps_longitude = Some(11.5);
        assert_eq!(media.coordinates(), Some((48.1, 11.5)));
    }
}
