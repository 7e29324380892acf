//! The reference sensor-reading payload.
//!
//! Rill carries opaque payloads; this module provides the one payload
//! type the client is tested against: a coffee-machine sensor reading
//! with a numeric value, a timestamp, and a categorical tag.
//!
//! The encoding is self-describing UTF-8 JSON, so field types can be
//! recovered without an external schema. For every well-formed reading
//! `r`, `decode(encode(r)) == r` (JSON float printing uses the shortest
//! representation that round-trips a finite f64).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

/// A single coffee-machine sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Measured water temperature.
    pub water_temperature: f64,
    /// When the reading was taken, milliseconds since the Unix epoch.
    pub reading_time_ms: i64,
    /// Categorical sensor tag (e.g. the coffee type being brewed).
    pub sensor_tag: String,
}

impl SensorReading {
    /// Creates a new reading.
    #[must_use]
    pub fn new(water_temperature: f64, reading_time_ms: i64, sensor_tag: impl Into<String>) -> Self {
        Self {
            water_temperature,
            reading_time_ms,
            sensor_tag: sensor_tag.into(),
        }
    }

    /// Encodes the reading to its wire payload.
    ///
    /// # Errors
    /// Returns [`CodecError::Encode`] if serialization fails (a
    /// non-finite temperature is the only practical cause).
    pub fn encode(&self) -> CodecResult<Bytes> {
        if !self.water_temperature.is_finite() {
            return Err(CodecError::Encode {
                message: "water_temperature must be finite".to_string(),
            });
        }
        let raw = serde_json::to_vec(self).map_err(|e| CodecError::Encode {
            message: e.to_string(),
        })?;
        Ok(Bytes::from(raw))
    }

    /// Decodes a reading from a wire payload.
    ///
    /// # Errors
    /// Returns [`CodecError::Decode`] on malformed or truncated input.
    pub fn decode(payload: &[u8]) -> CodecResult<Self> {
        serde_json::from_slice(payload).map_err(|e| CodecError::Decode {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_reading_roundtrip() {
        let original = SensorReading::new(93.7, 1_700_000_000_000, "espresso");
        let encoded = original.encode().unwrap();
        let decoded = SensorReading::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_reading_roundtrip_randomized() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let original = SensorReading::new(
                rng.gen::<f64>() * 100.0,
                rng.gen_range(0..=i64::MAX / 2),
                ["a", "b", "c"][rng.gen_range(0..3)],
            );
            let decoded = SensorReading::decode(&original.encode().unwrap()).unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn test_reading_encoding_is_self_describing() {
        let reading = SensorReading::new(81.5, 12345, "ristretto");
        let encoded = reading.encode().unwrap();
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.contains("water_temperature"));
        assert!(text.contains("sensor_tag"));
    }

    #[test]
    fn test_decode_malformed() {
        let err = SensorReading::decode(b"not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }

    #[test]
    fn test_decode_truncated() {
        let encoded = SensorReading::new(90.0, 1, "a").encode().unwrap();
        let err = SensorReading::decode(&encoded[..encoded.len() - 2]).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        let reading = SensorReading::new(f64::NAN, 0, "a");
        assert!(matches!(
            reading.encode(),
            Err(CodecError::Encode { .. })
        ));
    }
}
