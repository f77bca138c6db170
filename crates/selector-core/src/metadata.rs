//! Server metadata parsing
//!
//! Registry values are query strings such as
//! `weight=3&state=active&group=blue&latitude=39.9&longitude=116.4`.
//! Every field is parsed independently; a bad field never poisons the rest.

use url::form_urlencoded;

use crate::types::{ServerRecord, DEFAULT_WEIGHT};

/// Declared weight
pub const WEIGHT_KEY: &str = "weight";
/// Declared liveness tag
pub const STATE_KEY: &str = "state";
/// Logical partition tag
pub const GROUP_KEY: &str = "group";
/// Decimal latitude in degrees
pub const LATITUDE_KEY: &str = "latitude";
/// Decimal longitude in degrees
pub const LONGITUDE_KEY: &str = "longitude";

/// The only non-empty state that counts as eligible
pub const ACTIVE_STATE: &str = "active";

/// Parsed view of a server's metadata value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerMetadata {
    pub weight: Option<i64>,
    pub state: String,
    pub group: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ServerMetadata {
    /// Parse a raw query-string value. The first occurrence of a key wins.
    pub fn parse(raw: &str) -> Self {
        let mut meta = ServerMetadata::default();
        let (mut seen_weight, mut seen_state, mut seen_group) = (false, false, false);
        let (mut seen_lat, mut seen_lon) = (false, false);

        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            match &*key {
                WEIGHT_KEY if !seen_weight => {
                    seen_weight = true;
                    meta.weight = value.trim().parse::<i64>().ok().filter(|w| *w >= 0);
                }
                STATE_KEY if !seen_state => {
                    seen_state = true;
                    meta.state = value.into_owned();
                }
                GROUP_KEY if !seen_group => {
                    seen_group = true;
                    meta.group = value.into_owned();
                }
                LATITUDE_KEY if !seen_lat => {
                    seen_lat = true;
                    meta.latitude = parse_coordinate(&value, 90.0);
                }
                LONGITUDE_KEY if !seen_lon => {
                    seen_lon = true;
                    meta.longitude = parse_coordinate(&value, 180.0);
                }
                _ => {}
            }
        }

        meta
    }

    /// Declared weight, defaulting on absence or parse failure
    pub fn weight_or_default(&self) -> i64 {
        self.weight.unwrap_or(DEFAULT_WEIGHT)
    }

    /// Eligible when active (or stateless) and in the configured group
    pub fn is_eligible(&self, group: &str) -> bool {
        let active = self.state.is_empty() || self.state == ACTIVE_STATE;
        active && self.group == group
    }

    /// Declared coordinates, if both are present and valid
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    /// Build the weighted record for `key`
    pub fn to_record(&self, key: &str, raw: &str) -> ServerRecord {
        let mut record = ServerRecord::new(key).with_weight(self.weight_or_default());
        record.raw_metadata = raw.to_string();
        record.state = self.state.clone();
        record.group = self.group.clone();
        record
    }
}

fn parse_coordinate(value: &str, limit: f64) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_metadata() {
        let meta = ServerMetadata::parse("weight=3&state=active&group=blue&latitude=39.9&longitude=116.4");
        assert_eq!(meta.weight, Some(3));
        assert_eq!(meta.state, "active");
        assert_eq!(meta.group, "blue");
        assert_eq!(meta.coordinates(), Some((39.9, 116.4)));
        assert!(meta.is_eligible("blue"));
        assert!(!meta.is_eligible(""));
    }

    #[test]
    fn test_bad_fields_fall_back_independently() {
        let meta = ServerMetadata::parse("weight=heavy&latitude=north&longitude=10&group=");
        assert_eq!(meta.weight, None);
        assert_eq!(meta.weight_or_default(), DEFAULT_WEIGHT);
        assert_eq!(meta.latitude, None);
        assert_eq!(meta.longitude, Some(10.0));
        assert_eq!(meta.coordinates(), None);
        assert!(meta.is_eligible(""));
    }

    #[test]
    fn test_negative_weight_defaults() {
        let meta = ServerMetadata::parse("weight=-4");
        assert_eq!(meta.weight_or_default(), 1);
    }

    #[test]
    fn test_state_eligibility() {
        assert!(ServerMetadata::parse("").is_eligible(""));
        assert!(ServerMetadata::parse("state=active").is_eligible(""));
        assert!(!ServerMetadata::parse("state=inactive").is_eligible(""));
        assert!(!ServerMetadata::parse("group=red").is_eligible("blue"));
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        let meta = ServerMetadata::parse("latitude=91&longitude=0");
        assert_eq!(meta.coordinates(), None);
    }

    #[test]
    fn test_to_record() {
        let raw = "weight=5&state=active&group=g1";
        let record = ServerMetadata::parse(raw).to_record("tcp@10.0.0.1:80", raw);
        assert_eq!(record.key, "tcp@10.0.0.1:80");
        assert_eq!(record.weight, 5);
        assert_eq!(record.effective_weight, 5);
        assert_eq!(record.current_weight, 0);
        assert_eq!(record.group, "g1");
        assert_eq!(record.raw_metadata, raw);
    }
}
