//! Geo Distance Function
//!
//! Ranks servers by great-circle distance to the caller using the
//! `latitude`/`longitude` fields of their metadata.

use std::collections::HashMap;
use tracing::trace;

use crate::metadata::ServerMetadata;

/// Mean earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distances closer than this are treated as ties
const TIE_EPSILON_KM: f64 = 1e-6;

/// Haversine distance in kilometres between two (latitude, longitude) points
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Addresses tied for the minimum distance to (`lat`, `lon`).
///
/// `metadata` maps server address to its raw metadata value. Servers without
/// valid coordinates are not candidates. The result is sorted and empty when
/// no server declares coordinates.
pub fn closest_servers(lat: f64, lon: f64, metadata: &HashMap<String, String>) -> Vec<String> {
    let mut best = f64::INFINITY;
    let mut closest: Vec<String> = Vec::new();

    for (address, raw) in metadata {
        let Some((server_lat, server_lon)) = ServerMetadata::parse(raw).coordinates() else {
            continue;
        };

        let distance = great_circle_distance(lat, lon, server_lat, server_lon);
        if distance < best - TIE_EPSILON_KM {
            best = distance;
            closest.clear();
            closest.push(address.clone());
        } else if (distance - best).abs() <= TIE_EPSILON_KM {
            closest.push(address.clone());
        }
    }

    closest.sort();
    trace!(candidates = closest.len(), distance_km = best, "Closest servers ranked");
    closest
}
