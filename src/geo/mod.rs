//! Great-circle distance and nearby-restaurant ranking.

pub mod location;

use serde::{Deserialize, Serialize};

use crate::catalog::models::Restaurant;

pub use location::{locate, FixedLocation, GeocodedAddress, LocationProvider, Permission};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Radius used by the home screen when ranking restaurants.
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 10.0;

/// A point on the map, optionally with a human-readable address.
///
/// Used both for restaurant locations and for the device position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

pub type UserLocation = Location;

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Whether latitude/longitude lie in their geographic ranges.
    ///
    /// Distance math does not require this; callers decide whether to reject.
    pub fn is_in_range(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn distance_to(&self, other: &Location) -> f64 {
        distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

fn deg_to_rad(deg: f64) -> f64 {
    deg * (std::f64::consts::PI / 180.0)
}

/// Haversine distance in kilometres. Symmetric, and exactly 0 for identical points.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = deg_to_rad(lat2 - lat1);
    let d_lon = deg_to_rad(lon2 - lon1);
    let a = (d_lat / 2.0).sin().powi(2)
        + deg_to_rad(lat1).cos() * deg_to_rad(lat2).cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Restaurants within `max_distance_km` of `location`, closest first, paired with their distance.
///
/// Equal distances keep input order. Without a location nothing is ranked.
pub fn nearby_with_distance<'a>(
    location: Option<&Location>,
    restaurants: &'a [Restaurant],
    max_distance_km: f64,
) -> Vec<(&'a Restaurant, f64)> {
    let Some(location) = location else {
        return Vec::new();
    };

    let mut ranked: Vec<(&Restaurant, f64)> = restaurants
        .iter()
        .map(|r| (r, location.distance_to(&r.location)))
        .filter(|(_, d)| *d <= max_distance_km)
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked
}

pub fn nearby<'a>(
    location: Option<&Location>,
    restaurants: &'a [Restaurant],
    max_distance_km: f64,
) -> Vec<&'a Restaurant> {
    nearby_with_distance(location, restaurants, max_distance_km)
        .into_iter()
        .map(|(r, _)| r)
        .collect()
}

/// "850m" below one kilometre, "2.3km" otherwise.
pub fn format_distance(distance_km: f64) -> String {
    if distance_km < 1.0 {
        format!("{}m", (distance_km * 1000.0).round() as i64)
    } else {
        format!("{:.1}km", distance_km)
    }
}

pub fn restaurant_distance_label(location: Option<&Location>, restaurant: &Restaurant) -> String {
    match location {
        Some(location) => format_distance(location.distance_to(&restaurant.location)),
        None => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::Restaurant;

    fn restaurant(id: &str, lat: f64, lon: f64) -> Restaurant {
        Restaurant {
            id: id.into(),
            name: id.to_uppercase(),
            logo: String::new(),
            location: Location::new(lat, lon),
            is_premium: false,
        }
    }

    #[test]
    fn identical_points_are_zero_apart() {
        assert_eq!(distance_km(37.7749, -122.4194, 37.7749, -122.4194), 0.0);
        assert_eq!(distance_km(-91.0, 400.0, -91.0, 400.0), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            ((37.7749, -122.4194), (40.7128, -74.0060)),
            ((51.5074, -0.1278), (-33.8688, 151.2093)),
            ((0.0, 0.0), (0.0, 180.0)),
            ((89.9, 10.0), (-89.9, -170.0)),
            ((37.7749, -122.4194), (37.7850, -122.4200)),
        ];
        for ((a_lat, a_lon), (b_lat, b_lon)) in pairs {
            assert_eq!(
                distance_km(a_lat, a_lon, b_lat, b_lon),
                distance_km(b_lat, b_lon, a_lat, a_lon)
            );
        }
    }

    #[test]
    fn known_distances() {
        // San Francisco -> New York is roughly 4129 km.
        let d = distance_km(37.7749, -122.4194, 40.7128, -74.0060);
        assert!((d - 4129.0).abs() < 5.0, "got {d}");

        // Half the equator.
        let half = distance_km(0.0, 0.0, 0.0, 180.0);
        assert!((half - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn nearby_filters_and_sorts() {
        let user = Location::new(37.7749, -122.4194);
        let restaurants = vec![
            restaurant("far", 38.5816, -121.4944),
            restaurant("mid", 37.7850, -122.4200),
            restaurant("here", 37.7749, -122.4194),
            restaurant("close", 37.7800, -122.4194),
        ];
        let ranked = nearby_with_distance(Some(&user), &restaurants, DEFAULT_MAX_DISTANCE_KM);
        let ids: Vec<&str> = ranked.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["here", "close", "mid"]);
        assert!(ranked.windows(2).all(|w| w[0].1 <= w[1].1));
        assert!(ranked.iter().all(|(_, d)| *d <= DEFAULT_MAX_DISTANCE_KM));
    }

    #[test]
    fn nearby_keeps_input_order_for_ties() {
        let user = Location::new(0.0, 0.0);
        let restaurants = vec![
            restaurant("b", 0.01, 0.0),
            restaurant("a", 0.01, 0.0),
            restaurant("c", 0.01, 0.0),
        ];
        let ids: Vec<&str> = nearby(Some(&user), &restaurants, 10.0)
            .into_iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn nearby_without_location_is_empty() {
        let restaurants = vec![restaurant("here", 37.7749, -122.4194)];
        assert!(nearby(None, &restaurants, 10.0).is_empty());
        assert!(nearby(None, &restaurants, f64::INFINITY).is_empty());
    }

    #[test]
    fn nearby_respects_custom_radius() {
        let user = Location::new(37.7749, -122.4194);
        let restaurants = vec![restaurant("mid", 37.7850, -122.4200)];
        assert!(nearby(Some(&user), &restaurants, 0.5).is_empty());
        assert_eq!(nearby(Some(&user), &restaurants, 2.0).len(), 1);
    }

    #[test]
    fn formatting() {
        assert_eq!(format_distance(0.0), "0m");
        assert_eq!(format_distance(0.4567), "457m");
        assert_eq!(format_distance(0.9994), "999m");
        assert_eq!(format_distance(1.0), "1.0km");
        assert_eq!(format_distance(12.34), "12.3km");
    }

    #[test]
    fn label_for_same_point_and_unknown() {
        let r1 = restaurant("r1", 37.7749, -122.4194);
        let user = Location::new(37.7749, -122.4194);
        assert_eq!(restaurant_distance_label(Some(&user), &r1), "0m");
        assert_eq!(restaurant_distance_label(None, &r1), "Unknown");
    }

    #[test]
    fn range_check() {
        assert!(Location::new(37.7749, -122.4194).is_in_range());
        assert!(!Location::new(91.0, 0.0).is_in_range());
        assert!(!Location::new(0.0, -180.5).is_in_range());
        assert!(!Location::new(f64::NAN, 0.0).is_in_range());
    }
}
