use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position in decimal degrees.
///
/// The host HR system persists unconfigured coordinates as `0.0`, so a zero
/// scalar is treated as unset throughout this crate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Both scalars present: finite and non-zero.
    pub fn is_set(&self) -> bool {
        is_set(self.latitude) && is_set(self.longitude)
    }
}

fn is_set(v: f64) -> bool {
    v.is_finite() && v != 0.0
}

/// Haversine great-circle distance between two coordinates, in meters.
///
/// Returns `None` when any of the four scalars is unset.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> Option<f64> {
    if !a.is_set() || !b.is_set() {
        return None;
    }

    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    Some(EARTH_RADIUS_M * c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric() {
        let a = Coordinate::new(48.8566, 2.3522);
        let b = Coordinate::new(51.5074, -0.1278);
        let ab = haversine_m(a, b).unwrap();
        let ba = haversine_m(b, a).unwrap();
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = Coordinate::new(10.0, 10.0);
        assert_eq!(haversine_m(a, a), Some(0.0));
    }

    #[test]
    fn one_degree_of_latitude() {
        // 1° of latitude ≈ 111.19 km on a 6371 km sphere.
        let a = Coordinate::new(10.0, 10.0);
        let b = Coordinate::new(11.0, 10.0);
        let d = haversine_m(a, b).unwrap();
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn unset_scalar_yields_none() {
        let set = Coordinate::new(10.0, 10.0);
        assert_eq!(haversine_m(Coordinate::new(0.0, 10.0), set), None);
        assert_eq!(haversine_m(set, Coordinate::new(10.0, 0.0)), None);
        assert_eq!(haversine_m(Coordinate::new(f64::NAN, 10.0), set), None);
    }

    #[test]
    fn paris_to_london_sanity() {
        let paris = Coordinate::new(48.8566, 2.3522);
        let london = Coordinate::new(51.5074, -0.1278);
        let d = haversine_m(paris, london).unwrap();
        // ~343-344 km
        assert!((300_000.0..400_000.0).contains(&d), "got {d}");
    }
}
