use serde::{Deserialize, Serialize};

use crate::distance::{haversine_m, Coordinate};

/// A named circular attendance area, scoped to one company.
///
/// Administrator-managed; the pipeline only ever reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceZone {
    pub id: i64,
    pub scope: String,
    pub name: String,
    pub center: Coordinate,
    pub radius_m: f64,
}

/// Outcome of evaluating a position against the configured zones.
#[derive(Debug, Clone, PartialEq)]
pub enum FenceDecision {
    Allowed,
    Rejected { message: String },
}

impl FenceDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, FenceDecision::Allowed)
    }
}

/// Evaluate a requester position against the configured zones.
///
/// No zones configured means geofencing is disabled: always allowed.
/// With zones configured, a missing or unset position is rejected outright.
/// Otherwise the first zone whose distance is within its radius allows the
/// request. A zone whose distance cannot be computed (unset center) is
/// skipped and never reported as the closest zone.
pub fn evaluate(position: Option<Coordinate>, zones: &[GeofenceZone]) -> FenceDecision {
    if zones.is_empty() {
        return FenceDecision::Allowed;
    }

    let Some(position) = position.filter(Coordinate::is_set) else {
        return FenceDecision::Rejected {
            message: "Location (latitude & longitude) is required when geofencing is enabled"
                .to_string(),
        };
    };

    let mut closest: Option<(&GeofenceZone, f64)> = None;

    for zone in zones {
        let Some(dist) = haversine_m(zone.center, position) else {
            tracing::warn!(zone = %zone.name, "zone has unset center; skipping");
            continue;
        };

        if dist <= zone.radius_m {
            tracing::debug!(zone = %zone.name, dist_m = dist, "position inside zone");
            return FenceDecision::Allowed;
        }

        if closest.map_or(true, |(_, best)| dist < best) {
            closest = Some((zone, dist));
        }
    }

    let mut message = String::from("You are not within any allowed attendance area.");
    if let Some((zone, dist)) = closest {
        message.push_str(&format!(
            "\nClosest location: {} ({:.0}m away)",
            zone.name, dist
        ));
    }

    FenceDecision::Rejected { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(name: &str, lat: f64, lon: f64, radius_m: f64) -> GeofenceZone {
        GeofenceZone {
            id: 0,
            scope: "default".to_string(),
            name: name.to_string(),
            center: Coordinate::new(lat, lon),
            radius_m,
        }
    }

    #[test]
    fn no_zones_always_allows() {
        assert!(evaluate(None, &[]).is_allowed());
        assert!(evaluate(Some(Coordinate::new(10.0, 10.0)), &[]).is_allowed());
    }

    #[test]
    fn zones_without_position_reject() {
        let zones = [zone("HQ", 10.0, 10.0, 100.0)];
        let decision = evaluate(None, &zones);
        let FenceDecision::Rejected { message } = decision else {
            panic!("expected rejection");
        };
        assert!(message.contains("required"));
    }

    #[test]
    fn unset_position_counts_as_missing() {
        let zones = [zone("HQ", 10.0, 10.0, 100.0)];
        let decision = evaluate(Some(Coordinate::new(0.0, 0.0)), &zones);
        assert!(!decision.is_allowed());
    }

    #[test]
    fn boundary_radius_is_inclusive() {
        // 1° of latitude ≈ 111195 m; a radius of exactly that distance allows.
        let position = Coordinate::new(11.0, 10.0);
        let d = haversine_m(Coordinate::new(10.0, 10.0), position).unwrap();

        let inside = [zone("HQ", 10.0, 10.0, d)];
        assert!(evaluate(Some(position), &inside).is_allowed());

        let outside = [zone("HQ", 10.0, 10.0, d - 1.0)];
        assert!(!evaluate(Some(position), &outside).is_allowed());
    }

    #[test]
    fn rejection_cites_closest_zone() {
        let zones = [
            zone("Warehouse", 12.0, 10.0, 50.0),
            zone("HQ", 10.5, 10.0, 50.0),
        ];
        let decision = evaluate(Some(Coordinate::new(10.0, 10.0)), &zones);
        let FenceDecision::Rejected { message } = decision else {
            panic!("expected rejection");
        };
        assert!(message.contains("HQ"), "{message}");
        assert!(message.contains("m away"), "{message}");
        assert!(!message.contains("Warehouse"), "{message}");
    }

    #[test]
    fn rejection_never_cites_unset_zone() {
        let zones = [zone("Ghost", 0.0, 0.0, 50.0), zone("HQ", 12.0, 10.0, 50.0)];
        let decision = evaluate(Some(Coordinate::new(10.0, 10.0)), &zones);
        let FenceDecision::Rejected { message } = decision else {
            panic!("expected rejection");
        };
        assert!(!message.contains("Ghost"), "{message}");
        assert!(message.contains("HQ"), "{message}");
    }

    #[test]
    fn all_zones_unset_rejects_without_closest_line() {
        let zones = [zone("Ghost", 0.0, 0.0, 50.0)];
        let decision = evaluate(Some(Coordinate::new(10.0, 10.0)), &zones);
        let FenceDecision::Rejected { message } = decision else {
            panic!("expected rejection");
        };
        assert!(!message.contains("Closest location"), "{message}");
    }

    #[test]
    fn any_matching_zone_allows() {
        let zones = [
            zone("Far", 50.0, 50.0, 10.0),
            zone("Near", 10.0, 10.0, 1_000.0),
        ];
        assert!(evaluate(Some(Coordinate::new(10.001, 10.0)), &zones).is_allowed());
    }
}
