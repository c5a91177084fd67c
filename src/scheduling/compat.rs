use std::sync::Arc;

use tracing::{debug, info};

use super::geo::{DistanceProvider, GeoError};

/// Detour allowance for the along-route test: the new pickup may stretch the
/// existing route by at most 30%.
const DETOUR_TOLERANCE: f64 = 1.3;

/// Maximum angle between the two routes' direction vectors, in degrees.
const MAX_DIRECTION_ANGLE_DEG: f64 = 60.0;

/// The best combined route may be at most 50% longer than the two trips
/// driven separately.
const COMBINED_EFFICIENCY_LIMIT: f64 = 1.5;

/// Decides whether two routes can share a vehicle without backtracking,
/// direction conflicts, or an inefficient combined tour.
///
/// All three sub-tests must pass. Any distance or geocode failure, including
/// a zero or negative distance from the provider, makes the pair
/// incompatible: on ambiguous data we prefer not sharing a ride.
pub struct RouteCompatibilityChecker {
    provider: Arc<dyn DistanceProvider>,
}

impl RouteCompatibilityChecker {
    pub fn new(provider: Arc<dyn DistanceProvider>) -> Self {
        Self { provider }
    }

    /// True when the candidate route may safely share a slot with the
    /// existing route.
    pub fn compatible(
        &self,
        existing_pickup: &str,
        existing_drop: &str,
        new_pickup: &str,
        new_drop: &str,
    ) -> bool {
        match self.evaluate(existing_pickup, existing_drop, new_pickup, new_drop) {
            Ok(verdict) => verdict,
            Err(err) => {
                info!(
                    existing = %format_args!("{existing_pickup} -> {existing_drop}"),
                    candidate = %format_args!("{new_pickup} -> {new_drop}"),
                    %err,
                    "distance data unavailable, treating routes as incompatible"
                );
                false
            }
        }
    }

    fn evaluate(
        &self,
        existing_pickup: &str,
        existing_drop: &str,
        new_pickup: &str,
        new_drop: &str,
    ) -> Result<bool, GeoError> {
        if !self.pickup_along_route(existing_pickup, existing_drop, new_pickup)? {
            debug!(%new_pickup, "new pickup requires backtracking from the existing route");
            return Ok(false);
        }

        if !self.same_general_direction(existing_pickup, existing_drop, new_pickup, new_drop)? {
            debug!("routes head in different directions");
            return Ok(false);
        }

        if !self.combined_route_efficient(existing_pickup, existing_drop, new_pickup, new_drop)? {
            debug!("combined route is inefficient");
            return Ok(false);
        }

        Ok(true)
    }

    /// Distance lookup that refuses the provider's degenerate answers.
    fn distance(&self, origin: &str, destination: &str) -> Result<f64, GeoError> {
        let meters = self.provider.road_distance(origin, destination)?;
        if meters <= 0.0 {
            return Err(GeoError::InvalidDistance {
                origin: origin.to_string(),
                destination: destination.to_string(),
                meters,
            });
        }
        Ok(meters)
    }

    /// The new pickup must lie roughly along the existing route:
    /// d(ep, np) + d(np, ed) <= d(ep, ed) * tolerance.
    fn pickup_along_route(
        &self,
        existing_pickup: &str,
        existing_drop: &str,
        new_pickup: &str,
    ) -> Result<bool, GeoError> {
        let direct = self.distance(existing_pickup, existing_drop)?;
        let to_pickup = self.distance(existing_pickup, new_pickup)?;
        let onward = self.distance(new_pickup, existing_drop)?;

        let along = to_pickup + onward <= direct * DETOUR_TOLERANCE;
        debug!(
            direct_km = direct / 1000.0,
            via_pickup_km = (to_pickup + onward) / 1000.0,
            along,
            "along-route check"
        );
        Ok(along)
    }

    /// Both routes must point the same general way. Direction vectors are
    /// raw coordinate deltas (drop minus pickup), not great-circle corrected;
    /// a zero-magnitude vector means the pair cannot be judged.
    fn same_general_direction(
        &self,
        existing_pickup: &str,
        existing_drop: &str,
        new_pickup: &str,
        new_drop: &str,
    ) -> Result<bool, GeoError> {
        let (ep_lat, ep_lng) = self.provider.geocode(existing_pickup)?;
        let (ed_lat, ed_lng) = self.provider.geocode(existing_drop)?;
        let (np_lat, np_lng) = self.provider.geocode(new_pickup)?;
        let (nd_lat, nd_lng) = self.provider.geocode(new_drop)?;

        let existing = (ed_lat - ep_lat, ed_lng - ep_lng);
        let candidate = (nd_lat - np_lat, nd_lng - np_lng);

        let existing_magnitude = (existing.0 * existing.0 + existing.1 * existing.1).sqrt();
        let candidate_magnitude = (candidate.0 * candidate.0 + candidate.1 * candidate.1).sqrt();
        if existing_magnitude == 0.0 || candidate_magnitude == 0.0 {
            return Ok(false);
        }

        let dot = existing.0 * candidate.0 + existing.1 * candidate.1;
        let cos_angle = (dot / (existing_magnitude * candidate_magnitude)).clamp(-1.0, 1.0);
        let angle_deg = cos_angle.acos().to_degrees();

        debug!(angle_deg, "direction check");
        Ok(angle_deg <= MAX_DIRECTION_ANGLE_DEG)
    }

    /// The cheapest tour serving both trips must not exceed 1.5x the two
    /// trips driven separately. Four three-leg orderings are plausible, each
    /// visiting both pickups before its own drop.
    fn combined_route_efficient(
        &self,
        existing_pickup: &str,
        existing_drop: &str,
        new_pickup: &str,
        new_drop: &str,
    ) -> Result<bool, GeoError> {
        let existing_direct = self.distance(existing_pickup, existing_drop)?;
        let new_direct = self.distance(new_pickup, new_drop)?;
        let separate_total = existing_direct + new_direct;

        let orderings = [
            [existing_pickup, new_pickup, existing_drop, new_drop],
            [existing_pickup, new_pickup, new_drop, existing_drop],
            [new_pickup, existing_pickup, existing_drop, new_drop],
            [new_pickup, existing_pickup, new_drop, existing_drop],
        ];

        let mut best_combined = f64::INFINITY;
        for ordering in orderings {
            let total = self.distance(ordering[0], ordering[1])?
                + self.distance(ordering[1], ordering[2])?
                + self.distance(ordering[2], ordering[3])?;
            best_combined = best_combined.min(total);
        }

        let efficient = best_combined <= separate_total * COMBINED_EFFICIENCY_LIMIT;
        debug!(
            separate_km = separate_total / 1000.0,
            combined_km = best_combined / 1000.0,
            efficient,
            "combined-efficiency check"
        );
        Ok(efficient)
    }
}
