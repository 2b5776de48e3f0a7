//! ETA estimation.
//!
//! `ETA = ceil(((distance_km / speed_kmh) * 60 + prep_min) * 1.2)`.
//! Speeds and preparation times are per vehicle; the 1.2 factor is urban
//! traffic overhead.

use pazar_core::events::VehicleType;

/// Urban traffic overhead applied to the whole estimate.
const TRAFFIC_FACTOR: f64 = 1.2;

/// Assumed travel speed per vehicle, km/h. Cars are slower than motorbikes
/// in city traffic.
#[must_use]
pub const fn speed_kmh(vehicle: VehicleType) -> f64 {
    match vehicle {
        VehicleType::Walking => 5.0,
        VehicleType::Bicycle => 15.0,
        VehicleType::Motorbike => 30.0,
        VehicleType::Car => 25.0,
    }
}

/// Minutes the courier needs before moving (gear up, park, find the door).
#[must_use]
pub const fn prep_minutes(vehicle: VehicleType) -> f64 {
    match vehicle {
        VehicleType::Walking => 5.0,
        VehicleType::Bicycle => 3.0,
        VehicleType::Motorbike => 2.0,
        VehicleType::Car => 2.0,
    }
}

/// Estimated minutes for a courier on `vehicle` to cover `distance_km`,
/// rounded up to a whole minute.
#[must_use]
pub fn calculate_eta_minutes(distance_km: f64, vehicle: VehicleType) -> i32 {
    let travel_minutes = distance_km / speed_kmh(vehicle) * 60.0;
    let total = (travel_minutes + prep_minutes(vehicle)) * TRAFFIC_FACTOR;
    total.ceil() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_motorbike_is_three_minutes() {
        // ceil((0 + 2) * 1.2) = ceil(2.4) = 3
        assert_eq!(calculate_eta_minutes(0.0, VehicleType::Motorbike), 3);
    }

    #[test]
    fn bicycle_five_km() {
        // 5 / 15 * 60 = 20, + 3 prep = 23, * 1.2 = 27.6 -> 28
        assert_eq!(calculate_eta_minutes(5.0, VehicleType::Bicycle), 28);
    }

    #[test]
    fn walking_one_km() {
        // 1 / 5 * 60 = 12, + 5 prep = 17, * 1.2 = 20.4 -> 21
        assert_eq!(calculate_eta_minutes(1.0, VehicleType::Walking), 21);
    }

    #[test]
    fn car_is_slower_than_motorbike_over_distance() {
        let car = calculate_eta_minutes(10.0, VehicleType::Car);
        let motorbike = calculate_eta_minutes(10.0, VehicleType::Motorbike);
        assert!(car > motorbike, "car {car} vs motorbike {motorbike}");
    }

    #[test]
    fn whole_minute_results_do_not_round_up() {
        // 4 / 30 * 60 = 8, + 2 prep = 10, * 1.2 = 12.0 exactly
        assert_eq!(calculate_eta_minutes(4.0, VehicleType::Motorbike), 12);
    }
}
