use serde::Serialize;

use super::stop::NearestStopMatch;

/// Coarse time of day used to pick service frequency.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBand {
    Peak,
    OffPeak,
    Night,
}

impl TimeBand {
    pub fn from_hour(hour: u8) -> Self {
        match hour {
            h if crate::model::demand::is_rush_hour(h) => TimeBand::Peak,
            5..=21 => TimeBand::OffPeak,
            _ => TimeBand::Night,
        }
    }
}

/// A way of covering an origin to destination trip on one known route.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteOption {
    pub route_id: String,
    pub route_name: String,
    pub estimated_travel_minutes: u32,
    pub estimated_cost: f64,
    pub frequency_minutes: u32,
    pub time_band: TimeBand,
}

/// Origin to destination suggestion built from matched stops and the fastest option.
#[derive(Clone, Debug, Serialize)]
pub struct TripPlan {
    pub origin_stops: Vec<NearestStopMatch>,
    pub destination_stops: Vec<NearestStopMatch>,
    pub fastest_route: RouteOption,
    pub alternatives: Vec<RouteOption>,
    pub total_distance_km: f64,
    pub walking_time_minutes: u32,
    pub total_time_minutes: u32,
    pub total_cost: f64,
    pub recommendations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::TimeBand;

    #[test]
    fn test_time_band_from_hour() {
        assert_eq!(TimeBand::from_hour(8), TimeBand::Peak);
        assert_eq!(TimeBand::from_hour(18), TimeBand::Peak);
        assert_eq!(TimeBand::from_hour(12), TimeBand::OffPeak);
        assert_eq!(TimeBand::from_hour(5), TimeBand::OffPeak);
        assert_eq!(TimeBand::from_hour(22), TimeBand::Night);
        assert_eq!(TimeBand::from_hour(2), TimeBand::Night);
    }
}
