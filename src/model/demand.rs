use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

pub const MIN_DEMAND_SCORE: f64 = 0.0;
pub const MAX_DEMAND_SCORE: f64 = 100.0;

/// One (stop, hour, day) bucket of aggregated demand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandFeatureRow {
    pub stop_id: String,
    /// 0-23
    pub hour: u8,
    /// 0 is Monday, 6 is Sunday
    pub day_of_week: u8,
    /// 0-1
    pub avg_occupancy: f64,
    pub trip_count: u32,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(serialize_with = "bool_as_int", deserialize_with = "bool_from_int")]
    pub is_weekend: bool,
    #[serde(serialize_with = "bool_as_int", deserialize_with = "bool_from_int")]
    pub is_rush_hour: bool,
    /// 0-100
    pub demand_score: f64,
}

impl DemandFeatureRow {
    /// Builds a row and derives the weekend/rush flags and the demand score.
    pub fn aggregate(
        stop_id: String,
        hour: u8,
        day_of_week: u8,
        avg_occupancy: f64,
        trip_count: u32,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        DemandFeatureRow {
            stop_id,
            hour,
            day_of_week,
            avg_occupancy,
            trip_count,
            latitude,
            longitude,
            is_weekend: is_weekend(day_of_week),
            is_rush_hour: is_rush_hour(hour),
            demand_score: clip_demand(avg_occupancy * trip_count as f64 * 20.0),
        }
    }
}

pub fn is_weekend(day_of_week: u8) -> bool {
    day_of_week >= 5
}

/// 7-9 in the morning and 17-19 in the evening, inclusive.
pub fn is_rush_hour(hour: u8) -> bool {
    (7..=9).contains(&hour) || (17..=19).contains(&hour)
}

pub fn clip_demand(score: f64) -> f64 {
    if score.is_nan() {
        return MIN_DEMAND_SCORE;
    }
    score.clamp(MIN_DEMAND_SCORE, MAX_DEMAND_SCORE)
}

fn bool_as_int<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u8(u8::from(*value))
}

// pandas writes the flags as 0/1, hand edited files sometimes have true/false
fn bool_from_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;

    match s.trim() {
        "1" | "true" | "True" => Ok(true),
        "0" | "false" | "False" => Ok(false),
        other => Err(de::Error::custom(format!("invalid flag value {other:?}"))),
    }
}
