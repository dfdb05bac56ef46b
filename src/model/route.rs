use serde::{Deserialize, Serialize};

use super::gtfs_model::GtfsRoute;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub short_name: String,
    pub long_name: Option<String>,
    pub route_type: u16,
}

impl From<GtfsRoute> for Route {
    fn from(value: GtfsRoute) -> Self {
        let short_name = value
            .route_short_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| value.route_id.clone());

        Route {
            route_id: value.route_id,
            short_name,
            long_name: value.route_long_name.filter(|name| !name.is_empty()),
            route_type: value.route_type,
        }
    }
}
