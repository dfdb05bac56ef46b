//! Static GTFS feed tables.
use std::collections::HashMap;
use std::path::Path;

use anyhow::Error;
use itertools::Itertools;
use tracing::info;

use super::csv_files::read_records;
use crate::model::gtfs_model::{GtfsRoute, GtfsStop, GtfsStopTime, GtfsTrip};
use crate::model::route::Route;
use crate::model::stop::Stop;

#[tracing::instrument(err)]
pub fn read_stops(gtfs_dir: &Path) -> Result<Vec<Stop>, Error> {
    let stops = read_records::<GtfsStop>(&gtfs_dir.join("stops.txt"))?
        .into_iter()
        .map(Stop::from)
        .collect_vec();

    info!("got {} stops", stops.len());

    Ok(stops)
}

#[tracing::instrument(err)]
pub fn read_routes(gtfs_dir: &Path) -> Result<Vec<Route>, Error> {
    let routes = read_records::<GtfsRoute>(&gtfs_dir.join("routes.txt"))?
        .into_iter()
        .map(Route::from)
        .collect_vec();

    info!("got {} routes", routes.len());

    Ok(routes)
}

#[tracing::instrument(err)]
pub fn read_stop_times(gtfs_dir: &Path) -> Result<Vec<GtfsStopTime>, Error> {
    let stop_times = read_records::<GtfsStopTime>(&gtfs_dir.join("stop_times.txt"))?;

    info!("got {} stop times", stop_times.len());

    Ok(stop_times)
}

/// trip_id to route_id. Empty when the feed has no trips.txt.
#[tracing::instrument(err)]
pub fn read_trip_routes(gtfs_dir: &Path) -> Result<HashMap<String, String>, Error> {
    let path = gtfs_dir.join("trips.txt");
    if !path.exists() {
        info!("no trips.txt, pings will carry an unknown route");
        return Ok(HashMap::new());
    }

    let trips = read_records::<GtfsTrip>(&path)?
        .into_iter()
        .map(|t| (t.trip_id, t.route_id))
        .collect();

    Ok(trips)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;

    fn feed_dir(name: &str) -> anyhow::Result<PathBuf> {
        let dir = std::env::temp_dir().join(format!(
            "transit_demand_{}_{}",
            std::process::id(),
            name
        ));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    #[test]
    fn test_read_feed_with_extra_columns() -> anyhow::Result<()> {
        let dir = feed_dir("gtfs_extra_columns")?;

        fs::write(
            dir.join("stops.txt"),
            "stop_id,stop_code,stop_name,stop_lat,stop_lon,location_type\n\
             S1,001, Circle ,5.5700,-0.2100,0\n\
             S2,002,,5.5650,-0.2350,0\n",
        )?;
        fs::write(
            dir.join("routes.txt"),
            "route_id,agency_id,route_short_name,route_long_name,route_type,route_color\n\
             R1,A,,Circle - Kaneshie,3,FF0000\n\
             R2,A,207,,700,\n",
        )?;
        fs::write(
            dir.join("stop_times.txt"),
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\nT1,06:00:00,06:00:00,S1,1\n",
        )?;

        let stops = read_stops(&dir)?;
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].stop_name, "Circle");
        assert_eq!(stops[1].stop_name, "Stop S2");
        assert_eq!(stops[1].longitude, -0.235);

        let routes = read_routes(&dir)?;
        assert_eq!(routes[0].short_name, "R1");
        assert_eq!(routes[0].long_name.as_deref(), Some("Circle - Kaneshie"));
        assert_eq!(routes[1].short_name, "207");
        assert_eq!(routes[1].long_name, None);
        assert_eq!(routes[1].route_type, 700);

        let stop_times = read_stop_times(&dir)?;
        assert_eq!(stop_times.len(), 1);
        assert_eq!(stop_times[0].stop_id, "S1");

        assert!(read_trip_routes(&dir)?.is_empty());

        fs::remove_dir_all(&dir)?;

        Ok(())
    }

    #[test]
    fn test_bad_coordinate_names_the_record() -> anyhow::Result<()> {
        let dir = feed_dir("gtfs_bad_coordinate")?;
        fs::write(
            dir.join("stops.txt"),
            "stop_id,stop_name,stop_lat,stop_lon\nS1,A,5.57,-0.21\nS2,B,north,-0.23\n",
        )?;

        let err = read_stops(&dir).unwrap_err();
        assert!(format!("{err:#}").contains("record 3"));

        fs::remove_dir_all(&dir)?;

        Ok(())
    }
}
