use std::path::Path;

use anyhow::Error;
use tracing::info;

use super::csv_files::{read_records, write_records};
use crate::model::demand::DemandFeatureRow;
use crate::model::gps::SyntheticPing;

#[tracing::instrument(err)]
pub fn read_demand_features(path: &Path) -> Result<Vec<DemandFeatureRow>, Error> {
    let rows: Vec<DemandFeatureRow> = read_records(path)?;

    info!("got {} demand feature rows", rows.len());

    Ok(rows)
}

#[tracing::instrument(err, skip(rows), fields(rows = rows.len()))]
pub fn write_demand_features(path: &Path, rows: &[DemandFeatureRow]) -> Result<(), Error> {
    write_records(path, rows)
}

#[tracing::instrument(err, skip(pings), fields(pings = pings.len()))]
pub fn write_synthetic_gps(path: &Path, pings: &[SyntheticPing]) -> Result<(), Error> {
    write_records(path, pings)
}
