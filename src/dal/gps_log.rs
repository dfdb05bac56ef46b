use std::path::Path;

use anyhow::Error;

use super::csv_files::{read_records, write_records};
use crate::model::gps::GpsPing;

/// All logged pings, empty when nothing was logged yet.
pub fn read_gps_log(path: &Path) -> Result<Vec<GpsPing>, Error> {
    if !path.exists() {
        return Ok(vec![]);
    }

    read_records(path)
}

pub fn write_gps_log(path: &Path, pings: &[GpsPing]) -> Result<(), Error> {
    write_records(path, pings)
}
