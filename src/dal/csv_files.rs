use std::fs;
use std::path::Path;

use anyhow::{Context, Error};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info_span, trace};

/// Reads every record of a headed CSV file. Extra columns are ignored.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, Error> {
    let _span = info_span!("Reading csv", path = %path.display()).entered();

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let records = reader
        .deserialize()
        .enumerate()
        .map(|(line, record)| {
            // header is line 1
            record.with_context(|| format!("{} record {}", path.display(), line + 2))
        })
        .collect::<Result<Vec<T>, Error>>()?;

    trace!("read {} records", records.len());

    Ok(records)
}

/// Writes the records next to `path` and renames over it, readers never see half a file.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), Error> {
    let _span = info_span!("Writing csv", path = %path.display()).entered();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp_path, path).with_context(|| format!("replacing {}", path.display()))?;

    Ok(())
}
