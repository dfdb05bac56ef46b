use std::fs;
use std::path::Path;

use anyhow::{Context, Error};
use tracing::info;

use crate::model::route_suggestion::RouteSuggestion;

#[tracing::instrument(err)]
pub fn read_route_suggestions(path: &Path) -> Result<Vec<RouteSuggestion>, Error> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    let suggestions: Vec<RouteSuggestion> =
        serde_json::from_str(&text).context("Error parsing route suggestions")?;

    info!("got {} route suggestions", suggestions.len());

    Ok(suggestions)
}

#[tracing::instrument(err, skip(suggestions))]
pub fn write_route_suggestions(path: &Path, suggestions: &[RouteSuggestion]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, serde_json::to_string_pretty(suggestions)?)
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replacing {}", path.display()))?;

    Ok(())
}
