use std::fs;
use std::path::Path;

use anyhow::{Context, Error};
use itertools::Itertools;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::model::gps::SyntheticPing;
use crate::model::stop::Stop;
use crate::utils::mean;

const ZOOM: u8 = 12;

const MAP_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Transit demand map</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<script src="https://unpkg.com/leaflet.heat@0.2.0/dist/leaflet-heat.js"></script>
<style>html, body, #map { height: 100%; margin: 0; }</style>
</head>
<body>
<div id="map"></div>
<script>
const view = @VIEW@;
const stops = @STOPS@;
const heat = @HEAT@;

const map = L.map("map").setView(view.center, view.zoom);
L.tileLayer("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png", {
  attribution: "&copy; OpenStreetMap contributors"
}).addTo(map);

for (const stop of stops) {
  const popup = document.createElement("div");
  popup.append("Stop: " + stop.name, document.createElement("br"), "ID: " + stop.id);
  L.circleMarker([stop.lat, stop.lon], {
    radius: 5,
    color: "blue",
    fill: true,
    fillColor: "lightblue"
  }).bindPopup(popup).addTo(map);
}

if (heat.length > 0) {
  L.heatLayer(heat).addTo(map);
}
</script>
</body>
</html>
"#;

#[derive(Serialize)]
struct StopMarker<'a> {
    id: &'a str,
    name: &'a str,
    lat: f64,
    lon: f64,
}

/// Writes a Leaflet page with a marker per stop and an occupancy heat layer of the pings.
#[tracing::instrument(err, skip(stops, pings), fields(stops = stops.len(), pings = pings.len()))]
pub fn write_demand_map(path: &Path, stops: &[Stop], pings: &[SyntheticPing]) -> Result<(), Error> {
    let latitudes = stops.iter().map(|s| s.latitude).collect_vec();
    let longitudes = stops.iter().map(|s| s.longitude).collect_vec();
    let center = mean(&latitudes)
        .zip(mean(&longitudes))
        .context("no stops to center the map on")?;

    let markers = stops
        .iter()
        .map(|s| StopMarker {
            id: &s.stop_id,
            name: &s.stop_name,
            lat: s.latitude,
            lon: s.longitude,
        })
        .collect_vec();
    let heat = pings
        .iter()
        .map(|p| [p.latitude, p.longitude, p.occupancy])
        .collect_vec();

    let html = MAP_TEMPLATE
        .replace("@VIEW@", &script_json(&json!({ "center": [center.0, center.1], "zoom": ZOOM }))?)
        .replace("@STOPS@", &script_json(&markers)?)
        .replace("@HEAT@", &script_json(&heat)?);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, html).with_context(|| format!("writing {}", path.display()))?;

    info!("Map saved to {}", path.display());

    Ok(())
}

/// JSON that can sit inside a `<script>` element, a stop name can't close the tag.
fn script_json<T: Serialize>(value: &T) -> Result<String, Error> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}
