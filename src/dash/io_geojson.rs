// Reading the department boundaries.

use std::fs;

use crate::dash::io_common::{json_to_raw, simplify_file_name};
use crate::dash::*;

/// An empty feature collection, used when the boundaries cannot be read.
pub fn empty_feature_collection() -> JSValue {
    json!({"type": "FeatureCollection", "features": []})
}

/// Reads a GeoJSON feature collection. The document is returned untouched, the
/// presentation layer needs it as-is for the geometry.
pub fn read_feature_collection(path: &str) -> LoadResult<JSValue> {
    let contents = fs::read_to_string(path).context(ReadingFileSnafu { path })?;
    let js: JSValue =
        serde_json::from_str(contents.as_str()).context(ParsingGeoJsonSnafu { path })?;
    ensure!(
        js["type"].as_str() == Some("FeatureCollection") && js["features"].is_array(),
        NotAFeatureCollectionSnafu { path }
    );
    info!(
        "read_feature_collection: {}: {} features",
        simplify_file_name(path),
        js["features"].as_array().map(|a| a.len()).unwrap_or(0)
    );
    Ok(js)
}

/// Adds the features of the collection to the builder.
///
/// Features without a department code are skipped. Returns the number of features added.
pub fn add_boundaries(
    collection: &JSValue,
    source: &BoundarySource,
    builder: &mut Builder,
) -> usize {
    let code_property = source.code_property();
    let name_property = source.name_property();
    let empty: Vec<JSValue> = Vec::new();
    let features = collection["features"].as_array().unwrap_or(&empty);
    let mut added = 0;
    for (idx, feature) in features.iter().enumerate() {
        let properties = &feature["properties"];
        let code = json_to_raw(properties.get(&code_property));
        let name = json_to_raw(properties.get(&name_property));
        if builder.add_boundary(&code, &name, feature["geometry"].clone()) {
            added += 1;
        } else {
            warn!(
                "add_boundaries: feature {} has no {} property, skipping it",
                idx, code_property
            );
        }
    }
    added
}
