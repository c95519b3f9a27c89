//! Parsers for Overpass JSON responses.
//!
//! Overpass wraps results in an `elements` array. Building queries return
//! `way` elements carrying `bounds`; `out count` returns `count` elements
//! whose `tags.total` is a decimal string (some mirrors emit a number, so
//! both are accepted).
//!
//! When Overpass hits its own time or memory limit it still answers 200,
//! with whatever elements it had so far and a `remark` describing the
//! failure. Such a body is rejected instead of read as a complete result.

use soundmap_models::{Building, GeoPoint, InfrastructureCount};

use crate::OverpassError;

fn elements(body: &serde_json::Value) -> Result<&Vec<serde_json::Value>, OverpassError> {
    if let Some(remark) = body.get("remark").and_then(serde_json::Value::as_str) {
        log::warn!("Overpass returned a truncated result: {remark}");
        return Err(OverpassError::parse(format!(
            "Overpass result is incomplete: {remark}"
        )));
    }
    body.get("elements")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| OverpassError::parse("Overpass response missing 'elements' array"))
}

/// Extracts building anchors (bounding-box minimum corners) in response
/// order. Elements without usable bounds are skipped.
///
/// # Errors
///
/// Returns [`OverpassError::Parse`] if the body has no `elements` array or
/// carries a `remark`.
pub fn parse_buildings(body: &serde_json::Value) -> Result<Vec<Building>, OverpassError> {
    let elements = elements(body)?;
    let mut buildings = Vec::with_capacity(elements.len());

    for element in elements {
        let id = element["id"].as_u64().unwrap_or_default();
        let bounds = &element["bounds"];
        let (Some(minlat), Some(minlon)) = (bounds["minlat"].as_f64(), bounds["minlon"].as_f64())
        else {
            log::debug!("Skipping Overpass element {id} without bounds");
            continue;
        };

        match GeoPoint::new(minlat, minlon) {
            Ok(anchor) => buildings.push(Building { id, anchor }),
            Err(e) => log::warn!("Skipping Overpass element {id}: {e}"),
        }
    }

    Ok(buildings)
}

/// Extracts `count` totals in response order.
///
/// # Errors
///
/// Returns [`OverpassError::Parse`] if the body has no `elements` array or a
/// count element lacks a numeric `tags.total`.
pub fn parse_counts(body: &serde_json::Value) -> Result<Vec<u64>, OverpassError> {
    elements(body)?
        .iter()
        .filter(|element| element["type"].as_str() == Some("count"))
        .enumerate()
        .map(|(index, element)| {
            let total = &element["tags"]["total"];
            total
                .as_u64()
                .or_else(|| total.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| {
                    OverpassError::parse(format!("count element {index} has no numeric tags.total"))
                })
        })
        .collect()
}

/// Parses a survey response: highway count then building count.
///
/// # Errors
///
/// Returns [`OverpassError::Parse`] unless exactly two counts are present.
pub fn parse_survey(body: &serde_json::Value) -> Result<InfrastructureCount, OverpassError> {
    let counts = parse_counts(body)?;
    match counts[..] {
        [road_count, building_count] => Ok(InfrastructureCount {
            building_count,
            road_count,
        }),
        _ => Err(OverpassError::parse(format!(
            "expected 2 counts in survey response, got {}",
            counts.len()
        ))),
    }
}
