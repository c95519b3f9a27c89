//! Builds the renderer payload for one region.

use soundmap_models::{BoundingRegion, HeatmapDisplay, HeatmapLayer, WeightedPoint};

/// Zero-weight points at the south-west and north-east corners of `region`.
///
/// Some heatmap renderers refuse an empty point list; these keep the layer
/// mounted without drawing anything.
#[must_use]
pub const fn placeholder_points(region: &BoundingRegion) -> [WeightedPoint; 2] {
    [
        WeightedPoint::at(region.south_west, 0.0),
        WeightedPoint::at(region.north_east, 0.0),
    ]
}

/// Wraps scored points and display settings into a layer.
///
/// Point order is preserved. When `points` is empty and `placeholder` is
/// set, the layer carries [`placeholder_points`] instead.
#[must_use]
pub fn assemble(
    region: BoundingRegion,
    points: Vec<WeightedPoint>,
    display: &HeatmapDisplay,
    placeholder: bool,
) -> HeatmapLayer {
    let points = if points.is_empty() && placeholder {
        log::debug!("No buildings in {region}, using placeholder points");
        placeholder_points(&region).to_vec()
    } else {
        points
    };

    HeatmapLayer {
        region,
        points,
        display: display.clone(),
    }
}
