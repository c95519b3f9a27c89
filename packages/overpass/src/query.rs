//! Overpass QL query builders.

use std::fmt::Write as _;

use soundmap_models::{BoundingRegion, GeoPoint};

/// Header shared by every query: JSON output and a server-side timeout.
fn header(timeout_secs: u64) -> String {
    format!("[out:json][timeout:{timeout_secs}];")
}

/// All `building` ways intersecting `region`, with bounding boxes, at most
/// `limit` of them.
#[must_use]
pub fn buildings(region: &BoundingRegion, limit: u32, timeout_secs: u64) -> String {
    format!(
        "{}way[\"building\"]({:.7},{:.7},{:.7},{:.7});out bb {limit};",
        header(timeout_secs),
        region.south(),
        region.west(),
        region.north(),
        region.east(),
    )
}

/// One highway `out count` clause per anchor, in anchor order.
#[must_use]
pub fn road_counts(anchors: &[GeoPoint], radius_m: u32, timeout_secs: u64) -> String {
    let mut query = header(timeout_secs);
    for anchor in anchors {
        push_count_clause(&mut query, "highway", *anchor, radius_m);
    }
    query
}

/// Highway count followed by building count around `center`.
#[must_use]
pub fn survey(center: GeoPoint, radius_m: u32, timeout_secs: u64) -> String {
    let mut query = header(timeout_secs);
    push_count_clause(&mut query, "highway", center, radius_m);
    push_count_clause(&mut query, "building", center, radius_m);
    query
}

fn push_count_clause(query: &mut String, tag: &str, point: GeoPoint, radius_m: u32) {
    // Writing to a String cannot fail.
    let _ = write!(
        query,
        "way(around:{radius_m},{:.7},{:.7})[\"{tag}\"];out count;",
        point.latitude, point.longitude
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    #[test]
    fn building_query_uses_south_west_north_east_order() {
        let region = BoundingRegion {
            north_east: point(47.7, -122.3),
            south_west: point(47.5, -122.4),
        };
        let q = buildings(&region, 100, 10);
        assert_eq!(
            q,
            "[out:json][timeout:10];\
             way[\"building\"](47.5000000,-122.4000000,47.7000000,-122.3000000);\
             out bb 100;"
        );
    }

    #[test]
    fn road_count_query_has_one_clause_per_anchor_in_order() {
        let q = road_counts(&[point(1.0, 2.0), point(3.0, 4.0)], 100, 10);
        let first = q.find("1.0000000,2.0000000").unwrap();
        let second = q.find("3.0000000,4.0000000").unwrap();
        assert!(first < second);
        assert_eq!(q.matches("out count;").count(), 2);
    }

    #[test]
    fn survey_counts_roads_before_buildings() {
        let q = survey(point(47.6, -122.3), 1000, 25);
        assert!(q.starts_with("[out:json][timeout:25];"));
        assert!(q.find("highway").unwrap() < q.find("building").unwrap());
    }
}
