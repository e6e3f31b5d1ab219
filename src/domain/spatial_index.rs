//! Spatial Index (C3): a 2-D k-d tree over `(lat_rad, lng_rad)` answering
//! k-nearest and within-radius queries by great-circle (haversine) distance.
//!
//! Grounded in SPEC_FULL.md §4's supplemental note: branch pruning uses an
//! exact per-axis lower bound (the haversine distance between the query
//! point and a point sharing the query's value on the other axis and the
//! splitting value on the split axis), which stays admissible because
//! haversine distance is monotonic in each axis's angular difference.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Mean Earth radius in km, per spec.md §4.2.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Clone, Copy, Debug)]
struct Point {
    lat_rad: f64,
    lng_rad: f64,
    /// Index into whatever caller-owned slice this point was built from.
    source_index: usize,
}

#[derive(Clone, Debug)]
struct KdNode {
    point: Point,
    axis: u8,
    left: Option<usize>,
    right: Option<usize>,
}

/// A haversine-metric spatial index over a fixed set of `(lat, lng)` points
/// in degrees. Immutable once built (spec.md §5); rebuild a fresh index for
/// a different subset rather than mutating one in place.
#[derive(Clone, Debug, Default)]
pub struct SpatialIndex {
    nodes: Vec<KdNode>,
    root: Option<usize>,
    len: usize,
}

impl SpatialIndex {
    /// `points` is `(lat_deg, lng_deg, source_index)` — `source_index` is
    /// whatever the caller wants echoed back in query results (typically a
    /// position into a `FacilityTable` subset).
    pub fn build(points: &[(f64, f64, usize)]) -> Self {
        let mut items: Vec<Point> = points
            .iter()
            .map(|(lat, lng, source_index)| Point {
                lat_rad: lat.to_radians(),
                lng_rad: lng.to_radians(),
                source_index: *source_index,
            })
            .collect();

        let len = items.len();
        let mut nodes = Vec::with_capacity(len);
        let root = Self::build_recursive(&mut items, 0, &mut nodes);

        Self { nodes, root, len }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    fn build_recursive(items: &mut [Point], depth: usize, nodes: &mut Vec<KdNode>) -> Option<usize> {
        if items.is_empty() {
            return None;
        }

        let axis = (depth % 2) as u8;
        items.sort_by(|a, b| axis_value(a, axis).partial_cmp(&axis_value(b, axis)).unwrap_or(Ordering::Equal));
        let mid = items.len() / 2;
        let point = items[mid];

        let (left_items, rest) = items.split_at_mut(mid);
        let right_items = &mut rest[1..];

        let left = Self::build_recursive(left_items, depth + 1, nodes);
        let right = Self::build_recursive(right_items, depth + 1, nodes);

        nodes.push(KdNode { point, axis, left, right });
        Some(nodes.len() - 1)
    }

    /// The `k` closest points to `(lat, lng)` (degrees), ascending by
    /// distance in km. Returns fewer than `k` if the index holds fewer
    /// points (spec.md §8 boundary behavior).
    pub fn k_nearest(&self, lat: f64, lng: f64, k: usize) -> Vec<(usize, f64)> {
        if k == 0 || self.root.is_none() {
            return Vec::new();
        }

        let query = Point { lat_rad: lat.to_radians(), lng_rad: lng.to_radians(), source_index: 0 };
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);

        self.visit_k_nearest(self.root, &query, k, &mut heap);

        let mut results: Vec<(usize, f64)> = heap
            .into_iter()
            .map(|entry| (entry.source_index, entry.distance_km))
            .collect();
        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        results
    }

    fn visit_k_nearest(&self, node_idx: Option<usize>, query: &Point, k: usize, heap: &mut BinaryHeap<HeapEntry>) {
        let Some(idx) = node_idx else { return };
        let node = &self.nodes[idx];

        let distance_km = haversine_km(query.lat_rad, query.lng_rad, node.point.lat_rad, node.point.lng_rad);
        push_bounded(heap, HeapEntry { distance_km, source_index: node.point.source_index }, k);

        let diff = axis_value(query, node.axis) - axis_value(&node.point, node.axis);
        let (near, far) = if diff <= 0.0 { (node.left, node.right) } else { (node.right, node.left) };

        self.visit_k_nearest(near, query, k, heap);

        let worst = heap.peek().map(|entry| entry.distance_km);
        let bound_km = axis_bound_km(query, &node.point, node.axis);
        if heap.len() < k || worst.is_none_or(|worst| bound_km < worst) {
            self.visit_k_nearest(far, query, k, heap);
        }
    }

    /// All points within `radius_km` of `(lat, lng)`, ascending by distance.
    pub fn within_radius(&self, lat: f64, lng: f64, radius_km: f64) -> Vec<(usize, f64)> {
        if self.root.is_none() || radius_km < 0.0 {
            return Vec::new();
        }

        let query = Point { lat_rad: lat.to_radians(), lng_rad: lng.to_radians(), source_index: 0 };
        let mut out = Vec::new();
        self.visit_within_radius(self.root, &query, radius_km, &mut out);
        out.sort_by(|a: &(usize, f64), b: &(usize, f64)| {
            a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0))
        });
        out
    }

    fn visit_within_radius(&self, node_idx: Option<usize>, query: &Point, radius_km: f64, out: &mut Vec<(usize, f64)>) {
        let Some(idx) = node_idx else { return };
        let node = &self.nodes[idx];

        let distance_km = haversine_km(query.lat_rad, query.lng_rad, node.point.lat_rad, node.point.lng_rad);
        if distance_km <= radius_km {
            out.push((node.point.source_index, distance_km));
        }

        let bound_km = axis_bound_km(query, &node.point, node.axis);
        if bound_km <= radius_km {
            self.visit_within_radius(node.left, query, radius_km, out);
            self.visit_within_radius(node.right, query, radius_km, out);
        } else {
            let diff = axis_value(query, node.axis) - axis_value(&node.point, node.axis);
            let near = if diff <= 0.0 { node.left } else { node.right };
            self.visit_within_radius(near, query, radius_km, out);
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct HeapEntry {
    distance_km: f64,
    source_index: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.distance_km == other.distance_km
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    // Max-heap by distance so `peek()` exposes the current worst candidate,
    // letting `push_bounded` evict it once the heap holds `k` entries.
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_km.partial_cmp(&other.distance_km).unwrap_or(Ordering::Equal)
    }
}

fn push_bounded(heap: &mut BinaryHeap<HeapEntry>, entry: HeapEntry, k: usize) {
    if heap.len() < k {
        heap.push(entry);
    } else if let Some(worst) = heap.peek() {
        if entry.distance_km < worst.distance_km {
            heap.pop();
            heap.push(entry);
        }
    }
}

fn axis_value(point: &Point, axis: u8) -> f64 {
    if axis == 0 { point.lat_rad } else { point.lng_rad }
}

/// Lower bound on the distance from `query` to any point on the far side of
/// `split`'s splitting plane: the haversine distance to the point sharing
/// query's value on the other axis and split's value on the split axis.
fn axis_bound_km(query: &Point, split: &Point, axis: u8) -> f64 {
    let (lat, lng) = if axis == 0 {
        (split.lat_rad, query.lng_rad)
    } else {
        (query.lat_rad, split.lng_rad)
    };
    haversine_km(query.lat_rad, query.lng_rad, lat, lng)
}

/// Great-circle distance in km between two points given in radians.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Great-circle distance in km between two points given in degrees.
pub fn haversine_km_deg(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    haversine_km(lat1.to_radians(), lng1.to_radians(), lat2.to_radians(), lng2.to_radians())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_point_within_radius_contains_itself() {
        let index = SpatialIndex::build(&[(5.6037, -0.1870, 0)]);
        let hits = index.within_radius(5.6037, -0.1870, 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
        assert!(hits[0].1 < 1e-6);
    }

    #[test]
    fn k_nearest_ascending_and_capped_at_len() {
        let points = [
            (5.6037, -0.1870, 0), // Accra
            (6.6885, -1.6244, 1), // Kumasi
            (9.4034, -0.8393, 2), // Tamale
        ];
        let index = SpatialIndex::build(&points);
        let hits = index.k_nearest(5.6037, -0.1870, 10);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 0);
        assert!(hits[0].1 <= hits[1].1 && hits[1].1 <= hits[2].1);
    }

    #[test]
    fn within_radius_excludes_far_points() {
        let points = [(5.6037, -0.1870, 0), (9.4034, -0.8393, 1)];
        let index = SpatialIndex::build(&points);
        let hits = index.within_radius(5.6037, -0.1870, 50.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
    }

    #[test]
    fn haversine_matches_known_accra_kumasi_distance() {
        let d = haversine_km_deg(5.6037, -0.1870, 6.6885, -1.6244);
        assert!((d - 200.0).abs() < 40.0, "distance was {d}");
    }
}
