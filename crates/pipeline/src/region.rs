use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RegionError {
    #[error("Region needs at least 3 points, got {0}")]
    TooFewPoints(usize),

    #[error("Region rectangle is empty")]
    EmptyRectangle,

    #[error("Region coordinates must be finite")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Region as sent by clients: `[x1, y1, x2, y2]` or `[[x, y], ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionSpec {
    Rect([f32; 4]),
    Polygon(Vec<[f32; 2]>),
}

impl TryFrom<RegionSpec> for Region {
    type Error = RegionError;

    fn try_from(spec: RegionSpec) -> Result<Self, Self::Error> {
        match spec {
            RegionSpec::Rect([x1, y1, x2, y2]) => Region::from_rect(x1, y1, x2, y2),
            RegionSpec::Polygon(points) => {
                Region::from_points(points.into_iter().map(|[x, y]| Point::new(x, y)).collect())
            }
        }
    }
}

/// Immutable polygon. Rectangles are expanded to four corners so every
/// region goes through the same membership test.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    points: Vec<Point>,
}

const EDGE_EPSILON: f32 = 1e-3;

impl Region {
    pub fn from_points(points: Vec<Point>) -> Result<Self, RegionError> {
        if points.len() < 3 {
            return Err(RegionError::TooFewPoints(points.len()));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(RegionError::NonFinite);
        }
        Ok(Self { points })
    }

    /// Corners in any order; normalized to top-left, top-right, bottom-right, bottom-left.
    pub fn from_rect(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self, RegionError> {
        let (left, right) = (x1.min(x2), x1.max(x2));
        let (top, bottom) = (y1.min(y2), y1.max(y2));
        if !(left.is_finite() && right.is_finite() && top.is_finite() && bottom.is_finite()) {
            return Err(RegionError::NonFinite);
        }
        if right - left <= 0.0 || bottom - top <= 0.0 {
            return Err(RegionError::EmptyRectangle);
        }
        Self::from_points(vec![
            Point::new(left, top),
            Point::new(right, top),
            Point::new(right, bottom),
            Point::new(left, bottom),
        ])
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// Point-in-polygon test; points on the boundary count as inside.
    pub fn contains(&self, p: Point) -> bool {
        if self.edges().any(|(a, b)| on_segment(p, a, b)) {
            return true;
        }
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// True if any of the points is inside.
    pub fn aggregate(&self, points: &[Point]) -> bool {
        points.iter().any(|p| self.contains(*p))
    }
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    let len = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
    if cross.abs() > EDGE_EPSILON * len.max(1.0) {
        return false;
    }
    p.x >= a.x.min(b.x) - EDGE_EPSILON
        && p.x <= a.x.max(b.x) + EDGE_EPSILON
        && p.y >= a.y.min(b.y) - EDGE_EPSILON
        && p.y <= a.y.max(b.y) + EDGE_EPSILON
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Enter,
    Exit,
}

/// Debounces region membership into enter/exit edges.
///
/// Holds only the aggregate "any vehicle inside" flag; without a region
/// nothing is ever inside.
#[derive(Debug, Clone, Default)]
pub struct RegionTracker {
    region: Option<Region>,
    occupied: bool,
}

impl RegionTracker {
    pub fn new(region: Option<Region>) -> Self {
        Self {
            region,
            occupied: false,
        }
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn contains(&self, p: Point) -> bool {
        self.region.as_ref().is_some_and(|r| r.contains(p))
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    /// Feeds one frame's centroids, returning the edge if membership changed.
    pub fn update(&mut self, centroids: &[Point]) -> Option<Edge> {
        let now = self.region.as_ref().is_some_and(|r| r.aggregate(centroids));
        self.observe(now)
    }

    pub fn observe(&mut self, inside: bool) -> Option<Edge> {
        let edge = match (self.occupied, inside) {
            (false, true) => Some(Edge::Enter),
            (true, false) => Some(Edge::Exit),
            _ => None,
        };
        self.occupied = inside;
        edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Region {
        Region::from_rect(100.0, 100.0, 300.0, 300.0).unwrap()
    }

    fn triangle() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(200.0, 0.0),
            Point::new(100.0, 200.0),
        ]
    }

    // ========== Construction ==========

    #[test]
    fn rect_expands_to_four_corners() {
        let region = Region::from_rect(300.0, 300.0, 100.0, 100.0).unwrap();
        assert_eq!(region.points().len(), 4);
        assert_eq!(region.points()[0], Point::new(100.0, 100.0));
        assert_eq!(region, square(), "corner order must not matter");
    }

    #[test]
    fn degenerate_inputs_rejected() {
        assert_eq!(
            Region::from_points(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]),
            Err(RegionError::TooFewPoints(2))
        );
        assert_eq!(
            Region::from_rect(10.0, 10.0, 10.0, 50.0),
            Err(RegionError::EmptyRectangle)
        );
        assert_eq!(
            Region::from_rect(f32::NAN, 0.0, 1.0, 1.0),
            Err(RegionError::NonFinite)
        );
    }

    #[test]
    fn region_spec_deserializes_rect_and_polygon() {
        let rect: RegionSpec = serde_json::from_str("[100, 100, 300, 300]").unwrap();
        assert_eq!(Region::try_from(rect).unwrap(), square());

        let poly: RegionSpec = serde_json::from_str("[[0,0],[200,0],[100,200]]").unwrap();
        assert_eq!(Region::try_from(poly).unwrap().points().len(), 3);
    }

    // ========== Membership ==========

    #[test]
    fn interior_and_exterior_points() {
        let region = square();
        assert!(region.contains(Point::new(200.0, 200.0)));
        assert!(!region.contains(Point::new(50.0, 200.0)));
        assert!(!region.contains(Point::new(200.0, 301.0)));
    }

    #[test]
    fn boundary_counts_as_inside() {
        let region = square();
        assert!(region.contains(Point::new(100.0, 200.0)), "left edge");
        assert!(region.contains(Point::new(300.0, 300.0)), "corner");
        assert!(region.contains(Point::new(200.0, 100.0)), "top edge");
    }

    #[test]
    fn concave_polygon() {
        // U shape opening upward
        let region = Region::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(30.0, 0.0),
            Point::new(30.0, 20.0),
            Point::new(70.0, 20.0),
            Point::new(70.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ])
        .unwrap();
        assert!(!region.contains(Point::new(50.0, 10.0)), "inside the notch");
        assert!(region.contains(Point::new(15.0, 10.0)));
        assert!(region.contains(Point::new(50.0, 60.0)));
    }

    #[test]
    fn membership_invariant_under_rotation() {
        let base = triangle();
        let probes: Vec<Point> = (0..=20)
            .flat_map(|i| (0..=20).map(move |j| Point::new(i as f32 * 11.0 - 10.0, j as f32 * 11.0 - 10.0)))
            .collect();
        let reference = Region::from_points(base.clone()).unwrap();
        for shift in 1..base.len() {
            let mut rotated = base.clone();
            rotated.rotate_left(shift);
            let region = Region::from_points(rotated).unwrap();
            for p in &probes {
                assert_eq!(
                    region.contains(*p),
                    reference.contains(*p),
                    "rotation {shift} disagrees at {p:?}"
                );
            }
        }
    }

    #[test]
    fn aggregate_is_any() {
        let region = square();
        assert!(!region.aggregate(&[]));
        assert!(!region.aggregate(&[Point::new(0.0, 0.0)]));
        assert!(region.aggregate(&[Point::new(0.0, 0.0), Point::new(150.0, 150.0)]));
    }

    // ========== Edges ==========

    #[test]
    fn enter_fires_once_while_inside() {
        let mut tracker = RegionTracker::new(Some(square()));
        let inside = [Point::new(200.0, 200.0)];
        assert_eq!(tracker.update(&inside), Some(Edge::Enter));
        for _ in 0..49 {
            assert_eq!(tracker.update(&inside), None, "no re-trigger while inside");
        }
        assert!(tracker.is_occupied());
    }

    #[test]
    fn exit_fires_once_after_enter() {
        let mut tracker = RegionTracker::new(Some(square()));
        assert_eq!(tracker.update(&[]), None, "exit without enter is not an edge");
        tracker.update(&[Point::new(200.0, 200.0)]);
        assert_eq!(tracker.update(&[]), Some(Edge::Exit));
        assert_eq!(tracker.update(&[]), None);
    }

    #[test]
    fn no_region_never_occupied() {
        let mut tracker = RegionTracker::new(None);
        assert_eq!(tracker.update(&[Point::new(1.0, 1.0)]), None);
        assert!(!tracker.contains(Point::new(1.0, 1.0)));
    }
}
