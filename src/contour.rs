use std::collections::{HashMap, VecDeque};

use crate::error::{invalid, Result};
use crate::noise_field::ScalarField;

pub type Point = (f64, f64);

/// A closed ring: the last point repeats the first.
pub type Ring = Vec<Point>;

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Ring,
    pub holes: Vec<Ring>,
}

/// The region where the field is at least `threshold`, in grid space: sample `(i, j)` sits at
/// `(i + 0.5, j + 0.5)` and the grid spans `[0, width] × [0, height]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourBand {
    pub threshold: f64,
    pub polygons: Vec<Polygon>,
}

impl ContourBand {
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// All rings of the band, exteriors and holes alike.
    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        self.polygons
            .iter()
            .flat_map(|p| std::iter::once(&p.exterior).chain(p.holes.iter()))
    }

    /// Covered area: exteriors minus holes.
    pub fn area(&self) -> f64 {
        self.polygons
            .iter()
            .map(|p| {
                signed_area(&p.exterior).abs()
                    - p.holes.iter().map(|h| signed_area(h).abs()).sum::<f64>()
            })
            .sum()
    }
}

/// A segment between two cell-edge midpoints, in doubled coordinates relative to the cell.
type Segment = [(i32, i32); 2];

/// Segments for each of the 16 corner configurations. Bit 0 is the bottom-left corner, then
/// bottom-right, top-right and top-left. Segments keep the covered region on a consistent side,
/// which is what makes exterior and hole orientation distinguishable afterwards.
const CASES: [&[Segment]; 16] = [
    &[],
    &[[(2, 3), (1, 2)]],
    &[[(3, 2), (2, 3)]],
    &[[(3, 2), (1, 2)]],
    &[[(2, 1), (3, 2)]],
    &[[(2, 3), (1, 2)], [(2, 1), (3, 2)]],
    &[[(2, 1), (2, 3)]],
    &[[(2, 1), (1, 2)]],
    &[[(1, 2), (2, 1)]],
    &[[(2, 3), (2, 1)]],
    &[[(1, 2), (2, 1)], [(3, 2), (2, 3)]],
    &[[(3, 2), (2, 1)]],
    &[[(1, 2), (3, 2)]],
    &[[(2, 3), (3, 2)]],
    &[[(1, 2), (2, 3)]],
    &[],
];

/// Extracts one band per threshold, in the order given.
///
/// Thresholds must be finite and strictly increasing. A threshold strictly outside the field's
/// value range yields an empty band.
pub fn extract(field: &ScalarField, thresholds: &[f64]) -> Result<Vec<ContourBand>> {
    if let Some(bad) = field.values().iter().find(|v| !v.is_finite()) {
        return Err(invalid(format!("field contains non-finite value {}", bad)));
    }
    if let Some(bad) = thresholds.iter().find(|t| !t.is_finite()) {
        return Err(invalid(format!("threshold {} is not finite", bad)));
    }
    if let Some(w) = thresholds.windows(2).find(|w| w[0] >= w[1]) {
        return Err(invalid(format!(
            "thresholds must be strictly increasing, got {} then {}",
            w[0], w[1]
        )));
    }

    let (min, max) = field.range();
    let bands: Vec<ContourBand> = thresholds
        .iter()
        .map(|&threshold| {
            let polygons = if threshold < min || threshold > max {
                Vec::new()
            } else {
                contour(field, threshold)
            };
            ContourBand {
                threshold,
                polygons,
            }
        })
        .collect();
    log::debug!(
        "extracted {} bands ({} non-empty) from {}x{} field",
        bands.len(),
        bands.iter().filter(|b| !b.is_empty()).count(),
        field.width(),
        field.height()
    );
    Ok(bands)
}

fn contour(field: &ScalarField, threshold: f64) -> Vec<Polygon> {
    let mut polygons: Vec<Polygon> = Vec::new();
    let mut holes: Vec<Ring> = Vec::new();

    for ring in isorings(field, threshold) {
        let ring: Ring = ring
            .into_iter()
            .map(|p| interpolate(field, threshold, p))
            .collect();
        if signed_area(&ring) > 0.0 {
            polygons.push(Polygon {
                exterior: ring,
                holes: Vec::new(),
            });
        } else {
            holes.push(ring);
        }
    }

    for hole in holes {
        if let Some(polygon) = polygons
            .iter_mut()
            .find(|p| ring_contains_ring(&p.exterior, &hole) != Containment::Outside)
        {
            polygon.holes.push(hole);
        }
    }
    polygons
}

/// Traces closed rings in doubled integer coordinates. Samples outside the grid count as below
/// the threshold, so every ring closes, running along the border where needed.
fn isorings(field: &ScalarField, threshold: f64) -> Vec<Vec<(i32, i32)>> {
    let dx = field.width() as i32;
    let dy = field.height() as i32;
    let above = |x: i32, y: i32| {
        x >= 0 && y >= 0 && x < dx && y < dy && field.get(x as usize, y as usize) >= threshold
    };

    let mut stitcher = Stitcher::new(dx);
    for y in -1..dy {
        for x in -1..dx {
            let case = usize::from(above(x, y + 1))
                | usize::from(above(x + 1, y + 1)) << 1
                | usize::from(above(x + 1, y)) << 2
                | usize::from(above(x, y)) << 3;
            for &[(sx, sy), (ex, ey)] in CASES[case] {
                stitcher.stitch((2 * x + sx, 2 * y + sy), (2 * x + ex, 2 * y + ey));
            }
        }
    }
    stitcher.closed
}

struct Fragment {
    start: i64,
    end: i64,
    ring: VecDeque<(i32, i32)>,
}

/// Joins segments into rings. Open fragments are indexed by their first and last point.
struct Stitcher {
    stride: i64,
    fragments: Vec<Option<Fragment>>,
    by_start: HashMap<i64, usize>,
    by_end: HashMap<i64, usize>,
    closed: Vec<Vec<(i32, i32)>>,
}

impl Stitcher {
    fn new(width: i32) -> Self {
        Stitcher {
            stride: 2 * i64::from(width) + 1,
            fragments: Vec::new(),
            by_start: HashMap::new(),
            by_end: HashMap::new(),
            closed: Vec::new(),
        }
    }

    fn key(&self, (x, y): (i32, i32)) -> i64 {
        i64::from(x) + i64::from(y) * self.stride
    }

    fn stitch(&mut self, start: (i32, i32), end: (i32, i32)) {
        let start_key = self.key(start);
        let end_key = self.key(end);

        if let Some(f) = self.by_end.remove(&start_key) {
            match self.by_start.remove(&end_key) {
                Some(g) if g == f => {
                    if let Some(mut fragment) = self.fragments[f].take() {
                        fragment.ring.push_back(end);
                        self.closed.push(fragment.ring.into());
                    }
                }
                Some(g) => {
                    // `f` ends where the segment starts and `g` starts where it ends: splice
                    // `g` onto `f` and keep `f`'s slot.
                    if let Some(tail) = self.fragments[g].take() {
                        if let Some(head) = self.fragments[f].as_mut() {
                            head.ring.extend(tail.ring);
                            head.end = tail.end;
                        }
                        self.by_end.insert(tail.end, f);
                    }
                }
                None => {
                    if let Some(fragment) = self.fragments[f].as_mut() {
                        fragment.ring.push_back(end);
                        fragment.end = end_key;
                    }
                    self.by_end.insert(end_key, f);
                }
            }
        } else if let Some(f) = self.by_start.remove(&end_key) {
            if let Some(fragment) = self.fragments[f].as_mut() {
                fragment.ring.push_front(start);
                fragment.start = start_key;
            }
            self.by_start.insert(start_key, f);
        } else {
            let id = self.fragments.len();
            self.fragments.push(Some(Fragment {
                start: start_key,
                end: end_key,
                ring: VecDeque::from([start, end]),
            }));
            self.by_start.insert(start_key, id);
            self.by_end.insert(end_key, id);
        }
    }
}

/// Moves a cell-edge midpoint to where the field actually crosses `threshold` along that edge.
/// Points on the grid border stay put.
fn interpolate(field: &ScalarField, threshold: f64, (x2, y2): (i32, i32)) -> Point {
    let dx = field.width() as i32;
    let dy = field.height() as i32;
    let mut x = f64::from(x2) / 2.0;
    let mut y = f64::from(y2) / 2.0;
    let xt = (x2 / 2) as usize;
    let yt = (y2 / 2) as usize;

    // Even doubled x: the point lies between samples `xt - 1` and `xt` of row `yt`.
    if x2 % 2 == 0 && x2 > 0 && x2 < 2 * dx && y2 < 2 * dy {
        let v0 = field.get(xt - 1, yt);
        let v1 = field.get(xt, yt);
        x = xt as f64 + (threshold - v0) / (v1 - v0) - 0.5;
    }
    if y2 % 2 == 0 && y2 > 0 && y2 < 2 * dy && x2 < 2 * dx {
        let v0 = field.get(xt, yt - 1);
        let v1 = field.get(xt, yt);
        y = yt as f64 + (threshold - v0) / (v1 - v0) - 0.5;
    }
    (x, y)
}

/// Signed area of a closed ring. Positive for exteriors as traced by [`extract`], negative for
/// holes (clockwise on screen with y pointing down).
pub fn signed_area(ring: &[Point]) -> f64 {
    let Some(&(lx, ly)) = ring.last() else {
        return 0.0;
    };
    let (fx, fy) = ring[0];
    let mut area = ly * fx - lx * fy;
    for w in ring.windows(2) {
        let ((x0, y0), (x1, y1)) = (w[0], w[1]);
        area += y0 * x1 - x0 * y1;
    }
    area / 2.0
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Containment {
    Inside,
    Boundary,
    Outside,
}

/// Classifies `hole` against `ring` by its first vertex that is not on the ring's boundary.
fn ring_contains_ring(ring: &[Point], hole: &[Point]) -> Containment {
    hole.iter()
        .map(|&p| ring_contains_point(ring, p))
        .find(|&c| c != Containment::Boundary)
        .unwrap_or(Containment::Boundary)
}

fn ring_contains_point(ring: &[Point], (x, y): Point) -> Containment {
    let mut inside = false;
    let n = ring.len();
    for i in 0..n {
        let j = if i == 0 { n - 1 } else { i - 1 };
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if on_segment((xi, yi), (xj, yj), (x, y)) {
            return Containment::Boundary;
        }
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
    }
    if inside {
        Containment::Inside
    } else {
        Containment::Outside
    }
}

fn on_segment(a: Point, b: Point, c: Point) -> bool {
    let collinear = (b.0 - a.0) * (c.1 - a.1) == (c.0 - a.0) * (b.1 - a.1);
    let within = |p: f64, q: f64, r: f64| (p <= q && q <= r) || (r <= q && q <= p);
    collinear
        && if a.0 == b.0 {
            within(a.1, c.1, b.1)
        } else {
            within(a.0, c.0, b.0)
        }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise_field::generate;

    fn field(width: usize, height: usize, f: impl Fn(usize, usize) -> f64) -> ScalarField {
        let values = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        ScalarField::from_values(width, height, values).unwrap()
    }

    #[test]
    fn test_single_peak_is_a_diamond() {
        let peak = field(5, 5, |x, y| if (x, y) == (2, 2) { 1.0 } else { 0.0 });
        let bands = extract(&peak, &[0.5]).unwrap();
        assert_eq!(bands.len(), 1);
        let polygons = &bands[0].polygons;
        assert_eq!(polygons.len(), 1);
        let ring = &polygons[0].exterior;
        assert!(polygons[0].holes.is_empty());
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
        for point in [(2.5, 2.0), (2.0, 2.5), (2.5, 3.0), (3.0, 2.5)] {
            assert!(ring.contains(&point), "missing {:?} in {:?}", point, ring);
        }
        assert_eq!(signed_area(ring), 0.5);
    }

    #[test]
    fn test_interpolation_follows_crossing() {
        // Crossing at a quarter of the way from each low sample (at 0.5 or 2.5) towards the
        // peak sample at 1.5.
        let peak = field(3, 3, |x, y| if (x, y) == (1, 1) { 4.0 } else { 0.0 });
        let bands = extract(&peak, &[1.0]).unwrap();
        let ring = &bands[0].polygons[0].exterior;
        assert!(ring.contains(&(0.75, 1.5)), "{:?}", ring);
        assert!(ring.contains(&(2.25, 1.5)), "{:?}", ring);
        assert!(ring.contains(&(1.5, 0.75)), "{:?}", ring);
        assert!(ring.contains(&(1.5, 2.25)), "{:?}", ring);
    }

    #[test]
    fn test_annulus_has_hole() {
        let annulus = field(7, 7, |x, y| {
            let d = (x as i32 - 3).abs().max((y as i32 - 3).abs());
            if d == 2 {
                1.0
            } else {
                0.0
            }
        });
        let bands = extract(&annulus, &[0.5]).unwrap();
        let polygons = &bands[0].polygons;
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].holes.len(), 1);
        assert!(signed_area(&polygons[0].holes[0]) < 0.0);
        assert!(bands[0].area() > 0.0);
        assert!(bands[0].area() < signed_area(&polygons[0].exterior));
    }

    #[test]
    fn test_threshold_at_minimum_covers_grid() {
        let flat = field(3, 3, |_, _| 1.0);
        let bands = extract(&flat, &[1.0]).unwrap();
        assert_eq!(bands[0].polygons.len(), 1);
        // The full square with each corner cut by half a cell diagonally.
        assert_eq!(bands[0].area(), 8.5);
        for &(x, y) in &bands[0].polygons[0].exterior {
            assert!((0.0..=3.0).contains(&x) && (0.0..=3.0).contains(&y));
        }
    }

    #[test]
    fn test_out_of_range_thresholds_are_empty() {
        let noise = generate(0.42, 40, 40, 3.0).unwrap();
        let bands = extract(&noise, &[-5.0, 0.0, 5.0]).unwrap();
        assert_eq!(bands.len(), 3);
        assert!(bands[0].is_empty());
        assert!(!bands[1].is_empty());
        assert!(bands[2].is_empty());
    }

    #[test]
    fn test_one_band_per_threshold_in_order() {
        let noise = generate(0.42, 200, 200, 3.0).unwrap();
        let thresholds = [0.0, 0.2, 0.4, 0.6, 0.8];
        let bands = extract(&noise, &thresholds).unwrap();
        assert_eq!(bands.len(), thresholds.len());
        for (band, &t) in bands.iter().zip(&thresholds) {
            assert_eq!(band.threshold, t);
            for ring in band.rings() {
                assert!(ring.len() >= 4);
                assert_eq!(ring.first(), ring.last());
                for &(x, y) in ring {
                    assert!((0.0..=200.0).contains(&x) && (0.0..=200.0).contains(&y));
                }
            }
        }
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let noise = generate(0.42, 10, 10, 3.0).unwrap();
        assert!(extract(&noise, &[0.2, 0.1]).is_err());
        assert!(extract(&noise, &[0.2, 0.2]).is_err());
        assert!(extract(&noise, &[f64::NAN]).is_err());
        assert_eq!(extract(&noise, &[]).unwrap(), Vec::new());
    }
}
