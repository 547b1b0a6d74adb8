// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Boundary geometry on top of `imageproc::geometry`: convexity, hull corner
// picking, and the canonical document quadrilateral.

use std::cmp::Ordering;

use imageproc::geometry::contour_area;
use imageproc::point::Point;
use markscan_core::Point2;
use markscan_core::error::{MarkscanError, Result};

/// Shortest side a document quadrilateral may have, in pixels.
const MIN_SIDE: f32 = 1.0;

/// Smallest enclosed area a document quadrilateral may have, in square pixels.
const MIN_AREA: f32 = 1.0;

/// Convert an imageproc contour point.
pub fn to_point2(point: Point<i32>) -> Point2 {
    Point2::new(point.x as f32, point.y as f32)
}

fn cross(o: Point2, a: Point2, b: Point2) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Whether a closed polygon is strictly convex. Collinear vertices and
/// self-intersecting outlines both fail.
pub fn is_convex(points: &[Point2]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f32;
    for i in 0..n {
        let turn = cross(points[i], points[(i + 1) % n], points[(i + 2) % n]);
        if turn == 0.0 || !turn.is_finite() {
            return false;
        }
        if sign == 0.0 {
            sign = turn.signum();
        } else if turn.signum() != sign {
            return false;
        }
    }
    // A pentagram turns consistently but winds twice.
    let winding: f32 = (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            let c = points[(i + 2) % n];
            let u = (b.x - a.x, b.y - a.y);
            let v = (c.x - b.x, c.y - b.y);
            (u.0 * v.1 - u.1 * v.0).atan2(u.0 * v.0 + u.1 * v.1)
        })
        .sum();
    (winding.abs() - std::f32::consts::TAU).abs() < 1e-2
}

fn lexicographic(a: &Point2, b: &Point2) -> Ordering {
    a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y))
}

/// For each corner of a `width x height` frame (TL, TR, BR, BL), the point of
/// `candidates` nearest to it.
pub fn nearest_to_frame_corners(
    candidates: &[Point2],
    width: f32,
    height: f32,
) -> Option<[Point2; 4]> {
    let frame = [
        Point2::new(0.0, 0.0),
        Point2::new(width, 0.0),
        Point2::new(width, height),
        Point2::new(0.0, height),
    ];
    let mut picked = [Point2::default(); 4];
    for (slot, corner) in picked.iter_mut().zip(frame.iter()) {
        *slot = *candidates
            .iter()
            .min_by(|a, b| a.distance(corner).total_cmp(&b.distance(corner)))?;
    }
    Some(picked)
}

// -- Quadrilateral ------------------------------------------------------------

/// A document boundary in canonical corner order: top-left, top-right,
/// bottom-right, bottom-left.
///
/// Construction rejects degenerate input, so every `Quadrilateral` is safe to
/// hand to a homography.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrilateral {
    corners: [Point2; 4],
}

impl Quadrilateral {
    /// Canonicalize and validate four corners given in any order.
    pub fn new(points: [Point2; 4]) -> Result<Self> {
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(MarkscanError::BoundaryNotFound(
                "quadrilateral has a non-finite corner".into(),
            ));
        }

        let corners = canonical_order(points);

        for i in 0..4 {
            let side = corners[i].distance(&corners[(i + 1) % 4]);
            if side < MIN_SIDE {
                return Err(MarkscanError::BoundaryNotFound(format!(
                    "quadrilateral side {i} is only {side:.2} px long"
                )));
            }
        }
        let area = enclosed_area(&corners);
        if area < MIN_AREA {
            return Err(MarkscanError::BoundaryNotFound(format!(
                "quadrilateral encloses {area:.2} px²"
            )));
        }
        if !is_convex(&corners) {
            return Err(MarkscanError::BoundaryNotFound(
                "quadrilateral is not convex".into(),
            ));
        }

        Ok(Self { corners })
    }

    pub fn corners(&self) -> [Point2; 4] {
        self.corners
    }

    pub fn top_left(&self) -> Point2 {
        self.corners[0]
    }

    pub fn top_right(&self) -> Point2 {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point2 {
        self.corners[2]
    }

    pub fn bottom_left(&self) -> Point2 {
        self.corners[3]
    }

    pub fn area(&self) -> f32 {
        enclosed_area(&self.corners)
    }

    /// Corners as `(x, y)` tuples for projective transforms.
    pub fn control_points(&self) -> [(f32, f32); 4] {
        self.corners.map(|p| (p.x, p.y))
    }
}

fn enclosed_area(corners: &[Point2; 4]) -> f32 {
    contour_area(&corners.map(|p| Point::new(p.x, p.y))) as f32
}

/// Order four points TL, TR, BR, BL.
///
/// Coordinate sum picks TL (min) and BR (max); `y - x` picks TR (min) and
/// BL (max). When those four picks collide (a page rotated near 45°), the
/// points are instead ordered by angle about their centroid starting from TL.
/// Input is sorted first so every permutation yields the same output.
fn canonical_order(mut points: [Point2; 4]) -> [Point2; 4] {
    points.sort_by(lexicographic);

    let pick = |key: fn(&Point2) -> f32, max: bool| -> usize {
        let mut best = 0;
        for i in 1..4 {
            let ord = key(&points[i]).total_cmp(&key(&points[best]));
            if (max && ord == Ordering::Greater) || (!max && ord == Ordering::Less) {
                best = i;
            }
        }
        best
    };

    let sum = |p: &Point2| p.x + p.y;
    let diff = |p: &Point2| p.y - p.x;
    let picks = [pick(sum, false), pick(diff, false), pick(sum, true), pick(diff, true)];

    let distinct = (0..4).all(|i| (i + 1..4).all(|j| picks[i] != picks[j]));
    if distinct {
        return picks.map(|i| points[i]);
    }

    let cx = points.iter().map(|p| p.x).sum::<f32>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f32>() / 4.0;
    let mut by_angle = points;
    by_angle.sort_by(|a, b| {
        (a.y - cy)
            .atan2(a.x - cx)
            .total_cmp(&(b.y - cy).atan2(b.x - cx))
            .then(lexicographic(a, b))
    });
    let start = (1..4).fold(0, |best, i| {
        if sum(&by_angle[i]).total_cmp(&sum(&by_angle[best])) == Ordering::Less {
            i
        } else {
            best
        }
    });
    by_angle.rotate_left(start);
    by_angle
}
