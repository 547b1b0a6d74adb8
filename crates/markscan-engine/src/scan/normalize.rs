// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Geometric normalizer: find the sheet's boundary in a captured image and
// rectify it to the canonical frame every later stage works in.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area, convex_hull};
use imageproc::morphology::dilate;
use imageproc::point::Point;
use markscan_core::config::{BoundaryStrategy, NormalizeConfig};
use markscan_core::error::{MarkscanError, Result};
use markscan_core::{BoundaryKind, Point2};
use tracing::{debug, info, instrument, warn};

use crate::raster::RawImage;
use crate::scan::geometry::{Quadrilateral, is_convex, nearest_to_frame_corners, to_point2};

/// The sheet rectified to the canonical frame.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub gray: GrayImage,
    /// Which strategy of the fallback chain produced this image.
    pub boundary: BoundaryKind,
    /// The source-image quadrilateral, absent for a full-frame resize.
    pub quad: Option<Quadrilateral>,
}

/// An outer contour of the edge map, with its enclosed area.
#[derive(Debug, Clone)]
struct Candidate {
    points: Vec<Point<i32>>,
    area: f64,
}

/// Runs the boundary fallback chain from [`NormalizeConfig::fallbacks`].
pub struct Normalizer<'a> {
    config: &'a NormalizeConfig,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a NormalizeConfig) -> Self {
        Self { config }
    }

    /// Rectify `raw` into the canonical frame.
    ///
    /// Strategies are tried in configured order; the first that yields a
    /// usable quadrilateral wins. When every strategy fails the run fails with
    /// [`MarkscanError::BoundaryNotFound`].
    #[instrument(skip_all, fields(width = raw.width(), height = raw.height()))]
    pub fn normalize(&self, raw: &RawImage) -> Result<NormalizedImage> {
        let gray = raw.to_gray();
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(MarkscanError::Input("image has no pixels".into()));
        }

        let candidates = self.contour_candidates(&gray);
        info!(candidates = candidates.len(), "Boundary candidates collected");

        for strategy in &self.config.fallbacks {
            let attempt = match strategy {
                BoundaryStrategy::ContourQuad => self.contour_quad(&candidates, width, height),
                BoundaryStrategy::HullCorners => self.hull_corners(&candidates, width, height),
                BoundaryStrategy::FullFrame => {
                    warn!("No document boundary used; resizing the full frame");
                    return Ok(self.full_frame(&gray));
                }
            };

            match attempt {
                Some(quad) => {
                    let boundary = match strategy {
                        BoundaryStrategy::ContourQuad => BoundaryKind::ContourQuad,
                        _ => BoundaryKind::HullCorners,
                    };
                    if boundary == BoundaryKind::HullCorners {
                        warn!(
                            corners = ?quad.corners(),
                            "No 4-vertex contour; using hull corners as an approximate boundary"
                        );
                    }
                    return self.warp(&gray, quad, boundary);
                }
                None => debug!(?strategy, "Boundary strategy found nothing"),
            }
        }

        warn!("Every boundary strategy failed");
        Err(MarkscanError::BoundaryNotFound(if candidates.is_empty() {
            "no contours in the edge map".into()
        } else {
            format!(
                "none of {} contour(s) yields a usable quadrilateral",
                candidates.len()
            )
        }))
    }

    /// Rectify using corners supplied by the caller, in any order.
    pub fn rectify(&self, raw: &RawImage, corners: [Point2; 4]) -> Result<NormalizedImage> {
        let quad = Quadrilateral::new(corners)?;
        self.warp(&raw.to_gray(), quad, BoundaryKind::ContourQuad)
    }

    // -- Candidate search -----------------------------------------------------

    /// Outer contours of the thickened edge map, largest first.
    fn contour_candidates(&self, gray: &GrayImage) -> Vec<Candidate> {
        let blurred = if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(gray, self.config.blur_sigma)
        } else {
            gray.clone()
        };
        let mut edges = canny(&blurred, self.config.canny_low, self.config.canny_high);
        if self.config.edge_dilation > 0 {
            edges = dilate(&edges, Norm::LInf, self.config.edge_dilation);
        }

        let mut candidates: Vec<Candidate> = find_contours::<i32>(&edges)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter(|c| c.points.len() >= 3)
            .map(|c| Candidate {
                area: contour_area(&c.points),
                points: c.points,
            })
            .collect();

        candidates.sort_by(|a, b| b.area.total_cmp(&a.area));
        candidates.truncate(self.config.max_candidates);
        candidates
    }

    /// Smallest enclosed area a boundary may have in a `width x height` image.
    fn min_area(&self, width: u32, height: u32) -> f64 {
        self.config.min_area_fraction as f64 * width as f64 * height as f64
    }

    /// First candidate that simplifies to a large, convex 4-vertex polygon.
    ///
    /// `find_contours` starts each border at its first pixel in raster order,
    /// an extreme point of the outline, so the closed simplification seam
    /// sits on a hull vertex.
    fn contour_quad(
        &self,
        candidates: &[Candidate],
        width: u32,
        height: u32,
    ) -> Option<Quadrilateral> {
        let min_area = self.min_area(width, height);

        for (rank, candidate) in candidates.iter().enumerate() {
            if candidate.area < min_area {
                debug!(rank, area = candidate.area, min_area, "Contour too small; skipped");
                continue;
            }
            let length = arc_length(&candidate.points, true);
            for &factor in &self.config.approx_factors {
                let epsilon = factor as f64 * length;
                if !(epsilon > 0.0) {
                    continue;
                }
                let approx = approximate_polygon_dp(&candidate.points, epsilon, true);
                if approx.len() != 4 {
                    continue;
                }
                let area = contour_area(&approx);
                if area < min_area {
                    debug!(rank, factor, area, min_area, "4-vertex polygon too small");
                    continue;
                }
                let corners = [
                    to_point2(approx[0]),
                    to_point2(approx[1]),
                    to_point2(approx[2]),
                    to_point2(approx[3]),
                ];
                if !is_convex(&corners) {
                    debug!(rank, factor, "4-vertex polygon is not convex; skipped");
                    continue;
                }
                match Quadrilateral::new(corners) {
                    Ok(quad) => {
                        debug!(rank, factor, area, "Document quadrilateral found");
                        return Some(quad);
                    }
                    Err(err) => debug!(rank, factor, %err, "Degenerate quadrilateral rejected"),
                }
            }
        }
        None
    }

    /// Hull points of the largest contour nearest the four image corners.
    /// The contour itself must clear the same area floor as a true quad.
    fn hull_corners(
        &self,
        candidates: &[Candidate],
        width: u32,
        height: u32,
    ) -> Option<Quadrilateral> {
        let largest = candidates.first()?;
        let min_area = self.min_area(width, height);
        if largest.area < min_area {
            debug!(area = largest.area, min_area, "Largest contour too small for a hull boundary");
            return None;
        }

        let hull: Vec<Point2> = convex_hull(largest.points.clone())
            .into_iter()
            .map(to_point2)
            .collect();
        let corners = nearest_to_frame_corners(&hull, width as f32, height as f32)?;
        match Quadrilateral::new(corners) {
            Ok(quad) => Some(quad),
            Err(err) => {
                debug!(%err, "Hull corners are degenerate");
                None
            }
        }
    }

    // -- Rectification --------------------------------------------------------

    fn canonical_corners(&self) -> [(f32, f32); 4] {
        let w = self.config.canonical_width as f32;
        let h = self.config.canonical_height as f32;
        [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
    }

    fn warp(
        &self,
        gray: &GrayImage,
        quad: Quadrilateral,
        boundary: BoundaryKind,
    ) -> Result<NormalizedImage> {
        let projection =
            Projection::from_control_points(quad.control_points(), self.canonical_corners())
                .ok_or_else(|| {
                    MarkscanError::BoundaryNotFound(
                        "boundary yields a singular perspective transform".into(),
                    )
                })?;

        let mut output = GrayImage::new(self.config.canonical_width, self.config.canonical_height);
        warp_into(gray, &projection, Interpolation::Bilinear, Luma([255u8]), &mut output);

        info!(
            ?boundary,
            out_w = self.config.canonical_width,
            out_h = self.config.canonical_height,
            "Sheet rectified"
        );
        Ok(NormalizedImage {
            gray: output,
            boundary,
            quad: Some(quad),
        })
    }

    fn full_frame(&self, gray: &GrayImage) -> NormalizedImage {
        let resized = imageops::resize(
            gray,
            self.config.canonical_width,
            self.config.canonical_height,
            FilterType::Triangle,
        );
        NormalizedImage {
            gray: resized,
            boundary: BoundaryKind::FullFrame,
            quad: None,
        }
    }
}
