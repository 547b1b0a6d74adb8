// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic answer sheets for tests: an 800x1100 page laid out to
// the default 5x10x4 grid, then "photographed" onto a darker background.

use image::imageops;
use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use imageproc::rect::Rect;
use markscan_core::QuestionId;

use crate::raster::RawImage;

const PAGE_W: u32 = 800;
const PAGE_H: u32 = 1100;
const PAPER: Luma<u8> = Luma([250]);
const PENCIL: Luma<u8> = Luma([20]);
const OUTLINE: Luma<u8> = Luma([120]);
const BACKGROUND: Luma<u8> = Luma([40]);

// Answer block on the page: x 32..768, y 418..1012.
const ZONE_X: f32 = 32.0;
const ZONE_Y: f32 = 418.0;
const ZONE_W: f32 = 736.0;
const ZONE_H: f32 = 594.0;
const COLUMNS: u32 = 5;
const ROWS: u32 = 10;
const OPTIONS: usize = 4;
const BUBBLE_RADIUS: i32 = 12;

/// The answer block as `(x, y, width, height)` page pixels.
pub const ZONE_RECT: (u32, u32, u32, u32) = (32, 418, 736, 594);

/// Builds one rendered answer page.
#[derive(Debug, Clone, Default)]
pub struct SheetBuilder {
    answers: Vec<Option<usize>>,
    extra: Vec<(QuestionId, usize)>,
}

impl SheetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marked option per question, question 1 first; `None` leaves it blank.
    pub fn answers(mut self, answers: &[Option<usize>]) -> Self {
        self.answers = answers.to_vec();
        self
    }

    /// Fill one more bubble on top of the chosen answers.
    pub fn extra_mark(mut self, question: QuestionId, option: usize) -> Self {
        self.extra.push((question, option));
        self
    }

    /// Bubble centre in answer-zone coordinates.
    pub fn zone_center(&self, question: QuestionId, option: usize) -> (f32, f32) {
        let index = question - 1;
        let (column, row) = (index / ROWS, index % ROWS);
        let column_w = ZONE_W / COLUMNS as f32;
        let option_w = column_w / OPTIONS as f32;
        let row_h = ZONE_H / ROWS as f32;
        (
            column as f32 * column_w + (option as f32 + 0.5) * option_w,
            (row as f32 + 0.5) * row_h,
        )
    }

    fn page_center(&self, question: QuestionId, option: usize) -> (i32, i32) {
        let (x, y) = self.zone_center(question, option);
        ((ZONE_X + x).round() as i32, (ZONE_Y + y).round() as i32)
    }

    pub fn render(&self) -> GrayImage {
        let mut page = GrayImage::from_pixel(PAGE_W, PAGE_H, PAPER);

        // Title bar and name box.
        draw_filled_rect_mut(&mut page, Rect::at(60, 60).of_size(680, 40), Luma([60u8]));
        draw_filled_rect_mut(&mut page, Rect::at(60, 160).of_size(300, 6), Luma([90u8]));

        for question in 1..=COLUMNS * ROWS {
            let chosen = self.answers.get(question as usize - 1).copied().flatten();
            for option in 0..OPTIONS {
                let center = self.page_center(question, option);
                let marked = chosen == Some(option) || self.extra.contains(&(question, option));
                if marked {
                    draw_filled_circle_mut(&mut page, center, BUBBLE_RADIUS, PENCIL);
                } else {
                    draw_hollow_circle_mut(&mut page, center, BUBBLE_RADIUS, OUTLINE);
                }
            }
        }
        page
    }
}

/// The page pasted square onto a larger dark background.
pub fn photographed(page: &GrayImage) -> RawImage {
    let mut canvas = GrayImage::from_pixel(page.width() + 200, page.height() + 200, BACKGROUND);
    imageops::replace(&mut canvas, page, 100, 100);
    RawImage::from_gray(canvas)
}

/// The page seen at an angle: rotated a few degrees with some perspective.
pub fn skewed_photo(page: &GrayImage) -> RawImage {
    let (w, h) = (page.width() as f32, page.height() as f32);
    let projection = Projection::from_control_points(
        [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)],
        [(130.0, 90.0), (905.0, 140.0), (870.0, 1230.0), (95.0, 1190.0)],
    )
    .expect("valid skew");
    let mut canvas = GrayImage::from_pixel(1000, 1300, BACKGROUND);
    warp_into(page, &projection, Interpolation::Bilinear, BACKGROUND, &mut canvas);
    RawImage::from_gray(canvas)
}
