// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the markscan-engine crate: full extraction of a
// synthetic photographed sheet, and the boundary search on its own.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{GrayImage, Luma, imageops};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};

use markscan_core::ExtractionConfig;
use markscan_engine::{Extractor, Normalizer, RawImage};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// An 800x1100 page with the default 5x10 grid, every third question marked,
/// pasted onto a 1000x1300 dark background.
fn synthetic_photo() -> RawImage {
    let mut page = GrayImage::from_pixel(800, 1100, Luma([250u8]));
    let (column_w, row_h) = (736.0 / 5.0, 594.0 / 10.0);
    for question in 0..50u32 {
        let (column, row) = (question / 10, question % 10);
        for option in 0..4u32 {
            let x = 32.0 + column as f32 * column_w + (option as f32 + 0.5) * column_w / 4.0;
            let y = 418.0 + (row as f32 + 0.5) * row_h;
            let center = (x.round() as i32, y.round() as i32);
            if question % 3 == 0 && option == question % 4 {
                draw_filled_circle_mut(&mut page, center, 12, Luma([20u8]));
            } else {
                draw_hollow_circle_mut(&mut page, center, 12, Luma([120u8]));
            }
        }
    }

    let mut canvas = GrayImage::from_pixel(1000, 1300, Luma([40u8]));
    imageops::replace(&mut canvas, &page, 100, 100);
    RawImage::from_gray(canvas)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_full_extraction(c: &mut Criterion) {
    let photo = synthetic_photo();
    let extractor = match Extractor::new(ExtractionConfig::default()) {
        Ok(extractor) => extractor,
        Err(err) => panic!("default configuration rejected: {err}"),
    };

    c.bench_function("extract (1000x1300 photo, 50 questions)", |b| {
        b.iter(|| black_box(extractor.extract(black_box(&photo))));
    });
}

fn bench_normalization(c: &mut Criterion) {
    let photo = synthetic_photo();
    let config = ExtractionConfig::default();

    c.bench_function("normalize (1000x1300 photo)", |b| {
        b.iter(|| {
            let normalized = Normalizer::new(&config.normalize).normalize(black_box(&photo));
            black_box(normalized.map(|n| n.boundary).ok());
        });
    });
}

criterion_group!(benches, bench_full_extraction, bench_normalization);
criterion_main!(benches);
