//! Row-parallel template scans (feature-gated).
//!
//! Each row reports its own best placement; rows are then merged in order
//! with the same tie rule as the sequential scan, so both agree exactly.

use crate::image::Image;
use crate::kernel::{zncc_at, Peak, ScanWindow, TemplatePlan};
use rayon::prelude::*;

pub(crate) fn scan_best_par(image: &Image, plan: &TemplatePlan, window: ScanWindow) -> Option<Peak> {
    let row_best: Vec<Option<Peak>> = (window.y0..=window.y1)
        .into_par_iter()
        .map(|y| {
            let mut best = None;
            for x in window.x0..=window.x1 {
                let score = zncc_at(image, plan, x, y);
                if !score.is_finite() {
                    continue;
                }
                let peak = Peak { x, y, score };
                if peak.beats(&best) {
                    best = Some(peak);
                }
            }
            best
        })
        .collect();

    let mut best = None;
    for peak in row_best.into_iter().flatten() {
        if peak.beats(&best) {
            best = Some(peak);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::scan_best_par;
    use crate::image::Image;
    use crate::kernel::{scan_rows, ScanWindow, TemplatePlan};

    #[test]
    fn parallel_scan_matches_sequential() {
        let img = Image::from_fn(48, 40, |x, y| {
            50.0 + 20.0 * (0.4 * x).sin() * (0.3 * y + 0.2).cos() + 0.1 * x * y
        })
        .unwrap();
        let tpl = img.window(12, 9, 9, 9);
        let plan = TemplatePlan::new(&tpl, &[true; 81], 9, 9).unwrap();
        let window = ScanWindow {
            x0: 0,
            y0: 0,
            x1: 39,
            y1: 31,
        };
        assert_eq!(
            scan_best_par(&img, &plan, window),
            scan_rows(&img, &plan, window)
        );
    }
}
