//! Coarse-to-fine template search over image pyramids.
//!
//! The full placement range is scanned at the coarsest level; each finer
//! level rescans a small window around the doubled previous position. Only
//! the base level is refined to sub-pixel precision.

use crate::image::pyramid::ImagePyramid;
use crate::image::ImageField;
use crate::kernel::{scan_best, ScanWindow, TemplatePlan};
use crate::search::{refine_to_translation, SearchResult};
use crate::subset::Subset;
use crate::trace::{trace_event, trace_span};

/// Radius of the rescan window on finer levels.
const LEVEL_RADIUS: usize = 2;
/// Smallest template side kept at a coarse level.
const MIN_TEMPLATE_SIDE: usize = 5;

/// Locates the subset's bounding-box patch anywhere in the deformed image.
pub fn coarse_to_fine(
    subset: &Subset,
    reference: &ImagePyramid,
    deformed: &ImagePyramid,
) -> Option<SearchResult> {
    let (bx0, by0, bx1, by1) = subset.bounds();
    let width = bx1 - bx0 + 1;
    let height = by1 - by0 + 1;

    let mut top = reference.len().min(deformed.len()).saturating_sub(1);
    while top > 0 && (width >> top < MIN_TEMPLATE_SIDE || height >> top < MIN_TEMPLATE_SIDE) {
        top -= 1;
    }
    let _span = trace_span!("coarse_to_fine", subset = subset.id(), levels = top + 1).entered();

    let mut estimate: Option<(usize, usize)> = None;
    for level in (0..=top).rev() {
        let ref_level = reference.level(level)?;
        let def_level = deformed.level(level)?;
        let (x0, y0) = (bx0 >> level, by0 >> level);
        let (w, h) = (width >> level, height >> level);
        let values = ref_level.window(x0 as isize, y0 as isize, w, h);
        let plan = TemplatePlan::new(&values, &vec![true; w * h], w, h)?;

        let window = match estimate {
            None => ScanWindow {
                x0: 0,
                y0: 0,
                x1: def_level.width(),
                y1: def_level.height(),
            },
            Some((px, py)) => ScanWindow {
                x0: (2 * px).saturating_sub(LEVEL_RADIUS),
                y0: (2 * py).saturating_sub(LEVEL_RADIUS),
                x1: 2 * px + LEVEL_RADIUS,
                y1: 2 * py + LEVEL_RADIUS,
            },
        };
        let peak = scan_best(def_level, &plan, window)?;
        if level == 0 {
            let result = refine_to_translation(def_level, &plan, peak, (x0, y0));
            trace_event!("coarse_to_fine_match", u = result.u, v = result.v, score = result.score);
            return Some(result);
        }
        estimate = Some((peak.x, peak.y));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::coarse_to_fine;
    use crate::image::pyramid::ImagePyramid;
    use crate::optimizer::test_support::blob_pair;
    use crate::subset::Subset;

    #[test]
    fn finds_a_shift_larger_than_the_subset() {
        let (reference, deformed) = blob_pair(18.0, 11.0);
        let subset = Subset::square(0, 50, 50, 31, &reference).unwrap();
        let rp = ImagePyramid::build(&reference, 3, 16).unwrap();
        let dp = ImagePyramid::build(&deformed, 3, 16).unwrap();
        let found = coarse_to_fine(&subset, &rp, &dp).unwrap();
        assert!((found.u - 18.0).abs() < 0.5, "u = {}", found.u);
        assert!((found.v - 11.0).abs() < 0.5, "v = {}", found.v);
    }
}
