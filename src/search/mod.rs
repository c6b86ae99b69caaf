//! Integer template searches used to (re)initialize subsets.
//!
//! A search scores every integer placement of a subset template with masked
//! ZNCC, keeps the best one and refines it to sub-pixel precision with a
//! separable parabola fit over its 3x3 neighbourhood. [`search_translation`]
//! scans a window around a predicted position; [`coarse::coarse_to_fine`]
//! covers the whole image through a pyramid.

pub mod coarse;
pub(crate) mod peak;

use crate::image::Image;
use crate::kernel::{scan_best, zncc_at, Peak, ScanWindow, TemplatePlan};
use crate::subset::Subset;
use crate::trace::trace_event;

/// Translation estimate from a template search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchResult {
    pub u: f64,
    pub v: f64,
    /// ZNCC score of the integer peak, in `[-1, 1]`.
    pub score: f64,
}

/// Rectangular template covering a subset's bounding box.
pub(crate) struct SubsetTemplate {
    pub plan: TemplatePlan,
    pub x0: usize,
    pub y0: usize,
}

impl SubsetTemplate {
    /// Builds the template from the subset's active reference pixels.
    pub(crate) fn new(subset: &Subset) -> Option<Self> {
        let (x0, y0, x1, y1) = subset.bounds();
        let width = x1 - x0 + 1;
        let height = y1 - y0 + 1;
        let mut values = vec![0.0; width * height];
        let mut mask = vec![false; width * height];
        for (i, &(x, y)) in subset.pixels().iter().enumerate() {
            if !subset.is_active(i) {
                continue;
            }
            let idx = (y as usize - y0) * width + (x as usize - x0);
            values[idx] = subset.reference()[i];
            mask[idx] = true;
        }
        let plan = TemplatePlan::new(&values, &mask, width, height)?;
        Some(Self { plan, x0, y0 })
    }
}

/// Refines an integer peak and converts the placement to a translation.
pub(crate) fn refine_to_translation(
    image: &Image,
    plan: &TemplatePlan,
    peak: Peak,
    origin: (usize, usize),
) -> SearchResult {
    let mut s = [[f64::NEG_INFINITY; 3]; 3];
    for (yi, row) in s.iter_mut().enumerate() {
        for (xi, v) in row.iter_mut().enumerate() {
            let x = (peak.x + xi).checked_sub(1);
            let y = (peak.y + yi).checked_sub(1);
            if let (Some(x), Some(y)) = (x, y) {
                *v = zncc_at(image, plan, x, y);
            }
        }
    }
    let (dx, dy) = peak::refine_peak(s);
    SearchResult {
        u: peak.x as f64 + dx - origin.0 as f64,
        v: peak.y as f64 + dy - origin.1 as f64,
        score: peak.score,
    }
}

/// Searches `radius` pixels around the predicted translation `(u, v)`.
pub fn search_translation(
    subset: &Subset,
    deformed: &Image,
    predicted: (f64, f64),
    radius: usize,
) -> Option<SearchResult> {
    let template = SubsetTemplate::new(subset)?;
    let cx = template.x0 as f64 + predicted.0.round();
    let cy = template.y0 as f64 + predicted.1.round();
    if !cx.is_finite() || !cy.is_finite() {
        return None;
    }
    let r = radius as f64;
    if cx + r < 0.0 || cy + r < 0.0 {
        return None;
    }
    let window = ScanWindow {
        x0: (cx - r).max(0.0) as usize,
        y0: (cy - r).max(0.0) as usize,
        x1: (cx + r) as usize,
        y1: (cy + r) as usize,
    };
    let peak = scan_best(deformed, &template.plan, window)?;
    let result = refine_to_translation(deformed, &template.plan, peak, (template.x0, template.y0));
    trace_event!(
        "search",
        subset = subset.id(),
        u = result.u,
        v = result.v,
        score = result.score
    );
    Some(result)
}
