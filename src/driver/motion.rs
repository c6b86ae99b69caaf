//! Frame-to-frame motion detection on subset windows.

use crate::image::{Image, ImageField};
use crate::subset::Subset;

/// Mean absolute intensity change over the subset's active pixels between
/// two deformed frames. `None` when the frames differ in size or the subset
/// has no active pixels.
pub fn mean_abs_change(previous: &Image, current: &Image, subset: &Subset) -> Option<f64> {
    if previous.width() != current.width() || previous.height() != current.height() {
        return None;
    }
    let (mut sum, mut count) = (0.0, 0usize);
    for (i, &(x, y)) in subset.pixels().iter().enumerate() {
        let (x, y) = (x as usize, y as usize);
        if !subset.is_active(i) || x >= current.width() || y >= current.height() {
            continue;
        }
        sum += (current.intensity(x, y) - previous.intensity(x, y)).abs();
        count += 1;
    }
    (count > 0).then(|| sum / count as f64)
}
