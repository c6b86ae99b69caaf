//! Sub-sample peak localization by parabola fitting.

/// Offset of the vertex of the parabola through `(-1, fm)`, `(0, f0)`,
/// `(1, fp)`.
///
/// Returns `None` unless the parabola is concave, well conditioned and its
/// vertex lies within one sample of the centre.
pub(crate) fn parabolic_offset(fm: f64, f0: f64, fp: f64) -> Option<f64> {
    if !(fm.is_finite() && f0.is_finite() && fp.is_finite()) {
        return None;
    }
    let curvature = fm - 2.0 * f0 + fp;
    if curvature >= -1.0e-12 {
        return None;
    }
    let offset = 0.5 * (fm - fp) / curvature;
    (offset.is_finite() && offset.abs() <= 1.0).then_some(offset)
}

/// Separable refinement of a 3x3 score neighbourhood centred on `s[1][1]`.
///
/// Rows are `y`, columns are `x`; ill-conditioned directions keep a zero
/// offset.
pub(crate) fn refine_peak(s: [[f64; 3]; 3]) -> (f64, f64) {
    let dx = parabolic_offset(s[1][0], s[1][1], s[1][2]).unwrap_or(0.0);
    let dy = parabolic_offset(s[0][1], s[1][1], s[2][1]).unwrap_or(0.0);
    (dx, dy)
}

#[cfg(test)]
mod tests {
    use super::{parabolic_offset, refine_peak};

    #[test]
    fn parabola_vertex_is_recovered() {
        let f = |x: f64| 2.0 - (x + 0.35).powi(2);
        let dx = parabolic_offset(f(-1.0), f(0.0), f(1.0)).unwrap();
        assert!((dx + 0.35).abs() < 1e-12);
        assert!(parabolic_offset(1.0, 0.5, 1.0).is_none());
        assert!(parabolic_offset(f64::NAN, 0.5, 1.0).is_none());
    }

    #[test]
    fn separable_paraboloid() {
        let mut s = [[0.0; 3]; 3];
        for (yi, row) in s.iter_mut().enumerate() {
            for (xi, v) in row.iter_mut().enumerate() {
                let (x, y) = (xi as f64 - 1.0, yi as f64 - 1.0);
                *v = 1.0 - (x - 0.2).powi(2) - 0.5 * (y + 0.4).powi(2);
            }
        }
        let (dx, dy) = refine_peak(s);
        assert!((dx - 0.2).abs() < 1e-12);
        assert!((dy + 0.4).abs() < 1e-12);
    }
}
