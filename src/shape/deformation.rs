//! Generic deformation map shared by every shape-function type.
//!
//! For a reference pixel at offset `(dx, dy)` from the subset centroid:
//!
//! ```text
//! sx = (1 + ex) dx + g dy        sy = g dx + (1 + ey) dy
//! lx = cos(t) sx - sin(t) sy     ly = sin(t) sx + cos(t) sy
//! qx = uxx dx^2 / 2 + uxy dx dy + uyy dy^2 / 2   (qy likewise)
//! w  = 1 + px dx + py dy
//! X  = cx + (lx + qx + u) / w    Y  = cy + (ly + qy + v) / w
//! ```
//!
//! Disabled degrees of freedom hold zero, which reduces the map to the
//! identity when every value is zero.

use super::Dof;

/// Values of all generic degrees of freedom.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Deformation {
    values: [f64; Dof::COUNT],
}

impl Deformation {
    /// Reads one degree of freedom.
    #[inline]
    pub fn get(&self, dof: Dof) -> f64 {
        self.values[dof.slot()]
    }

    /// Writes one degree of freedom.
    #[inline]
    pub fn set(&mut self, dof: Dof, value: f64) {
        self.values[dof.slot()] = value;
    }

    #[inline]
    fn stretched(&self, dx: f64, dy: f64) -> (f64, f64) {
        let g = self.get(Dof::ShearStrain);
        (
            (1.0 + self.get(Dof::NormalStrainX)) * dx + g * dy,
            g * dx + (1.0 + self.get(Dof::NormalStrainY)) * dy,
        )
    }

    #[inline]
    fn quadratic(&self, dx: f64, dy: f64) -> (f64, f64) {
        let qx = 0.5 * self.get(Dof::Uxx) * dx * dx
            + self.get(Dof::Uxy) * dx * dy
            + 0.5 * self.get(Dof::Uyy) * dy * dy;
        let qy = 0.5 * self.get(Dof::Vxx) * dx * dx
            + self.get(Dof::Vxy) * dx * dy
            + 0.5 * self.get(Dof::Vyy) * dy * dy;
        (qx, qy)
    }

    #[inline]
    fn weight(&self, dx: f64, dy: f64) -> f64 {
        1.0 + self.get(Dof::ProjectionAugX) * dx + self.get(Dof::ProjectionAugY) * dy
    }

    /// Numerators `(nx, ny)`, rotated stretch `(lx, ly)` and projective weight.
    #[inline]
    fn parts(&self, dx: f64, dy: f64) -> ((f64, f64), (f64, f64), f64) {
        let (sx, sy) = self.stretched(dx, dy);
        let (sin_t, cos_t) = self.get(Dof::Theta).sin_cos();
        let lx = cos_t * sx - sin_t * sy;
        let ly = sin_t * sx + cos_t * sy;
        let (qx, qy) = self.quadratic(dx, dy);
        let nx = lx + qx + self.get(Dof::U);
        let ny = ly + qy + self.get(Dof::V);
        ((nx, ny), (lx, ly), self.weight(dx, dy))
    }

    /// Maps a reference pixel to deformed-image coordinates.
    #[inline]
    pub fn map(&self, cx: f64, cy: f64, x: f64, y: f64) -> (f64, f64) {
        let ((nx, ny), _, w) = self.parts(x - cx, y - cy);
        (cx + nx / w, cy + ny / w)
    }

    /// Derivatives `(dX/dp, dY/dp)` of the map with respect to one DOF.
    pub fn derivative(&self, dof: Dof, cx: f64, cy: f64, x: f64, y: f64) -> (f64, f64) {
        let dx = x - cx;
        let dy = y - cy;
        let ((nx, ny), (lx, ly), w) = self.parts(dx, dy);
        let inv_w = 1.0 / w;
        let (sin_t, cos_t) = self.get(Dof::Theta).sin_cos();
        match dof {
            Dof::U => (inv_w, 0.0),
            Dof::V => (0.0, inv_w),
            Dof::Theta => (-ly * inv_w, lx * inv_w),
            Dof::NormalStrainX => (cos_t * dx * inv_w, sin_t * dx * inv_w),
            Dof::NormalStrainY => (-sin_t * dy * inv_w, cos_t * dy * inv_w),
            Dof::ShearStrain => (
                (cos_t * dy - sin_t * dx) * inv_w,
                (sin_t * dy + cos_t * dx) * inv_w,
            ),
            Dof::Uxx => (0.5 * dx * dx * inv_w, 0.0),
            Dof::Uyy => (0.5 * dy * dy * inv_w, 0.0),
            Dof::Uxy => (dx * dy * inv_w, 0.0),
            Dof::Vxx => (0.0, 0.5 * dx * dx * inv_w),
            Dof::Vyy => (0.0, 0.5 * dy * dy * inv_w),
            Dof::Vxy => (0.0, dx * dy * inv_w),
            Dof::ProjectionAugX => (-nx * dx * inv_w * inv_w, -ny * dx * inv_w * inv_w),
            Dof::ProjectionAugY => (-nx * dy * inv_w * inv_w, -ny * dy * inv_w * inv_w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Deformation;
    use crate::shape::Dof;

    fn sample() -> Deformation {
        let mut d = Deformation::default();
        let values = [
            (Dof::U, 1.2),
            (Dof::V, -0.7),
            (Dof::Theta, 0.05),
            (Dof::NormalStrainX, 0.01),
            (Dof::NormalStrainY, -0.02),
            (Dof::ShearStrain, 0.015),
            (Dof::Uxx, 1e-3),
            (Dof::Uyy, -2e-3),
            (Dof::Uxy, 5e-4),
            (Dof::Vxx, -1e-3),
            (Dof::Vyy, 3e-4),
            (Dof::Vxy, 2e-3),
            (Dof::ProjectionAugX, 1e-3),
            (Dof::ProjectionAugY, -2e-3),
        ];
        for (dof, v) in values {
            d.set(dof, v);
        }
        d
    }

    #[test]
    fn analytic_derivatives_match_finite_differences() {
        let base = sample();
        let (cx, cy, x, y) = (20.0, 30.0, 27.0, 24.0);
        let h = 1e-6;
        for dof in Dof::ALL {
            let mut plus = base;
            let mut minus = base;
            plus.set(dof, base.get(dof) + h);
            minus.set(dof, base.get(dof) - h);
            let (xp, yp) = plus.map(cx, cy, x, y);
            let (xm, ym) = minus.map(cx, cy, x, y);
            let (ax, ay) = base.derivative(dof, cx, cy, x, y);
            assert!(((xp - xm) / (2.0 * h) - ax).abs() < 1e-5, "{dof:?} x");
            assert!(((yp - ym) / (2.0 * h) - ay).abs() < 1e-5, "{dof:?} y");
        }
    }

    #[test]
    fn centroid_moves_by_translation_only() {
        let d = sample();
        let (x, y) = d.map(20.0, 30.0, 20.0, 30.0);
        assert!((x - 21.2).abs() < 1e-12);
        assert!((y - 29.3).abs() < 1e-12);
    }
}
