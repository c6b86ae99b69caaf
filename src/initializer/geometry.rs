//! Initial guesses from externally supplied point mappings.

use super::{GuessSource, InitContext, InitFailure, InitialGuess, InitializationMethod, Initializer};
use crate::shape::{Dof, Motion};
use crate::util::math::wrap_angle;
use crate::util::{DicError, DicResult};
use nalgebra::{Matrix3, Vector3};

/// Maps reference-image points into the deformed image.
pub trait PointTransform: Send + Sync {
    /// Returns `Ok(None)` where the mapping is undefined; an error when the
    /// collaborator itself fails.
    fn apply(&self, x: f64, y: f64) -> DicResult<Option<(f64, f64)>>;
}

/// Planar projective mapping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    h: Matrix3<f64>,
}

impl Homography {
    /// Row-major 3x3 coefficients.
    pub fn new(coefficients: [f64; 9]) -> DicResult<Self> {
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(DicError::InvalidConfig("homography has non-finite coefficients"));
        }
        let h = Matrix3::from_row_slice(&coefficients);
        if h.determinant().abs() < 1.0e-12 {
            return Err(DicError::InvalidConfig("homography is singular"));
        }
        Ok(Self { h })
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            h: Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0),
        }
    }
}

impl PointTransform for Homography {
    fn apply(&self, x: f64, y: f64) -> DicResult<Option<(f64, f64)>> {
        let p = self.h * Vector3::new(x, y, 1.0);
        if p.z.abs() < 1.0e-12 {
            return Ok(None);
        }
        let (mx, my) = (p.x / p.z, p.y / p.z);
        if !(mx.is_finite() && my.is_finite()) {
            return Err(DicError::NumericalFailure("homography produced a non-finite point"));
        }
        Ok(Some((mx, my)))
    }
}

/// Sparse point correspondences interpolated by inverse squared distance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Correspondences {
    pairs: Vec<((f64, f64), (f64, f64))>,
}

impl Correspondences {
    /// `pairs` holds `(reference point, deformed point)`.
    pub fn new(pairs: Vec<((f64, f64), (f64, f64))>) -> DicResult<Self> {
        if pairs.is_empty() {
            return Err(DicError::InvalidConfig("correspondence set is empty"));
        }
        let finite = pairs
            .iter()
            .all(|&((a, b), (c, d))| a.is_finite() && b.is_finite() && c.is_finite() && d.is_finite());
        if !finite {
            return Err(DicError::InvalidConfig("correspondence set has non-finite points"));
        }
        Ok(Self { pairs })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl PointTransform for Correspondences {
    fn apply(&self, x: f64, y: f64) -> DicResult<Option<(f64, f64)>> {
        let (mut wsum, mut du, mut dv) = (0.0, 0.0, 0.0);
        for &((rx, ry), (dx, dy)) in &self.pairs {
            let d2 = (rx - x).powi(2) + (ry - y).powi(2);
            if d2 < 1.0e-18 {
                return Ok(Some((dx, dy)));
            }
            let w = 1.0 / d2;
            wsum += w;
            du += w * (dx - rx);
            dv += w * (dy - ry);
        }
        Ok((wsum > 0.0).then(|| (x + du / wsum, y + dv / wsum)))
    }
}

/// Centroid mapped through a [`PointTransform`]; rotation from the mapped
/// unit offset.
pub struct TransformInitializer {
    method: InitializationMethod,
    transform: Box<dyn PointTransform>,
}

impl TransformInitializer {
    pub fn new(method: InitializationMethod, transform: Box<dyn PointTransform>) -> Self {
        Self { method, transform }
    }
}

impl Initializer for TransformInitializer {
    fn method(&self) -> InitializationMethod {
        self.method
    }

    fn initialize(&self, ctx: &InitContext<'_>, subset: usize) -> Result<InitialGuess, InitFailure> {
        let (cx, cy) = ctx.subset(subset)?.centroid();
        let (mx, my) = self
            .transform
            .apply(cx, cy)?
            .ok_or(InitFailure::NoEstimate("centroid outside the transform domain"))?;
        let theta = if ctx.shape.index_of(Dof::Theta).is_some() {
            let (ax, ay) = self
                .transform
                .apply(cx + 1.0, cy)?
                .ok_or(InitFailure::NoEstimate("offset outside the transform domain"))?;
            wrap_angle((ay - my).atan2(ax - mx))
        } else {
            0.0
        };
        let params = ctx.shape.params_from_motion(&Motion {
            u: mx - cx,
            v: my - cy,
            theta,
            ..Motion::default()
        });
        ctx.guess(subset, params, GuessSource::PointTransform)
    }
}

#[cfg(test)]
mod tests {
    use super::{Correspondences, Homography, PointTransform, TransformInitializer};
    use crate::initializer::test_support::Fixture;
    use crate::initializer::{GuessSource, InitializationMethod, Initializer};
    use crate::optimizer::test_support::shifted_pair;
    use crate::shape::{DofFlags, ShapeFunction, ShapeFunctionType};
    use crate::subset::Subset;

    #[test]
    fn homography_maps_points() {
        let h = Homography::translation(2.0, -1.0);
        assert_eq!(h.apply(3.0, 4.0), Ok(Some((5.0, 3.0))));
        assert!(Homography::new([0.0; 9]).is_err());
        let scale = Homography::new([2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(scale.apply(1.5, -1.0), Ok(Some((3.0, -2.0))));
        let vanishing = Homography::new([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]).unwrap();
        assert_eq!(vanishing.apply(-1.0, 0.0), Ok(None));
    }

    #[test]
    fn correspondences_interpolate_displacements() {
        let c = Correspondences::new(vec![
            ((0.0, 0.0), (1.0, 0.0)),
            ((10.0, 0.0), (13.0, 0.0)),
        ])
        .unwrap();
        assert_eq!(c.apply(0.0, 0.0), Ok(Some((1.0, 0.0))));
        let (x, _) = c.apply(5.0, 0.0).unwrap().unwrap();
        assert!((x - 7.0).abs() < 1e-12);
        assert!(Correspondences::new(Vec::new()).is_err());
    }

    #[test]
    fn guess_carries_translation_and_rotation() {
        let (reference, deformed) = shifted_pair(2.0, -1.0);
        let subsets = vec![Subset::square(0, 50, 50, 21, &reference).unwrap()];
        let flags = DofFlags {
            rotation: true,
            ..DofFlags::default()
        };
        let shape = ShapeFunction::new(ShapeFunctionType::Affine, &flags).unwrap();
        let fx = Fixture::new(reference, deformed, subsets, shape);
        let init = TransformInitializer::new(
            InitializationMethod::UsePlanarProjection,
            Box::new(Homography::translation(2.0, -1.0)),
        );
        let g = init.initialize(&fx.ctx(0), 0).unwrap();
        assert_eq!(g.source, GuessSource::PointTransform);
        assert_eq!(g.params.len(), 3);
        assert!((g.params[0] - 2.0).abs() < 1e-9 && (g.params[1] + 1.0).abs() < 1e-9);
        assert!(g.params[2].abs() < 1e-9);
        assert!(g.gamma < 1e-3);
    }
}
