//! Shape functions: parametric maps from reference subset pixels to deformed
//! image coordinates.
//!
//! A [`ShapeFunction`] fixes, for the whole run, which generic degrees of
//! freedom ([`Dof`]) are active and in which order they appear in a parameter
//! vector. Parameter vectors are plain `&[f64]` slices of length
//! [`ShapeFunction::num_params`]; the all-zero vector is the identity map for
//! every shape-function type.

mod deformation;

pub use deformation::Deformation;

use crate::field::FieldName;
use crate::util::{DicError, DicResult};
use std::fmt;
use std::str::FromStr;

/// Deformation model family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShapeFunctionType {
    /// Translation, rotation, normal and shear strain, selected by flags.
    #[default]
    Affine,
    /// Full affine plus second-order displacement gradients.
    Quadratic,
    /// Affine plus two projective augmentation terms.
    Projection,
    /// Translation and rotation only.
    RigidBody,
}

impl ShapeFunctionType {
    pub const ALL: [ShapeFunctionType; 4] = [
        Self::Affine,
        Self::Quadratic,
        Self::Projection,
        Self::RigidBody,
    ];

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Affine => "AFFINE",
            Self::Quadratic => "QUADRATIC",
            Self::Projection => "PROJECTION",
            Self::RigidBody => "RIGID_BODY",
        }
    }
}

impl fmt::Display for ShapeFunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeFunctionType {
    type Err = DicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| DicError::InvalidParameterValue {
                name: "shape_function_type".to_string(),
                value: s.to_string(),
            })
    }
}

/// Generic degree of freedom of the deformation map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dof {
    U,
    V,
    Theta,
    NormalStrainX,
    NormalStrainY,
    ShearStrain,
    Uxx,
    Uyy,
    Uxy,
    Vxx,
    Vyy,
    Vxy,
    ProjectionAugX,
    ProjectionAugY,
}

impl Dof {
    /// Number of generic degrees of freedom.
    pub const COUNT: usize = 14;

    pub const ALL: [Dof; Dof::COUNT] = [
        Self::U,
        Self::V,
        Self::Theta,
        Self::NormalStrainX,
        Self::NormalStrainY,
        Self::ShearStrain,
        Self::Uxx,
        Self::Uyy,
        Self::Uxy,
        Self::Vxx,
        Self::Vyy,
        Self::Vxy,
        Self::ProjectionAugX,
        Self::ProjectionAugY,
    ];

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self as usize
    }

    /// Field and component that store this degree of freedom.
    pub fn field(self) -> (FieldName, usize) {
        match self {
            Self::U => (FieldName::Displacement, 0),
            Self::V => (FieldName::Displacement, 1),
            Self::Theta => (FieldName::RotationZ, 0),
            Self::NormalStrainX => (FieldName::NormalStrainXx, 0),
            Self::NormalStrainY => (FieldName::NormalStrainYy, 0),
            Self::ShearStrain => (FieldName::ShearStrainXy, 0),
            Self::Uxx => (FieldName::QuadUxx, 0),
            Self::Uyy => (FieldName::QuadUyy, 0),
            Self::Uxy => (FieldName::QuadUxy, 0),
            Self::Vxx => (FieldName::QuadVxx, 0),
            Self::Vyy => (FieldName::QuadVyy, 0),
            Self::Vxy => (FieldName::QuadVxy, 0),
            Self::ProjectionAugX => (FieldName::ProjectionAugX, 0),
            Self::ProjectionAugY => (FieldName::ProjectionAugY, 0),
        }
    }

    fn simplex_delta(self, delta_disp: f64, delta_theta: f64) -> f64 {
        match self {
            Self::U | Self::V => delta_disp,
            Self::Theta => delta_theta,
            Self::NormalStrainX | Self::NormalStrainY | Self::ShearStrain => 1e-2,
            Self::Uxx | Self::Uyy | Self::Uxy | Self::Vxx | Self::Vyy | Self::Vxy => 1e-3,
            Self::ProjectionAugX | Self::ProjectionAugY => 1e-4,
        }
    }
}

/// Affine DOF switches taken from the parameter set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DofFlags {
    pub translation: bool,
    pub rotation: bool,
    pub normal_strain: bool,
    pub shear_strain: bool,
    /// Required for [`ShapeFunctionType::Projection`].
    pub projection: bool,
}

impl Default for DofFlags {
    fn default() -> Self {
        Self {
            translation: true,
            rotation: false,
            normal_strain: false,
            shear_strain: false,
            projection: false,
        }
    }
}

/// Kinematic summary of a parameter vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Motion {
    pub u: f64,
    pub v: f64,
    pub theta: f64,
    pub ex: f64,
    pub ey: f64,
    pub gxy: f64,
}

/// Active DOF layout for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeFunction {
    kind: ShapeFunctionType,
    dofs: Vec<Dof>,
    index: [Option<usize>; Dof::COUNT],
}

impl ShapeFunction {
    /// Builds the DOF layout for `kind` under `flags`.
    pub fn new(kind: ShapeFunctionType, flags: &DofFlags) -> DicResult<Self> {
        let mut dofs = Vec::with_capacity(Dof::COUNT);
        let affine = |dofs: &mut Vec<Dof>| {
            if flags.translation {
                dofs.extend([Dof::U, Dof::V]);
            }
            if flags.rotation {
                dofs.push(Dof::Theta);
            }
            if flags.normal_strain {
                dofs.extend([Dof::NormalStrainX, Dof::NormalStrainY]);
            }
            if flags.shear_strain {
                dofs.push(Dof::ShearStrain);
            }
        };
        match kind {
            ShapeFunctionType::Affine => affine(&mut dofs),
            ShapeFunctionType::Quadratic => dofs.extend(&Dof::ALL[..12]),
            ShapeFunctionType::Projection => {
                if !flags.projection {
                    return Err(DicError::InvalidConfig(
                        "PROJECTION shape function requires enable_projection_shape_function",
                    ));
                }
                affine(&mut dofs);
                dofs.extend([Dof::ProjectionAugX, Dof::ProjectionAugY]);
            }
            ShapeFunctionType::RigidBody => dofs.extend([Dof::U, Dof::V, Dof::Theta]),
        }
        if dofs.is_empty() {
            return Err(DicError::InvalidConfig(
                "shape function has no enabled degrees of freedom",
            ));
        }
        let mut index = [None; Dof::COUNT];
        for (i, dof) in dofs.iter().enumerate() {
            index[dof.slot()] = Some(i);
        }
        Ok(Self { kind, dofs, index })
    }

    pub fn kind(&self) -> ShapeFunctionType {
        self.kind
    }

    /// Active DOFs in parameter-vector order.
    pub fn dofs(&self) -> &[Dof] {
        &self.dofs
    }

    pub fn num_params(&self) -> usize {
        self.dofs.len()
    }

    /// Position of `dof` in a parameter vector, if active.
    pub fn index_of(&self, dof: Dof) -> Option<usize> {
        self.index[dof.slot()]
    }

    /// Identity parameters.
    pub fn zero_params(&self) -> Vec<f64> {
        vec![0.0; self.dofs.len()]
    }

    /// Value of `dof` in `params`; zero when the DOF is inactive.
    pub fn value(&self, params: &[f64], dof: Dof) -> f64 {
        self.index_of(dof)
            .and_then(|i| params.get(i).copied())
            .unwrap_or(0.0)
    }

    /// Expands a parameter vector into the generic deformation.
    pub fn deformation(&self, params: &[f64]) -> Deformation {
        let mut d = Deformation::default();
        for (dof, &v) in self.dofs.iter().zip(params) {
            d.set(*dof, v);
        }
        d
    }

    /// Maps reference pixel `(x, y)` of a subset centred at `(cx, cy)`.
    pub fn map(&self, params: &[f64], cx: f64, cy: f64, x: f64, y: f64) -> (f64, f64) {
        self.deformation(params).map(cx, cy, x, y)
    }

    /// Writes `dX/dp` into `jx` and `dY/dp` into `jy` for the active DOFs.
    pub fn jacobian(
        &self,
        deformation: &Deformation,
        cx: f64,
        cy: f64,
        x: f64,
        y: f64,
        jx: &mut [f64],
        jy: &mut [f64],
    ) {
        for (i, dof) in self.dofs.iter().enumerate() {
            let (dxp, dyp) = deformation.derivative(*dof, cx, cy, x, y);
            jx[i] = dxp;
            jy[i] = dyp;
        }
    }

    /// Extracts translation, rotation and strains.
    pub fn motion(&self, params: &[f64]) -> Motion {
        Motion {
            u: self.value(params, Dof::U),
            v: self.value(params, Dof::V),
            theta: self.value(params, Dof::Theta),
            ex: self.value(params, Dof::NormalStrainX),
            ey: self.value(params, Dof::NormalStrainY),
            gxy: self.value(params, Dof::ShearStrain),
        }
    }

    /// Builds a parameter vector from a motion; inactive components are dropped.
    pub fn params_from_motion(&self, motion: &Motion) -> Vec<f64> {
        let mut params = self.zero_params();
        let pairs = [
            (Dof::U, motion.u),
            (Dof::V, motion.v),
            (Dof::Theta, motion.theta),
            (Dof::NormalStrainX, motion.ex),
            (Dof::NormalStrainY, motion.ey),
            (Dof::ShearStrain, motion.gxy),
        ];
        for (dof, v) in pairs {
            if let Some(i) = self.index_of(dof) {
                params[i] = v;
            }
        }
        params
    }

    /// Adds a rigid translation to `params` when translation is active.
    pub fn add_translation(&self, params: &mut [f64], du: f64, dv: f64) {
        if let Some(i) = self.index_of(Dof::U) {
            params[i] += du;
        }
        if let Some(i) = self.index_of(Dof::V) {
            params[i] += dv;
        }
    }

    /// Initial simplex edge lengths, one per active DOF.
    pub fn simplex_deltas(&self, delta_disp: f64, delta_theta: f64) -> Vec<f64> {
        self.dofs
            .iter()
            .map(|d| d.simplex_delta(delta_disp, delta_theta))
            .collect()
    }

    /// Field storing `dof`.
    pub fn field_name(&self, dof: Dof) -> FieldName {
        dof.field().0
    }
}

#[cfg(test)]
mod tests {
    use super::{Dof, DofFlags, Motion, ShapeFunction, ShapeFunctionType};
    use crate::util::DicError;

    fn all_flags() -> DofFlags {
        DofFlags {
            translation: true,
            rotation: true,
            normal_strain: true,
            shear_strain: true,
            projection: true,
        }
    }

    #[test]
    fn zero_params_are_identity_for_every_layout() {
        let masks = [
            DofFlags::default(),
            DofFlags {
                translation: false,
                rotation: true,
                ..DofFlags::default()
            },
            all_flags(),
        ];
        for kind in ShapeFunctionType::ALL {
            for flags in masks {
                let flags = DofFlags {
                    projection: true,
                    ..flags
                };
                let sf = ShapeFunction::new(kind, &flags).unwrap();
                let p = sf.zero_params();
                for (x, y) in [(3.0, 4.0), (10.0, -2.0), (0.0, 0.0)] {
                    let (mx, my) = sf.map(&p, 5.0, 6.0, x, y);
                    assert!((mx - x).abs() < 1e-12 && (my - y).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn layouts_follow_type_and_flags() {
        let affine = ShapeFunction::new(ShapeFunctionType::Affine, &all_flags()).unwrap();
        assert_eq!(affine.num_params(), 6);
        let quad = ShapeFunction::new(ShapeFunctionType::Quadratic, &DofFlags::default()).unwrap();
        assert_eq!(quad.num_params(), 12);
        let rigid = ShapeFunction::new(ShapeFunctionType::RigidBody, &DofFlags::default()).unwrap();
        assert_eq!(rigid.dofs(), &[Dof::U, Dof::V, Dof::Theta]);
        let proj = ShapeFunction::new(ShapeFunctionType::Projection, &all_flags()).unwrap();
        assert_eq!(proj.num_params(), 8);
        assert_eq!(proj.index_of(Dof::ProjectionAugY), Some(7));
    }

    #[test]
    fn invalid_layouts_are_configuration_errors() {
        let none = DofFlags {
            translation: false,
            ..DofFlags::default()
        };
        assert!(matches!(
            ShapeFunction::new(ShapeFunctionType::Affine, &none),
            Err(DicError::InvalidConfig(_))
        ));
        assert!(matches!(
            ShapeFunction::new(ShapeFunctionType::Projection, &DofFlags::default()),
            Err(DicError::InvalidConfig(_))
        ));
    }

    #[test]
    fn motion_round_trip_drops_inactive_components() {
        let sf = ShapeFunction::new(ShapeFunctionType::Affine, &DofFlags::default()).unwrap();
        let m = Motion {
            u: 1.0,
            v: 2.0,
            theta: 0.3,
            ..Motion::default()
        };
        let p = sf.params_from_motion(&m);
        assert_eq!(p, vec![1.0, 2.0]);
        let back = sf.motion(&p);
        assert_eq!(back.theta, 0.0);
        let mut q = p.clone();
        sf.add_translation(&mut q, 0.5, -1.0);
        assert_eq!(q, vec![1.5, 1.0]);
    }

    #[test]
    fn pure_rotation_rotates_about_centroid() {
        let sf = ShapeFunction::new(ShapeFunctionType::RigidBody, &DofFlags::default()).unwrap();
        let p = [0.0, 0.0, std::f64::consts::FRAC_PI_2];
        let (x, y) = sf.map(&p, 10.0, 10.0, 12.0, 10.0);
        assert!((x - 10.0).abs() < 1e-12);
        assert!((y - 12.0).abs() < 1e-12);
    }
}
