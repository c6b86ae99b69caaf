//! Named, stateful per-point field storage.
//!
//! A field is identified by a [`FieldSpec`]: its name, its type (scalar or
//! two-component vector) and its state. States follow the usual lagged
//! layout: `NMinusOne` holds the values of the previous frame, `N` the values
//! of the frame in flight and `NPlusOne` predictions for the frame being
//! initialized. [`FieldStore::advance`] rotates `N` into `NMinusOne` between
//! frames.

use crate::util::{DicError, DicResult};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar or vector field layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldType {
    /// One value per point.
    Scalar,
    /// Two values (x, y) per point.
    Vector,
}

impl FieldType {
    /// Number of stored components per point.
    pub fn components(self) -> usize {
        match self {
            FieldType::Scalar => 1,
            FieldType::Vector => 2,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            FieldType::Scalar => "scalar",
            FieldType::Vector => "vector",
        }
    }
}

/// Time level of a field value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldState {
    /// Previous frame.
    NMinusOne,
    /// Current frame.
    N,
    /// Prediction for the next solve.
    NPlusOne,
}

/// Quantities the correlation core reads and writes per subset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldName {
    SubsetCoordinates,
    Displacement,
    RotationZ,
    NormalStrainXx,
    NormalStrainYy,
    ShearStrainXy,
    QuadUxx,
    QuadUyy,
    QuadUxy,
    QuadVxx,
    QuadVyy,
    QuadVxy,
    ProjectionAugX,
    ProjectionAugY,
    Gamma,
    Sigma,
    Sssig,
    NoiseLevel,
    ActivePixels,
    Match,
    Iterations,
    StatusFlag,
    NeighborId,
}

impl FieldName {
    /// All field names in output column order.
    pub const ALL: [FieldName; 23] = [
        Self::SubsetCoordinates,
        Self::Displacement,
        Self::RotationZ,
        Self::NormalStrainXx,
        Self::NormalStrainYy,
        Self::ShearStrainXy,
        Self::QuadUxx,
        Self::QuadUyy,
        Self::QuadUxy,
        Self::QuadVxx,
        Self::QuadVyy,
        Self::QuadVxy,
        Self::ProjectionAugX,
        Self::ProjectionAugY,
        Self::Gamma,
        Self::Sigma,
        Self::Sssig,
        Self::NoiseLevel,
        Self::ActivePixels,
        Self::Match,
        Self::Iterations,
        Self::StatusFlag,
        Self::NeighborId,
    ];

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubsetCoordinates => "SUBSET_COORDINATES",
            Self::Displacement => "DISPLACEMENT",
            Self::RotationZ => "ROTATION_Z",
            Self::NormalStrainXx => "NORMAL_STRAIN_XX",
            Self::NormalStrainYy => "NORMAL_STRAIN_YY",
            Self::ShearStrainXy => "SHEAR_STRAIN_XY",
            Self::QuadUxx => "QUAD_UXX",
            Self::QuadUyy => "QUAD_UYY",
            Self::QuadUxy => "QUAD_UXY",
            Self::QuadVxx => "QUAD_VXX",
            Self::QuadVyy => "QUAD_VYY",
            Self::QuadVxy => "QUAD_VXY",
            Self::ProjectionAugX => "PROJECTION_AUG_X",
            Self::ProjectionAugY => "PROJECTION_AUG_Y",
            Self::Gamma => "GAMMA",
            Self::Sigma => "SIGMA",
            Self::Sssig => "SSSIG",
            Self::NoiseLevel => "NOISE_LEVEL",
            Self::ActivePixels => "ACTIVE_PIXELS",
            Self::Match => "MATCH",
            Self::Iterations => "ITERATIONS",
            Self::StatusFlag => "STATUS_FLAG",
            Self::NeighborId => "NEIGHBOR_ID",
        }
    }

    /// Layout of the field.
    pub fn field_type(self) -> FieldType {
        match self {
            Self::SubsetCoordinates | Self::Displacement => FieldType::Vector,
            _ => FieldType::Scalar,
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one stored quantity at one time level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldSpec {
    name: FieldName,
    field_type: FieldType,
    state: FieldState,
}

impl FieldSpec {
    /// Creates a spec; the type is implied by the name.
    pub const fn new(name: FieldName, state: FieldState) -> Self {
        let field_type = match name {
            FieldName::SubsetCoordinates | FieldName::Displacement => FieldType::Vector,
            _ => FieldType::Scalar,
        };
        Self {
            name,
            field_type,
            state,
        }
    }

    /// Current-frame spec for `name`.
    pub const fn current(name: FieldName) -> Self {
        Self::new(name, FieldState::N)
    }

    /// Previous-frame spec for `name`.
    pub const fn previous(name: FieldName) -> Self {
        Self::new(name, FieldState::NMinusOne)
    }

    /// Prediction spec for `name`.
    pub const fn predicted(name: FieldName) -> Self {
        Self::new(name, FieldState::NPlusOne)
    }

    pub fn name(&self) -> FieldName {
        self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn state(&self) -> FieldState {
        self.state
    }
}

pub const DISPLACEMENT_FS: FieldSpec = FieldSpec::current(FieldName::Displacement);
pub const DISPLACEMENT_NM1_FS: FieldSpec = FieldSpec::previous(FieldName::Displacement);
pub const ROTATION_Z_FS: FieldSpec = FieldSpec::current(FieldName::RotationZ);
pub const GAMMA_FS: FieldSpec = FieldSpec::current(FieldName::Gamma);
pub const SIGMA_FS: FieldSpec = FieldSpec::current(FieldName::Sigma);
pub const ITERATIONS_FS: FieldSpec = FieldSpec::current(FieldName::Iterations);
pub const STATUS_FLAG_FS: FieldSpec = FieldSpec::current(FieldName::StatusFlag);

/// Dense per-point storage for registered fields.
#[derive(Clone, Debug)]
pub struct FieldStore {
    num_points: usize,
    fields: BTreeMap<FieldSpec, Vec<f64>>,
}

impl FieldStore {
    /// Creates an empty store for `num_points` points.
    pub fn new(num_points: usize) -> Self {
        Self {
            num_points,
            fields: BTreeMap::new(),
        }
    }

    /// Number of points every field holds.
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// Registers a spec, zero-initialized. Registering twice is a no-op.
    pub fn register(&mut self, spec: FieldSpec) {
        let len = self.num_points * spec.field_type().components();
        self.fields.entry(spec).or_insert_with(|| vec![0.0; len]);
    }

    /// Registers `name` at all three states.
    pub fn register_all_states(&mut self, name: FieldName) {
        for state in [FieldState::NMinusOne, FieldState::N, FieldState::NPlusOne] {
            self.register(FieldSpec::new(name, state));
        }
    }

    /// Returns true if `spec` has been registered.
    pub fn is_registered(&self, spec: FieldSpec) -> bool {
        self.fields.contains_key(&spec)
    }

    /// Iterates over registered specs in a stable order.
    pub fn specs(&self) -> impl Iterator<Item = FieldSpec> + '_ {
        self.fields.keys().copied()
    }

    fn slot(&self, spec: FieldSpec, point: usize, component: usize) -> DicResult<usize> {
        if point >= self.num_points {
            return Err(DicError::IndexOutOfBounds {
                index: point,
                len: self.num_points,
                context: "field point",
            });
        }
        let comps = spec.field_type().components();
        if component >= comps {
            return Err(DicError::IndexOutOfBounds {
                index: component,
                len: comps,
                context: "field component",
            });
        }
        if !self.fields.contains_key(&spec) {
            return Err(DicError::UnknownField {
                name: spec.name().as_str(),
            });
        }
        Ok(point * comps + component)
    }

    fn expect_type(spec: FieldSpec, expected: FieldType) -> DicResult<()> {
        if spec.field_type() != expected {
            return Err(DicError::FieldTypeMismatch {
                name: spec.name().as_str(),
                expected: expected.as_str(),
            });
        }
        Ok(())
    }

    /// Reads one component of a field value.
    pub fn get_component(&self, spec: FieldSpec, point: usize, component: usize) -> DicResult<f64> {
        let idx = self.slot(spec, point, component)?;
        Ok(self.fields[&spec][idx])
    }

    /// Writes one component of a field value.
    pub fn set_component(
        &mut self,
        spec: FieldSpec,
        point: usize,
        component: usize,
        value: f64,
    ) -> DicResult<()> {
        let idx = self.slot(spec, point, component)?;
        if let Some(values) = self.fields.get_mut(&spec) {
            values[idx] = value;
        }
        Ok(())
    }

    /// Reads a scalar field value.
    pub fn get(&self, spec: FieldSpec, point: usize) -> DicResult<f64> {
        Self::expect_type(spec, FieldType::Scalar)?;
        self.get_component(spec, point, 0)
    }

    /// Writes a scalar field value.
    pub fn set(&mut self, spec: FieldSpec, point: usize, value: f64) -> DicResult<()> {
        Self::expect_type(spec, FieldType::Scalar)?;
        self.set_component(spec, point, 0, value)
    }

    /// Reads a vector field value.
    pub fn get_vector(&self, spec: FieldSpec, point: usize) -> DicResult<[f64; 2]> {
        Self::expect_type(spec, FieldType::Vector)?;
        Ok([
            self.get_component(spec, point, 0)?,
            self.get_component(spec, point, 1)?,
        ])
    }

    /// Writes a vector field value.
    pub fn set_vector(&mut self, spec: FieldSpec, point: usize, value: [f64; 2]) -> DicResult<()> {
        Self::expect_type(spec, FieldType::Vector)?;
        self.set_component(spec, point, 0, value[0])?;
        self.set_component(spec, point, 1, value[1])
    }

    /// Raw values of a field, `components()` values per point.
    pub fn values(&self, spec: FieldSpec) -> DicResult<&[f64]> {
        self.fields
            .get(&spec)
            .map(Vec::as_slice)
            .ok_or(DicError::UnknownField {
                name: spec.name().as_str(),
            })
    }

    /// Copies every `N` field into its `NMinusOne` counterpart (when registered).
    pub fn advance(&mut self) {
        let current: Vec<(FieldSpec, Vec<f64>)> = self
            .fields
            .iter()
            .filter(|(spec, _)| spec.state() == FieldState::N)
            .map(|(spec, values)| (*spec, values.clone()))
            .collect();
        for (spec, values) in current {
            let prev = FieldSpec::previous(spec.name());
            if let Some(slot) = self.fields.get_mut(&prev) {
                slot.copy_from_slice(&values);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldName, FieldSpec, FieldStore, DISPLACEMENT_FS, DISPLACEMENT_NM1_FS, GAMMA_FS};
    use crate::util::DicError;

    #[test]
    fn scalar_and_vector_access() {
        let mut store = FieldStore::new(3);
        store.register(GAMMA_FS);
        store.register(DISPLACEMENT_FS);
        store.set(GAMMA_FS, 2, 0.25).unwrap();
        store.set_vector(DISPLACEMENT_FS, 1, [1.5, -2.0]).unwrap();
        assert_eq!(store.get(GAMMA_FS, 2).unwrap(), 0.25);
        assert_eq!(store.get_vector(DISPLACEMENT_FS, 1).unwrap(), [1.5, -2.0]);
        assert_eq!(store.values(DISPLACEMENT_FS).unwrap().len(), 6);
    }

    #[test]
    fn type_mismatch_and_unknown_field_are_errors() {
        let mut store = FieldStore::new(1);
        store.register(DISPLACEMENT_FS);
        assert!(matches!(
            store.get(DISPLACEMENT_FS, 0),
            Err(DicError::FieldTypeMismatch { .. })
        ));
        assert!(matches!(
            store.get(GAMMA_FS, 0),
            Err(DicError::UnknownField { name: "GAMMA" })
        ));
        assert!(store.get_vector(DISPLACEMENT_FS, 1).is_err());
    }

    #[test]
    fn advance_copies_current_into_previous() {
        let mut store = FieldStore::new(2);
        store.register_all_states(FieldName::Displacement);
        store.set_vector(DISPLACEMENT_FS, 0, [3.0, 4.0]).unwrap();
        store.advance();
        assert_eq!(store.get_vector(DISPLACEMENT_NM1_FS, 0).unwrap(), [3.0, 4.0]);
        store.set_vector(DISPLACEMENT_FS, 0, [5.0, 6.0]).unwrap();
        assert_eq!(store.get_vector(DISPLACEMENT_NM1_FS, 0).unwrap(), [3.0, 4.0]);
        let predicted = FieldSpec::predicted(FieldName::Displacement);
        assert_eq!(store.get_vector(predicted, 0).unwrap(), [0.0, 0.0]);
    }
}
