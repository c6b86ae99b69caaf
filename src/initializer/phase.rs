//! FFT phase correlation.
//!
//! The normalized cross-power spectrum `conj(F_ref) F_def / |..|` of two
//! windows inverts to a peak at the translation of the deformed window
//! relative to the reference one. Both windows are mean-removed, tapered
//! with a separable Hann window and centred in a zero-padded power-of-two
//! square before the transform. Only frequencies whose cross-power reaches a
//! fraction of the strongest one are whitened; the rest carry taper leakage
//! shared by both windows and would pull the peak towards zero. Peaks past
//! `n / 2` wrap to negative shifts; the integer peak is refined with a
//! separable parabola fit.

use super::{GuessSource, InitContext, InitFailure, InitialGuess, InitializationMethod, Initializer};
use crate::image::{Image, ImageField};
use crate::search::peak::parabolic_offset;
use crate::shape::Motion;
use crate::trace::trace_event;
use crate::util::{DicError, DicResult};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::{Arc, OnceLock};

/// Smallest per-subset transform size.
const MIN_FFT_SIZE: usize = 16;
/// Largest transform size; also caps the global registration window.
const MAX_FFT_SIZE: usize = 1024;
/// Number of cached per-size correlators (`2^0 ..= 2^10`).
const SIZE_SLOTS: usize = 11;
/// Cross-power magnitudes below this fraction of the largest are zeroed.
const SPECTRUM_RELATIVE_CUTOFF: f64 = 1.0e-4;

/// Translation measured by phase correlation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseShift {
    pub dx: f64,
    pub dy: f64,
    /// Height of the correlation peak; 1 for a perfect circular shift.
    pub peak: f64,
}

/// Square phase correlator with cached FFT plans.
pub struct PhaseCorrelator {
    size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl PhaseCorrelator {
    /// Creates a correlator for `size x size` transforms; `size` must be a
    /// power of two.
    pub fn new(size: usize) -> DicResult<Self> {
        if size < 2 || !size.is_power_of_two() || size > MAX_FFT_SIZE {
            return Err(DicError::InvalidDimensions {
                width: size,
                height: size,
            });
        }
        let mut planner = FftPlanner::new();
        Ok(Self {
            size,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Shift of `target` relative to `reference`; both are row-major
    /// `side x side` windows with `side <= size`.
    pub fn correlate(&self, reference: &[f64], target: &[f64], side: usize) -> Option<PhaseShift> {
        let n = self.size;
        if side < 2 || side > n || reference.len() != side * side || target.len() != side * side {
            return None;
        }
        let taper = hann_window(side);
        let ref_fft = self.fft_2d(self.prepare(reference, side, &taper), false);
        let tar_fft = self.fft_2d(self.prepare(target, side, &taper), false);

        let mut cross: Vec<Complex<f64>> = ref_fft
            .iter()
            .zip(&tar_fft)
            .map(|(&a, &b)| a.conj() * b)
            .collect();
        let strongest = cross.iter().map(|c| c.norm()).fold(0.0, f64::max);
        if !strongest.is_finite() || strongest <= 0.0 {
            return None;
        }
        let cutoff = strongest * SPECTRUM_RELATIVE_CUTOFF;
        for c in &mut cross {
            let magnitude = c.norm();
            *c = if magnitude > cutoff {
                *c / magnitude
            } else {
                Complex::new(0.0, 0.0)
            };
        }
        let surface: Vec<f64> = self
            .fft_2d(cross, true)
            .iter()
            .map(|c| c.re / (n * n) as f64)
            .collect();

        let (px, py, peak) = surface
            .iter()
            .enumerate()
            .fold((0, 0, f64::NEG_INFINITY), |best, (i, &v)| {
                if v > best.2 {
                    (i % n, i / n, v)
                } else {
                    best
                }
            });
        if !peak.is_finite() || peak <= 0.0 {
            return None;
        }

        let at = |x: usize, y: usize| surface[(y % n) * n + (x % n)];
        let ox = parabolic_offset(at(px + n - 1, py), peak, at(px + 1, py)).unwrap_or(0.0);
        let oy = parabolic_offset(at(px, py + n - 1), peak, at(px, py + 1)).unwrap_or(0.0);
        Some(PhaseShift {
            dx: wrap(px, n) + ox,
            dy: wrap(py, n) + oy,
            peak,
        })
    }

    /// Mean-removed, tapered copy of a `side x side` window centred in the
    /// zero-padded transform square.
    fn prepare(&self, values: &[f64], side: usize, taper: &[f64]) -> Vec<Complex<f64>> {
        let n = self.size;
        let offset = (n - side) / 2;
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let mut padded = vec![Complex::new(0.0, 0.0); n * n];
        for (i, &v) in values.iter().enumerate() {
            let (x, y) = (i % side, i / side);
            padded[(y + offset) * n + x + offset] = Complex::new((v - mean) * taper[x] * taper[y], 0.0);
        }
        padded
    }

    fn fft_2d(&self, mut data: Vec<Complex<f64>>, inverse: bool) -> Vec<Complex<f64>> {
        let n = self.size;
        let plan = if inverse { &self.inverse } else { &self.forward };
        for _ in 0..2 {
            for row in data.chunks_exact_mut(n) {
                plan.process(row);
            }
            transpose_square(&mut data, n);
        }
        data
    }
}

fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

fn transpose_square(data: &mut [Complex<f64>], n: usize) {
    for y in 0..n {
        for x in (y + 1)..n {
            data.swap(y * n + x, x * n + y);
        }
    }
}

fn wrap(peak: usize, n: usize) -> f64 {
    if peak > n / 2 {
        peak as f64 - n as f64
    } else {
        peak as f64
    }
}

/// Per-subset phase correlation around the predicted position.
pub struct PhaseInitializer {
    correlators: [OnceLock<Option<PhaseCorrelator>>; SIZE_SLOTS],
}

impl Default for PhaseInitializer {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseInitializer {
    pub fn new() -> Self {
        Self {
            correlators: std::array::from_fn(|_| OnceLock::new()),
        }
    }

    fn correlator(&self, size: usize) -> Option<&PhaseCorrelator> {
        let slot = self.correlators.get(size.trailing_zeros() as usize)?;
        slot.get_or_init(|| PhaseCorrelator::new(size).ok()).as_ref()
    }
}

impl Initializer for PhaseInitializer {
    fn method(&self) -> InitializationMethod {
        InitializationMethod::UsePhaseCorrelation
    }

    fn initialize(&self, ctx: &InitContext<'_>, subset: usize) -> Result<InitialGuess, InitFailure> {
        let s = ctx.subset(subset)?;
        let (bx0, by0, bx1, by1) = s.bounds();
        let side = (bx1 - bx0 + 1).max(by1 - by0 + 1);
        // Twice the subset extent keeps the content dominant over the taper.
        let region = (2 * side).min(MAX_FFT_SIZE);
        let n = region.next_power_of_two().clamp(MIN_FFT_SIZE, MAX_FFT_SIZE);
        let correlator = self
            .correlator(n)
            .ok_or(InitFailure::NoEstimate("no correlator for window size"))?;

        let mut params = ctx.predicted(subset);
        let motion = ctx.shape.motion(&params);
        let (pu, pv) = (motion.u.round(), motion.v.round());
        if !pu.is_finite() || !pv.is_finite() {
            return Err(InitFailure::NoEstimate("non-finite prediction"));
        }
        let (cx, cy) = s.centroid();
        let x0 = cx.round() as isize - (region / 2) as isize;
        let y0 = cy.round() as isize - (region / 2) as isize;
        let reference = ctx.reference.window(x0, y0, region, region);
        let deformed = ctx
            .deformed
            .window(x0 + pu as isize, y0 + pv as isize, region, region);
        let shift = correlator
            .correlate(&reference, &deformed, region)
            .ok_or(InitFailure::NoEstimate("flat correlation surface"))?;

        let delta_u = pu + shift.dx - motion.u;
        let delta_v = pv + shift.dy - motion.v;
        ctx.shape.add_translation(&mut params, delta_u, delta_v);
        ctx.guess(subset, params, GuessSource::PhaseCorrelation)
    }
}

/// One global translation per frame applied to every subset.
pub struct RegistrationInitializer {
    correlator: PhaseCorrelator,
    origin: (isize, isize),
    reference: Vec<f64>,
    shift: Option<PhaseShift>,
}

impl RegistrationInitializer {
    /// Uses the largest centred power-of-two square that fits the image.
    pub fn new(reference: &Image) -> DicResult<Self> {
        let side = reference.width().min(reference.height()).min(MAX_FFT_SIZE);
        if side < 2 {
            return Err(DicError::InvalidDimensions {
                width: reference.width(),
                height: reference.height(),
            });
        }
        let n = 1usize << (usize::BITS - 1 - side.leading_zeros());
        let origin = (
            ((reference.width() - n) / 2) as isize,
            ((reference.height() - n) / 2) as isize,
        );
        Ok(Self {
            correlator: PhaseCorrelator::new(n)?,
            origin,
            reference: reference.window(origin.0, origin.1, n, n),
            shift: None,
        })
    }

    pub fn shift(&self) -> Option<PhaseShift> {
        self.shift
    }
}

impl Initializer for RegistrationInitializer {
    fn method(&self) -> InitializationMethod {
        InitializationMethod::UseImageRegistration
    }

    fn prepare_frame(&mut self, _reference: &Image, deformed: &Image) -> DicResult<()> {
        let n = self.correlator.size();
        let target = deformed.window(self.origin.0, self.origin.1, n, n);
        self.shift = self.correlator.correlate(&self.reference, &target, n);
        if let Some(s) = self.shift {
            trace_event!("image_registration", dx = s.dx, dy = s.dy, peak = s.peak);
        }
        Ok(())
    }

    fn initialize(&self, ctx: &InitContext<'_>, subset: usize) -> Result<InitialGuess, InitFailure> {
        let shift = self
            .shift
            .ok_or(InitFailure::NoEstimate("frame not registered"))?;
        let params = ctx.shape.params_from_motion(&Motion {
            u: shift.dx,
            v: shift.dy,
            ..Motion::default()
        });
        ctx.guess(subset, params, GuessSource::ImageRegistration)
    }
}

#[cfg(test)]
mod tests {
    use super::{PhaseCorrelator, PhaseInitializer, RegistrationInitializer};
    use crate::image::ImageField;
    use crate::initializer::test_support::Fixture;
    use crate::initializer::{GuessSource, Initializer};
    use crate::optimizer::test_support::blob_pair;
    use crate::shape::{DofFlags, ShapeFunction, ShapeFunctionType};
    use crate::subset::Subset;

    #[test]
    fn rejects_non_power_of_two_sizes() {
        assert!(PhaseCorrelator::new(48).is_err());
        assert!(PhaseCorrelator::new(64).is_ok());
    }

    #[test]
    fn recovers_integer_shifts_of_both_signs() {
        let (reference, deformed) = blob_pair(5.0, -3.0);
        let pc = PhaseCorrelator::new(64).unwrap();
        let a = reference.window(32, 32, 64, 64);
        let b = deformed.window(32, 32, 64, 64);
        let s = pc.correlate(&a, &b, 64).unwrap();
        assert!((s.dx - 5.0).abs() < 0.5, "dx = {}", s.dx);
        assert!((s.dy + 3.0).abs() < 0.5, "dy = {}", s.dy);
        assert!(pc.correlate(&a, &b[1..], 64).is_none());
        assert!(pc.correlate(&a, &b, 65).is_none());
    }

    #[test]
    fn smaller_windows_are_zero_padded() {
        let (reference, deformed) = blob_pair(-2.0, 3.0);
        let pc = PhaseCorrelator::new(64).unwrap();
        let a = reference.window(34, 34, 60, 60);
        let b = deformed.window(34, 34, 60, 60);
        let s = pc.correlate(&a, &b, 60).unwrap();
        assert!((s.dx + 2.0).abs() < 0.5, "dx = {}", s.dx);
        assert!((s.dy - 3.0).abs() < 0.5, "dy = {}", s.dy);
    }

    fn fixture(dx: f64, dy: f64) -> Fixture {
        let (reference, deformed) = blob_pair(dx, dy);
        let subsets = vec![Subset::square(0, 64, 64, 31, &reference).unwrap()];
        let shape = ShapeFunction::new(ShapeFunctionType::Affine, &DofFlags::default()).unwrap();
        Fixture::new(reference, deformed, subsets, shape)
    }

    #[test]
    fn subset_guess_lands_near_the_true_shift() {
        let fx = fixture(6.0, 4.0);
        let g = PhaseInitializer::new().initialize(&fx.ctx(0), 0).unwrap();
        assert_eq!(g.source, GuessSource::PhaseCorrelation);
        assert!((g.params[0] - 6.0).abs() < 0.5 && (g.params[1] - 4.0).abs() < 0.5);
    }

    #[test]
    fn small_shifts_are_not_pulled_to_zero() {
        let init = PhaseInitializer::new();
        for (dx, dy) in [(2.0, 1.0), (1.0, 0.0), (-1.5, 2.5)] {
            let fx = fixture(dx, dy);
            let g = init.initialize(&fx.ctx(0), 0).unwrap();
            assert!(
                (g.params[0] - dx).abs() < 0.5 && (g.params[1] - dy).abs() < 0.5,
                "({dx}, {dy}) -> ({}, {})",
                g.params[0],
                g.params[1]
            );
        }
    }

    #[test]
    fn registration_is_computed_per_frame() {
        let fx = fixture(-7.0, 2.0);
        let mut init = RegistrationInitializer::new(&fx.reference).unwrap();
        assert!(init.initialize(&fx.ctx(0), 0).is_err());
        init.prepare_frame(&fx.reference, &fx.deformed).unwrap();
        let s = init.shift().unwrap();
        assert!((s.dx + 7.0).abs() < 0.5 && (s.dy - 2.0).abs() < 0.5);
        assert_eq!(fx.reference.width(), 128);
        let g = init.initialize(&fx.ctx(0), 0).unwrap();
        assert_eq!(g.source, GuessSource::ImageRegistration);
    }
}
