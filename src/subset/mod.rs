//! Subsets: the pixel patches tracked from frame to frame.
//!
//! A subset stores its reference intensities once, at construction, together
//! with an activity mask (obstructed or excluded pixels are inactive) and a
//! few reference-image statistics used by the driver: the SSSIG gradient
//! measure, an image-noise estimate and the derived displacement sigma.

use crate::image::ImageField;
use crate::util::{DicError, DicResult};

/// Reference statistics computed at construction.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SubsetStats {
    /// Smaller of the mean squared x and y intensity gradients.
    pub sssig: f64,
    /// Immerkaer noise estimate over the subset pixels.
    pub noise: f64,
    /// Predicted displacement standard deviation; negative when undefined.
    pub sigma: f64,
}

/// A tracked patch of reference pixels.
#[derive(Clone, Debug)]
pub struct Subset {
    id: usize,
    cx: f64,
    cy: f64,
    pixels: Vec<(f64, f64)>,
    reference: Vec<f64>,
    active: Vec<bool>,
    deformed: Vec<f64>,
    neighbor: Option<usize>,
    force_simplex: bool,
    stats: SubsetStats,
}

impl Subset {
    /// Square subset of side `size` centred on pixel `(cx, cy)`.
    ///
    /// Even sizes extend one pixel further towards negative offsets.
    pub fn square<I: ImageField + ?Sized>(
        id: usize,
        cx: usize,
        cy: usize,
        size: usize,
        reference: &I,
    ) -> DicResult<Self> {
        if size == 0 {
            return Err(DicError::InvalidDimensions {
                width: size,
                height: size,
            });
        }
        let half = size / 2;
        if cx < half || cy < half {
            return Err(DicError::InvalidConfig(
                "subset extends beyond the reference image",
            ));
        }
        let mut pixels = Vec::with_capacity(size * size);
        for y in cy - half..cy - half + size {
            for x in cx - half..cx - half + size {
                pixels.push((x, y));
            }
        }
        Self::from_pixels(id, cx as f64, cy as f64, &pixels, reference)
    }

    /// Subset from an explicit pixel list with centroid `(cx, cy)`.
    pub fn from_pixels<I: ImageField + ?Sized>(
        id: usize,
        cx: f64,
        cy: f64,
        pixels: &[(usize, usize)],
        reference: &I,
    ) -> DicResult<Self> {
        if pixels.is_empty() {
            return Err(DicError::InvalidConfig("subset has no pixels"));
        }
        if !cx.is_finite() || !cy.is_finite() {
            return Err(DicError::InvalidConfig("subset centroid is not finite"));
        }
        let mut coords = Vec::with_capacity(pixels.len());
        let mut values = Vec::with_capacity(pixels.len());
        for &(x, y) in pixels {
            if x >= reference.width() || y >= reference.height() {
                return Err(DicError::InvalidConfig(
                    "subset extends beyond the reference image",
                ));
            }
            coords.push((x as f64, y as f64));
            values.push(reference.intensity(x, y));
        }
        let stats = reference_stats(pixels, reference);
        Ok(Self {
            id,
            cx,
            cy,
            deformed: values.clone(),
            active: vec![true; coords.len()],
            pixels: coords,
            reference: values,
            neighbor: None,
            force_simplex: false,
            stats,
        })
    }

    /// Re-reads reference intensities and statistics from `reference`,
    /// keeping geometry, mask, neighbor and solver hint.
    pub fn resample<I: ImageField + ?Sized>(&self, reference: &I) -> DicResult<Self> {
        let pixels: Vec<(usize, usize)> = self
            .pixels
            .iter()
            .map(|&(x, y)| (x as usize, y as usize))
            .collect();
        let mut out = Self::from_pixels(self.id, self.cx, self.cy, &pixels, reference)?;
        out.active = self.active.clone();
        out.neighbor = self.neighbor;
        out.force_simplex = self.force_simplex;
        Ok(out)
    }

    /// Sets the subset whose current-frame solution may seed this one.
    pub fn with_neighbor(mut self, neighbor: Option<usize>) -> Self {
        self.neighbor = neighbor;
        self
    }

    /// Requests the simplex optimizer for this subset.
    pub fn with_force_simplex(mut self, force: bool) -> Self {
        self.force_simplex = force;
        self
    }

    /// Replaces the activity mask.
    pub fn set_active_mask(&mut self, mask: Vec<bool>) -> DicResult<()> {
        if mask.len() != self.pixels.len() {
            return Err(DicError::BufferTooSmall {
                needed: self.pixels.len(),
                got: mask.len(),
            });
        }
        self.active = mask;
        Ok(())
    }

    /// Deactivates pixels for which `excluded` returns true.
    pub fn exclude_where<F: Fn(f64, f64) -> bool>(&mut self, excluded: F) {
        for (flag, &(x, y)) in self.active.iter_mut().zip(&self.pixels) {
            if excluded(x, y) {
                *flag = false;
            }
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn centroid(&self) -> (f64, f64) {
        (self.cx, self.cy)
    }

    /// Number of pixels, active or not.
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Reference coordinates of every pixel.
    pub fn pixels(&self) -> &[(f64, f64)] {
        &self.pixels
    }

    /// Reference intensities.
    pub fn reference(&self) -> &[f64] {
        &self.reference
    }

    pub fn is_active(&self, i: usize) -> bool {
        self.active.get(i).copied().unwrap_or(false)
    }

    pub fn active_mask(&self) -> &[bool] {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// Deformed intensities from the last accepted evaluation.
    pub fn deformed(&self) -> &[f64] {
        &self.deformed
    }

    pub(crate) fn set_deformed(&mut self, values: Vec<f64>) {
        if values.len() == self.deformed.len() {
            self.deformed = values;
        }
    }

    pub fn neighbor(&self) -> Option<usize> {
        self.neighbor
    }

    pub fn force_simplex(&self) -> bool {
        self.force_simplex
    }

    pub fn stats(&self) -> SubsetStats {
        self.stats
    }

    /// Inclusive integer bounding box `(x0, y0, x1, y1)` of the pixels.
    pub fn bounds(&self) -> (usize, usize, usize, usize) {
        let mut b = (usize::MAX, usize::MAX, 0, 0);
        for &(x, y) in &self.pixels {
            let (x, y) = (x as usize, y as usize);
            b = (b.0.min(x), b.1.min(y), b.2.max(x), b.3.max(y));
        }
        b
    }
}

fn reference_stats<I: ImageField + ?Sized>(pixels: &[(usize, usize)], image: &I) -> SubsetStats {
    let n = pixels.len() as f64;
    let (mut gxx, mut gyy) = (0.0, 0.0);
    for &(x, y) in pixels {
        let (gx, gy) = image.gradient(x, y);
        gxx += gx * gx;
        gyy += gy * gy;
    }
    let sssig = (gxx / n).min(gyy / n);

    // Immerkaer: sigma = sqrt(pi/2) / 6 * mean |I * N| over interior pixels.
    let (w, h) = (image.width(), image.height());
    let mut acc = 0.0;
    let mut count = 0usize;
    for &(x, y) in pixels {
        if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
            continue;
        }
        let i = |dx: isize, dy: isize| {
            image.intensity((x as isize + dx) as usize, (y as isize + dy) as usize)
        };
        let conv = i(-1, -1) - 2.0 * i(0, -1) + i(1, -1) - 2.0 * i(-1, 0) + 4.0 * i(0, 0)
            - 2.0 * i(1, 0)
            + i(-1, 1)
            - 2.0 * i(0, 1)
            + i(1, 1);
        acc += conv.abs();
        count += 1;
    }
    let noise = if count > 0 {
        (std::f64::consts::PI / 2.0).sqrt() / 6.0 * acc / count as f64
    } else {
        0.0
    };

    let sigma = if sssig > 0.0 && sssig.is_finite() {
        noise * (2.0 / (n * sssig)).sqrt()
    } else {
        -1.0
    };
    SubsetStats {
        sssig,
        noise,
        sigma,
    }
}

#[cfg(test)]
mod tests {
    use super::Subset;
    use crate::image::Image;

    fn ramp() -> Image {
        Image::from_fn(32, 32, |x, y| 2.0 * x + 3.0 * y).unwrap()
    }

    #[test]
    fn square_subset_layout() {
        let img = ramp();
        let s = Subset::square(4, 10, 12, 5, &img).unwrap();
        assert_eq!(s.len(), 25);
        assert_eq!(s.centroid(), (10.0, 12.0));
        assert_eq!(s.pixels()[0], (8.0, 10.0));
        assert_eq!(s.reference()[0], 2.0 * 8.0 + 3.0 * 10.0);
        assert_eq!(s.bounds(), (8, 10, 12, 14));
        assert_eq!(s.active_count(), 25);
    }

    #[test]
    fn subsets_outside_the_image_are_rejected() {
        let img = ramp();
        assert!(Subset::square(0, 1, 10, 7, &img).is_err());
        assert!(Subset::square(0, 30, 10, 7, &img).is_err());
        assert!(Subset::from_pixels(0, 0.0, 0.0, &[], &img).is_err());
    }

    #[test]
    fn ramp_statistics() {
        let img = ramp();
        let s = Subset::square(0, 16, 16, 9, &img).unwrap();
        let stats = s.stats();
        assert!((stats.sssig - 4.0).abs() < 1e-9);
        assert!(stats.noise.abs() < 1e-9);
        assert!(stats.sigma.abs() < 1e-9);
    }

    #[test]
    fn flat_subset_has_negative_sigma() {
        let img = Image::from_fn(16, 16, |_, _| 7.0).unwrap();
        let s = Subset::square(0, 8, 8, 5, &img).unwrap();
        assert!(s.stats().sigma < 0.0);
    }

    #[test]
    fn exclusion_deactivates_pixels() {
        let img = ramp();
        let mut s = Subset::square(0, 16, 16, 5, &img).unwrap();
        s.exclude_where(|x, _| x > 16.5);
        assert_eq!(s.active_count(), 15);
        assert!(!s.is_active(4));
        assert!(s.set_active_mask(vec![true; 3]).is_err());
    }
}
