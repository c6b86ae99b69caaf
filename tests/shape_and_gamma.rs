use subsetdic::{
    DofFlags, GammaEvaluator, Image, InterpolationMethod, ShapeFunction, ShapeFunctionType, Subset,
};

fn speckle(x: f64, y: f64) -> f64 {
    100.0
        + 40.0 * (0.21 * x + 0.5).sin() * (0.17 * y).cos()
        + 30.0 * (0.09 * x - 0.13 * y).cos()
        + 20.0 * (0.05 * (x + y)).sin()
}

fn all_flag_masks() -> Vec<DofFlags> {
    (0u8..32)
        .map(|bits| DofFlags {
            translation: bits & 1 != 0,
            rotation: bits & 2 != 0,
            normal_strain: bits & 4 != 0,
            shear_strain: bits & 8 != 0,
            projection: bits & 16 != 0,
        })
        .collect()
}

#[test]
fn zero_parameters_map_every_pixel_to_itself() {
    let image = Image::from_fn(64, 64, speckle).unwrap();
    let subset = Subset::square(0, 30, 28, 17, &image).unwrap();
    let (cx, cy) = subset.centroid();
    let mut built = 0;
    for kind in ShapeFunctionType::ALL {
        for flags in all_flag_masks() {
            let Ok(shape) = ShapeFunction::new(kind, &flags) else {
                continue;
            };
            built += 1;
            let params = shape.zero_params();
            assert_eq!(params.len(), shape.num_params());
            for &(x, y) in subset.pixels() {
                let (mx, my) = shape.map(&params, cx, cy, x, y);
                assert!(
                    (mx - x).abs() < 1e-12 && (my - y).abs() < 1e-12,
                    "{kind} {flags:?} moved ({x}, {y}) to ({mx}, {my})"
                );
            }
        }
    }
    // Affine needs one affine flag, projection needs its own flag.
    assert_eq!(built, 30 + 16 + 32 + 32);
}

#[test]
fn self_gamma_is_zero_for_every_interpolator() {
    let image = Image::from_fn(80, 80, speckle).unwrap();
    let subset = Subset::square(0, 40, 40, 25, &image).unwrap();
    let shape = ShapeFunction::new(ShapeFunctionType::Affine, &DofFlags::default()).unwrap();
    for method in InterpolationMethod::ALL {
        for normalize in [false, true] {
            let evaluator = GammaEvaluator::new(method, normalize);
            let eval = evaluator
                .evaluate(&subset, &image, &shape, &shape.zero_params())
                .unwrap();
            assert!(eval.gamma.abs() < 1e-10, "{method:?}: gamma {}", eval.gamma);
            assert_eq!(eval.active_pixels, subset.len());
        }
    }
}

#[test]
fn gamma_grows_away_from_the_true_shift() {
    let reference = Image::from_fn(80, 80, speckle).unwrap();
    let deformed = Image::from_fn(80, 80, |x, y| speckle(x - 1.0, y)).unwrap();
    let subset = Subset::square(0, 40, 40, 25, &reference).unwrap();
    let shape = ShapeFunction::new(ShapeFunctionType::Affine, &DofFlags::default()).unwrap();
    let evaluator = GammaEvaluator::new(InterpolationMethod::KeysFourth, false);
    let gamma = |u: f64| {
        evaluator
            .evaluate(&subset, &deformed, &shape, &[u, 0.0])
            .unwrap()
            .gamma
    };
    assert!(gamma(1.0) < 1e-10);
    assert!(gamma(0.5) > gamma(1.0));
    assert!(gamma(0.0) > gamma(0.5));
    assert!(gamma(1.5) > gamma(1.0));
}
