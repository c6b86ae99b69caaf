use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use subsetdic::field::{DISPLACEMENT_FS, GAMMA_FS, ITERATIONS_FS, STATUS_FLAG_FS};
use subsetdic::{
    CorrelationParams, Driver, Image, InitializationMethod, InterpolationMethod,
    OptimizationMethod, StatusFlag, Subset,
};

fn speckle(x: f64, y: f64) -> f64 {
    100.0
        + 40.0 * (0.21 * x + 0.5).sin() * (0.17 * y).cos()
        + 30.0 * (0.09 * x - 0.13 * y).cos()
        + 20.0 * (0.05 * (x + y)).sin()
}

fn shifted(dx: f64, dy: f64) -> Image {
    Image::from_fn(100, 100, |x, y| speckle(x - dx, y - dy)).unwrap()
}

fn blob_speckle(seed: u64) -> impl Fn(f64, f64) -> f64 {
    let mut rng = StdRng::seed_from_u64(seed);
    let blobs: Vec<(f64, f64)> = (0..500)
        .map(|_| (rng.random_range(-10.0..170.0), rng.random_range(-10.0..170.0)))
        .collect();
    move |x, y| {
        50.0 + blobs
            .iter()
            .map(|&(bx, by)| 120.0 * (-((x - bx).powi(2) + (y - by).powi(2)) / 12.5).exp())
            .sum::<f64>()
    }
}

fn single(reference: &Image, size: usize) -> Vec<Subset> {
    vec![Subset::square(0, 50, 50, size, reference).unwrap()]
}

fn grid(reference: &Image) -> Vec<Subset> {
    let mut out = Vec::new();
    for y in [30, 50, 70] {
        for x in [30, 50, 70] {
            out.push(Subset::square(out.len(), x, y, 21, reference).unwrap());
        }
    }
    out
}

#[test]
fn simplex_and_gradient_recover_an_integer_shift() {
    for method in [OptimizationMethod::Simplex, OptimizationMethod::GradientBased] {
        let reference = shifted(0.0, 0.0);
        let params = CorrelationParams {
            optimization_method: method,
            ..CorrelationParams::generic()
        };
        let mut driver = Driver::new(params, single(&reference, 31), reference).unwrap();
        let report = driver.correlate_frame(&shifted(3.0, -2.0)).unwrap();
        let r = &report.results[0];
        assert_eq!(r.status, StatusFlag::CorrelationSuccessful, "{method}");
        assert!((r.u - 3.0).abs() < 0.05, "{method}: u = {}", r.u);
        assert!((r.v + 2.0).abs() < 0.05, "{method}: v = {}", r.v);
    }
}

#[test]
fn keys_gradient_scenario_at_2_3_px() {
    let reference = shifted(0.0, 0.0);
    let params = CorrelationParams {
        optimization_method: OptimizationMethod::GradientBased,
        interpolation_method: InterpolationMethod::KeysFourth,
        ..CorrelationParams::generic()
    };
    let max_iterations = params.max_solver_iterations_fast;
    let mut driver = Driver::new(params, single(&reference, 31), reference).unwrap();
    let report = driver.correlate_frame(&shifted(2.3, 0.0)).unwrap();
    let r = &report.results[0];
    assert_eq!(r.status, StatusFlag::CorrelationSuccessful);
    assert!((r.u - 2.3).abs() < 0.05, "u = {}", r.u);
    assert!(r.iterations < max_iterations);

    let fields = driver.field_store();
    assert!((fields.get_vector(DISPLACEMENT_FS, 0).unwrap()[0] - 2.3).abs() < 0.05);
    assert_eq!(fields.get(STATUS_FLAG_FS, 0).unwrap(), 0.0);
    assert!(fields.get(ITERATIONS_FS, 0).unwrap() < max_iterations as f64);
}

#[test]
fn zero_motion_is_accepted_from_the_first_guess() {
    let reference = shifted(0.0, 0.0);
    let params = CorrelationParams {
        initialization_method: InitializationMethod::UseZeros,
        initial_gamma_threshold: 0.05,
        ..CorrelationParams::generic()
    };
    let mut driver = Driver::new(params, grid(&reference), reference.clone()).unwrap();
    let report = driver.correlate_frame(&reference).unwrap();
    assert_eq!(report.num_failed(), 0);
    for r in &report.results {
        assert!(r.gamma.abs() < 1e-10);
        assert_eq!(r.status, StatusFlag::InitializeSuccessful);
        assert_eq!(r.iterations, 0);
        assert_eq!((r.u, r.v), (0.0, 0.0));
    }
}

#[test]
fn jumps_are_measured_against_the_last_stored_value() {
    let reference = shifted(0.0, 0.0);
    let params = CorrelationParams {
        disp_jump_tol: 2.0,
        ..CorrelationParams::generic()
    };
    let mut driver = Driver::new(params, single(&reference, 31), reference).unwrap();

    let first = driver.correlate_frame(&shifted(0.5, 0.0)).unwrap();
    assert_eq!(first.results[0].status, StatusFlag::CorrelationSuccessful);

    let second = driver.correlate_frame(&shifted(3.0, 0.0)).unwrap();
    let r = &second.results[0];
    assert_eq!(r.status, StatusFlag::JumpToleranceExceeded);
    assert!((r.u - 0.5).abs() < 0.05, "stale value kept, u = {}", r.u);
    assert_eq!(r.gamma, -1.0);
    assert_eq!(driver.field_store().get(GAMMA_FS, 0).unwrap(), -1.0);

    let third = driver.correlate_frame(&shifted(1.0, 0.0)).unwrap();
    assert_eq!(third.results[0].status, StatusFlag::CorrelationSuccessful);
    assert!((third.results[0].u - 1.0).abs() < 0.05);
}

#[test]
fn repeated_runs_are_identical() {
    let mut rng = StdRng::seed_from_u64(42);
    let noise: Vec<f64> = (0..100 * 100).map(|_| rng.random_range(-2.0..2.0)).collect();
    let reference = shifted(0.0, 0.0);
    let deformed = Image::from_fn(100, 100, |x, y| {
        speckle(x - 1.3, y + 0.7) + noise[y as usize * 100 + x as usize]
    })
    .unwrap();

    let run = || {
        let mut driver =
            Driver::new(CorrelationParams::generic(), grid(&reference), reference.clone()).unwrap();
        let report = driver.correlate_frame(&deformed).unwrap();
        let fields = driver.field_store();
        let values: Vec<Vec<f64>> = [DISPLACEMENT_FS, GAMMA_FS, STATUS_FLAG_FS]
            .iter()
            .map(|&spec| fields.values(spec).unwrap().to_vec())
            .collect();
        (report, values)
    };
    let (report_a, fields_a) = run();
    let (report_b, fields_b) = run();
    assert_eq!(report_a, report_b);
    assert_eq!(fields_a, fields_b);
    assert_eq!(report_a.num_successful(), 9);
}

#[test]
fn tracking_preset_solves_with_rotation() {
    let reference = shifted(0.0, 0.0);
    let params = CorrelationParams::tracking();
    let mut driver = Driver::new(params, single(&reference, 41), reference).unwrap();
    let report = driver.correlate_frame(&shifted(1.5, 0.5)).unwrap();
    let r = &report.results[0];
    assert_eq!(r.status, StatusFlag::CorrelationSuccessful);
    assert_eq!(r.params.len(), 3);
    assert!((r.u - 1.5).abs() < 0.05 && (r.v - 0.5).abs() < 0.05);
    assert!(r.theta.abs() < 0.01, "theta = {}", r.theta);
}

#[test]
fn search_rescues_large_shifts() {
    let speckle = blob_speckle(11);
    let reference = Image::from_fn(128, 128, &speckle).unwrap();
    let deformed = Image::from_fn(128, 128, |x, y| speckle(x - 12.0, y + 7.0)).unwrap();
    let subsets = vec![Subset::square(0, 64, 64, 31, &reference).unwrap()];

    let strict = CorrelationParams {
        initial_gamma_threshold: 0.05,
        ..CorrelationParams::generic()
    };
    let mut driver = Driver::new(strict.clone(), subsets.clone(), reference.clone()).unwrap();
    let report = driver.correlate_frame(&deformed).unwrap();
    assert_eq!(report.results[0].status, StatusFlag::InitializeFailed);

    let searching = CorrelationParams {
        use_search_initialization_for_failed_steps: true,
        search_window_radius: 16,
        ..strict
    };
    let mut driver = Driver::new(searching, subsets, reference).unwrap();
    let report = driver.correlate_frame(&deformed).unwrap();
    let r = &report.results[0];
    assert!(r.is_success(), "{}", r.status);
    assert!((r.u - 12.0).abs() < 0.05 && (r.v + 7.0).abs() < 0.05);
}

#[test]
fn phase_correlation_seeds_the_solver() {
    let speckle = blob_speckle(5);
    let reference = Image::from_fn(128, 128, &speckle).unwrap();
    let deformed = Image::from_fn(128, 128, |x, y| speckle(x - 5.4, y - 3.2)).unwrap();
    let params = CorrelationParams {
        initialization_method: InitializationMethod::UsePhaseCorrelation,
        ..CorrelationParams::generic()
    };
    let subsets = vec![Subset::square(0, 64, 64, 31, &reference).unwrap()];
    let mut driver = Driver::new(params, subsets, reference).unwrap();
    let r = driver.correlate_frame(&deformed).unwrap().results.remove(0);
    assert_eq!(r.status, StatusFlag::CorrelationSuccessful);
    assert!((r.u - 5.4).abs() < 0.05 && (r.v - 3.2).abs() < 0.05);
}

#[test]
fn unchanged_frames_are_skipped() {
    let reference = shifted(0.0, 0.0);
    let params = CorrelationParams {
        enable_motion_detection: true,
        motion_detection_threshold: 0.5,
        ..CorrelationParams::generic()
    };
    let mut driver = Driver::new(params, grid(&reference), reference).unwrap();
    let frame = shifted(0.7, 0.0);
    let first = driver.correlate_frame(&frame).unwrap();
    assert!(first
        .results
        .iter()
        .all(|r| r.status == StatusFlag::CorrelationSuccessful));
    let second = driver.correlate_frame(&frame).unwrap();
    for (a, b) in first.results.iter().zip(&second.results) {
        assert_eq!(b.status, StatusFlag::FrameSkippedDueToNoMotion);
        assert!(b.is_success());
        assert_eq!(a.u, b.u);
        assert_eq!(b.iterations, 0);
    }
}

#[test]
fn neighbors_seed_later_waves() {
    let reference = shifted(0.0, 0.0);
    let subsets: Vec<Subset> = grid(&reference)
        .into_iter()
        .map(|s| {
            let neighbor = s.id().checked_sub(1);
            s.with_neighbor(neighbor)
        })
        .collect();
    let params = CorrelationParams {
        initialization_method: InitializationMethod::UseNeighborValues,
        ..CorrelationParams::generic()
    };
    let mut driver = Driver::new(params, subsets, reference).unwrap();
    let report = driver.correlate_frame(&shifted(1.2, -0.6)).unwrap();
    assert_eq!(report.num_successful(), 9);
    for r in &report.results {
        assert!((r.u - 1.2).abs() < 0.05 && (r.v + 0.6).abs() < 0.05);
    }
}

#[test]
fn filtered_images_still_track() {
    let reference = shifted(0.0, 0.0);
    let params = CorrelationParams {
        gauss_filter_images: true,
        gauss_filter_mask_size: 7,
        ..CorrelationParams::generic()
    };
    let mut driver = Driver::new(params, grid(&reference), reference).unwrap();
    let report = driver.correlate_frame(&shifted(0.8, 0.4)).unwrap();
    assert_eq!(report.num_successful(), 9);
    for r in &report.results {
        assert!((r.u - 0.8).abs() < 0.05 && (r.v - 0.4).abs() < 0.05);
    }
}

#[test]
fn low_gradient_subsets_fail_construction() {
    let reference = Image::from_fn(100, 100, |x, y| if x < 60.0 { 80.0 } else { speckle(x, y) }).unwrap();
    let subsets = vec![
        Subset::square(0, 30, 50, 21, &reference).unwrap(),
        Subset::square(1, 80, 50, 21, &reference).unwrap(),
    ];
    let params = CorrelationParams {
        sssig_threshold: 1.0,
        ..CorrelationParams::generic()
    };
    let mut driver = Driver::new(params, subsets, reference.clone()).unwrap();
    let report = driver.correlate_frame(&reference).unwrap();
    assert_eq!(report.results[0].status, StatusFlag::SubsetConstructionFailed);
    assert!(report.results[1].is_success());
}
