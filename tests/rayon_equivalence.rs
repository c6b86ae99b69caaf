#![cfg(feature = "rayon")]

use subsetdic::{CorrelationParams, Driver, FrameReport, Image, Subset};

fn speckle(x: f64, y: f64) -> f64 {
    100.0
        + 40.0 * (0.21 * x + 0.5).sin() * (0.17 * y).cos()
        + 30.0 * (0.09 * x - 0.13 * y).cos()
        + 20.0 * (0.05 * (x + y)).sin()
}

fn subsets(reference: &Image) -> Vec<Subset> {
    let mut out = Vec::new();
    for y in (20..=100).step_by(16) {
        for x in (20..=100).step_by(16) {
            let id = out.len();
            // Every other subset seeds from its left neighbor.
            let neighbor = (id % 2 == 1).then(|| id - 1);
            out.push(
                Subset::square(id, x, y, 19, reference)
                    .unwrap()
                    .with_neighbor(neighbor),
            );
        }
    }
    out
}

fn run(parallel: bool) -> Vec<FrameReport> {
    let reference = Image::from_fn(120, 120, speckle).unwrap();
    let mut driver = Driver::new(
        CorrelationParams::generic(),
        subsets(&reference),
        reference,
    )
    .unwrap()
    .with_parallel(parallel);
    [0.4, 0.9, 1.5]
        .iter()
        .map(|&shift| {
            let frame = Image::from_fn(120, 120, |x, y| speckle(x - shift, y - 0.5 * shift)).unwrap();
            driver.correlate_frame(&frame).unwrap()
        })
        .collect()
}

#[test]
fn parallel_matches_sequential() {
    let sequential = run(false);
    let parallel = run(true);
    assert_eq!(sequential, parallel);
    for report in &parallel {
        assert_eq!(report.num_failed(), 0);
    }
}
