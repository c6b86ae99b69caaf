//! Per-frame results and their delimited text rendering.

use super::status::StatusFlag;
use std::io::{self, Write};

/// Column names of [`FrameReport::write_delimited`], after the optional id.
pub const COLUMNS: [&str; 13] = [
    "COORDINATE_X",
    "COORDINATE_Y",
    "DISPLACEMENT_X",
    "DISPLACEMENT_Y",
    "ROTATION_Z",
    "NORMAL_STRAIN_XX",
    "NORMAL_STRAIN_YY",
    "SHEAR_STRAIN_XY",
    "GAMMA",
    "SIGMA",
    "ACTIVE_PIXELS",
    "ITERATIONS",
    "STATUS_FLAG",
];

/// Outcome of one subset in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SubsetResult {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub u: f64,
    pub v: f64,
    pub theta: f64,
    pub ex: f64,
    pub ey: f64,
    pub gxy: f64,
    /// -1 for failed subsets.
    pub gamma: f64,
    /// -1 for failed subsets.
    pub sigma: f64,
    pub active_pixels: usize,
    pub iterations: usize,
    pub status: StatusFlag,
    /// Stored parameter vector in shape-function order.
    pub params: Vec<f64>,
}

impl SubsetResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Results of one correlated frame, in subset order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub frame: usize,
    pub results: Vec<SubsetResult>,
    /// Drop the subset id column when writing.
    pub omit_row_id: bool,
}

impl FrameReport {
    pub fn num_successful(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn num_failed(&self) -> usize {
        self.results.len() - self.num_successful()
    }

    /// Result of the subset with `id`.
    pub fn result(&self, id: usize) -> Option<&SubsetResult> {
        self.results.iter().find(|r| r.id == id)
    }

    /// Writes a header line followed by one row per subset.
    pub fn write_delimited<W: Write>(&self, writer: &mut W, delimiter: &str) -> io::Result<()> {
        let mut header: Vec<&str> = Vec::with_capacity(COLUMNS.len() + 1);
        if !self.omit_row_id {
            header.push("SUBSET_ID");
        }
        header.extend(COLUMNS);
        writeln!(writer, "{}", header.join(delimiter))?;

        for r in &self.results {
            let mut cells: Vec<String> = Vec::with_capacity(COLUMNS.len() + 1);
            if !self.omit_row_id {
                cells.push(r.id.to_string());
            }
            cells.extend(
                [r.x, r.y, r.u, r.v, r.theta, r.ex, r.ey, r.gxy, r.gamma, r.sigma]
                    .iter()
                    .map(|v| format!("{v:.6e}")),
            );
            cells.push(r.active_pixels.to_string());
            cells.push(r.iterations.to_string());
            cells.push(r.status.as_str().to_string());
            writeln!(writer, "{}", cells.join(delimiter))?;
        }
        Ok(())
    }
}
