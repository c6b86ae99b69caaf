//! Extrapolation of stored per-subset solutions.

use super::ProjectionMethod;
use std::collections::VecDeque;

/// Number of stored solutions needed by the highest-order projection.
const HISTORY_DEPTH: usize = 3;

/// Most recent stored solutions of one subset, newest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolutionHistory {
    entries: VecDeque<Vec<f64>>,
}

impl SolutionHistory {
    /// Records a stored solution, dropping the oldest beyond the depth.
    pub fn push(&mut self, params: Vec<f64>) {
        self.entries.push_front(params);
        self.entries.truncate(HISTORY_DEPTH);
    }

    /// Last stored solution.
    pub fn latest(&self) -> Option<&[f64]> {
        self.entries.front().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Predicts the next solution; falls back to lower orders on short
    /// histories.
    pub fn extrapolate(&self, method: ProjectionMethod) -> Option<Vec<f64>> {
        let p1 = self.entries.front()?;
        let order = match method {
            ProjectionMethod::DisplacementBased => 1,
            ProjectionMethod::VelocityBased => 2,
            ProjectionMethod::Multistep => 3,
        }
        .min(self.entries.len());
        let out = match order {
            3 => {
                let (p2, p3) = (&self.entries[1], &self.entries[2]);
                (0..p1.len())
                    .map(|i| 3.0 * p1[i] - 3.0 * p2[i] + p3[i])
                    .collect()
            }
            2 => {
                let p2 = &self.entries[1];
                (0..p1.len()).map(|i| 2.0 * p1[i] - p2[i]).collect()
            }
            _ => p1.clone(),
        };
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::SolutionHistory;
    use crate::initializer::ProjectionMethod;

    fn history(values: &[f64]) -> SolutionHistory {
        let mut h = SolutionHistory::default();
        for &v in values {
            h.push(vec![v, -v]);
        }
        h
    }

    #[test]
    fn projections_extrapolate_polynomials() {
        // 1, 4, 9 -> 16 for a quadratic path; oldest first.
        let h = history(&[1.0, 4.0, 9.0]);
        assert_eq!(h.extrapolate(ProjectionMethod::DisplacementBased), Some(vec![9.0, -9.0]));
        assert_eq!(h.extrapolate(ProjectionMethod::VelocityBased), Some(vec![14.0, -14.0]));
        assert_eq!(h.extrapolate(ProjectionMethod::Multistep), Some(vec![16.0, -16.0]));
    }

    #[test]
    fn short_histories_fall_back() {
        assert_eq!(history(&[]).extrapolate(ProjectionMethod::Multistep), None);
        assert_eq!(
            history(&[2.0]).extrapolate(ProjectionMethod::Multistep),
            Some(vec![2.0, -2.0])
        );
        assert_eq!(
            history(&[2.0, 3.0]).extrapolate(ProjectionMethod::Multistep),
            Some(vec![4.0, -4.0])
        );
    }

    #[test]
    fn depth_is_bounded() {
        let h = history(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(h.len(), 3);
        assert_eq!(h.latest(), Some(&[5.0, -5.0][..]));
    }
}
