//! Append-only annual record of step results.

use serde::Serialize;

use super::types::{SolveStatus, StepResult};

/// Ordered step results, one per completed step.
///
/// Results can only be appended; existing entries are never reordered or
/// changed. The record's length is the run's progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnnualRecord {
    steps: Vec<StepResult>,
}

impl AnnualRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            steps: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, result: StepResult) {
        debug_assert_eq!(result.step, self.steps.len(), "record must stay contiguous");
        self.steps.push(result);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, step: usize) -> Option<&StepResult> {
        self.steps.get(step)
    }

    pub fn last(&self) -> Option<&StepResult> {
        self.steps.last()
    }

    pub fn as_slice(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepResult> {
        self.steps.iter()
    }

    /// Steps `from..=to`, clamped to what has been recorded.
    pub fn range(&self, from: usize, to: usize) -> &[StepResult] {
        if from >= self.steps.len() || from > to {
            return &[];
        }
        let end = to.saturating_add(1).min(self.steps.len());
        &self.steps[from..end]
    }

    /// Largest recorded purchase (kW), or 0 for an empty record.
    pub fn peak_purchase_kw(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| s.purchase_kw)
            .fold(0.0, f64::max)
    }

    pub fn count_status(&self, status: SolveStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn into_vec(self) -> Vec<StepResult> {
        self.steps
    }
}

impl<'a> IntoIterator for &'a AnnualRecord {
    type Item = &'a StepResult;
    type IntoIter = std::slice::Iter<'a, StepResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn result(step: usize, purchase: f64, status: SolveStatus) -> StepResult {
        StepResult {
            step,
            timestamp: NaiveDate::from_ymd_opt(2024, 4, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            status,
            demand_kw: purchase,
            pv_available_kw: 0.0,
            pv_used_kw: 0.0,
            pv_curtailed_kw: 0.0,
            purchase_kw: purchase,
            sale_kw: 0.0,
            charge_kw: 0.0,
            discharge_kw: 0.0,
            soc_kwh: 0.0,
            price_per_kwh: 10.0,
            purchase_cap_kw: None,
            window_len: 1,
        }
    }

    fn filled() -> AnnualRecord {
        let mut r = AnnualRecord::new();
        r.push(result(0, 10.0, SolveStatus::Optimal));
        r.push(result(1, 30.0, SolveStatus::Infeasible));
        r.push(result(2, 20.0, SolveStatus::Optimal));
        r
    }

    #[test]
    fn peak_is_max_purchase() {
        assert_eq!(filled().peak_purchase_kw(), 30.0);
        assert_eq!(AnnualRecord::new().peak_purchase_kw(), 0.0);
    }

    #[test]
    fn range_is_inclusive_and_clamped() {
        let r = filled();
        assert_eq!(r.range(1, 2).len(), 2);
        assert_eq!(r.range(1, 99).len(), 2);
        assert!(r.range(2, 1).is_empty());
        assert!(r.range(5, 9).is_empty());
    }

    #[test]
    fn counts_statuses() {
        let r = filled();
        assert_eq!(r.count_status(SolveStatus::Optimal), 2);
        assert_eq!(r.count_status(SolveStatus::Infeasible), 1);
        assert_eq!(r.count_status(SolveStatus::Timeout), 0);
    }

    #[test]
    fn serializes_as_array() {
        let v = serde_json::to_value(filled()).unwrap();
        assert_eq!(v.as_array().unwrap().len(), 3);
        assert_eq!(v[1]["status"], "infeasible");
    }
}
