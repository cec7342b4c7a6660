//! Forecast feed: aligned demand, PV, and price series on a fixed time grid.
//!
//! The rolling controller reads forecasts exclusively through [`ForecastFeed`].
//! Windows that would run past the end of the data are truncated to the
//! remaining steps rather than padded or rejected.

mod synthetic;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

pub use synthetic::SyntheticForecast;

/// One forecast step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Start of the interval.
    pub timestamp: NaiveDateTime,
    /// Site demand (kW, >= 0).
    pub demand_kw: f64,
    /// PV power available before curtailment (kW, >= 0).
    pub pv_kw: f64,
    /// Market energy price for the interval (currency per kWh).
    pub price_per_kwh: f64,
}

/// A contiguous horizon of forecast points starting at step `start`.
#[derive(Debug, Clone, Copy)]
pub struct ForecastWindow<'a> {
    start: usize,
    requested: usize,
    points: &'a [ForecastPoint],
}

impl<'a> ForecastWindow<'a> {
    /// Step index of the first point.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `true` when the data ran out before the requested horizon.
    pub fn is_truncated(&self) -> bool {
        self.points.len() < self.requested
    }

    pub fn points(&self) -> &'a [ForecastPoint] {
        self.points
    }

    pub fn first(&self) -> Option<&'a ForecastPoint> {
        self.points.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'a, ForecastPoint> {
        self.points.iter()
    }
}

/// Source of forecast windows for the rolling controller.
pub trait ForecastFeed {
    /// All points, in time order.
    fn points(&self) -> &[ForecastPoint];

    /// Number of available steps.
    fn len(&self) -> usize {
        self.points().len()
    }

    fn is_empty(&self) -> bool {
        self.points().is_empty()
    }

    fn point(&self, step: usize) -> Option<&ForecastPoint> {
        self.points().get(step)
    }

    /// Returns up to `horizon` points starting at `start`.
    ///
    /// Near the end of the data the window shrinks to `len - start` points;
    /// past the end it is empty.
    fn window(&self, start: usize, horizon: usize) -> ForecastWindow<'_> {
        let points = self.points();
        let from = start.min(points.len());
        let to = start.saturating_add(horizon).min(points.len());
        ForecastWindow {
            start,
            requested: horizon,
            points: &points[from..to],
        }
    }
}

/// In-memory forecast series with a uniform step.
#[derive(Debug, Clone)]
pub struct SeriesForecast {
    step: Duration,
    points: Vec<ForecastPoint>,
}

impl SeriesForecast {
    /// Builds a series after checking values and timestamp spacing.
    pub fn new(points: Vec<ForecastPoint>, step: Duration) -> Result<Self, ForecastError> {
        let first = points.first().ok_or(ForecastError::Empty)?.timestamp;
        for (row, p) in points.iter().enumerate() {
            check_value(row, "demand_kw", p.demand_kw, true)?;
            check_value(row, "pv_kw", p.pv_kw, true)?;
            check_value(row, "price_per_kwh", p.price_per_kwh, false)?;
            let expected = first + step * row as i32;
            if p.timestamp != expected {
                return Err(ForecastError::Gap {
                    row,
                    expected,
                    found: p.timestamp,
                });
            }
        }
        Ok(Self { step, points })
    }

    /// Series with the same demand, PV and price at every step.
    pub fn constant(
        start: NaiveDateTime,
        step: Duration,
        total_steps: usize,
        demand_kw: f64,
        pv_kw: f64,
        price_per_kwh: f64,
    ) -> Result<Self, ForecastError> {
        Self::from_daily_profile(
            start,
            step,
            total_steps,
            &[demand_kw],
            &[pv_kw],
            &[price_per_kwh],
        )
    }

    /// Tiles one-day profiles across `total_steps`, repeating and truncating
    /// as needed ("tomorrow looks like today").
    pub fn from_daily_profile(
        start: NaiveDateTime,
        step: Duration,
        total_steps: usize,
        demand_kw: &[f64],
        pv_kw: &[f64],
        price_per_kwh: &[f64],
    ) -> Result<Self, ForecastError> {
        let period = demand_kw.len();
        if period == 0 || total_steps == 0 {
            return Err(ForecastError::Empty);
        }
        for (field, profile) in [("pv_kw", pv_kw), ("price_per_kwh", price_per_kwh)] {
            if profile.len() != period {
                return Err(ForecastError::ProfileLength {
                    field,
                    expected: period,
                    found: profile.len(),
                });
            }
        }

        let points = (0..total_steps)
            .map(|k| {
                let i = k % period;
                ForecastPoint {
                    timestamp: start + step * k as i32,
                    demand_kw: demand_kw[i],
                    pv_kw: pv_kw[i],
                    price_per_kwh: price_per_kwh[i],
                }
            })
            .collect();
        Self::new(points, step)
    }

    /// Loads a CSV with header `timestamp,demand_kw,pv_kw,price_per_kwh`.
    ///
    /// Timestamps use the ISO form `2024-04-01T00:30:00`.
    pub fn from_csv_path(path: &Path, step: Duration) -> Result<Self, ForecastError> {
        let file = File::open(path).map_err(|source| ForecastError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(file, step)
    }

    pub fn from_csv_reader<R: Read>(reader: R, step: Duration) -> Result<Self, ForecastError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut points = Vec::new();
        for (row, record) in rdr.deserialize::<ForecastPoint>().enumerate() {
            points.push(record.map_err(|source| ForecastError::Parse { row, source })?);
        }
        Self::new(points, step)
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Points stamped in `[from, to)`; an open end keeps that side of the series.
    pub fn period(
        &self,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<Self, ForecastError> {
        let points: Vec<ForecastPoint> = self
            .points
            .iter()
            .filter(|p| from.is_none_or(|t| p.timestamp >= t))
            .filter(|p| to.is_none_or(|t| p.timestamp < t))
            .copied()
            .collect();
        if points.is_empty() {
            return Err(ForecastError::EmptyPeriod);
        }
        Ok(Self {
            step: self.step,
            points,
        })
    }

    /// Keeps only the first `total_steps` points.
    pub fn truncate(&mut self, total_steps: usize) {
        self.points.truncate(total_steps);
    }
}

impl ForecastFeed for SeriesForecast {
    fn points(&self) -> &[ForecastPoint] {
        &self.points
    }
}

fn check_value(
    row: usize,
    field: &'static str,
    value: f64,
    non_negative: bool,
) -> Result<(), ForecastError> {
    if !value.is_finite() || (non_negative && value < 0.0) {
        return Err(ForecastError::InvalidValue { row, field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn half_hour() -> Duration {
        Duration::minutes(30)
    }

    #[test]
    fn window_is_full_length_away_from_the_end() {
        let f = SeriesForecast::constant(start(), half_hour(), 10, 1.0, 0.0, 20.0).unwrap();
        let w = f.window(2, 4);
        assert_eq!(w.start(), 2);
        assert_eq!(w.len(), 4);
        assert!(!w.is_truncated());
        assert_eq!(w.first().unwrap().timestamp, start() + half_hour() * 2);
    }

    #[test]
    fn window_truncates_at_the_tail() {
        let f = SeriesForecast::constant(start(), half_hour(), 10, 1.0, 0.0, 20.0).unwrap();
        let w = f.window(8, 48);
        assert_eq!(w.len(), 2);
        assert!(w.is_truncated());
        assert!(f.window(10, 48).is_empty());
        assert!(f.window(usize::MAX, 48).is_empty());
    }

    #[test]
    fn daily_profile_repeats() {
        let f = SeriesForecast::from_daily_profile(
            start(),
            half_hour(),
            5,
            &[1.0, 2.0],
            &[0.0, 3.0],
            &[10.0, 20.0],
        )
        .unwrap();
        let demand: Vec<f64> = f.points().iter().map(|p| p.demand_kw).collect();
        assert_eq!(demand, vec![1.0, 2.0, 1.0, 2.0, 1.0]);
        assert_eq!(f.point(3).unwrap().pv_kw, 3.0);
    }

    #[test]
    fn daily_profile_rejects_mismatched_lengths() {
        let err = SeriesForecast::from_daily_profile(
            start(),
            half_hour(),
            5,
            &[1.0, 2.0],
            &[0.0],
            &[10.0, 20.0],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::ProfileLength { field: "pv_kw", .. }
        ));
    }

    #[test]
    fn rejects_negative_demand() {
        let err = SeriesForecast::constant(start(), half_hour(), 3, -1.0, 0.0, 20.0).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InvalidValue {
                field: "demand_kw",
                ..
            }
        ));
    }

    #[test]
    fn csv_round_trips_through_reader() {
        let data = "\
timestamp,demand_kw,pv_kw,price_per_kwh
2024-04-01T00:00:00,100.0,0.0,12.5
2024-04-01T00:30:00,110.0,5.0,13.0
";
        let f = SeriesForecast::from_csv_reader(data.as_bytes(), half_hour()).unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(f.point(1).unwrap().demand_kw, 110.0);
        assert_eq!(f.step(), half_hour());
    }

    #[test]
    fn csv_gap_is_reported_with_row() {
        let data = "\
timestamp,demand_kw,pv_kw,price_per_kwh
2024-04-01T00:00:00,100.0,0.0,12.5
2024-04-01T01:00:00,110.0,5.0,13.0
";
        let err = SeriesForecast::from_csv_reader(data.as_bytes(), half_hour()).unwrap_err();
        assert!(matches!(err, ForecastError::Gap { row: 1, .. }));
    }

    #[test]
    fn period_keeps_half_open_range() {
        let f = SeriesForecast::constant(start(), half_hour(), 48, 1.0, 0.0, 20.0).unwrap();
        let p = f
            .period(Some(start() + Duration::hours(2)), Some(start() + Duration::hours(4)))
            .unwrap();
        assert_eq!(p.len(), 4);
        assert_eq!(p.point(0).unwrap().timestamp, start() + Duration::hours(2));
        assert_eq!(
            p.point(3).unwrap().timestamp,
            start() + Duration::hours(3) + half_hour()
        );
        assert_eq!(p.step(), half_hour());
    }

    #[test]
    fn period_with_open_ends() {
        let f = SeriesForecast::constant(start(), half_hour(), 10, 1.0, 0.0, 20.0).unwrap();
        assert_eq!(f.period(None, None).unwrap().len(), 10);
        assert_eq!(f.period(Some(start() + Duration::hours(4)), None).unwrap().len(), 2);
        assert_eq!(f.period(None, Some(start() + half_hour())).unwrap().len(), 1);
    }

    #[test]
    fn period_outside_series_is_rejected() {
        let f = SeriesForecast::constant(start(), half_hour(), 10, 1.0, 0.0, 20.0).unwrap();
        let err = f.period(Some(start() + Duration::days(1)), None).unwrap_err();
        assert!(matches!(err, ForecastError::EmptyPeriod));
        let err = f.period(Some(start()), Some(start())).unwrap_err();
        assert!(matches!(err, ForecastError::EmptyPeriod));
    }

    #[test]
    fn empty_csv_is_rejected() {
        let data = "timestamp,demand_kw,pv_kw,price_per_kwh\n";
        let err = SeriesForecast::from_csv_reader(data.as_bytes(), half_hour()).unwrap_err();
        assert!(matches!(err, ForecastError::Empty));
    }
}
