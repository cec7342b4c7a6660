use std::f64::consts::PI;

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::SeriesForecast;
use crate::error::ForecastError;

/// Seeded generator for a synthetic year of demand, PV and price.
///
/// Demand follows a daily sinusoid around a base load. PV is a half-cosine
/// between sunrise and sunset, scaled by a seasonal swing that peaks at the
/// June solstice. Prices sit on a base level with morning and evening peaks.
/// Demand and PV carry Gaussian noise drawn from a single seeded RNG, so the
/// same seed always yields the same series.
#[derive(Debug, Clone)]
pub struct SyntheticForecast {
    pub start: NaiveDateTime,
    pub step: Duration,
    pub total_steps: usize,
    pub seed: u64,
    /// Mean demand (kW).
    pub demand_base_kw: f64,
    /// Daily demand swing (kW).
    pub demand_amp_kw: f64,
    /// Hour of day at which demand peaks.
    pub demand_peak_hour: f64,
    /// Demand noise standard deviation (kW).
    pub demand_noise_kw: f64,
    /// Clear-sky PV peak at the solstice (kW).
    pub pv_peak_kw: f64,
    pub sunrise_hour: f64,
    pub sunset_hour: f64,
    /// Fractional winter reduction of the PV peak (0.0-1.0).
    pub pv_seasonal_swing: f64,
    /// Multiplicative PV noise standard deviation.
    pub pv_noise_std: f64,
    /// Off-peak energy price.
    pub price_base: f64,
    /// Relative price lift at the morning and evening peaks.
    pub price_peak_lift: f64,
}

impl SyntheticForecast {
    /// Generates the full series.
    pub fn generate(&self) -> Result<SeriesForecast, ForecastError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let points = (0..self.total_steps)
            .map(|k| {
                let timestamp = self.start + self.step * k as i32;
                let hour = hour_of_day(timestamp);

                let phase = 2.0 * PI * (hour - self.demand_peak_hour) / 24.0;
                let demand = self.demand_base_kw
                    + self.demand_amp_kw * phase.cos()
                    + gaussian_noise(&mut rng, self.demand_noise_kw);

                let pv = self.pv_peak_kw
                    * self.seasonal_factor(timestamp)
                    * daylight_frac(hour, self.sunrise_hour, self.sunset_hour)
                    * (1.0 + gaussian_noise(&mut rng, self.pv_noise_std));

                let peaks = bump(hour, 8.0, 1.5) + bump(hour, 19.0, 2.0);
                let price = self.price_base * (1.0 + self.price_peak_lift * peaks);

                super::ForecastPoint {
                    timestamp,
                    demand_kw: demand.max(0.0),
                    pv_kw: pv.max(0.0),
                    price_per_kwh: price,
                }
            })
            .collect();
        SeriesForecast::new(points, self.step)
    }

    fn seasonal_factor(&self, ts: NaiveDateTime) -> f64 {
        let swing = self.pv_seasonal_swing.clamp(0.0, 1.0);
        let doy = f64::from(ts.ordinal());
        let summer = 0.5 + 0.5 * (2.0 * PI * (doy - 172.0) / 365.0).cos();
        1.0 - swing * (1.0 - summer)
    }
}

fn hour_of_day(ts: NaiveDateTime) -> f64 {
    f64::from(ts.hour()) + f64::from(ts.minute()) / 60.0
}

/// Half-cosine daylight shape in [0, 1]; zero outside `[sunrise, sunset)`.
fn daylight_frac(hour: f64, sunrise: f64, sunset: f64) -> f64 {
    if sunset <= sunrise || hour < sunrise || hour >= sunset {
        return 0.0;
    }
    (PI * (hour - sunrise) / (sunset - sunrise)).sin()
}

fn bump(hour: f64, center: f64, width: f64) -> f64 {
    let z = (hour - center) / width;
    (-z * z).exp()
}

/// Box-Muller standard normal scaled by `std_dev`.
fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos() * std_dev
}
