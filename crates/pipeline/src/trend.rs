//! Short-term wind trend from a bounded, time-ordered sample window.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use common::config::TrendConfig;
use common::{Measurement, Trend, TrendResult};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    at: DateTime<Utc>,
    speed_knots: f64,
}

/// Summary of the current window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendWindowInfo {
    pub samples: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub span_minutes: f64,
}

#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    samples: VecDeque<Sample>,
    reference: Duration,
    stable_threshold_pct: f64,
    max_samples: usize,
}

impl TrendAnalyzer {
    pub fn new(reference: Duration, stable_threshold_pct: f64, max_samples: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            reference,
            stable_threshold_pct,
            max_samples: max_samples.max(2),
        }
    }

    pub fn from_config(cfg: &TrendConfig) -> Self {
        Self::new(
            Duration::seconds(cfg.reference_interval_secs as i64),
            cfg.stable_threshold_pct,
            cfg.max_samples,
        )
    }

    /// Insert a sample in timestamp order, then drop anything older than twice
    /// the reference interval before the newest sample.
    pub fn add(&mut self, measurement: &Measurement) {
        let sample = Sample {
            at: measurement.timestamp(),
            speed_knots: measurement.wind_speed_knots(),
        };
        let pos = self.samples.partition_point(|s| s.at <= sample.at);
        self.samples.insert(pos, sample);
        self.prune();
    }

    fn prune(&mut self) {
        let Some(newest) = self.samples.back().map(|s| s.at) else {
            return;
        };
        let cutoff = newest - self.reference * 2;
        while self.samples.front().is_some_and(|s| s.at < cutoff) {
            self.samples.pop_front();
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    pub fn analyze_trend(&self) -> TrendResult {
        self.analyze_trend_at(Utc::now())
    }

    /// Compare the newest speed with the sample closest to `now - reference`.
    pub fn analyze_trend_at(&self, now: DateTime<Utc>) -> TrendResult {
        let (Some(oldest), Some(current)) = (self.samples.front(), self.samples.back()) else {
            return TrendResult::insufficient();
        };
        if self.samples.len() < 2 || current.at - oldest.at < self.reference {
            return TrendResult::insufficient();
        }

        let target = now - self.reference;
        let previous = self
            .samples
            .iter()
            .take(self.samples.len() - 1)
            .min_by_key(|s| (s.at - target).num_milliseconds().abs());
        let Some(previous) = previous else {
            return TrendResult::insufficient();
        };

        let change = current.speed_knots - previous.speed_knots;
        let percent_change = if previous.speed_knots == 0.0 {
            0.0
        } else {
            change / previous.speed_knots * 100.0
        };

        let trend = if percent_change.abs() < self.stable_threshold_pct {
            Trend::Stable
        } else if change > 0.0 {
            Trend::Strengthening
        } else {
            Trend::Weakening
        };

        TrendResult {
            trend,
            icon: trend.icon().to_string(),
            color: trend.color().to_string(),
            current_speed: Some(current.speed_knots),
            previous_speed: Some(previous.speed_knots),
            change: Some(change),
            percent_change: Some(percent_change),
        }
    }

    pub fn cache_info(&self) -> TrendWindowInfo {
        let oldest = self.samples.front().map(|s| s.at);
        let newest = self.samples.back().map(|s| s.at);
        let span_minutes = match (oldest, newest) {
            (Some(o), Some(n)) => (n - o).num_seconds() as f64 / 60.0,
            _ => 0.0,
        };
        TrendWindowInfo {
            samples: self.samples.len(),
            oldest,
            newest,
            span_minutes,
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::SensorReading;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    fn at(minutes: i64, speed: f64) -> Measurement {
        Measurement::new(
            SensorReading {
                timestamp: t0() + Duration::minutes(minutes),
                wind_speed_knots: speed,
                wind_gust_knots: None,
                max_gust_knots: None,
                wind_direction_deg: 90.0,
                wind_direction_avg_deg: None,
                temperature_f: None,
                humidity_pct: None,
                pressure_inhg: None,
            },
            "test",
        )
    }

    fn analyzer() -> TrendAnalyzer {
        TrendAnalyzer::new(Duration::minutes(10), 5.0, 240)
    }

    #[test]
    fn test_single_sample_is_insufficient() {
        let mut a = analyzer();
        a.add(&at(0, 12.0));
        assert_eq!(a.analyze_trend_at(t0()).trend, Trend::InsufficientData);
    }

    #[test]
    fn test_short_span_is_insufficient() {
        let mut a = analyzer();
        a.add(&at(0, 12.0));
        a.add(&at(9, 18.0));
        let r = a.analyze_trend_at(t0() + Duration::minutes(9));
        assert_eq!(r.trend, Trend::InsufficientData);
        assert_eq!(r.change, None);
    }

    #[test]
    fn test_strengthening_over_reference_interval() {
        let mut a = analyzer();
        a.add(&at(0, 10.0));
        a.add(&at(10, 15.0));
        let r = a.analyze_trend_at(t0() + Duration::minutes(10));
        assert_eq!(r.trend, Trend::Strengthening);
        assert_eq!(r.change, Some(5.0));
        assert_eq!(r.percent_change, Some(50.0));
        assert_eq!(r.previous_speed, Some(10.0));
    }

    #[test]
    fn test_weakening_and_stable() {
        let mut a = analyzer();
        a.add(&at(0, 20.0));
        a.add(&at(10, 14.0));
        assert_eq!(
            a.analyze_trend_at(t0() + Duration::minutes(10)).trend,
            Trend::Weakening
        );

        let mut b = analyzer();
        b.add(&at(0, 20.0));
        b.add(&at(10, 20.5));
        assert_eq!(
            b.analyze_trend_at(t0() + Duration::minutes(10)).trend,
            Trend::Stable
        );
    }

    #[test]
    fn test_zero_previous_gives_zero_percent() {
        let mut a = analyzer();
        a.add(&at(0, 0.0));
        a.add(&at(10, 8.0));
        let r = a.analyze_trend_at(t0() + Duration::minutes(10));
        assert_eq!(r.percent_change, Some(0.0));
        assert_eq!(r.trend, Trend::Stable);
    }

    #[test]
    fn test_previous_is_closest_to_reference_point() {
        let mut a = analyzer();
        for (m, s) in [(0, 10.0), (4, 11.0), (6, 12.0), (14, 16.0)] {
            a.add(&at(m, s));
        }
        // now - 10min = minute 4.
        let r = a.analyze_trend_at(t0() + Duration::minutes(14));
        assert_eq!(r.previous_speed, Some(11.0));
    }

    #[test]
    fn test_out_of_order_insert_and_pruning() {
        let mut a = analyzer();
        a.add(&at(5, 11.0));
        a.add(&at(0, 10.0));
        let info = a.cache_info();
        assert_eq!(info.oldest, Some(t0()));
        assert_eq!(info.newest, Some(t0() + Duration::minutes(5)));

        a.add(&at(30, 12.0));
        // Window keeps 20 minutes before the newest sample.
        assert_eq!(a.len(), 1);
        assert_eq!(a.cache_info().span_minutes, 0.0);

        a.clear();
        assert!(a.is_empty());
    }

    #[test]
    fn test_max_samples_cap() {
        let mut a = TrendAnalyzer::new(Duration::minutes(10), 5.0, 3);
        for m in 0..6 {
            a.add(&at(m, 10.0));
        }
        assert_eq!(a.len(), 3);
        assert_eq!(a.cache_info().oldest, Some(t0() + Duration::minutes(3)));
    }
}
