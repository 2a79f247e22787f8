//! Directional statistics over a city's weighted flow bearings.
//!
//! Each flow contributes `count × great-circle distance` at the bearing from
//! the city to the other endpoint. The rose entropy measures how evenly that
//! weight spreads over compass sectors; the rose gravity is the length of the
//! weighted vector sum, so it grows with both volume and concentration.

use std::collections::BTreeMap;

use polars::prelude::*;

use crate::enrich::{CityPoint, EnrichedFlow};
use crate::error::Result;
use crate::schema::metrics;

/// Mean earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub const DEFAULT_BIN_WIDTH_DEG: f64 = 20.0;

/// Great-circle distance between two points given in decimal degrees.
pub fn haversine_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (
        lon1.to_radians(),
        lat1.to_radians(),
        lon2.to_radians(),
        lat2.to_radians(),
    );
    let dlon = lon2 - lon1;
    let dlat = lat2 - lat1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    c * EARTH_RADIUS_KM
}

/// Initial compass bearing from point 1 to point 2, in `[0, 360)` degrees
/// clockwise from north.
pub fn initial_bearing(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (
        lon1.to_radians(),
        lat1.to_radians(),
        lon2.to_radians(),
        lat2.to_radians(),
    );
    let dlon = lon2 - lon1;
    let x = dlon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let bearing = (x.atan2(y).to_degrees() + 360.0) % 360.0;
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Weighted Shannon entropy, in bits, of bearings binned into
/// `bin_width`-degree sectors. Zero when there is no weight at all.
pub fn rose_entropy(bearings: &[f64], weights: &[f64], bin_width: f64) -> f64 {
    let bins = (360.0 / bin_width).ceil().max(1.0) as usize;
    let mut sums = vec![0.0f64; bins];
    for (&bearing, &weight) in bearings.iter().zip(weights) {
        let idx = ((bearing.rem_euclid(360.0) / bin_width).floor() as usize).min(bins - 1);
        sums[idx] += weight;
    }

    let total: f64 = sums.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    sums.iter()
        .map(|w| w / total)
        .filter(|&p| p > 0.0)
        .map(|p| p * (1.0 / p).log2())
        .sum()
}

/// Length of the weighted vector sum of bearings. Not normalized by total
/// weight.
pub fn rose_gravity(bearings: &[f64], weights: &[f64]) -> f64 {
    let (x, y) = bearings
        .iter()
        .zip(weights)
        .fold((0.0f64, 0.0f64), |(x, y), (&bearing, &weight)| {
            let angle = bearing.to_radians();
            (x + angle.cos() * weight, y + angle.sin() * weight)
        });
    x.hypot(y)
}

/// Rose entropy and gravity of one city in each direction. A direction
/// without flows is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CityMetrics {
    pub city: String,
    pub entropy_out: Option<f64>,
    pub entropy_in: Option<f64>,
    pub gravity_out: Option<f64>,
    pub gravity_in: Option<f64>,
}

#[derive(Debug, Default)]
struct Rose {
    bearings: Vec<f64>,
    weights: Vec<f64>,
}

impl Rose {
    fn push(&mut self, bearing: f64, weight: f64) {
        self.bearings.push(bearing);
        self.weights.push(weight);
    }
}

/// Computes per-city rose metrics over enriched flows.
#[derive(Debug, Clone)]
pub struct FlowStatistics {
    bin_width: f64,
}

impl Default for FlowStatistics {
    fn default() -> Self {
        Self::new(DEFAULT_BIN_WIDTH_DEG)
    }
}

impl FlowStatistics {
    pub fn new(bin_width: f64) -> Self {
        let bin_width = if bin_width > 0.0 && bin_width <= 360.0 {
            bin_width
        } else {
            tracing::warn!(
                bin_width,
                fallback = DEFAULT_BIN_WIDTH_DEG,
                "rose bin width out of range"
            );
            DEFAULT_BIN_WIDTH_DEG
        };
        Self { bin_width }
    }

    /// Metrics for every city that appears as an endpoint, sorted by name.
    ///
    /// Outgoing flows are grouped by origin with the bearing origin →
    /// destination; incoming flows by destination with the bearing
    /// destination → origin. Flows lacking either endpoint are skipped.
    pub fn city_metrics(&self, flows: &[EnrichedFlow]) -> Vec<CityMetrics> {
        let mut outgoing: BTreeMap<&str, Rose> = BTreeMap::new();
        let mut incoming: BTreeMap<&str, Rose> = BTreeMap::new();
        let mut skipped = 0;

        for flow in flows {
            let (Some(o), Some(d)) = (&flow.origin, &flow.destination) else {
                skipped += 1;
                continue;
            };
            let weight = flow.count as f64 * distance(o, d);
            outgoing
                .entry(o.name.as_str())
                .or_default()
                .push(bearing(o, d), weight);
            incoming
                .entry(d.name.as_str())
                .or_default()
                .push(bearing(d, o), weight);
        }
        if skipped > 0 {
            tracing::warn!(skipped, "flows without geocoded endpoints left out of metrics");
        }

        let mut cities: Vec<&str> = outgoing.keys().chain(incoming.keys()).copied().collect();
        cities.sort_unstable();
        cities.dedup();

        cities
            .into_iter()
            .map(|city| {
                let out = outgoing.get(city);
                let inc = incoming.get(city);
                CityMetrics {
                    city: city.to_string(),
                    entropy_out: out.map(|r| self.entropy(r)),
                    entropy_in: inc.map(|r| self.entropy(r)),
                    gravity_out: out.map(|r| rose_gravity(&r.bearings, &r.weights)),
                    gravity_in: inc.map(|r| rose_gravity(&r.bearings, &r.weights)),
                }
            })
            .collect()
    }

    fn entropy(&self, rose: &Rose) -> f64 {
        rose_entropy(&rose.bearings, &rose.weights, self.bin_width)
    }
}

fn distance(a: &CityPoint, b: &CityPoint) -> f64 {
    haversine_distance(a.lon, a.lat, b.lon, b.lat)
}

fn bearing(from: &CityPoint, to: &CityPoint) -> f64 {
    initial_bearing(from.lon, from.lat, to.lon, to.lat)
}

pub fn metrics_frame(rows: &[CityMetrics]) -> Result<DataFrame> {
    let names: Vec<&str> = rows.iter().map(|r| r.city.as_str()).collect();
    let pick = |f: fn(&CityMetrics) -> Option<f64>| -> Vec<Option<f64>> {
        rows.iter().map(f).collect()
    };
    Ok(DataFrame::new(vec![
        Column::new(metrics::CITYNAME.into(), &names),
        Column::new(metrics::ENTROPY_OUT.into(), &pick(|r| r.entropy_out)),
        Column::new(metrics::ENTROPY_IN.into(), &pick(|r| r.entropy_in)),
        Column::new(metrics::GRAVITY_OUT.into(), &pick(|r| r.gravity_out)),
        Column::new(metrics::GRAVITY_IN.into(), &pick(|r| r.gravity_in)),
    ])?)
}
