use polars::prelude::*;

use crate::config::GeocodeOverride;
use crate::error::Result;
use crate::schema::geocode;

const MUNICIPALITIES: [i64; 4] = [110000, 120000, 310000, 500000];
/// First-level "市辖区" placeholders under each municipality.
const MUNICIPAL_DISTRICT_ROOTS: [i64; 4] = [110100, 120100, 310100, 500100];
const CHONGQING_COUNTIES: &str = "重庆市郊县";

/// Coordinates for one place in the service's local datum and in WGS84.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeocodeHit {
    pub gcj_x: f64,
    pub gcj_y: f64,
    pub wgs_x: f64,
    pub wgs_y: f64,
}

/// Place-name geocoding service.
///
/// Implementations return `None` when the service has no result or fails;
/// the caller leaves that city's coordinates unset.
pub trait Geocoder {
    fn geocode(&self, name: &str) -> Option<GeocodeHit>;
}

impl<F> Geocoder for F
where
    F: Fn(&str) -> Option<GeocodeHit>,
{
    fn geocode(&self, name: &str) -> Option<GeocodeHit> {
        self(name)
    }
}

/// One row of the city geocode table.
#[derive(Debug, Clone, PartialEq)]
pub struct CityGeocode {
    pub adcode: i64,
    pub fullname: String,
    pub hit: Option<GeocodeHit>,
}

/// Municipalities plus every prefecture-level unit of the master table.
pub fn select_cities(master: &[(i64, String)]) -> Vec<(i64, String)> {
    let is_prefecture = |code: i64| {
        code % 100 == 0 && code % 10000 != 0 && !MUNICIPAL_DISTRICT_ROOTS.contains(&code)
    };
    let municipalities = master.iter().filter(|(c, _)| MUNICIPALITIES.contains(c));
    let prefectures = master.iter().filter(|(c, _)| is_prefecture(*c));
    municipalities
        .chain(prefectures)
        .filter(|(_, name)| !name.contains(CHONGQING_COUNTIES))
        .cloned()
        .collect()
}

/// Geocode each city in turn, then apply manual overrides by full name.
pub fn build_city_geocodes(
    cities: &[(i64, String)],
    geocoder: &dyn Geocoder,
    overrides: &[GeocodeOverride],
) -> Vec<CityGeocode> {
    let mut misses = 0;
    let mut rows: Vec<CityGeocode> = cities
        .iter()
        .map(|(adcode, fullname)| {
            let hit = geocoder.geocode(fullname);
            if hit.is_none() {
                misses += 1;
                tracing::warn!(city = %fullname, "no geocode result");
            }
            CityGeocode {
                adcode: *adcode,
                fullname: fullname.clone(),
                hit,
            }
        })
        .collect();

    for o in overrides {
        for row in rows.iter_mut().filter(|r| r.fullname == o.fullname) {
            row.hit = Some(GeocodeHit {
                gcj_x: o.gcj_x,
                gcj_y: o.gcj_y,
                wgs_x: o.wgs_x,
                wgs_y: o.wgs_y,
            });
        }
    }

    tracing::info!(cities = rows.len(), misses, "city geocoding finished");
    rows
}

pub fn geocode_frame(rows: &[CityGeocode]) -> Result<DataFrame> {
    let coord = |f: fn(&GeocodeHit) -> f64| -> Vec<Option<f64>> {
        rows.iter().map(|r| r.hit.as_ref().map(f)).collect()
    };
    let codes: Vec<i64> = rows.iter().map(|r| r.adcode).collect();
    let names: Vec<&str> = rows.iter().map(|r| r.fullname.as_str()).collect();
    Ok(DataFrame::new(vec![
        Column::new(geocode::ADCODE.into(), &codes),
        Column::new(geocode::FULLNAME.into(), &names),
        Column::new(geocode::GCJ_X.into(), &coord(|h| h.gcj_x)),
        Column::new(geocode::GCJ_Y.into(), &coord(|h| h.gcj_y)),
        Column::new(geocode::WGS_X.into(), &coord(|h| h.wgs_x)),
        Column::new(geocode::WGS_Y.into(), &coord(|h| h.wgs_y)),
    ])?)
}
