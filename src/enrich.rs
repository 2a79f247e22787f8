use std::collections::HashSet;

use polars::prelude::*;

use crate::error::Result;
use crate::flows::OdKey;
use crate::schema::{flow, geocode, od};
use crate::table::{parse_code, require_columns};

/// A named city location in WGS84 degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct CityPoint {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
}

/// One row of the symbolic flow table. An endpoint is `None` when the city
/// has no geocode entry or lacks a name or coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedFlow {
    pub od_code: String,
    pub count: i64,
    pub origin: Option<CityPoint>,
    pub destination: Option<CityPoint>,
}

/// Attach origin and destination names and coordinates to OD counts.
///
/// Every OD row is kept; an endpoint missing from `cities` yields nulls so
/// gaps stay visible in the output.
pub fn enrich_flows(od_counts: &DataFrame, cities: &DataFrame) -> Result<DataFrame> {
    require_columns(od_counts, &[od::OD_CODE, od::COUNT])?;
    require_columns(
        cities,
        &[geocode::ADCODE, geocode::FULLNAME, geocode::WGS_X, geocode::WGS_Y],
    )?;

    let base = split_od_codes(od_counts)?;
    let origin = endpoint_lookup(cities, flow::OCITY, flow::OCITY_NAME, flow::O_X, flow::O_Y)?;
    let dest = endpoint_lookup(cities, flow::DCITY, flow::DCITY_NAME, flow::D_X, flow::D_Y)?;

    let df = base
        .lazy()
        .join(
            origin.lazy(),
            [col(flow::OCITY)],
            [col(flow::OCITY)],
            JoinArgs::new(JoinType::Left),
        )
        .join(
            dest.lazy(),
            [col(flow::DCITY)],
            [col(flow::DCITY)],
            JoinArgs::new(JoinType::Left),
        )
        .select(flow::ALL.iter().map(|c| col(*c)).collect::<Vec<_>>())
        .sort([flow::OD_CODE], SortMultipleOptions::default())
        .collect()?;

    let origin_gaps = df.column(flow::O_X)?.null_count();
    let dest_gaps = df.column(flow::D_X)?.null_count();
    if origin_gaps + dest_gaps > 0 {
        tracing::warn!(origin_gaps, dest_gaps, "flows with ungeocoded endpoints");
    }
    tracing::info!(flows = df.height(), "symbolic flows enriched");
    Ok(df)
}

/// `OD_code`, `count`, `Ocity`, `Dcity`.
fn split_od_codes(od_counts: &DataFrame) -> Result<DataFrame> {
    let keys = od_counts.column(od::OD_CODE)?.cast(&DataType::String)?;
    let counts = od_counts.column(od::COUNT)?.cast(&DataType::Int64)?;

    let mut codes = Vec::with_capacity(od_counts.height());
    let mut ocity = Vec::with_capacity(od_counts.height());
    let mut dcity = Vec::with_capacity(od_counts.height());
    for key in keys.str()?.into_iter() {
        let pair = key.and_then(OdKey::parse_codes);
        codes.push(key.map(str::to_string));
        ocity.push(pair.map(|(o, _)| o));
        dcity.push(pair.map(|(_, d)| d));
    }

    Ok(DataFrame::new(vec![
        Column::new(od::OD_CODE.into(), &codes),
        counts.with_name(od::COUNT.into()),
        Column::new(flow::OCITY.into(), &ocity),
        Column::new(flow::DCITY.into(), &dcity),
    ])?)
}

/// City table renamed for one endpoint, first row per code.
fn endpoint_lookup(
    cities: &DataFrame,
    key: &str,
    name: &str,
    x: &str,
    y: &str,
) -> Result<DataFrame> {
    let adcodes = cities.column(geocode::ADCODE)?.cast(&DataType::String)?;
    let names = cities.column(geocode::FULLNAME)?.cast(&DataType::String)?;
    let xs = cities.column(geocode::WGS_X)?.cast(&DataType::Float64)?;
    let ys = cities.column(geocode::WGS_Y)?.cast(&DataType::Float64)?;

    let mut seen = HashSet::new();
    let (mut codes, mut labels, mut lons, mut lats) = (vec![], vec![], vec![], vec![]);
    for (((code, label), lon), lat) in adcodes
        .str()?
        .into_iter()
        .zip(names.str()?.into_iter())
        .zip(xs.f64()?.into_iter())
        .zip(ys.f64()?.into_iter())
    {
        let Some(code) = code.and_then(parse_code) else {
            continue;
        };
        if !seen.insert(code) {
            tracing::warn!(adcode = code, "duplicate geocode entry ignored");
            continue;
        }
        codes.push(code);
        labels.push(label.map(str::to_string));
        lons.push(lon);
        lats.push(lat);
    }

    Ok(DataFrame::new(vec![
        Column::new(key.into(), &codes),
        Column::new(name.into(), &labels),
        Column::new(x.into(), &lons),
        Column::new(y.into(), &lats),
    ])?)
}

/// Read symbolic flow rows back from a frame, as written by [`enrich_flows`]
/// or loaded from CSV.
pub fn flows_from_frame(df: &DataFrame) -> Result<Vec<EnrichedFlow>> {
    require_columns(df, &flow::ALL)?;
    let keys = df.column(flow::OD_CODE)?.cast(&DataType::String)?;
    let counts = df.column(flow::COUNT)?.cast(&DataType::Int64)?;
    let o_names = df.column(flow::OCITY_NAME)?.cast(&DataType::String)?;
    let o_x = df.column(flow::O_X)?.cast(&DataType::Float64)?;
    let o_y = df.column(flow::O_Y)?.cast(&DataType::Float64)?;
    let d_names = df.column(flow::DCITY_NAME)?.cast(&DataType::String)?;
    let d_x = df.column(flow::D_X)?.cast(&DataType::Float64)?;
    let d_y = df.column(flow::D_Y)?.cast(&DataType::Float64)?;

    let (keys, counts) = (keys.str()?, counts.i64()?);
    let (o_names, o_x, o_y) = (o_names.str()?, o_x.f64()?, o_y.f64()?);
    let (d_names, d_x, d_y) = (d_names.str()?, d_x.f64()?, d_y.f64()?);

    let point = |name: Option<&str>, lon: Option<f64>, lat: Option<f64>| {
        Some(CityPoint {
            name: name?.to_string(),
            lon: lon?,
            lat: lat?,
        })
    };

    Ok((0..df.height())
        .map(|i| EnrichedFlow {
            od_code: keys.get(i).unwrap_or_default().to_string(),
            count: counts.get(i).unwrap_or(0),
            origin: point(o_names.get(i), o_x.get(i), o_y.get(i)),
            destination: point(d_names.get(i), d_x.get(i), d_y.get(i)),
        })
        .collect())
}
