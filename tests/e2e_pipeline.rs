//! End-to-end runs of every stage against a scratch data directory.
//!
//! Each test writes the input tables, runs the stages in order through
//! `Pipeline`, and checks the tables each stage leaves on disk.

use std::path::Path;

use encoding_rs::GBK;
use polars::prelude::*;
use pretty_assertions::assert_eq;

use symbolic_flow::geocode::GeocodeHit;
use symbolic_flow::schema::{flow, metrics, od, symbol};
use symbolic_flow::table::read_csv_as_strings;
use symbolic_flow::{Pipeline, PipelineConfig};

// ============================================================================
// Fixtures
// ============================================================================

fn write(path: &Path, text: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

fn write_gbk(path: &Path, text: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let (bytes, _, _) = GBK.encode(text);
    std::fs::write(path, &bytes).unwrap();
}

fn setup(base: &Path) {
    write(
        &base.join("input/AMap_adcode.csv"),
        "adcode,fullname\n\
         110000,北京市\n\
         110100,市辖区\n\
         110101,东城区\n\
         110108,海淀区\n\
         130000,河北省\n\
         130100,石家庄市\n\
         130104,桥西区\n\
         310000,上海市\n\
         310115,浦东新区\n\
         371200,莱芜市\n\
         440000,广东省\n\
         440300,深圳市\n\
         440305,南山区\n\
         469001,五指山市\n",
    );
    write(
        &base.join("input/city_alias.csv"),
        "alias,mainname\n魔都,上海市\n鹏城,深圳市\n",
    );
    write(
        &base.join("input/shortname_adcode.csv"),
        "shortname,adcode\n冀,130000\n沪,310000\n",
    );
    write(&base.join("input/minority.csv"), "蒙古族\n藏族\n");
    write(&base.join("input/provincialcounties.csv"), "adcode\n469001\n");
    write_gbk(
        &base.join("poi/poi_part1.csv"),
        "name,_id,adcode\n\
         北京大学(海淀),B1,110108\n\
         北京烤鸭,B2,440305\n\
         北京饭店,B3,440304\n\
         河北驴肉火烧,B4,310115\n\
         bad,line,with,too,many\n\
         魔都咖啡,B5,440305\n",
    );
    write_gbk(
        &base.join("poi/poi_part2.csv"),
        "name,_id,adcode\n\
         五指山茶,B6,440305\n\
         深圳湾酒店,B7,440305\n\
         无名小店,B8,440305\n\
         上海小笼包,B9,469001\n",
    );
}

fn city_coords(name: &str) -> Option<GeocodeHit> {
    let (x, y) = match name {
        "北京市" => (116.40, 39.90),
        "上海市" => (121.47, 31.23),
        "石家庄市" => (114.51, 38.04),
        "深圳市" => (114.06, 22.54),
        _ => return None,
    };
    Some(GeocodeHit {
        gcj_x: x + 0.006,
        gcj_y: y + 0.001,
        wgs_x: x,
        wgs_y: y,
    })
}

fn strings(df: &DataFrame, column: &str) -> Vec<String> {
    df.column(column)
        .unwrap()
        .cast(&DataType::String)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect()
}

fn run_through_counts(base: &Path) -> Pipeline {
    let pipeline = Pipeline::new(PipelineConfig::with_base_path(base));
    pipeline.build_symbol_table().unwrap();
    pipeline.tag_poi_files(&base.join("poi")).unwrap();
    pipeline.aggregate_flows().unwrap();
    pipeline
}

// ============================================================================
// 1. Symbol table
// ============================================================================

#[test]
fn test_symbol_table_stage() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let pipeline = Pipeline::new(PipelineConfig::with_base_path(dir.path()));
    pipeline.build_symbol_table().unwrap();

    let df = read_csv_as_strings(&dir.path().join("output/placesymbol_code.csv")).unwrap();
    let table = pipeline.load_symbol_table().unwrap();
    assert_eq!(table.len(), df.height());
    assert_eq!(table.get("北京"), Some(110000));
    assert_eq!(table.get("东城"), Some(110101));
    assert_eq!(table.get("魔都"), Some(310000));
    assert_eq!(table.get("冀"), Some(130000));
    assert_eq!(table.get("市辖"), None);

    let codes: Vec<i64> = strings(&df, symbol::PLACECODE)
        .iter()
        .map(|c| c.parse().unwrap())
        .collect();
    let mut sorted = codes.clone();
    sorted.sort();
    assert_eq!(codes, sorted);
}

// ============================================================================
// 2. Tagging
// ============================================================================

#[test]
fn test_tagging_stage() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let pipeline = Pipeline::new(PipelineConfig::with_base_path(dir.path()));
    pipeline.build_symbol_table().unwrap();

    let summaries = pipeline.tag_poi_files(&dir.path().join("poi")).unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].bad_lines, 1);
    assert_eq!(summaries[0].rows_read, 5);
    assert_eq!(summaries[0].rows_tagged, 5);
    assert_eq!(summaries[1].rows_tagged, 3);

    let tagged = read_csv_as_strings(
        &dir.path().join("output/extractresult/output_poi_part1_1.csv"),
    )
    .unwrap();
    let names = strings(&tagged, "name");
    assert_eq!(names[0], "北京大学");
    assert_eq!(strings(&tagged, symbol::PLACESYMBOL)[0], "北京");
    assert_eq!(strings(&tagged, symbol::PLACECODE)[0], "110000");
}

// ============================================================================
// 3. OD aggregation
// ============================================================================

#[test]
fn test_aggregation_stage() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    run_through_counts(dir.path());

    let df = read_csv_as_strings(&dir.path().join("output/OD_code_counts.csv")).unwrap();
    assert_eq!(
        strings(&df, od::OD_CODE),
        vec!["110000_440300", "130100_310000", "310000_440300"]
    );
    assert_eq!(strings(&df, od::COUNT), vec!["2", "1", "1"]);
}

// ============================================================================
// 4. Geocoding, enrichment and metrics
// ============================================================================

#[test]
fn test_full_chain() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let pipeline = run_through_counts(dir.path());

    let cities = pipeline.geocode_cities(&city_coords).unwrap();
    assert_eq!(
        strings(&cities, "fullname"),
        vec!["北京市", "上海市", "石家庄市", "莱芜市", "深圳市"]
    );
    // Laiwu has no service result but is corrected by the default override
    assert_eq!(cities.column("wgs_x").unwrap().null_count(), 0);

    let flows = pipeline.enrich_flows().unwrap();
    assert_eq!(flows.get_column_names_str(), flow::ALL.to_vec());
    assert_eq!(flows.height(), 3);
    assert_eq!(
        strings(&flows, flow::OCITY_NAME),
        vec!["北京市", "石家庄市", "上海市"]
    );
    assert_eq!(flows.column(flow::D_X).unwrap().null_count(), 0);

    let df = pipeline.compute_city_metrics().unwrap();
    assert_eq!(
        strings(&df, metrics::CITYNAME),
        vec!["上海市", "北京市", "深圳市", "石家庄市"]
    );

    let entropy_out = df.column(metrics::ENTROPY_OUT).unwrap().f64().unwrap().clone();
    let entropy_in = df.column(metrics::ENTROPY_IN).unwrap().f64().unwrap().clone();
    let gravity_in = df.column(metrics::GRAVITY_IN).unwrap().f64().unwrap().clone();

    // Beijing only sends, Shenzhen only receives
    assert_eq!(entropy_in.get(1), None);
    assert_eq!(entropy_out.get(1), Some(0.0));
    assert_eq!(entropy_out.get(2), None);

    // Shenzhen receives from two distinct sectors
    let shenzhen_in = entropy_in.get(2).unwrap();
    assert!(shenzhen_in > 0.0 && shenzhen_in <= 1.0 + 1e-9);
    assert!(gravity_in.get(2).unwrap() > 0.0);

    assert!(dir.path().join("output/city_od_metrics.csv").exists());
}

#[test]
fn test_ungeocoded_endpoints_stay_null() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let pipeline = run_through_counts(dir.path());

    let no_shenzhen = |name: &str| {
        if name == "深圳市" {
            None
        } else {
            city_coords(name)
        }
    };
    pipeline.geocode_cities(&no_shenzhen).unwrap();

    let flows = pipeline.enrich_flows().unwrap();
    assert_eq!(flows.height(), 3);
    assert_eq!(flows.column(flow::D_X).unwrap().null_count(), 2);

    let df = pipeline.compute_city_metrics().unwrap();
    assert_eq!(strings(&df, metrics::CITYNAME), vec!["上海市", "石家庄市"]);
}

#[test]
fn test_config_file_resolves_relative_base() {
    let dir = tempfile::tempdir().unwrap();
    setup(&dir.path().join("data"));
    let config_path = dir.path().join("flow.toml");
    write(&config_path, "base_path = \"data\"\nbatch_size = 1\n");

    let config = PipelineConfig::from_toml_file(&config_path).unwrap();
    assert_eq!(config.base_path, dir.path().join("data"));
    let pipeline = Pipeline::new(config);
    pipeline.build_symbol_table().unwrap();
    assert!(dir.path().join("data/output/placesymbol_code.csv").exists());
}
