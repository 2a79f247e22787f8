//! One driver per stage. Each reads its inputs from the configured files,
//! writes its output table, and returns it. Stages share nothing in memory.

use polars::prelude::*;

use crate::config::PipelineConfig;
use crate::enrich::{enrich_flows, flows_from_frame};
use crate::error::Result;
use crate::flows::{counts_frame, excluded_codes, FlowAggregator};
use crate::geocode::{build_city_geocodes, geocode_frame, select_cities, Geocoder};
use crate::matcher::SymbolMatcher;
use crate::normalize::CodeNormalizer;
use crate::schema::geocode;
use crate::stats::{metrics_frame, FlowStatistics};
use crate::symbols::{alias_rows, master_rows, short_name_rows, SymbolTable, SymbolTableBuilder};
use crate::table::{read_csv_as_strings, read_single_column, write_csv};
use crate::tagging::{list_csv_files, tag_files, FileSummary};

pub struct Pipeline {
    config: PipelineConfig,
    normalizer: CodeNormalizer,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            normalizer: CodeNormalizer::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: CodeNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build the place-symbol table and write `placesymbol,placecode`.
    pub fn build_symbol_table(&self) -> Result<DataFrame> {
        let c = &self.config;
        let master = master_rows(&read_csv_as_strings(&c.path(&c.master_table))?)?;
        let aliases = alias_rows(&read_csv_as_strings(&c.path(&c.alias_table))?)?;
        let short_names = short_name_rows(&read_csv_as_strings(&c.path(&c.shortname_table))?)?;
        let minority = read_single_column(&c.path(&c.minority_list))?;

        let table = SymbolTableBuilder::new(minority).build(&master, &aliases, &short_names);
        let mut df = table.to_frame()?;
        write_csv(&mut df, &c.path(&c.symbol_table))?;
        Ok(df)
    }

    pub fn load_symbol_table(&self) -> Result<SymbolTable> {
        let c = &self.config;
        SymbolTable::from_frame(&read_csv_as_strings(&c.path(&c.symbol_table))?)
    }

    /// Tag every POI file under `poi_dir` into the tagged-output directory.
    pub fn tag_poi_files(&self, poi_dir: &std::path::Path) -> Result<Vec<FileSummary>> {
        let c = &self.config;
        let matcher = SymbolMatcher::new(&self.load_symbol_table()?);
        let files = list_csv_files(poi_dir)?;
        tracing::info!(files = files.len(), symbols = matcher.len(), "tagging POI files");
        tag_files(
            &files,
            &matcher,
            &c.path(&c.tagged_dir),
            c.batch_size,
            c.max_rows_per_file,
        )
    }

    /// Aggregate tagged files into `OD_code,count`.
    pub fn aggregate_flows(&self) -> Result<DataFrame> {
        let c = &self.config;
        let excluded = excluded_codes(&read_csv_as_strings(&c.path(&c.excluded_table))?)?;
        let aggregator = FlowAggregator::new(self.normalizer.clone(), excluded);

        let files = list_csv_files(&c.path(&c.tagged_dir))?;
        let counts = aggregator.count_files(&files, c.batch_size)?;
        tracing::info!(files = files.len(), edges = counts.len(), "OD counts aggregated");

        let mut df = counts_frame(&counts)?;
        write_csv(&mut df, &c.path(&c.od_counts))?;
        Ok(df)
    }

    /// Geocode municipalities and prefecture-level cities of the master table.
    pub fn geocode_cities(&self, geocoder: &dyn Geocoder) -> Result<DataFrame> {
        let c = &self.config;
        let master = master_rows(&read_csv_as_strings(&c.path(&c.master_table))?)?;
        let rows = build_city_geocodes(&select_cities(&master), geocoder, &c.geocode_overrides);
        let mut df = geocode_frame(&rows)?;
        write_csv(&mut df, &c.path(&c.city_geocodes))?;
        Ok(df)
    }

    /// Join OD counts with the city geocode table into the symbolic flow table.
    pub fn enrich_flows(&self) -> Result<DataFrame> {
        let c = &self.config;
        let counts = read_csv_as_strings(&c.path(&c.od_counts))?;
        let cities = read_csv_as_strings(&c.path(&c.city_geocodes))?;
        let cities = cities.drop_many([geocode::GCJ_X, geocode::GCJ_Y]);

        let mut df = enrich_flows(&counts, &cities)?;
        write_csv(&mut df, &c.path(&c.symbolic_flows))?;
        Ok(df)
    }

    /// Per-city rose entropy and gravity of the symbolic flow table.
    pub fn compute_city_metrics(&self) -> Result<DataFrame> {
        let c = &self.config;
        let flows = flows_from_frame(&read_csv_as_strings(&c.path(&c.symbolic_flows))?)?;
        let rows = FlowStatistics::new(c.bin_width_deg).city_metrics(&flows);
        tracing::info!(cities = rows.len(), "city metrics computed");

        let mut df = metrics_frame(&rows)?;
        write_csv(&mut df, &c.path(&c.city_metrics))?;
        Ok(df)
    }
}
