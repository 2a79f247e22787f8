use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use rayon::prelude::*;

use crate::error::{FlowError, Result};
use crate::normalize::CodeNormalizer;
use crate::schema::{excluded, od, poi, symbol};
use crate::table::{parse_code, read_csv_as_strings, require_columns};

/// Directed city pair: the referenced place is the origin, the city the POI
/// sits in is the destination. Both sides are normalized 4-digit codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OdKey {
    pub origin: String,
    pub destination: String,
}

impl OdKey {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
        }
    }

    /// Split `"<origin>_<destination>"` into its two 6-digit city codes.
    pub fn parse_codes(od_code: &str) -> Option<(i64, i64)> {
        let (o, d) = od_code.trim().split_once('_')?;
        Some((parse_code(o)?, parse_code(d)?))
    }
}

impl fmt::Display for OdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}00_{}00", self.origin, self.destination)
    }
}

/// Aggregated OD edge counts, ordered by key.
pub type OdCounts = BTreeMap<OdKey, u64>;

/// One tagged row as far as flow classification is concerned.
#[derive(Debug, Clone, Copy)]
pub struct TaggedCodes<'a> {
    pub adcode: &'a str,
    pub place_code: &'a str,
}

/// Classifies tagged POIs into translocal OD edges and counts them.
#[derive(Debug, Clone)]
pub struct FlowAggregator {
    normalizer: CodeNormalizer,
    excluded: HashSet<i64>,
}

impl FlowAggregator {
    pub fn new(normalizer: CodeNormalizer, excluded: HashSet<i64>) -> Self {
        Self {
            normalizer,
            excluded,
        }
    }

    fn is_excluded(&self, raw: &str) -> bool {
        parse_code(raw).is_some_and(|c| self.excluded.contains(&c))
    }

    /// The edge a tagged POI contributes, or `None` when it touches an
    /// excluded unit or references its own city.
    pub fn classify(&self, row: TaggedCodes<'_>) -> Option<OdKey> {
        if self.is_excluded(row.adcode) || self.is_excluded(row.place_code) {
            return None;
        }
        let place = self.normalizer.normalize_place(row.place_code);
        let own = self.normalizer.normalize_own(row.adcode);
        if place == own {
            return None;
        }
        Some(OdKey::new(place, own))
    }

    pub fn count<'a>(&self, rows: impl IntoIterator<Item = TaggedCodes<'a>>) -> OdCounts {
        let mut counts = OdCounts::new();
        for key in rows.into_iter().filter_map(|r| self.classify(r)) {
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    /// Count the edges of one tagged-POI frame.
    pub fn count_frame(&self, df: &DataFrame) -> Result<OdCounts> {
        require_columns(df, &[poi::ADCODE, symbol::PLACECODE])?;
        let adcodes = df.column(poi::ADCODE)?.cast(&DataType::String)?;
        let places = df.column(symbol::PLACECODE)?.cast(&DataType::String)?;
        let rows = adcodes
            .str()?
            .into_iter()
            .zip(places.str()?.into_iter())
            .filter_map(|(adcode, place_code)| {
                Some(TaggedCodes {
                    adcode: adcode?,
                    place_code: place_code?,
                })
            });
        Ok(self.count(rows))
    }

    pub fn count_file(&self, path: &Path) -> Result<OdCounts> {
        let df = read_csv_as_strings(path)?;
        self.count_frame(&df)
    }

    /// Count tagged files `batch_size` at a time and sum the per-file counts.
    ///
    /// Each batch runs on a pool of at most `batch_size` threads and is merged
    /// before the next starts. Files that cannot be read are logged and skipped.
    pub fn count_files(&self, paths: &[PathBuf], batch_size: usize) -> Result<OdCounts> {
        let batch_size = batch_size.max(1);
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(batch_size.min(cores))
            .build()
            .map_err(|e| FlowError::General(format!("thread pool: {e}")))?;

        let mut total = OdCounts::new();
        for (n, batch) in paths.chunks(batch_size).enumerate() {
            let counts = pool.install(|| {
                batch
                    .par_iter()
                    .filter_map(|path| match self.count_file(path) {
                        Ok(counts) => Some(counts),
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "skipping tagged file");
                            None
                        }
                    })
                    .reduce(OdCounts::new, merge_counts)
            });
            tracing::debug!(batch = n + 1, files = batch.len(), edges = counts.len(), "counting batch finished");
            total = merge_counts(total, counts);
        }
        Ok(total)
    }
}

/// Sum two count maps.
pub fn merge_counts(mut into: OdCounts, from: OdCounts) -> OdCounts {
    for (key, n) in from {
        *into.entry(key).or_insert(0) += n;
    }
    into
}

pub fn counts_frame(counts: &OdCounts) -> Result<DataFrame> {
    let keys: Vec<String> = counts.keys().map(|k| k.to_string()).collect();
    let values: Vec<i64> = counts
        .values()
        .map(|&n| i64::try_from(n))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| FlowError::InvalidData("OD count overflows i64".into()))?;
    Ok(DataFrame::new(vec![
        Column::new(od::OD_CODE.into(), &keys),
        Column::new(od::COUNT.into(), &values),
    ])?)
}

/// Codes listed in the excluded-units table.
pub fn excluded_codes(df: &DataFrame) -> Result<HashSet<i64>> {
    require_columns(df, &[excluded::ADCODE])?;
    let codes = df.column(excluded::ADCODE)?.cast(&DataType::String)?;
    Ok(codes.str()?.into_iter().flatten().filter_map(parse_code).collect())
}
