use std::path::{Path, PathBuf};

use polars::prelude::*;
use rayon::prelude::*;

use crate::error::{FlowError, Result};
use crate::matcher::{PoiRecord, SymbolMatcher, TaggedPoi};
use crate::schema::poi;
use crate::table::{read_gbk_csv_lossy, require_columns, write_csv};

/// Outcome of tagging one POI source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSummary {
    pub path: PathBuf,
    pub rows_read: usize,
    pub rows_tagged: usize,
    pub bad_lines: usize,
    pub chunks_written: usize,
    pub error: Option<String>,
}

/// All `*.csv` files directly under `dir`, sorted by path.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read POI records from a GBK source file. Rows without a name, id or
/// adcode are skipped. Names are kept as written.
pub fn read_poi_file(path: &Path) -> Result<(Vec<PoiRecord>, usize)> {
    let legacy = read_gbk_csv_lossy(path)?;
    let df = &legacy.frame;
    require_columns(df, &[poi::NAME, poi::ID, poi::ADCODE])?;

    let names = df.column(poi::NAME)?.str()?;
    let ids = df.column(poi::ID)?.str()?;
    let adcodes = df.column(poi::ADCODE)?.str()?;

    let records = names
        .into_iter()
        .zip(ids.into_iter())
        .zip(adcodes.into_iter())
        .filter_map(|((name, id), adcode)| {
            let name = name.filter(|n| !n.trim().is_empty())?;
            Some(PoiRecord {
                id: id?.trim().to_string(),
                adcode: adcode?.trim().to_string(),
                name: name.to_string(),
            })
        })
        .collect();
    Ok((records, legacy.bad_lines))
}

pub fn tagged_frame(rows: &[TaggedPoi]) -> Result<DataFrame> {
    let [name, id, adcode, place_symbol, place_code] = poi::TAGGED;
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    let adcodes: Vec<&str> = rows.iter().map(|r| r.adcode.as_str()).collect();
    let symbols: Vec<&str> = rows.iter().map(|r| r.place_symbol.as_str()).collect();
    let codes: Vec<i64> = rows.iter().map(|r| r.place_code).collect();
    Ok(DataFrame::new(vec![
        Column::new(name.into(), &names),
        Column::new(id.into(), &ids),
        Column::new(adcode.into(), &adcodes),
        Column::new(place_symbol.into(), &symbols),
        Column::new(place_code.into(), &codes),
    ])?)
}

/// Tag one source file and write its matches in chunks of at most
/// `max_rows_per_file` rows to `output_<stem>_<n>.csv`.
pub fn tag_file(
    path: &Path,
    matcher: &SymbolMatcher,
    output_dir: &Path,
    max_rows_per_file: usize,
) -> Result<FileSummary> {
    let (records, bad_lines) = read_poi_file(path)?;
    if bad_lines > 0 {
        tracing::warn!(path = %path.display(), bad_lines, "skipped malformed lines");
    }

    let tagged: Vec<TaggedPoi> = records.iter().filter_map(|r| matcher.tag(r)).collect();

    let stem = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .unwrap_or("poi");
    let chunk_size = max_rows_per_file.max(1);
    let mut chunks_written = 0;
    for (i, chunk) in tagged.chunks(chunk_size).enumerate() {
        let mut df = tagged_frame(chunk)?;
        let out = output_dir.join(format!("output_{stem}_{}.csv", i + 1));
        write_csv(&mut df, &out)?;
        chunks_written += 1;
    }

    Ok(FileSummary {
        path: path.to_path_buf(),
        rows_read: records.len(),
        rows_tagged: tagged.len(),
        bad_lines,
        chunks_written,
        error: None,
    })
}

/// Tag many files, `batch_size` at a time.
///
/// Each batch runs on a pool of at most `batch_size` threads and completes
/// before the next starts. A failing file is logged and reported in its
/// summary; it never stops the run.
pub fn tag_files(
    paths: &[PathBuf],
    matcher: &SymbolMatcher,
    output_dir: &Path,
    batch_size: usize,
    max_rows_per_file: usize,
) -> Result<Vec<FileSummary>> {
    std::fs::create_dir_all(output_dir)?;
    let batch_size = batch_size.max(1);
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(batch_size.min(cores))
        .build()
        .map_err(|e| FlowError::General(format!("thread pool: {e}")))?;

    let mut summaries = Vec::with_capacity(paths.len());
    for (n, batch) in paths.chunks(batch_size).enumerate() {
        let results: Vec<FileSummary> = pool.install(|| {
            batch
                .par_iter()
                .map(|path| {
                    tag_file(path, matcher, output_dir, max_rows_per_file).unwrap_or_else(|e| {
                        tracing::warn!(path = %path.display(), error = %e, "error processing file");
                        FileSummary {
                            path: path.clone(),
                            error: Some(e.to_string()),
                            ..Default::default()
                        }
                    })
                })
                .collect()
        });
        tracing::info!(
            batch = n + 1,
            files = batch.len(),
            tagged = results.iter().map(|s| s.rows_tagged).sum::<usize>(),
            "tagging batch finished"
        );
        summaries.extend(results);
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolTable;
    use crate::schema::symbol;
    use crate::table::read_csv_as_strings;
    use encoding_rs::GBK;

    fn write_gbk(path: &Path, text: &str) {
        let (bytes, _, _) = GBK.encode(text);
        std::fs::write(path, &bytes).unwrap();
    }

    fn matcher() -> SymbolMatcher {
        SymbolMatcher::new(&SymbolTable::from_entries(vec![
            ("北京".to_string(), 110000),
            ("上海".to_string(), 310000),
        ]))
    }

    #[test]
    fn test_tag_file_splits_output() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let path = src.path().join("poi_2018.csv");
        write_gbk(
            &path,
            "name,_id,adcode\n\
             北京饭店,B1,440305\n\
             上海小吃,B2,440305\n\
             无名店,B3,440305\n\
             北京烤鸭(分店),B4,320102\n\
             ,B5,440305\n",
        );

        let summary = tag_file(&path, &matcher(), out.path(), 2).unwrap();
        assert_eq!(summary.rows_read, 4);
        assert_eq!(summary.rows_tagged, 3);
        assert_eq!(summary.chunks_written, 2);

        let first = read_csv_as_strings(&out.path().join("output_poi_2018_1.csv")).unwrap();
        assert_eq!(first.height(), 2);
        let second = read_csv_as_strings(&out.path().join("output_poi_2018_2.csv")).unwrap();
        assert_eq!(second.height(), 1);
        assert_eq!(
            second.column(poi::NAME).unwrap().str().unwrap().get(0),
            Some("北京烤鸭")
        );
        assert_eq!(
            second.column(symbol::PLACECODE).unwrap().str().unwrap().get(0),
            Some("110000")
        );
    }

    #[test]
    fn test_names_keep_surrounding_whitespace() {
        let src = tempfile::tempdir().unwrap();
        let path = src.path().join("poi.csv");
        write_gbk(&path, "name,_id,adcode\n  北京饭店 (东门),B1,440305\n   ,B2,440305\n");

        let (records, bad_lines) = read_poi_file(&path).unwrap();
        assert_eq!(bad_lines, 0);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "  北京饭店 (东门)");

        let tagged = matcher().tag(&records[0]).unwrap();
        assert_eq!(tagged.name, "  北京饭店 ");
        let df = tagged_frame(&[tagged]).unwrap();
        assert_eq!(df.get_column_names_str(), poi::TAGGED.to_vec());
    }

    #[test]
    fn test_bad_file_does_not_stop_batch() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let good = src.path().join("a.csv");
        let bad = src.path().join("b.csv");
        write_gbk(&good, "name,_id,adcode\n上海中心,B1,310115\n");
        write_gbk(&bad, "title,id\nfoo,1\n");

        let files = list_csv_files(src.path()).unwrap();
        assert_eq!(files, vec![good.clone(), bad.clone()]);

        let summaries = tag_files(&files, &matcher(), out.path(), 1, 100).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].rows_tagged, 1);
        assert!(summaries[0].error.is_none());
        assert!(summaries[1].error.is_some());
    }
}
