use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::config::PipelineConfig;
use crate::error::FlowError;
use crate::geocode::{GeocodeHit, Geocoder};
use crate::normalize::CodeNormalizer;
use crate::pipeline::Pipeline;
use crate::schema;
use crate::stats;

#[pyclass]
pub struct SymbolicFlowModel {
    pipeline: Pipeline,
}

#[pymethods]
impl SymbolicFlowModel {
    /// Create a model over a data directory, optionally from a TOML config.
    /// An explicit `base_path` wins over the config file's.
    #[new]
    #[pyo3(signature = (base_path=None, config_path=None))]
    fn new(base_path: Option<String>, config_path: Option<String>) -> PyResult<Self> {
        let mut config = match config_path {
            Some(p) => PipelineConfig::from_toml_file(&PathBuf::from(p))?,
            None => PipelineConfig::default(),
        };
        if let Some(base) = base_path {
            config.base_path = PathBuf::from(base);
        }
        Ok(Self {
            pipeline: Pipeline::new(config),
        })
    }

    // ── Stages ──────────────────────────────────────────────────────────────

    fn build_symbol_table(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.pipeline.build_symbol_table()?))
    }

    /// Tag all POI CSVs under `poi_dir`.
    ///
    /// Returns one `(path, rows_read, rows_tagged, bad_lines, chunks, error)`
    /// tuple per file.
    #[allow(clippy::type_complexity)]
    fn tag_poi_files(
        &self,
        py: Python<'_>,
        poi_dir: &str,
    ) -> PyResult<Vec<(String, usize, usize, usize, usize, Option<String>)>> {
        let dir = PathBuf::from(poi_dir);
        let summaries = py.allow_threads(|| self.pipeline.tag_poi_files(&dir))?;
        Ok(summaries
            .into_iter()
            .map(|s| {
                (
                    s.path.display().to_string(),
                    s.rows_read,
                    s.rows_tagged,
                    s.bad_lines,
                    s.chunks_written,
                    s.error,
                )
            })
            .collect())
    }

    fn aggregate_flows(&self, py: Python<'_>) -> PyResult<PyDataFrame> {
        let df = py.allow_threads(|| self.pipeline.aggregate_flows())?;
        Ok(PyDataFrame(df))
    }

    /// Geocode the city list with a Python callable.
    ///
    /// `geocoder(fullname)` must return `None` or a
    /// `(gcj_x, gcj_y, wgs_x, wgs_y)` tuple. Exceptions count as misses.
    fn geocode_cities(&self, geocoder: PyObject) -> PyResult<PyDataFrame> {
        let geocoder = PyGeocoder { callable: geocoder };
        Ok(PyDataFrame(self.pipeline.geocode_cities(&geocoder)?))
    }

    fn enrich_flows(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.pipeline.enrich_flows()?))
    }

    fn compute_city_metrics(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.pipeline.compute_city_metrics()?))
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    #[staticmethod]
    fn normalize_own_code(code: &str) -> String {
        CodeNormalizer::default().normalize_own(code)
    }

    #[staticmethod]
    fn normalize_place_code(code: &str) -> String {
        CodeNormalizer::default().normalize_place(code)
    }

    #[staticmethod]
    #[pyo3(signature = (bearings, weights, interval=stats::DEFAULT_BIN_WIDTH_DEG))]
    fn rose_entropy(bearings: Vec<f64>, weights: Vec<f64>, interval: f64) -> PyResult<f64> {
        if bearings.len() != weights.len() {
            return Err(FlowError::InvalidData("bearings and weights differ in length".into()).into());
        }
        Ok(stats::rose_entropy(&bearings, &weights, interval))
    }

    #[staticmethod]
    fn rose_gravity(bearings: Vec<f64>, weights: Vec<f64>) -> PyResult<f64> {
        if bearings.len() != weights.len() {
            return Err(FlowError::InvalidData("bearings and weights differ in length".into()).into());
        }
        Ok(stats::rose_gravity(&bearings, &weights))
    }

    #[getter]
    fn base_path(&self) -> String {
        self.pipeline.config().base_path.display().to_string()
    }
}

struct PyGeocoder {
    callable: PyObject,
}

impl Geocoder for PyGeocoder {
    fn geocode(&self, name: &str) -> Option<GeocodeHit> {
        Python::with_gil(|py| {
            let result = self.callable.call1(py, (name,)).map_err(|e| {
                tracing::warn!(city = %name, error = %e, "geocoder raised");
            });
            let coords: Option<(f64, f64, f64, f64)> = result.ok()?.extract(py).ok()?;
            coords.map(|(gcj_x, gcj_y, wgs_x, wgs_y)| GeocodeHit {
                gcj_x,
                gcj_y,
                wgs_x,
                wgs_y,
            })
        })
    }
}

/// Export column-name constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let symbol = PyModule::new(m.py(), "symbol")?;
    symbol.add("PLACESYMBOL", schema::symbol::PLACESYMBOL)?;
    symbol.add("PLACECODE", schema::symbol::PLACECODE)?;
    m.add_submodule(&symbol)?;

    let od = PyModule::new(m.py(), "od")?;
    od.add("OD_CODE", schema::od::OD_CODE)?;
    od.add("COUNT", schema::od::COUNT)?;
    m.add_submodule(&od)?;

    let flow = PyModule::new(m.py(), "flow")?;
    flow.add("ALL", schema::flow::ALL.to_vec())?;
    m.add_submodule(&flow)?;

    let metrics = PyModule::new(m.py(), "metrics")?;
    metrics.add("CITYNAME", schema::metrics::CITYNAME)?;
    metrics.add("ENTROPY_OUT", schema::metrics::ENTROPY_OUT)?;
    metrics.add("ENTROPY_IN", schema::metrics::ENTROPY_IN)?;
    metrics.add("GRAVITY_OUT", schema::metrics::GRAVITY_OUT)?;
    metrics.add("GRAVITY_IN", schema::metrics::GRAVITY_IN)?;
    m.add_submodule(&metrics)?;

    Ok(())
}

#[pymodule]
#[pyo3(name = "_core")]
fn core_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    crate::logging::init();
    m.add_class::<SymbolicFlowModel>()?;
    add_schema_exports(m)?;
    Ok(())
}
