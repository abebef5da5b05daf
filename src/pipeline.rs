//! End-to-end batch prediction run

use crate::aligner::InputAligner;
use crate::artifacts::{load_features, load_metadata};
use crate::assembler::ResultTable;
use crate::config::AppConfig;
use crate::error::Result;
use crate::input::read_table;
use crate::metrics::{RunMetrics, Stage};
use crate::models::ModelLoader;
use crate::preprocess::load_preprocessor;
use crate::types::Table;
use std::path::PathBuf;
use tracing::{debug, info};

/// Paths and knobs for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub model_path: PathBuf,
    pub features_path: PathBuf,
    pub input_path: PathBuf,
    pub preprocessor_path: Option<PathBuf>,
    pub meta_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    /// Rows included in the preview
    pub sample_rows: usize,
}

/// Everything a run produces
#[derive(Debug)]
pub struct RunOutput {
    pub results: ResultTable,
    /// Leading raw input rows joined with their predictions
    pub preview: Table,
    pub metrics: RunMetrics,
}

/// Load artifacts, predict every input row, optionally write the results.
pub fn run_predictions(options: &RunOptions, config: &AppConfig) -> Result<RunOutput> {
    let mut metrics = RunMetrics::new();

    let (mut model, features, mut preprocessor, metadata) = metrics.time(Stage::Load, || {
        let model = ModelLoader::new().load_model(&options.model_path)?;
        let features = load_features(&options.features_path)?;
        let preprocessor = options
            .preprocessor_path
            .as_deref()
            .map(load_preprocessor)
            .transpose()?;
        let metadata = options.meta_path.as_deref().map(load_metadata).transpose()?;
        Ok::<_, crate::error::PredictError>((model, features, preprocessor, metadata))
    })?;

    if let Some(metadata) = &metadata {
        debug!(
            defaults = metadata.defaults().len(),
            extra_keys = ?metadata.extra().keys().collect::<Vec<_>>(),
            "Metadata loaded"
        );
    }

    let input = metrics.time(Stage::Read, || read_table(&options.input_path, &config.input))?;

    let aligner = InputAligner::new(&features, metadata.as_ref());
    let aligned = metrics.time(Stage::Align, || aligner.align(input.clone()))?;
    info!(
        rows = aligned.n_rows(),
        features = aligner.feature_count(),
        "Input aligned"
    );

    let x = metrics.time(Stage::Preprocess, || match preprocessor.as_mut() {
        Some(preprocessor) => preprocessor.apply(&aligned),
        None => Ok(aligned.to_matrix()?),
    })?;
    debug!(shape = ?x.shape(), "Model input ready");

    let predictions = metrics.time(Stage::Predict, || model.predict(x.view()))?;
    metrics.record_predictions(&predictions);

    let results = ResultTable::assemble(predictions);
    if let Some(path) = &options.output_path {
        metrics.time(Stage::Write, || {
            results.write_csv(path, config.output.delimiter)
        })?;
    }

    let preview = results.preview(&input, options.sample_rows)?;
    info!(
        rows = results.n_rows(),
        columns = ?results.column_names(),
        "Prediction run complete"
    );

    Ok(RunOutput {
        results,
        preview,
        metrics,
    })
}
