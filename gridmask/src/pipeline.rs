//! Batch masking.
//!
//! [`run_mask_job`] opens the mask once, shares it between workers and
//! masks every input in parallel on a [`WorkerPool`]. A failing input is
//! logged and reported; the remaining inputs still run.

use crate::config::{ConfigError, MaskInput, MaskJob, SubsetMode};
use crate::error::RasterError;
use crate::mask::MaskRaster;
use crate::raster::{Raster, RasterOptions};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that stop a whole job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to load mask {path:?}: {source}")]
    Mask {
        path: PathBuf,
        #[source]
        source: RasterError,
    },

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// Fixed-size rayon pool that runs the per-input work.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self, PipelineError> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("gridmask-worker-{i}"))
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `op` inside the pool; parallel iterators in `op` use its threads.
    pub fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }
}

/// Outcome of a job.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobReport {
    /// Inputs written successfully.
    pub succeeded: Vec<PathBuf>,
    /// Inputs that failed, with the error message.
    pub failed: Vec<(PathBuf, String)>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Mask every input of `job`.
///
/// In [`SubsetMode::Multiple`] the mask is partitioned by value first and
/// each input is written as one tile per group.
pub fn run_mask_job(job: &MaskJob) -> Result<JobReport, PipelineError> {
    job.validate()?;
    let start = Instant::now();

    let mask_error = |source: RasterError| PipelineError::Mask {
        path: job.mask_path.clone(),
        source,
    };
    let mut mask = MaskRaster::open(&job.mask_path).map_err(mask_error)?;
    if job.mode == SubsetMode::Multiple {
        mask.build_subset(None).map_err(mask_error)?;
    }
    let mask = Arc::new(mask);
    info!(
        mask = %job.mask_path.display(),
        valid = mask.valid_count(),
        groups = mask.subsets().len(),
        mode = %job.mode,
        inputs = job.inputs.len(),
        "Loaded mask"
    );

    let pool = WorkerPool::new(job.threads)?;
    let outcomes: Vec<(PathBuf, Result<(), RasterError>)> = pool.install(|| {
        job.inputs
            .par_iter()
            .map(|input| {
                let outcome = mask_input(&mask, input, job.mode);
                (input.input.clone(), outcome)
            })
            .collect()
    });

    let mut report = JobReport::default();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(()) => report.succeeded.push(path),
            Err(e) => {
                warn!(input = %path.display(), error = %e, "Masking failed");
                report.failed.push((path, e.to_string()));
            }
        }
    }

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        threads = pool.threads(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Mask job finished"
    );
    Ok(report)
}

fn mask_input(mask: &Arc<MaskRaster>, input: &MaskInput, mode: SubsetMode) -> Result<(), RasterError> {
    let options = RasterOptions::new()
        .with_mask(Arc::clone(mask))
        .with_mask_extent(true)
        .with_positions(false)
        .with_default_value(input.default_value)
        .with_out_type(input.out_type);
    let raster = Raster::<f64>::open(&input.input, &options)?;
    debug!(input = %input.input.display(), rows = raster.rows(), cols = raster.cols(), "Masked input");

    match mode {
        SubsetMode::Single => raster.output_to_file(&input.output),
        SubsetMode::Multiple => {
            let tiles = raster.output_subsets_to_file(&input.output)?;
            debug!(input = %input.input.display(), tiles, "Wrote subset tiles");
            Ok(())
        }
    }
}
