//! Per-volume SBI and registration stages, and the batch modes built from them.
//!
//! Each stage is wrapped so that any error ends up as a failed [`VolumeOutcome`] in
//! the returned [`BatchReport`]; sibling volumes and series keep going.

use crate::algorithms::{FeatureExtractor, RigidAligner, RigidTransform2D};
use crate::config::Config;
use crate::data::{SbiPointSet, VolumeLoader, VolumeSaver, VolumeStack, VolumeTransformer};
use crate::logging::{new_correlation_id, StageSpan};
use crate::pipeline::{
    find_series_roots, find_series_volumes, BatchReport, Stage, VolumePaths, VolumeOutcome,
    VolumeStatus,
};
use crate::SbiError;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Result of a stage that did not fail.
enum StageResult {
    Done {
        output: PathBuf,
        transform: Option<RigidTransform2D>,
        /// Size of the point set the stage extracted or registered
        points: usize,
    },
    Skip(String),
}

/// Everything needed to turn volume directories into SBI artifacts and registered volumes.
#[derive(Debug, Clone)]
pub struct RegistrationPipeline {
    config: Config,
    loader: VolumeLoader,
    extractor: FeatureExtractor,
    transformer: VolumeTransformer,
    saver: VolumeSaver,
}

impl RegistrationPipeline {
    pub fn new(config: Config) -> Self {
        Self {
            loader: VolumeLoader::new(&config.volume),
            extractor: FeatureExtractor::from_config(&config),
            transformer: VolumeTransformer::from_config(&config),
            saver: VolumeSaver::new(config.volume.output_extension.clone()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn loader(&self) -> &VolumeLoader {
        &self.loader
    }

    pub fn paths(&self, volume: &Path) -> VolumePaths {
        VolumePaths::new(volume, self.config.policy.path_convention)
    }

    /// Extract and persist the SBI point set of `volume`.
    fn build_sbi(&self, volume: &VolumeStack, paths: &VolumePaths) -> crate::Result<SbiPointSet> {
        let points = self.extractor.build(volume)?;
        points.save(&paths.sbi_artifact)?;
        Ok(points)
    }

    /// Point set of `volume_dir`, from its artifact or freshly extracted.
    ///
    /// `loaded` is reused when the volume has already been read.
    fn point_set(&self, paths: &VolumePaths, loaded: Option<&VolumeStack>) -> crate::Result<SbiPointSet> {
        if paths.sbi_artifact.is_file() {
            return SbiPointSet::load(&paths.sbi_artifact);
        }
        match loaded {
            Some(volume) => self.build_sbi(volume, paths),
            None => {
                let volume = self.loader.load(&paths.volume)?;
                self.build_sbi(&volume, paths)
            }
        }
    }

    /// Estimate the transform taking `source` onto `target`.
    pub fn estimate(&self, source: &SbiPointSet, target: &SbiPointSet) -> crate::Result<RigidTransform2D> {
        let aligner = RigidAligner::new(source, target, self.config.icp)?;
        let registration = aligner.registration();
        info!(
            fitness = registration.fitness,
            inlier_rmse = registration.inlier_rmse,
            iterations = registration.iterations,
            "ICP registration estimated"
        );
        Ok(aligner.transform())
    }

    /// Register an in-memory volume given both point sets.
    pub fn register_volume(
        &self,
        volume: VolumeStack,
        source: &SbiPointSet,
        target: &SbiPointSet,
    ) -> crate::Result<(VolumeStack, RigidTransform2D)> {
        let transform = self.estimate(source, target)?;
        let registered = self.transformer.apply(volume, &transform)?;
        Ok((registered, transform))
    }

    fn try_sbi(&self, volume_dir: &Path) -> anyhow::Result<StageResult> {
        let paths = self.paths(volume_dir);
        if paths.sbi_artifact.is_file() {
            info!("[skip] SBI point cloud data already exists: {}", paths.sbi_artifact.display());
            return Ok(StageResult::Skip("SBI point cloud data already exists".to_string()));
        }

        let volume = self.loader.load(volume_dir)?;
        let points = self.build_sbi(&volume, &paths)?;
        Ok(StageResult::Done {
            output: paths.sbi_artifact,
            transform: None,
            points: points.len(),
        })
    }

    fn try_register(&self, source_dir: &Path, target_dir: &Path) -> anyhow::Result<StageResult> {
        let paths = self.paths(source_dir);
        if paths.registered_volume.exists() {
            info!(
                "[skip] registrated volume already constructed: {}",
                paths.registered_volume.display()
            );
            return Ok(StageResult::Skip("registered volume already exists".to_string()));
        }
        if source_dir == target_dir {
            info!("[skip] reference volume is not registered: {}", source_dir.display());
            return Ok(StageResult::Skip("reference volume of the series".to_string()));
        }

        let volume = self.loader.load(source_dir)?;
        let source = self.point_set(&paths, Some(&volume))?;
        let target = self.point_set(&self.paths(target_dir), None)?;

        let (registered, transform) = self.register_volume(volume, &source, &target)?;
        self.saver.save(&registered, &paths.registered_volume)?;
        Ok(StageResult::Done {
            output: paths.registered_volume,
            transform: Some(transform),
            points: source.len(),
        })
    }

    fn run_stage<F>(&self, stage: Stage, volume: &Path, run: F) -> VolumeOutcome
    where
        F: FnOnce() -> anyhow::Result<StageResult>,
    {
        let span = StageSpan::new(stage.as_str(), volume, None);
        let _enter = span.enter();

        let outcome = match run() {
            Ok(StageResult::Done {
                output,
                transform,
                points,
            }) => {
                span.record_points(points);
                let outcome = VolumeOutcome::new(volume, stage, VolumeStatus::Completed { output });
                match transform {
                    Some(t) => outcome.with_transform(t),
                    None => outcome,
                }
            }
            Ok(StageResult::Skip(reason)) => VolumeOutcome::new(volume, stage, VolumeStatus::Skipped { reason }),
            Err(e) => {
                let input_error = e.downcast_ref::<SbiError>().is_some_and(SbiError::is_input_error);
                error!(volume = %volume.display(), stage = stage.as_str(), input_error, "{:#}", e);
                VolumeOutcome::new(
                    volume,
                    stage,
                    VolumeStatus::Failed {
                        error: format!("{:#}", e),
                    },
                )
            }
        };

        span.record_completion(!outcome.is_failed());
        outcome
    }

    /// Build the SBI artifact of one volume unless it already exists.
    pub fn make_sbi(&self, volume_dir: &Path) -> VolumeOutcome {
        self.run_stage(Stage::Sbi, volume_dir, || self.try_sbi(volume_dir))
    }

    /// Register `source_dir` onto `target_dir` unless the output already exists.
    pub fn make_registered_volume(&self, source_dir: &Path, target_dir: &Path) -> VolumeOutcome {
        self.run_stage(Stage::Registration, source_dir, || {
            self.try_register(source_dir, target_dir)
        })
    }

    pub fn run_single_sbi(&self, volume_dir: &Path) -> BatchReport {
        new_correlation_id();
        let mut report = BatchReport::new();
        report.push(self.make_sbi(volume_dir));
        report
    }

    pub fn run_single_registration(&self, source_dir: &Path, target_dir: &Path) -> BatchReport {
        new_correlation_id();
        let mut report = BatchReport::new();
        report.push(self.make_registered_volume(source_dir, target_dir));
        report
    }

    /// SBI for every volume of the series, then registration onto the first one.
    pub fn run_series(&self, root: &Path, sbi_only: bool) -> BatchReport {
        let correlation_id = new_correlation_id();
        let mut report = BatchReport::new();

        let volumes = match find_series_volumes(root, &self.loader) {
            Ok(volumes) => volumes,
            Err(e) => {
                error!(root = %root.display(), "{:#}", e);
                report.push(VolumeOutcome::new(
                    root,
                    Stage::Discovery,
                    VolumeStatus::Failed {
                        error: format!("{:#}", e),
                    },
                ));
                return report;
            }
        };

        let Some(target) = volumes.first() else {
            warn!(root = %root.display(), "No volumes found in series");
            report.push(VolumeOutcome::new(
                root,
                Stage::Discovery,
                VolumeStatus::Skipped {
                    reason: "no volumes found".to_string(),
                },
            ));
            return report;
        };

        info!(
            root = %root.display(),
            volumes = volumes.len(),
            target = %target.display(),
            correlation_id = %correlation_id,
            "Processing series"
        );

        for volume in &volumes {
            report.push(self.make_sbi(volume));
        }

        if !sbi_only {
            for volume in &volumes {
                report.push(self.make_registered_volume(volume, target));
            }
        }

        report
    }

    /// Every series found below `root`, optionally in parallel.
    pub fn run_recursive(&self, root: &Path, sbi_only: bool) -> BatchReport {
        let mut report = BatchReport::new();

        let roots = match find_series_roots(root, &self.loader) {
            Ok(roots) => roots,
            Err(e) => {
                error!(root = %root.display(), "{:#}", e);
                report.push(VolumeOutcome::new(
                    root,
                    Stage::Discovery,
                    VolumeStatus::Failed {
                        error: format!("{:#}", e),
                    },
                ));
                return report;
            }
        };

        info!(root = %root.display(), series = roots.len(), "Series found");

        let reports: Vec<BatchReport> = if self.config.batch.parallel_series {
            roots
                .par_iter()
                .map(|series| self.run_series(series, sbi_only))
                .collect()
        } else {
            roots
                .iter()
                .map(|series| self.run_series(series, sbi_only))
                .collect()
        };

        for series_report in reports {
            report.merge(series_report);
        }
        report
    }
}
