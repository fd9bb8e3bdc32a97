// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`, and all
// their flags. Enum-valued flags (architecture, head, feature
// count, accelerator) are parsed through their FromStr impls.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::{DataOptions, ExperimentConfig, ScatteringOptions, VitOptions};
use crate::data::loader::FieldSpec;
use crate::domain::{
    architecture::{Accelerator, Architecture, HeadKind},
    target_schema::FeatureCount,
};
use crate::ml::scattering::FilterLearningRates;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model, then test it and plot the predictions
    Train(TrainArgs),

    /// Re-test the best checkpoint of a finished run
    Evaluate(EvaluateArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Map file (.npy, [maps, H, W]); repeat once per channel
    #[arg(long = "maps", required = true)]
    pub maps: Vec<PathBuf>,

    /// Normalisation reference per channel, in the same order as --maps
    #[arg(long = "reference")]
    pub references: Vec<PathBuf>,

    /// Skip the log10 transform before normalisation
    #[arg(long)]
    pub linear: bool,

    /// Whitespace-separated parameter table, one row per simulation
    #[arg(long)]
    pub params: PathBuf,

    /// Maps per simulation
    #[arg(long, default_value_t = 1)]
    pub maps_per_sim: usize,

    /// Keep all 8 rotated/flipped copies of the training maps in memory
    #[arg(long)]
    pub materialize_augmentation: bool,

    /// Subtract each map's mean after normalisation
    #[arg(long)]
    pub remove_monopole: bool,

    /// sn, maxvit or cnn
    #[arg(long, default_value = "sn")]
    pub arch: Architecture,

    /// Network outputs: 2 or 6 means, or 4 or 12 with uncertainties
    #[arg(long, default_value = "12")]
    pub features: FeatureCount,

    #[arg(long, default_value_t = 6)]
    pub hidden: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.01)]
    pub weight_decay: f64,

    /// Learning rate for every scattering filter parameter
    #[arg(long, default_value_t = 0.005)]
    pub lr_filters: f64,

    #[arg(long)]
    pub lr_orientation: Option<f64>,

    #[arg(long)]
    pub lr_frequency: Option<f64>,

    #[arg(long)]
    pub lr_scale: Option<f64>,

    #[arg(long)]
    pub lr_slant: Option<f64>,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 200)]
    pub epochs: usize,

    /// Data-loading workers
    #[arg(long, default_value_t = 10)]
    pub num_workers: usize,

    /// Seeds every random draw of the run
    #[arg(long, default_value_t = 123)]
    pub seed: u64,

    /// Scattering order (1 or 2)
    #[arg(long, default_value_t = 2)]
    pub order: usize,

    /// Scattering scales J
    #[arg(long, default_value_t = 2)]
    pub scales: usize,

    /// Scattering orientations L
    #[arg(long, default_value_t = 4)]
    pub orientations: usize,

    /// Keep the initial Morlet filter bank fixed
    #[arg(long)]
    pub fixed_filters: bool,

    /// Head on top of the scattering coefficients: cnn, mlp or linear
    #[arg(long, default_value = "cnn")]
    pub head: HeadKind,

    #[arg(long, default_value_t = 4)]
    pub patch_size: usize,

    #[arg(long, default_value_t = 64)]
    pub d_model: usize,

    #[arg(long, default_value_t = 4)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 4)]
    pub num_layers: usize,

    /// Checkpoint, config and metrics directory
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    #[arg(long, default_value = "plots")]
    pub plot_dir: PathBuf,

    /// wgpu or cpu
    #[arg(long, default_value = "wgpu")]
    pub accelerator: Accelerator,
}

/// Convert CLI TrainArgs into the application-layer ExperimentConfig.
/// The application layer never sees clap types.
impl TryFrom<TrainArgs> for ExperimentConfig {
    type Error = anyhow::Error;

    fn try_from(a: TrainArgs) -> Result<Self> {
        if !a.references.is_empty() && a.references.len() != a.maps.len() {
            bail!(
                "{} --reference files given for {} --maps files",
                a.references.len(), a.maps.len()
            );
        }

        let log10 = !a.linear;
        let fields = a
            .maps
            .iter()
            .enumerate()
            .map(|(i, maps)| FieldSpec {
                maps:      maps.clone(),
                reference: a.references.get(i).cloned(),
                log10,
            })
            .collect();

        let filter_lr = FilterLearningRates {
            orientation: a.lr_orientation.unwrap_or(a.lr_filters),
            frequency:   a.lr_frequency.unwrap_or(a.lr_filters),
            scale:       a.lr_scale.unwrap_or(a.lr_filters),
            slant:       a.lr_slant.unwrap_or(a.lr_filters),
        };

        let cfg = ExperimentConfig {
            architecture: a.arch,
            features:     a.features,
            hidden:       a.hidden,
            dropout:      a.dropout,
            lr:           a.lr,
            weight_decay: a.weight_decay,
            filter_lr,
            batch_size:   a.batch_size,
            epochs:       a.epochs,
            num_workers:  a.num_workers,
            seed:         a.seed,
            scattering: ScatteringOptions {
                order:        a.order,
                scales:       a.scales,
                orientations: a.orientations,
                learnable:    !a.fixed_filters,
                head:         a.head,
            },
            vit: VitOptions {
                patch_size: a.patch_size,
                d_model:    a.d_model,
                num_heads:  a.num_heads,
                num_layers: a.num_layers,
            },
            data: DataOptions {
                fields,
                params_path:              a.params,
                maps_per_sim:             a.maps_per_sim,
                materialize_augmentation: a.materialize_augmentation,
                keep_monopole:            !a.remove_monopole,
            },
            checkpoint_dir: a.checkpoint_dir,
            plot_dir:       a.plot_dir,
            accelerator:    a.accelerator,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// All arguments for the `evaluate` command.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory of a finished `train` run
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Override the accelerator saved with the run
    #[arg(long)]
    pub accelerator: Option<Accelerator>,

    /// Override the plot directory saved with the run
    #[arg(long)]
    pub plot_dir: Option<PathBuf>,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn train_args(extra: &[&str]) -> TrainArgs {
        let mut argv = vec!["cosmo-infer", "train", "--maps", "a.npy", "--params", "p.txt"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Train(args) => args,
            other => panic!("expected train, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_build_a_valid_config() {
        let cfg = ExperimentConfig::try_from(train_args(&[])).unwrap();
        assert_eq!(cfg.architecture, Architecture::Scattering);
        assert_eq!(cfg.features, FeatureCount::Twelve);
        assert_eq!(cfg.scattering.head, HeadKind::Cnn);
        assert!(cfg.scattering.learnable);
        assert!(cfg.data.keep_monopole);
        assert_eq!(cfg.filter_lr, FilterLearningRates::uniform(0.005));
        assert!(cfg.data.fields[0].log10);
        assert_eq!(cfg.seed, 123);
    }

    #[test]
    fn test_flags_reach_the_config() {
        let cfg = ExperimentConfig::try_from(train_args(&[
            "--maps", "b.npy",
            "--arch", "maxvit",
            "--features", "4",
            "--lr-slant", "0.1",
            "--fixed-filters",
            "--linear",
            "--remove-monopole",
            "--accelerator", "cpu",
        ]))
        .unwrap();
        assert_eq!(cfg.data.fields.len(), 2);
        assert!(!cfg.data.fields[1].log10);
        assert_eq!(cfg.architecture, Architecture::Vit);
        assert_eq!(cfg.features, FeatureCount::Four);
        assert_eq!(cfg.filter_lr.slant, 0.1);
        assert_eq!(cfg.filter_lr.scale, 0.005);
        assert!(!cfg.scattering.learnable);
        assert!(!cfg.data.keep_monopole);
        assert_eq!(cfg.accelerator, Accelerator::Cpu);
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let argv = ["cosmo-infer", "train", "--maps", "a.npy", "--params", "p.txt", "--features", "5"];
        assert!(Cli::try_parse_from(argv).is_err());

        let args = train_args(&["--reference", "r1.npy", "--reference", "r2.npy"]);
        assert!(ExperimentConfig::try_from(args).is_err());

        let args = train_args(&["--order", "3"]);
        assert!(ExperimentConfig::try_from(args).is_err());
    }

    #[test]
    fn test_evaluate_overrides_are_optional() {
        let cli = Cli::try_parse_from(["cosmo-infer", "evaluate", "--accelerator", "cpu"]).unwrap();
        match cli.command {
            Commands::Evaluate(args) => {
                assert_eq!(args.accelerator, Some(Accelerator::Cpu));
                assert!(args.plot_dir.is_none());
                assert_eq!(args.checkpoint_dir, PathBuf::from("checkpoints"));
            }
            other => panic!("expected evaluate, got {other:?}"),
        }
    }
}
