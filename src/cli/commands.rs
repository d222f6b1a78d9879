// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `generate`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{builder::RangedU64ValueParser, Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train encoder + decoder on a reports CSV, then evaluate
    Train(TrainArgs),

    /// Write a report for one X-ray using a trained output directory
    Generate(GenerateArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Reports CSV: [index,] uid, problems, findings, impression
    #[arg(long, default_value = "xray-dataset/cleaned_reports.csv")]
    pub csv: String,

    /// Directory holding <uid>.png|jpg images
    #[arg(long, default_value = "xray-dataset/images")]
    pub image_dir: String,

    /// Where checkpoints, vocabulary, history and scores are written
    #[arg(long, default_value = "./saved_exp/baseline_model/")]
    pub outdir: String,

    #[arg(long, default_value_t = 4, value_parser = positive())]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Encoder weights (.mpk.gz record) to start from
    #[arg(long)]
    pub pretrained: Option<String>,

    /// Skip training and evaluate the weights already in --outdir
    #[arg(long)]
    pub test: bool,

    /// Images are resized and centre-cropped to this square side
    #[arg(long, default_value_t = 256, value_parser = positive())]
    pub image_size: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Size of the image feature vector and of the word embeddings
    #[arg(long, default_value_t = 128)]
    pub embed_size: usize,

    /// LSTM hidden size
    #[arg(long, default_value_t = 128)]
    pub hidden_size: usize,

    /// Number of stacked LSTM layers
    #[arg(long, default_value_t = 3)]
    pub num_layers: usize,

    /// Channels of the first residual stage
    #[arg(long, default_value_t = 32)]
    pub base_channels: usize,

    /// Words seen fewer times in training impressions map to <unk>
    #[arg(long, default_value_t = 1)]
    pub min_word_freq: usize,

    /// Background workers loading images (0 = load on the main thread)
    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,

    /// Seed for the data split and shuffling
    #[arg(long, default_value_t = 1337)]
    pub seed: u64,

    /// Probability at which a class counts as predicted
    #[arg(long, default_value_t = 0.1)]
    pub threshold: f32,

    /// Longest caption produced during evaluation
    #[arg(long, default_value_t = 40)]
    pub max_decode_len: usize,

    /// Clip the global gradient norm to this value
    #[arg(long)]
    pub max_grad_norm: Option<f32>,

    /// Disable dynamic loss scaling
    #[arg(long)]
    pub no_loss_scaling: bool,
}

/// Accepts integers >= 1.
fn positive() -> RangedU64ValueParser<usize> {
    RangedU64ValueParser::<usize>::new().range(1..)
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            csv_path:       a.csv,
            image_dir:      a.image_dir,
            outdir:         a.outdir,
            pretrained:     a.pretrained,
            test_only:      a.test,
            batch_size:     a.batch_size,
            epochs:         a.epochs,
            lr:             a.lr,
            image_size:     a.image_size,
            embed_size:     a.embed_size,
            hidden_size:    a.hidden_size,
            num_layers:     a.num_layers,
            base_channels:  a.base_channels,
            min_word_freq:  a.min_word_freq,
            num_workers:    a.num_workers,
            seed:           a.seed,
            threshold:      a.threshold,
            max_decode_len: a.max_decode_len,
            max_grad_norm:  a.max_grad_norm,
            loss_scaling:   !a.no_loss_scaling,
            ..TrainConfig::default()
        }
    }
}

/// All arguments for the `generate` command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// X-ray image to describe
    #[arg(long)]
    pub image: PathBuf,

    /// Output directory of a finished `train` run
    #[arg(long, default_value = "./saved_exp/baseline_model/")]
    pub outdir: String,

    #[arg(long, default_value_t = 0.1)]
    pub threshold: f32,

    /// 0 decodes greedily; higher values sample more freely
    #[arg(long, default_value_t = 0.0)]
    pub temperature: f32,

    #[arg(long, default_value_t = 1337)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults() {
        let cli = Cli::try_parse_from(["xray-report-gen", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.batch_size, 4);
        assert_eq!(cfg.epochs, 10);
        assert_eq!(cfg.outdir, "./saved_exp/baseline_model/");
        assert!(cfg.loss_scaling);
        assert!(!cfg.test_only);
        assert!(cfg.pretrained.is_none());
    }

    #[test]
    fn test_train_flags() {
        let cli = Cli::try_parse_from([
            "xray-report-gen", "train",
            "--batch-size", "8", "--epochs", "2", "--test",
            "--pretrained", "enc.mpk.gz", "--no-loss-scaling",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!((cfg.batch_size, cfg.epochs), (8, 2));
        assert!(cfg.test_only);
        assert!(!cfg.loss_scaling);
        assert_eq!(cfg.pretrained.as_deref(), Some("enc.mpk.gz"));
    }

    #[test]
    fn test_zero_batch_or_image_size_is_rejected() {
        assert!(Cli::try_parse_from(["xray-report-gen", "train", "--batch-size", "0"]).is_err());
        assert!(Cli::try_parse_from(["xray-report-gen", "train", "--image-size", "0"]).is_err());
        assert!(Cli::try_parse_from(["xray-report-gen", "train", "--image-size", "1"]).is_ok());
    }

    #[test]
    fn test_generate_requires_image() {
        assert!(Cli::try_parse_from(["xray-report-gen", "generate"]).is_err());
        let cli = Cli::try_parse_from(["xray-report-gen", "generate", "--image", "a.png"]).unwrap();
        let Commands::Generate(args) = cli.command else { panic!("expected generate") };
        assert_eq!(args.temperature, 0.0);
    }
}
