// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `classify`, and all
// their flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use crate::application::train_use_case::TrainConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the hierarchical attention classifier on a JSON-lines review file
    Train(TrainArgs),

    /// Classify review texts with a trained checkpoint
    Classify(ClassifyArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON-lines file: {"text", "label", "user"?, "item"?, "fold"?} per line
    pub dataset: String,

    /// Directory for weights, vocabulary, maps and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Fold used as the test set
    #[arg(long, default_value_t = 0)]
    pub fold: usize,

    /// Validation slice taken from the training split (fraction < 1, or a count)
    #[arg(long, default_value_t = 0.0)]
    pub validation: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Word embedding size (ignored with --embeddings)
    #[arg(long, default_value_t = 200)]
    pub embed_size: usize,

    /// GRU hidden size per direction
    #[arg(long, default_value_t = 50)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Data loader worker threads
    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 0.001)]
    pub lr: f64,

    /// Gradient-norm clipping threshold (0 disables)
    #[arg(long, default_value_t = 1.0)]
    pub clip_grad: f64,

    /// Dropout on the embedding lookups
    #[arg(long, default_value_t = 0.5)]
    pub dropout: f64,

    /// Sentences kept per document
    #[arg(long, default_value_t = 16)]
    pub max_sents: usize,

    /// Words kept per sentence
    #[arg(long, default_value_t = 32)]
    pub max_words: usize,

    /// Vocabulary size when built from the corpus
    #[arg(long, default_value_t = 10_000)]
    pub max_feat: usize,

    /// Pretrained word2vec text file
    #[arg(long)]
    pub embeddings: Option<String>,

    /// Checkpoint directory to continue training from
    #[arg(long)]
    pub resume: Option<String>,

    /// Sample classes uniformly in every epoch
    #[arg(long)]
    pub balance: bool,

    /// Save a snapshot of the weights after every epoch
    #[arg(long)]
    pub snapshot: bool,

    /// Memory budget for the largest batch, in MB (0 skips the check)
    #[arg(long, default_value_t = 4096)]
    pub memory_budget_mb: u64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            dataset:          a.dataset,
            checkpoint_dir:   a.checkpoint_dir,
            fold:             a.fold,
            validation:       a.validation,
            seed:             a.seed,
            embed_size:       a.embed_size,
            hidden_size:      a.hidden_size,
            batch_size:       a.batch_size,
            num_workers:      a.num_workers,
            epochs:           a.epochs,
            lr:               a.lr,
            clip_grad:        a.clip_grad,
            dropout:          a.dropout,
            max_sents:        a.max_sents,
            max_words:        a.max_words,
            max_feat:         a.max_feat,
            embeddings:       a.embeddings,
            resume:           a.resume,
            balance:          a.balance,
            snapshot:         a.snapshot,
            memory_budget_mb: a.memory_budget_mb,
        }
    }
}

/// All arguments for the `classify` command
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Texts to classify
    #[arg(required_unless_present = "input")]
    pub texts: Vec<String>,

    /// JSON-lines file of reviews to classify instead of positional texts
    #[arg(long)]
    pub input: Option<String>,

    /// Directory written by `train`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Print per-sentence attention weights
    #[arg(long)]
    pub attention: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["han", "train", "data/reviews.jsonl"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert_eq!(TrainConfig::from(args), TrainConfig::default());
    }

    #[test]
    fn test_classify_needs_texts_or_input() {
        assert!(Cli::try_parse_from(["han", "classify"]).is_err());
        assert!(Cli::try_parse_from(["han", "classify", "--input", "x.jsonl"]).is_ok());
        assert!(Cli::try_parse_from(["han", "classify", "Great phone."]).is_ok());
    }
}
