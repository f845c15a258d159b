use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about = "Personalized nutrition plans from a recipe corpus", long_about = None)]
pub struct Cli {
    /// Engine configuration JSON; defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute the macro target and assemble a meal plan for a patient
    Plan {
        #[command(flatten)]
        index: IndexArgs,

        /// Patient profile JSON
        #[arg(short, long)]
        profile: PathBuf,
    },
    /// Rank replacement recipes for a single meal
    Alternatives {
        #[command(flatten)]
        index: IndexArgs,

        /// Alternatives request JSON (a search query plus recipe ids to exclude)
        #[arg(short, long)]
        request: PathBuf,
    },
    /// Analyze progress at a control visit and re-plan with the adjusted target
    Control {
        #[command(flatten)]
        index: IndexArgs,

        /// Control visit JSON (baseline profile plus current weight and reports)
        #[arg(long = "visit")]
        visit: PathBuf,
    },
    /// Analyze progress at a control visit without building a plan
    Progress {
        /// Control visit JSON
        #[arg(long = "visit")]
        visit: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Recipe corpus CSV used to build the in-process index
    #[arg(long, required_unless_present_any = ["index_url", "snapshot"])]
    pub corpus: Option<PathBuf>,

    /// Vector index snapshot; loaded when present, written after a corpus build
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Query a remote index instead of building one locally
    #[arg(long)]
    pub index_url: Option<String>,

    #[arg(long, value_enum, default_value_t = EmbedderKind::Model2vec)]
    pub embedder: EmbedderKind,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Static model2vec embeddings (downloads the model on first use)
    Model2vec,
    /// Offline feature hashing
    Hashing,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plan_command() {
        let cli = Cli::try_parse_from([
            "nutri-plan",
            "--json-logs",
            "plan",
            "--corpus",
            "recipes.csv",
            "--embedder",
            "hashing",
            "--profile",
            "patient.json",
        ])
        .unwrap();
        assert!(cli.json_logs);
        match cli.command {
            Command::Plan { index, profile } => {
                assert_eq!(index.embedder, EmbedderKind::Hashing);
                assert_eq!(profile, PathBuf::from("patient.json"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn progress_needs_no_index() {
        let cli = Cli::try_parse_from(["nutri-plan", "progress", "--visit", "visit.json"]).unwrap();
        assert!(matches!(cli.command, Command::Progress { .. }));
        assert!(Cli::try_parse_from(["nutri-plan", "control", "--visit", "visit.json"]).is_err());
    }

    #[test]
    fn index_source_is_required() {
        let parsed = Cli::try_parse_from(["nutri-plan", "alternatives", "--request", "q.json"]);
        assert!(parsed.is_err());
    }
}
