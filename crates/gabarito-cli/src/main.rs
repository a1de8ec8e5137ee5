//! gabarito CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "gabarito", version, about = "Shuffled exam variants and variant-aware grading")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and example exam
    Init,

    /// Validate exam TOML files
    Validate {
        /// Path to exam file or directory
        #[arg(long, default_value = "exams")]
        exams: PathBuf,
    },

    /// Generate a new variant set for an exam
    Generate {
        /// Path to exam file or directory
        #[arg(long, default_value = "exams")]
        exams: PathBuf,

        /// Exam id
        #[arg(long)]
        exam: u64,

        /// Recorded as the creator of the set
        #[arg(long)]
        by: Option<String>,

        /// Make the new set official
        #[arg(long)]
        official: bool,
    },

    /// List the variant sets of an exam, newest first
    History {
        /// Exam id
        #[arg(long)]
        exam: u64,
    },

    /// Designate the official variant set of an exam
    SetOfficial {
        /// Exam id
        #[arg(long)]
        exam: u64,

        /// Variant set id or short code
        #[arg(long)]
        set: String,
    },

    /// Delete a variant set that was never used for grading
    Delete {
        /// Exam id
        #[arg(long)]
        exam: u64,

        /// Variant set id or short code
        #[arg(long)]
        set: String,
    },

    /// Show which question sits at a position of a variant
    Resolve {
        /// Exam id
        #[arg(long)]
        exam: u64,

        /// Variant set id or short code (default: official)
        #[arg(long)]
        set: Option<String>,

        /// Variant, e.g. "2" or "versao2"
        #[arg(long)]
        variant: String,

        /// 1-based position on the answer sheet
        #[arg(long)]
        position: String,
    },

    /// Grade submissions from a JSON file
    Grade {
        /// Path to exam file or directory
        #[arg(long, default_value = "exams")]
        exams: PathBuf,

        /// JSON file with one submission or an array of them
        #[arg(long)]
        submissions: PathBuf,

        /// Append graded results to this JSON-lines file
        #[arg(long)]
        record: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Compare the answer keys of two variant sets
    Compare {
        /// Exam id
        #[arg(long)]
        exam: u64,

        /// Baseline variant set id or short code
        #[arg(long)]
        a: String,

        /// Other variant set id or short code
        #[arg(long)]
        b: String,

        /// Variant to compare (default: all)
        #[arg(long)]
        variant: Option<u32>,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Class report from recorded results
    Report {
        /// Results file (JSON array or JSON lines)
        #[arg(long)]
        results: PathBuf,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gabarito=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { exams } => commands::validate::execute(exams, config),
        Commands::Generate {
            exams,
            exam,
            by,
            official,
        } => commands::generate::execute(exams, exam, by, official, config),
        Commands::History { exam } => commands::history::execute(exam, config),
        Commands::SetOfficial { exam, set } => commands::official::execute(exam, set, config),
        Commands::Delete { exam, set } => commands::delete::execute(exam, set, config),
        Commands::Resolve {
            exam,
            set,
            variant,
            position,
        } => commands::resolve::execute(exam, set, variant, position, config),
        Commands::Grade {
            exams,
            submissions,
            record,
            format,
        } => commands::grade::execute(exams, submissions, record, format, config).await,
        Commands::Compare {
            exam,
            a,
            b,
            variant,
            format,
        } => commands::compare::execute(exam, a, b, variant, format, config),
        Commands::Report { results, format } => commands::report::execute(results, format),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
