//! Command line entry point: evaluate prediction runs or prepare gold data.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tagscore::{
    evaluate, prepare_dataset, DivByZeroStrat, EvalConfigBuilder, ReportFormat, TagSet,
    TagVocabulary, DEFAULT_SPLITS,
};
use tracing::{error, info, Level};

/// CLI arguments
#[derive(Parser)]
#[command(name = "tagscore")]
#[command(about = "Span-level evaluation of NER prediction runs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log every step, repeat for more details
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every prediction run of a model and write the averaged report
    Evaluate {
        /// Directory searched recursively for `*predictions.txt` files
        predictions_dir: PathBuf,
        /// Directory holding the `{split}.json` gold files
        gold_dir: PathBuf,
        /// Only runs whose path contains this string are evaluated (empty keeps all)
        model: String,
        /// Only score the tokens whose (token, tag) pair is absent from the train split
        #[arg(long)]
        unseen: bool,
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = ReportFormat::Html)]
        format: ReportFormat,
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(long, default_value = "test")]
        test_split: String,
        #[arg(long, default_value = "train")]
        train_split: String,
        /// Value of a metric whose denominator is zero: 0, 1 or error
        #[arg(long, default_value_t = DivByZeroStrat::ReplaceBy0)]
        zero_division: DivByZeroStrat,
        /// The prefix is at the end of the tags (e.g. `PER-B`)
        #[arg(long)]
        suffix: bool,
    },
    /// Filter a multilingual corpus by language and relabel it to a tag set
    Prepare {
        /// Directory holding the `{split}.json` corpus files
        input_dir: PathBuf,
        #[arg(short, long, default_value = "en")]
        language: String,
        #[arg(short, long, default_value = "data")]
        output_dir: PathBuf,
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = TagSet::A)]
        tag_set: TagSet,
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_SPLITS.map(String::from))]
        splits: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    if let Err(e) = run(cli.command) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Evaluate {
            predictions_dir,
            gold_dir,
            model,
            unseen,
            format,
            output_dir,
            test_split,
            train_split,
            zero_division,
            suffix,
        } => {
            let config = EvalConfigBuilder::new()
                .model_filter(model)
                .unseen_only(unseen)
                .format(format)
                .output_dir(output_dir)
                .test_split(test_split)
                .train_split(train_split)
                .division_by_zero(zero_division)
                .suffix(suffix)
                .build();
            info!("evaluating with\n {}", config);
            let evaluation = evaluate(&predictions_dir, &gold_dir, &config).with_context(|| {
                format!(
                    "failed to evaluate the runs of {} against {}",
                    predictions_dir.display(),
                    gold_dir.display()
                )
            })?;
            let path = evaluation
                .write_report()
                .context("failed to write the report")?;
            println!(
                "Averaged {} runs, report saved to {}",
                evaluation.run_count(),
                path.display()
            );
        }
        Commands::Prepare {
            input_dir,
            language,
            output_dir,
            tag_set,
            splits,
        } => {
            let vocab = TagVocabulary::multinerd();
            let counts = prepare_dataset(
                &input_dir,
                &splits,
                &language,
                tag_set,
                &output_dir,
                &vocab,
            )
            .with_context(|| format!("failed to prepare the corpus of {}", input_dir.display()))?;
            let out = output_dir.join(tag_set.dir_name());
            for (split, count) in counts {
                println!(
                    "{} file is saved to {} with {} examples.",
                    split,
                    out.join(format!("{}.json", split)).display(),
                    count
                );
            }
        }
    }
    Ok(())
}
