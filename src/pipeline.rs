/**
End to end evaluation: read the gold split and the prediction runs, optionally keep the unseen
tokens only, score every run and average the scores.
*/
use crate::config::EvalConfig;
use crate::data::{read_gold_split, read_predictions, PredictionRuns};
use crate::error::{EvalError, Result};
use crate::metrics::{average_runs, score_run, RunScores};
use crate::reporter::{report_file_name, ScoreTable};
use crate::unseen::filter_unseen;
use crate::vocab::TagVocabulary;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Averaged scores of an evaluation, along with what is needed to name and write its report.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub table: ScoreTable,
    /// Scores of each run, keyed by run id.
    pub runs: Vec<(String, RunScores)>,
    pub config: EvalConfig,
}

impl Evaluation {
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn report_file_name(&self) -> String {
        report_file_name(
            &self.config.test_split,
            &self.config.model_filter,
            self.run_count(),
            self.config.unseen_only,
            self.config.format,
        )
    }

    pub fn report_path(&self) -> PathBuf {
        self.config.output_dir.join(self.report_file_name())
    }

    /// Writes the report in the configured format and directory, creating the directory if
    /// needed. Returns the path of the report.
    pub fn write_report(&self) -> Result<PathBuf> {
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir).map_err(|e| EvalError::io(dir, e))?;
        let path = self.report_path();
        self.table.write_report(self.config.format, &path)?;
        info!(path = %path.display(), format = %self.config.format, "wrote report");
        Ok(path)
    }
}

/// Evaluates every prediction run found under `predictions_dir` against the gold split
/// `{gold_dir}/{test_split}.json`. In unseen mode, `{gold_dir}/{train_split}.json` is read too.
pub fn evaluate<P: AsRef<Path>, Q: AsRef<Path>>(
    predictions_dir: P,
    gold_dir: Q,
    config: &EvalConfig,
) -> Result<Evaluation> {
    let vocab = TagVocabulary::multinerd();
    let gold_dir = gold_dir.as_ref();
    let test = read_gold_split(split_path(gold_dir, &config.test_split), &vocab)?;
    let runs = read_predictions(predictions_dir, &config.model_filter)?;

    let (gold, runs) = if config.unseen_only {
        let train = read_gold_split(split_path(gold_dir, &config.train_split), &vocab)?;
        filter_unseen(&train, &test, &runs)?
    } else {
        (test.tags, runs)
    };

    let scores = score_runs(&gold, runs, config)?;
    let table = average_runs(scores.iter().map(|(_, s)| s))?;
    info!(
        runs = scores.len(),
        classes = table.tags().len(),
        "averaged the scores of every run"
    );
    Ok(Evaluation {
        table,
        runs: scores,
        config: config.clone(),
    })
}

fn split_path(gold_dir: &Path, split: &str) -> PathBuf {
    gold_dir.join(format!("{}.json", split))
}

fn score_runs(
    gold: &[Vec<String>],
    runs: PredictionRuns,
    config: &EvalConfig,
) -> Result<Vec<(String, RunScores)>> {
    runs.into_iter()
        .map(|(run, predicted)| {
            match score_run(gold, &predicted, config.zero_division, config.suffix) {
                Ok(scores) => {
                    debug!(run = %run, classes = scores.len(), "scored run");
                    Ok((run, scores))
                }
                Err(source) => Err(EvalError::MisalignedRun { run, source }),
            }
        })
        .collect()
}
