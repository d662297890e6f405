/*!
Span-level evaluation of named entity recognition runs. Every prediction run of a model is scored
against the gold data with exact-match precision, recall and f-score per entity type, the scores
are averaged across runs, and the averaged table is written as CSV, HTML or Markdown.

The evaluation can be restricted to the tokens whose (token, tag) pair never occurs in the
training split, to measure how a model generalizes to unseen entities.

# Tagging
Tags follow the BIO scheme, e.g. `B-PER`, `I-PER` and `O`. Entities are extracted leniently, the
same way conlleval does: a chunk starts on a `B`, on an `I` following an `O` or on a change of
type, and ends right before the next chunk start or `O`. The tag vocabulary is the one of the
MultiNERD dataset. Gold files may store tags either as names or as indices in this vocabulary.

# Terminology
* A run is one file of predictions, one line of whitespace separated tags per gold example.
* A class is an entity type such as `PER` or `LOC`. The `overall` class holds the micro average
    over every entity type.
* The score table maps a metric and a class to the mean of that metric across runs.
*/

mod config;
mod data;
mod entity;
mod error;
pub mod loss;
mod metrics;
mod pipeline;
mod prepare;
mod reporter;
mod unseen;
mod vocab;

// The public api starts here
pub use config::{EvalConfig, EvalConfigBuilder};

pub use data::{
    read_gold_split, read_predictions, GoldSplit, NerRecord, PredictionRuns, RawTag,
    PREDICTION_SUFFIX,
};

pub use entity::{Entities, Entity};

pub use error::{EvalError, Result};

pub use metrics::{
    average_runs, score_run, ClassScore, ComputationError, DivByZeroStrat, RunScores, OVERALL,
};

pub use pipeline::{evaluate, Evaluation};

pub use prepare::{prepare_dataset, CorpusRecord, TagSet, DEFAULT_SPLITS};

pub use reporter::{
    report_file_name, HtmlTable, MarkdownTable, Metric, ReportFormat, ReportParsingError,
    ScoreTable,
};

pub use unseen::{filter_unseen, SeenPairs};

pub use vocab::{TagSubset, TagVocabulary, MODEL_B_ENTITIES, OUTSIDE};

/// Extracts the entities of `sequences`. Offsets index the sequences flattened one after the
/// other, with a separator position between two sequences.
///
/// #Example
/// ```rust
/// use tagscore::get_entities;
///
/// let sequences = vec![vec!["B-PER", "I-PER", "O"], vec!["B-LOC"]];
/// let entities = get_entities(&sequences, false).unwrap();
/// let spans: Vec<_> = entities.iter().map(|e| e.as_tuple()).collect();
/// assert_eq!(spans, vec![(0, 1, "PER"), (4, 4, "LOC")]);
/// ```
pub fn get_entities<S: AsRef<str>>(
    sequences: &[Vec<S>],
    suffix: bool,
) -> std::result::Result<Entities<'_>, ComputationError> {
    entity::get_entities_lenient(sequences, suffix)
}

/// Scores every run against `gold` and averages the scores.
///
/// #Example
/// ```rust
/// use tagscore::{score_runs, DivByZeroStrat, Metric};
///
/// let gold = vec![vec!["B-PER", "I-PER", "O", "B-LOC"]];
/// let perfect = gold.clone();
/// let partial = vec![vec!["B-PER", "O", "O", "B-LOC"]];
/// let table = score_runs(&gold, &[perfect, partial], DivByZeroStrat::ReplaceBy0, false).unwrap();
/// assert_eq!(table.get(Metric::F1, "LOC"), Some(1.0));
/// assert_eq!(table.get(Metric::F1, "PER"), Some(0.5));
/// ```
pub fn score_runs<S: AsRef<str>>(
    gold: &[Vec<S>],
    runs: &[Vec<Vec<S>>],
    zero_division: DivByZeroStrat,
    suffix: bool,
) -> std::result::Result<ScoreTable, ComputationError> {
    let scores = runs
        .iter()
        .map(|run| score_run(gold, run, zero_division, suffix))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    average_runs(scores.iter())
}
