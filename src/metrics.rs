/**
This module computes the span-level metrics (precision, recall, f-score, support) of a prediction
run against the gold sequences, and averages them across runs.
*/
use crate::entity::get_entities_lenient;
use crate::reporter::{Metric, ScoreTable};
use ahash::AHashSet;
use enum_iterator::all;
use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error;

/// Name of the column holding the micro average over every entity type.
pub const OVERALL: &str = "overall";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
/// How do we handle cases with a division by zero? Do we replace the result by 1, return an
/// error, or replace the division result with 0? SeqEval uses by default the `ReplaceBy0`
/// strategy. `ReturnError` stops the computation; it can be useful if you believe there should
/// be no 0 in the denominator.
pub enum DivByZeroStrat {
    /// Returns 1 when the denominator is 0
    ReplaceBy1,
    /// Returns an error
    ReturnError,
    /// Returns 0 when the denominator is 0
    #[default]
    ReplaceBy0,
}

#[derive(Debug, Error)]
#[error("could not parse `{0}` into a division by zero strategy (expected 0, 1 or error)")]
pub struct ParsingDivisionByZeroStrategyError(String);

impl FromStr for DivByZeroStrat {
    type Err = ParsingDivisionByZeroStrategyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "0" | "zero" | "replaceby0" => Ok(DivByZeroStrat::ReplaceBy0),
            "1" | "one" | "replaceby1" => Ok(DivByZeroStrat::ReplaceBy1),
            "error" | "returnerror" => Ok(DivByZeroStrat::ReturnError),
            _ => Err(ParsingDivisionByZeroStrategyError(String::from(s))),
        }
    }
}

impl Display for DivByZeroStrat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReplaceBy0 => "0",
            Self::ReplaceBy1 => "1",
            Self::ReturnError => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
/// Enum error encompassing the failures that could happen when computing the precison, recall,
/// f-score and the support.
pub enum ComputationError {
    #[error("received an empty tag")]
    EmptyTag,
    #[error("received an empty input: {0}")]
    EmptyInput(&'static str),
    #[error("expected {expected} sequences, found {found}")]
    InconsistentSequenceCount { expected: usize, found: usize },
    #[error("example {example} has {expected} gold tags but {found} predicted tags")]
    InconsistentLength {
        example: usize,
        expected: usize,
        found: usize,
    },
    #[error("encountered division by zero")]
    DivisionByZero,
}

/// Divides `numerator` by `denominator` element-wise. Zero denominators follow `zero_division`
/// and never produce NaN.
fn prf_divide(
    numerator: &Array1<f32>,
    denominator: &Array1<f32>,
    zero_division: DivByZeroStrat,
) -> Result<Array1<f32>, ComputationError> {
    let replacement = match zero_division {
        DivByZeroStrat::ReturnError if denominator.iter().any(|d| *d == 0.0) => {
            return Err(ComputationError::DivisionByZero)
        }
        DivByZeroStrat::ReplaceBy1 => 1.0,
        _ => 0.0,
    };
    Ok(Zip::from(numerator)
        .and(denominator)
        .map_collect(|&n, &d| if d == 0.0 { replacement } else { n / d }))
}

/// F1 of each pair of precision and recall. A null sum gives 0.
fn f1_score(precision: &Array1<f32>, recall: &Array1<f32>) -> Array1<f32> {
    Zip::from(precision).and(recall).map_collect(|&p, &r| {
        let denom = p + r;
        if denom == 0.0 {
            0.0
        } else {
            2.0 * p * r / denom
        }
    })
}

fn check_for_empty_slices<T>(gold: &[T], predicted: &[T]) -> Result<(), ComputationError> {
    if gold.is_empty() {
        return Err(ComputationError::EmptyInput("gold"));
    };
    if predicted.is_empty() {
        return Err(ComputationError::EmptyInput("predictions"));
    };
    Ok(())
}

/// Checks that `predicted` has one sequence per gold sequence, each of the same length.
pub(crate) fn check_consistent_length<S, T>(
    gold: &[Vec<S>],
    predicted: &[Vec<T>],
) -> Result<(), ComputationError> {
    if gold.len() != predicted.len() {
        return Err(ComputationError::InconsistentSequenceCount {
            expected: gold.len(),
            found: predicted.len(),
        });
    }
    for (example, (g, p)) in gold.iter().zip(predicted).enumerate() {
        if g.len() != p.len() {
            return Err(ComputationError::InconsistentLength {
                example,
                expected: g.len(),
                found: p.len(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Metrics of a single class in a single run.
pub struct ClassScore {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    /// Number of gold entities of this class.
    pub support: usize,
}

impl ClassScore {
    pub fn get(&self, metric: Metric) -> f32 {
        match metric {
            Metric::Precision => self.precision,
            Metric::Recall => self.recall,
            Metric::F1 => self.f1,
        }
    }
}

/// Per-class metrics of one run, keyed by entity type. The `overall` key holds the micro average.
pub type RunScores = BTreeMap<String, ClassScore>;

/// Computes the precision, recall, f-score and support of every entity type found in `gold` or
/// `predicted`, plus their micro average under the `overall` key. Entities are matched exactly:
/// same boundaries and same type.
///
/// * `gold`: Gold tag sequences
/// * `predicted`: Predicted tag sequences, aligned with `gold`
/// * `zero_division`: What to do in case of division by zero.
/// * `suffix`: Is the prefix (e.g. 'I', 'B') located at the end of the tags?
pub fn score_run<S: AsRef<str>>(
    gold: &[Vec<S>],
    predicted: &[Vec<S>],
    zero_division: DivByZeroStrat,
    suffix: bool,
) -> Result<RunScores, ComputationError> {
    check_for_empty_slices(gold, predicted)?;
    check_consistent_length(gold, predicted)?;
    let entities_true = get_entities_lenient(gold, suffix)?.spans_by_tag();
    let entities_pred = get_entities_lenient(predicted, suffix)?.spans_by_tag();

    let target_names: BTreeSet<&str> = entities_true
        .keys()
        .chain(entities_pred.keys())
        .copied()
        .collect();
    let empty = AHashSet::default();
    let mut tp_sum = Vec::with_capacity(target_names.len());
    let mut pred_sum = Vec::with_capacity(target_names.len());
    let mut true_sum = Vec::with_capacity(target_names.len());
    for name in target_names.iter() {
        let true_spans = entities_true.get(name).unwrap_or(&empty);
        let pred_spans = entities_pred.get(name).unwrap_or(&empty);
        tp_sum.push(true_spans.intersection(pred_spans).count());
        pred_sum.push(pred_spans.len());
        true_sum.push(true_spans.len());
    }
    let tp_sum = Array1::from(tp_sum);
    let pred_sum = Array1::from(pred_sum);
    let true_sum = Array1::from(true_sum);

    let per_class = prf_arrays(&tp_sum, &pred_sum, &true_sum, zero_division)?;
    let micro = prf_arrays(
        &Array1::from(vec![tp_sum.sum()]),
        &Array1::from(vec![pred_sum.sum()]),
        &Array1::from(vec![true_sum.sum()]),
        zero_division,
    )?;

    let mut scores: RunScores = target_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), per_class.class(i)))
        .collect();
    scores.insert(String::from(OVERALL), micro.class(0));
    Ok(scores)
}

/// Precision, recall, f-score and support arrays, one entry per class.
struct PrecisionRecallFScoreTrueSum {
    precision: Array1<f32>,
    recall: Array1<f32>,
    f1: Array1<f32>,
    support: Array1<usize>,
}

impl PrecisionRecallFScoreTrueSum {
    fn class(&self, i: usize) -> ClassScore {
        ClassScore {
            precision: self.precision[i],
            recall: self.recall[i],
            f1: self.f1[i],
            support: self.support[i],
        }
    }
}

fn prf_arrays(
    tp_sum: &Array1<usize>,
    pred_sum: &Array1<usize>,
    true_sum: &Array1<usize>,
    zero_division: DivByZeroStrat,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError> {
    let tp = tp_sum.mapv(|x| x as f32);
    let precision = prf_divide(&tp, &pred_sum.mapv(|x| x as f32), zero_division)?;
    let recall = prf_divide(&tp, &true_sum.mapv(|x| x as f32), zero_division)?;
    let f1 = f1_score(&precision, &recall);
    Ok(PrecisionRecallFScoreTrueSum {
        precision,
        recall,
        f1,
        support: true_sum.clone(),
    })
}

/// Averages the metrics of every run. Each run weighs the same, whatever its number of examples.
/// A class missing from a run (e.g. a type only some runs predicted) is averaged over the runs
/// where it appears.
pub fn average_runs<'a, I>(runs: I) -> Result<ScoreTable, ComputationError>
where
    I: IntoIterator<Item = &'a RunScores>,
{
    let mut collected: BTreeMap<(Metric, &str), Vec<f32>> = BTreeMap::new();
    let mut run_count = 0;
    for run in runs {
        run_count += 1;
        for (tag, score) in run.iter() {
            for metric in all::<Metric>() {
                collected
                    .entry((metric, tag.as_str()))
                    .or_default()
                    .push(score.get(metric));
            }
        }
    }
    if run_count == 0 {
        return Err(ComputationError::EmptyInput("runs"));
    }
    let mut table = ScoreTable::new();
    for ((metric, tag), values) in collected {
        // Never empty: an entry is created along with its first value.
        let mean = Array1::from(values).mean().unwrap_or_default();
        table.insert(metric, tag, mean);
    }
    Ok(table)
}
