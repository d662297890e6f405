/**
Restricts an evaluation to the positions whose (token, tag) pair never occurs in the training split.
The same positional mask is applied to the gold tags and to every prediction run, so they stay
aligned example for example.
*/
use crate::data::{GoldSplit, PredictionRuns};
use crate::error::{EvalError, Result};
use crate::metrics::check_consistent_length;
use ahash::AHashSet;
use itertools::Itertools;
use tracing::info;

/// Every (token, tag) pair of a split.
#[derive(Debug, Clone, Default)]
pub struct SeenPairs<'a>(AHashSet<(&'a str, &'a str)>);

impl<'a> SeenPairs<'a> {
    pub fn from_split(split: &'a GoldSplit) -> Self {
        let pairs = split
            .tokens
            .iter()
            .zip(split.tags.iter())
            .flat_map(|(tokens, tags)| tokens.iter().zip(tags))
            .map(|(token, tag)| (token.as_str(), tag.as_str()))
            .collect();
        Self(pairs)
    }

    pub fn contains(&self, token: &str, tag: &str) -> bool {
        self.0.contains(&(token, tag))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` at every position whose pair is unseen.
    pub fn keep_mask<S: AsRef<str>>(&self, tokens: &[S], tags: &[S]) -> Vec<bool> {
        tokens
            .iter()
            .zip(tags)
            .map(|(token, tag)| !self.contains(token.as_ref(), tag.as_ref()))
            .collect()
    }
}

/// Keeps the elements of `seq` where `mask` is `true`.
pub fn apply_mask<T: Clone>(seq: &[T], mask: &[bool]) -> Vec<T> {
    seq.iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(item, _)| item.clone())
        .collect()
}

/// Filters the gold tags of `test` and every run down to the positions unseen in `train`.
/// Examples where every position is filtered out are kept as empty sequences.
pub fn filter_unseen(
    train: &GoldSplit,
    test: &GoldSplit,
    runs: &PredictionRuns,
) -> Result<(Vec<Vec<String>>, PredictionRuns)> {
    for (run, sequences) in runs.iter() {
        check_consistent_length(&test.tags, sequences).map_err(|source| {
            EvalError::MisalignedRun {
                run: run.clone(),
                source,
            }
        })?;
    }
    let seen = SeenPairs::from_split(train);
    let masks: Vec<Vec<bool>> = test
        .tokens
        .iter()
        .zip_eq(&test.tags)
        .map(|(tokens, tags)| seen.keep_mask(tokens, tags))
        .collect();

    let gold = test
        .tags
        .iter()
        .zip_eq(&masks)
        .map(|(tags, mask)| apply_mask(tags, mask))
        .collect::<Vec<_>>();
    let filtered_runs = runs
        .iter()
        .map(|(run, sequences)| {
            let filtered = sequences
                .iter()
                .zip_eq(&masks)
                .map(|(seq, mask)| apply_mask(seq, mask))
                .collect();
            (run.clone(), filtered)
        })
        .collect();

    let total: usize = masks.iter().map(Vec::len).sum();
    let kept: usize = masks.iter().flatten().filter(|k| **k).count();
    info!(
        seen_pairs = seen.len(),
        kept,
        total,
        "filtered out the tokens seen during training"
    );
    Ok((gold, filtered_runs))
}
