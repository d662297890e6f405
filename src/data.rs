/**
Readers for the gold splits (JSON lines with `tokens` and `ner_tags`) and for the prediction runs
(plain text files, one whitespace separated tag sequence per line).
*/
use crate::error::{EvalError, Result};
use crate::vocab::TagVocabulary;
use serde::{Deserialize, Serialize};
use serde_jsonlines::json_lines;
use std::collections::BTreeMap;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Every file whose name ends with this suffix is a prediction run.
pub const PREDICTION_SUFFIX: &str = "predictions.txt";

/// A tag as stored in a record: either its index in the vocabulary or its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTag {
    Index(u64),
    Name(String),
}

/// One line of a gold file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NerRecord {
    pub tokens: Vec<String>,
    pub ner_tags: Vec<RawTag>,
}

/// A split of the gold data. `tokens[i]` and `tags[i]` always have the same length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoldSplit {
    pub name: String,
    pub tokens: Vec<Vec<String>>,
    pub tags: Vec<Vec<String>>,
}

impl GoldSplit {
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Reads a gold split, keeping the order of the file. The split is named after the file stem.
/// Tag indices are resolved with `vocab`.
pub fn read_gold_split<P: AsRef<Path>>(path: P, vocab: &TagVocabulary) -> Result<GoldSplit> {
    let path = path.as_ref();
    let records = json_lines::<NerRecord, _>(path).map_err(|e| EvalError::io(path, e))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut split = GoldSplit {
        name,
        ..Default::default()
    };
    for (i, record) in records.enumerate() {
        let line = i + 1;
        let record = record.map_err(|source| EvalError::MalformedRecord {
            path: path.to_path_buf(),
            line,
            source,
        })?;
        if record.tokens.len() != record.ner_tags.len() {
            return Err(EvalError::RecordLengthMismatch {
                path: path.to_path_buf(),
                line,
                tokens: record.tokens.len(),
                tags: record.ner_tags.len(),
            });
        }
        let tags = record
            .ner_tags
            .into_iter()
            .map(|tag| resolve_tag(tag, vocab, path, line))
            .collect::<Result<Vec<_>>>()?;
        split.tokens.push(record.tokens);
        split.tags.push(tags);
    }
    info!(split = %split.name, examples = split.len(), "read gold split");
    Ok(split)
}

fn resolve_tag(tag: RawTag, vocab: &TagVocabulary, path: &Path, line: usize) -> Result<String> {
    match tag {
        RawTag::Name(name) => Ok(name),
        RawTag::Index(index) => usize::try_from(index)
            .ok()
            .and_then(|i| vocab.name_of(i))
            .map(String::from)
            .ok_or_else(|| EvalError::UnknownTagIndex {
                path: path.to_path_buf(),
                line,
                index,
            }),
    }
}

/// Predicted tag sequences of every run, keyed by the path of the run file relative to the
/// predictions directory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictionRuns(BTreeMap<String, Vec<Vec<String>>>);

impl Deref for PredictionRuns {
    type Target = BTreeMap<String, Vec<Vec<String>>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for PredictionRuns {
    type Item = (String, Vec<Vec<String>>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<Vec<String>>>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, Vec<Vec<String>>)> for PredictionRuns {
    fn from_iter<T: IntoIterator<Item = (String, Vec<Vec<String>>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Collects every prediction file under `root` whose relative path contains `model_filter` (an
/// empty filter keeps every file). Finding no file is an error.
pub fn read_predictions<P: AsRef<Path>>(root: P, model_filter: &str) -> Result<PredictionRuns> {
    let root = root.as_ref();
    let mut files = Vec::new();
    collect_prediction_files(root, &mut files)?;
    let mut runs = BTreeMap::new();
    for file in files {
        let run_id = file
            .strip_prefix(root)
            .unwrap_or(file.as_path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !run_id.contains(model_filter) {
            continue;
        }
        let content = fs::read_to_string(&file).map_err(|e| EvalError::io(&file, e))?;
        let sequences: Vec<Vec<String>> = content
            .lines()
            .map(|line| line.split_whitespace().map(String::from).collect())
            .collect();
        if sequences.is_empty() {
            warn!(run = %run_id, "prediction file is empty");
        }
        debug!(run = %run_id, sequences = sequences.len(), "read prediction run");
        runs.insert(run_id, sequences);
    }
    if runs.is_empty() {
        return Err(EvalError::NoRuns {
            dir: root.to_path_buf(),
            filter: String::from(model_filter),
            suffix: PREDICTION_SUFFIX,
        });
    }
    info!(runs = runs.len(), filter = model_filter, "read prediction runs");
    Ok(PredictionRuns(runs))
}

/// Recursively pushes the prediction files under `dir`, in sorted order. Symbolic links to
/// directories are not followed.
fn collect_prediction_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .and_then(|it| it.collect::<std::io::Result<Vec<_>>>())
        .map_err(|e| EvalError::io(dir, e))?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| EvalError::io(&path, e))?;
        if file_type.is_dir() {
            collect_prediction_files(&path, files)?;
        } else if entry
            .file_name()
            .to_string_lossy()
            .ends_with(PREDICTION_SUFFIX)
        {
            files.push(path);
        }
    }
    Ok(())
}
