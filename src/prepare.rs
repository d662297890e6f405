/**
Prepares gold data: keeps the records of one language of a multilingual corpus and writes them
with tag names, either with the full tag set (system A) or with the reduced model B tag set where
every other tag becomes `O` (system B).
*/
use crate::data::{NerRecord, RawTag};
use crate::error::{EvalError, Result};
use crate::vocab::{TagSubset, TagVocabulary};
use serde::{Deserialize, Serialize};
use serde_jsonlines::{json_lines, write_json_lines};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Splits prepared when none are given.
pub const DEFAULT_SPLITS: [&str; 3] = ["train", "validation", "test"];

/// One line of a multilingual corpus split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub tokens: Vec<String>,
    pub ner_tags: Vec<u64>,
    pub lang: String,
}

/// Tag set of the prepared data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum TagSet {
    /// Every tag of the vocabulary.
    #[default]
    A,
    /// The model B entities only.
    B,
}

impl TagSet {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::A => "system_a",
            Self::B => "system_b",
        }
    }
}

impl Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "a",
            Self::B => "b",
        };
        write!(f, "{}", s)
    }
}

/// Prepares every split of `input_dir` (`{split}.json`) into `{output_dir}/system_{a,b}/`.
/// Existing files are overwritten. Returns the number of records kept per split.
pub fn prepare_dataset<P, Q, S>(
    input_dir: P,
    splits: &[S],
    language: &str,
    tag_set: TagSet,
    output_dir: Q,
    vocab: &TagVocabulary,
) -> Result<BTreeMap<String, usize>>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    S: AsRef<str>,
{
    let subset = match tag_set {
        TagSet::A => None,
        TagSet::B => Some(vocab.model_b()),
    };
    let out = output_dir.as_ref().join(tag_set.dir_name());
    fs::create_dir_all(&out).map_err(|e| EvalError::io(&out, e))?;

    let mut counts = BTreeMap::new();
    for split in splits {
        let split = split.as_ref();
        let source = input_dir.as_ref().join(format!("{}.json", split));
        let records = prepare_split(&source, language, subset.as_ref(), vocab)?;
        let target: PathBuf = out.join(format!("{}.json", split));
        write_json_lines(&target, &records).map_err(|e| EvalError::io(&target, e))?;
        info!(
            split,
            examples = records.len(),
            path = %target.display(),
            "saved prepared split"
        );
        counts.insert(String::from(split), records.len());
    }
    Ok(counts)
}

/// Records of `path` in `language`, with tag names relabelled to `subset` when given.
fn prepare_split(
    path: &Path,
    language: &str,
    subset: Option<&TagSubset>,
    vocab: &TagVocabulary,
) -> Result<Vec<NerRecord>> {
    let records = json_lines::<CorpusRecord, _>(path).map_err(|e| EvalError::io(path, e))?;
    let mut kept = Vec::new();
    for (i, record) in records.enumerate() {
        let line = i + 1;
        let record = record.map_err(|source| EvalError::MalformedRecord {
            path: path.to_path_buf(),
            line,
            source,
        })?;
        if record.lang != language {
            continue;
        }
        if record.tokens.len() != record.ner_tags.len() {
            return Err(EvalError::RecordLengthMismatch {
                path: path.to_path_buf(),
                line,
                tokens: record.tokens.len(),
                tags: record.ner_tags.len(),
            });
        }
        let ner_tags = record
            .ner_tags
            .iter()
            .map(|&index| {
                usize::try_from(index)
                    .ok()
                    .and_then(|i| vocab.relabel(i, subset))
                    .map(|name| RawTag::Name(String::from(name)))
                    .ok_or_else(|| EvalError::UnknownTagIndex {
                        path: path.to_path_buf(),
                        line,
                        index,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        kept.push(NerRecord {
            tokens: record.tokens,
            ner_tags,
        });
    }
    Ok(kept)
}
