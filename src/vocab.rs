/**
This module holds the MultiNERD tag vocabulary: a fixed bijection between BIO tag names and their
integer indices, and the reduced tag subsets derived from a list of entity types.
*/
use ahash::AHashMap;
use std::collections::BTreeSet;

/// Outside tag. It never belongs to a `TagSubset`.
pub const OUTSIDE: &str = "O";

/// Entity types kept by the reduced "model B" tag set.
pub const MODEL_B_ENTITIES: [&str; 5] = ["PER", "ORG", "LOC", "DIS", "ANIM"];

// The index of a tag is its position in this array. The order follows the MultiNERD dataset card.
const MULTINERD_TAGS: [&str; 31] = [
    "O", "B-PER", "I-PER", "B-ORG", "I-ORG", "B-LOC", "I-LOC", "B-ANIM", "I-ANIM", "B-BIO",
    "I-BIO", "B-CEL", "I-CEL", "B-DIS", "I-DIS", "B-EVE", "I-EVE", "B-FOOD", "I-FOOD", "B-INST",
    "I-INST", "B-MEDIA", "I-MEDIA", "B-MYTH", "I-MYTH", "B-PLANT", "I-PLANT", "B-TIME",
    "I-TIME", "B-VEHI", "I-VEHI",
];

/// Bidirectional mapping between tag names and indices. It is built once and passed by reference
/// to every component that needs to resolve tags.
#[derive(Debug, Clone, PartialEq)]
pub struct TagVocabulary {
    names: Vec<String>,
    indices: AHashMap<String, usize>,
}

impl TagVocabulary {
    /// The 31 tags of the MultiNERD corpus.
    pub fn multinerd() -> Self {
        Self::from_names(MULTINERD_TAGS)
    }

    /// Builds a vocabulary where the index of each tag is its position in `names`. Duplicated
    /// names keep their first index.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut indices = AHashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            indices.entry(name.clone()).or_insert(i);
        }
        Self { names, indices }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates over `(index, name)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().map(String::as_str).enumerate()
    }

    /// Returns the `B-` and `I-` tags (and their indices) of the given entity types. Entity
    /// types unknown to the vocabulary contribute nothing.
    pub fn restrict<S: AsRef<str>>(&self, entities: &[S]) -> TagSubset {
        let mut names = Vec::with_capacity(entities.len() * 2);
        for prefix in ["B-", "I-"] {
            for entity in entities {
                let name = format!("{}{}", prefix, entity.as_ref());
                if self.indices.contains_key(&name) {
                    names.push(name);
                }
            }
        }
        let indices = names.iter().filter_map(|n| self.index_of(n)).collect();
        TagSubset { names, indices }
    }

    /// Tag subset of the reduced "model B" system.
    pub fn model_b(&self) -> TagSubset {
        self.restrict(&MODEL_B_ENTITIES)
    }

    /// Name of the tag at `index`. With a subset, tags outside of it are mapped to `O`.
    pub fn relabel(&self, index: usize, subset: Option<&TagSubset>) -> Option<&str> {
        let name = self.name_of(index)?;
        match subset {
            Some(s) if !s.contains_index(index) => Some(OUTSIDE),
            _ => Some(name),
        }
    }
}

/// Closed set of tags belonging to a reduced list of entity types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSubset {
    /// All `B-` tags first, then all `I-` tags, each in the order of the entity list.
    names: Vec<String>,
    indices: BTreeSet<usize>,
}

impl TagSubset {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn indices(&self) -> &BTreeSet<usize> {
        &self.indices
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn contains_index(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }
}
