/**
This module parses tag sequences into entities. The chunking follows the lenient (conlleval) rules:
a chunk can start on an `I` tag, and a change of entity type always closes the previous chunk.
*/
use crate::metrics::ComputationError;
use ahash::{AHashMap, AHashSet};
use std::fmt::Display;
use std::iter::once;
use std::ops::Deref;

/// Character separating the prefix from the entity type, as in `B-PER`.
const DELIMITER: char = '-';
/// Entity type of a tag without one (e.g. `O` or a bare `B`).
const NO_TYPE: &str = "_";

/// An entity represent a named objet in named entity recognition (NER). It contains a start and an
/// end (i.e. at what index of the flattened sequences does it starts and ends, both inclusive) and
/// a tag, which the associated entity (such as `LOC`, `PER`, etc.)
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entity<'a> {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) tag: &'a str,
}

impl<'a> Entity<'a> {
    pub(crate) fn new(start: usize, end: usize, tag: &'a str) -> Self {
        Entity { start, end, tag }
    }

    pub fn as_tuple(&self) -> (usize, usize, &'a str) {
        (self.start, self.end, self.tag)
    }
}

impl Display for Entity<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.tag, self.start, self.end)
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
/// Prefix of a tag. Prefixes with no role in the chunking rules are kept as `Other`.
enum UserPrefix {
    I,
    O,
    B,
    E,
    S,
    Other(char),
}

impl From<char> for UserPrefix {
    fn from(value: char) -> Self {
        match value {
            'I' => Self::I,
            'O' => Self::O,
            'B' => Self::B,
            'E' => Self::E,
            'S' => Self::S,
            c => Self::Other(c),
        }
    }
}

impl UserPrefix {
    /// `O` and `.` never belong to a chunk.
    fn is_outside(&self) -> bool {
        matches!(self, Self::O | Self::Other('.'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct InnerToken<'a> {
    prefix: UserPrefix,
    tag: &'a str,
}

impl<'a> InnerToken<'a> {
    /// Splits a raw tag into its prefix and its entity type.
    ///
    /// * `token`: raw tag, such as `"B-PER"` (or `"PER-B"` when `suffix` is true).
    /// * `suffix`: Marker indicating if the prefix is located at the end of the token.
    fn try_new(token: &'a str, suffix: bool) -> Result<Self, ComputationError> {
        let (prefix, tag) = if suffix {
            let prefix = token.chars().last().ok_or(ComputationError::EmptyTag)?;
            let rest = &token[..token.len() - prefix.len_utf8()];
            let tag = rest.rsplit_once(DELIMITER).map_or(rest, |(t, _)| t);
            (prefix, tag)
        } else {
            let prefix = token.chars().next().ok_or(ComputationError::EmptyTag)?;
            let rest = &token[prefix.len_utf8()..];
            let tag = rest.split_once(DELIMITER).map_or(rest, |(_, t)| t);
            (prefix, tag)
        };
        let tag = if tag.is_empty() { NO_TYPE } else { tag };
        Ok(Self {
            prefix: UserPrefix::from(prefix),
            tag,
        })
    }
}

/// State carried from one token to the next while chunking.
struct LenientChunker<'a> {
    prev_prefix: UserPrefix,
    prev_type: &'a str,
    begin_offset: usize,
}

impl<'a> LenientChunker<'a> {
    fn new() -> Self {
        Self {
            prev_prefix: UserPrefix::O,
            prev_type: "",
            begin_offset: 0,
        }
    }

    /// Checks if a chunk ended between the previous and current token.
    fn end_of_chunk(&self, current: &InnerToken<'a>) -> bool {
        match (self.prev_prefix, current.prefix) {
            (UserPrefix::E, _) | (UserPrefix::S, _) => true,
            (UserPrefix::B, UserPrefix::B | UserPrefix::S | UserPrefix::O) => true,
            (UserPrefix::I, UserPrefix::B | UserPrefix::S | UserPrefix::O) => true,
            (prev, _) => !prev.is_outside() && self.prev_type != current.tag,
        }
    }

    /// Checks if a chunk started between the previous and current token.
    fn start_of_chunk(&self, current: &InnerToken<'a>) -> bool {
        match (self.prev_prefix, current.prefix) {
            (_, UserPrefix::B | UserPrefix::S) => true,
            (UserPrefix::E | UserPrefix::S | UserPrefix::O, UserPrefix::E | UserPrefix::I) => {
                true
            }
            (_, curr) => !curr.is_outside() && self.prev_type != current.tag,
        }
    }
}

/// Leniently retrieves the entities of every sequence. The sequences are read as a single
/// sequence where each of them is followed by an `O`, so the offsets of the entities are global.
pub(crate) fn get_entities_lenient<'a, S: AsRef<str>>(
    sequences: &'a [Vec<S>],
    suffix: bool,
) -> Result<Entities<'a>, ComputationError> {
    let flattened = sequences
        .iter()
        .flat_map(|seq| seq.iter().map(AsRef::as_ref).chain(once("O")))
        .chain(once("O"));
    let mut chunker = LenientChunker::new();
    let mut entities = Vec::new();
    for (i, raw) in flattened.enumerate() {
        let token = InnerToken::try_new(raw, suffix)?;
        if chunker.end_of_chunk(&token) {
            // `end_of_chunk` is false on the first token: the initial previous prefix is `O`.
            entities.push(Entity::new(chunker.begin_offset, i - 1, chunker.prev_type));
        }
        if chunker.start_of_chunk(&token) {
            chunker.begin_offset = i;
        }
        chunker.prev_prefix = token.prefix;
        chunker.prev_type = token.tag;
    }
    Ok(Entities(entities))
}

#[derive(Debug, PartialEq, Clone, Default)]
/// Entities found in a list of sequences, in order of appearance.
pub struct Entities<'a>(Vec<Entity<'a>>);

impl<'a> Deref for Entities<'a> {
    type Target = Vec<Entity<'a>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> IntoIterator for Entities<'a> {
    type Item = Entity<'a>;
    type IntoIter = std::vec::IntoIter<Entity<'a>>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> Entities<'a> {
    /// Filters the entities for a given tag name and returns them in a HashSet.
    pub fn filter<S: AsRef<str>>(&self, tag_name: S) -> AHashSet<&Entity<'a>> {
        let tag_name_ref = tag_name.as_ref();
        self.iter().filter(|e| e.tag == tag_name_ref).collect()
    }

    /// Filters the entities for a given tag name and return the number of entities.
    pub fn filter_count<S: AsRef<str>>(&self, tag_name: S) -> usize {
        let tag_name_ref = tag_name.as_ref();
        self.iter().filter(|e| e.tag == tag_name_ref).count()
    }

    pub fn unique_tags(&self) -> AHashSet<&'a str> {
        self.iter().map(|e| e.tag).collect()
    }

    /// Groups the `(start, end)` spans by tag.
    pub(crate) fn spans_by_tag(&self) -> AHashMap<&'a str, AHashSet<(usize, usize)>> {
        let mut grouped: AHashMap<&'a str, AHashSet<(usize, usize)>> =
            AHashMap::with_capacity(self.len());
        for e in self.iter() {
            grouped.entry(e.tag).or_default().insert((e.start, e.end));
        }
        grouped
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use quickcheck::{Arbitrary, Gen, TestResult};
    use rstest::rstest;

    fn tuples<'a>(entities: &Entities<'a>) -> Vec<(usize, usize, &'a str)> {
        entities.iter().map(|e| e.as_tuple()).collect()
    }

    #[test]
    fn test_get_entities() {
        let seq = vec![vec![
            "O", "O", "O", "B-MISC", "I-MISC", "I-MISC", "O", "B-PER", "I-PER",
        ]];
        let entities = get_entities_lenient(&seq, false).unwrap();
        assert_eq!(tuples(&entities), vec![(3, 5, "MISC"), (7, 8, "PER")]);
    }

    #[test]
    fn test_get_entities_with_suffix() {
        let seq = vec![vec![
            "O", "O", "O", "MISC-B", "MISC-I", "MISC-I", "O", "PER-B", "PER-I",
        ]];
        let entities = get_entities_lenient(&seq, true).unwrap();
        assert_eq!(tuples(&entities), vec![(3, 5, "MISC"), (7, 8, "PER")]);
    }

    #[test]
    fn test_adjacent_chunks_start_where_previous_ends() {
        let seq = vec![vec!["B-PER", "B-LOC", "I-LOC"]];
        let entities = get_entities_lenient(&seq, false).unwrap();
        assert_eq!(tuples(&entities), vec![(0, 0, "PER"), (1, 2, "LOC")]);
    }

    #[test]
    fn test_offsets_are_global_across_sequences() {
        let seq = vec![vec!["B-PER", "I-PER", "O", "B-LOC"], vec!["B-GEO", "O"]];
        let entities = get_entities_lenient(&seq, false).unwrap();
        // The second sequence starts at 5: four tokens plus the separating `O`.
        assert_eq!(
            tuples(&entities),
            vec![(0, 1, "PER"), (3, 3, "LOC"), (5, 5, "GEO")]
        );
    }

    #[rstest]
    #[case(vec!["I-PER", "I-PER", "O"], vec![(0, 1, "PER")])]
    #[case(vec!["O", "I-PER", "I-LOC"], vec![(1, 1, "PER"), (2, 2, "LOC")])]
    #[case(vec!["B-PER", "I-LOC"], vec![(0, 0, "PER"), (1, 1, "LOC")])]
    #[case(vec!["S-PER", "B-LOC", "E-LOC"], vec![(0, 0, "PER"), (1, 2, "LOC")])]
    #[case(vec!["O", "O"], vec![])]
    #[case(vec![], vec![])]
    fn test_lenient_rules(
        #[case] seq: Vec<&'static str>,
        #[case] expected: Vec<(usize, usize, &'static str)>,
    ) {
        let seqs = vec![seq];
        let entities = get_entities_lenient(&seqs, false).unwrap();
        assert_eq!(tuples(&entities), expected);
    }

    #[test]
    fn test_tag_without_type() {
        let seq = vec![vec!["B", "I"]];
        let entities = get_entities_lenient(&seq, false).unwrap();
        assert_eq!(tuples(&entities), vec![(0, 1, "_")]);
    }

    #[test]
    fn test_empty_tag_is_an_error() {
        let seq = vec![vec!["B-PER", ""]];
        let err = get_entities_lenient(&seq, false).unwrap_err();
        assert_eq!(err, ComputationError::EmptyTag);
    }

    #[test]
    fn test_unique_tags_and_filter() {
        let seq = vec![
            vec!["B-PER", "I-PER", "O", "B-LOC"],
            vec![
                "B-GEO", "I-GEO", "O", "B-GEO", "O", "B-PER", "I-PER", "I-PER", "B-LOC",
            ],
        ];
        let entities = get_entities_lenient(&seq, false).unwrap();
        let expected: AHashSet<&str> = AHashSet::from_iter(["PER", "LOC", "GEO"]);
        assert_eq!(entities.unique_tags(), expected);
        assert_eq!(entities.filter_count("GEO"), 2);
        assert_eq!(entities.filter("PER").len(), 2);
        assert_eq!(entities.spans_by_tag()["LOC"].len(), 2);
    }

    #[derive(Debug, Clone, Copy)]
    pub(crate) struct SingleTokenTag(pub(crate) &'static str);

    impl Arbitrary for SingleTokenTag {
        fn arbitrary(g: &mut Gen) -> Self {
            Self(*g.choose(&["B-PER", "B-GEO", "B-LOC", "O"]).unwrap())
        }
    }

    #[test]
    fn test_property_begin_only_entities_have_length_one() {
        fn begin_only(tokens: Vec<Vec<SingleTokenTag>>) -> TestResult {
            let seqs: Vec<Vec<&str>> = tokens
                .iter()
                .map(|v| v.iter().map(|t| t.0).collect())
                .collect();
            let entities = get_entities_lenient(&seqs, false).unwrap();
            let expected = seqs.iter().flatten().filter(|t| **t != "O").count();
            TestResult::from_bool(
                entities.len() == expected && entities.iter().all(|e| e.start == e.end),
            )
        }
        quickcheck::QuickCheck::new()
            .tests(1000)
            .quickcheck(begin_only as fn(Vec<Vec<SingleTokenTag>>) -> TestResult)
    }
}
