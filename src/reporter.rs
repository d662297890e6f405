/**
This modules holds the averaged scores of every class and prints them as a CSV, HTML or Markdown
table.
*/
use crate::error::{EvalError, Result};
use enum_iterator::{all, Sequence};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Metrics reported for each class, in reporting order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Sequence, Serialize, Deserialize,
)]
pub enum Metric {
    Precision,
    Recall,
    F1,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::F1 => "f1",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Precision => "Precision",
            Self::Recall => "Recall",
            Self::F1 => "F1",
        }
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Error)]
#[error("impossible to parse the string ({0}) into a Metric")]
pub struct MetricParsingError(String);

impl FromStr for Metric {
    type Err = MetricParsingError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "precision" => Ok(Metric::Precision),
            "recall" => Ok(Metric::Recall),
            "f1" | "fscore" | "f1-score" => Ok(Metric::F1),
            _ => Err(MetricParsingError(String::from(s))),
        }
    }
}

/// Output formats of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Sequence, clap::ValueEnum)]
pub enum ReportFormat {
    Csv,
    #[default]
    Html,
    #[value(alias = "md")]
    Markdown,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Markdown => "md",
        }
    }
}

impl Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Markdown => "markdown",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Error)]
#[error("unsupported report format `{0}` (expected one of: {formats})", formats = all::<ReportFormat>().join(", "))]
pub struct ReportFormatParsingError(String);

impl FromStr for ReportFormat {
    type Err = ReportFormatParsingError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "html" => Ok(Self::Html),
            "markdown" | "md" => Ok(Self::Markdown),
            _ => Err(ReportFormatParsingError(String::from(s))),
        }
    }
}

/// Averaged scores, indexed by metric then by class.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreTable {
    scores: BTreeMap<Metric, BTreeMap<String, f32>>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, metric: Metric, tag: &str, value: f32) {
        self.scores
            .entry(metric)
            .or_default()
            .insert(String::from(tag), value);
    }

    pub fn get(&self, metric: Metric, tag: &str) -> Option<f32> {
        self.scores.get(&metric)?.get(tag).copied()
    }

    /// Every class having at least one score, sorted.
    pub fn tags(&self) -> BTreeSet<&str> {
        self.scores
            .values()
            .flat_map(|by_tag| by_tag.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.values().all(BTreeMap::is_empty)
    }

    /// Markdown view of the table: one row per metric, one column per class.
    pub fn markdown(&self) -> MarkdownTable<'_> {
        MarkdownTable(self)
    }

    /// HTML view of the table: one row per metric, one column per class.
    pub fn html(&self) -> HtmlTable<'_> {
        HtmlTable(self)
    }

    /// CSV form: one row per class, one column per metric, full precision. Missing scores are
    /// empty cells.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> std::result::Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec![String::from("tag")];
        header.extend(all::<Metric>().map(|m| m.to_string()));
        wtr.write_record(&header)?;
        for tag in self.tags() {
            let mut record = vec![String::from(tag)];
            record.extend(
                all::<Metric>().map(|m| self.get(m, tag).map(|v| v.to_string()).unwrap_or_default()),
            );
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv(&self) -> std::result::Result<String, csv::Error> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Writes the table in `format` at `path`, replacing any existing file.
    pub fn write_report<P: AsRef<Path>>(&self, format: ReportFormat, path: P) -> Result<()> {
        let path = path.as_ref();
        match format {
            ReportFormat::Csv => fs::File::create(path)
                .and_then(|file| self.write_csv(file).map_err(io::Error::from)),
            ReportFormat::Html => fs::write(path, self.html().to_string()),
            ReportFormat::Markdown => fs::write(path, self.markdown().to_string()),
        }
        .map_err(|e| EvalError::io(path, e))
    }

    /// Reads back a table written in the CSV format. Empty cells are missing scores.
    pub fn from_csv(content: &str) -> std::result::Result<Self, ReportParsingError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(content.as_bytes());
        let header = reader.headers()?.clone();
        if header.is_empty() {
            return Err(ReportParsingError::MissingHeader);
        }
        let metrics = header
            .iter()
            .skip(1)
            .map(|h| h.parse::<Metric>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut table = Self::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line() as usize);
            if record.len() != header.len() {
                return Err(ReportParsingError::WrongFieldCount {
                    line,
                    expected: header.len(),
                    found: record.len(),
                });
            }
            let tag = &record[0];
            for (metric, field) in metrics.iter().zip(record.iter().skip(1)) {
                if field.is_empty() {
                    continue;
                }
                let value = field
                    .parse::<f32>()
                    .map_err(|_| ReportParsingError::InvalidValue {
                        line,
                        value: String::from(field),
                    })?;
                table.insert(*metric, tag, value);
            }
        }
        Ok(table)
    }

    fn cell(&self, metric: Metric, tag: &str) -> String {
        match self.get(metric, tag) {
            Some(v) => format!("{:.3}", v),
            None => String::from("N/A"),
        }
    }
}

impl Display for ScoreTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Class, {}", all::<Metric>().map(|m| m.title()).join(", "))?;
        for tag in self.tags() {
            let values = all::<Metric>()
                .map(|m| match self.get(m, tag) {
                    Some(v) => v.to_string(),
                    None => String::from("N/A"),
                })
                .join(", ");
            writeln!(f, "{}, {}", tag, values)?;
        }
        Ok(())
    }
}

pub struct MarkdownTable<'a>(&'a ScoreTable);

impl Display for MarkdownTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags = self.0.tags();
        writeln!(f, "| Metric | {} |", tags.iter().join(" | "))?;
        writeln!(f, "| --- |{}", " --- |".repeat(tags.len()))?;
        for metric in all::<Metric>() {
            let cells = tags.iter().map(|t| self.0.cell(metric, t)).join(" | ");
            writeln!(f, "| {} | {} |", metric.title(), cells)?;
        }
        Ok(())
    }
}

pub struct HtmlTable<'a>(&'a ScoreTable);

impl Display for HtmlTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags = self.0.tags();
        writeln!(f, "<table border=\"1\" class=\"dataframe\">")?;
        writeln!(f, "  <thead>")?;
        writeln!(f, "    <tr style=\"text-align: right;\">")?;
        writeln!(f, "      <th>metric</th>")?;
        for tag in tags.iter() {
            writeln!(f, "      <th>{}</th>", escape_html(tag))?;
        }
        writeln!(f, "    </tr>")?;
        writeln!(f, "  </thead>")?;
        writeln!(f, "  <tbody>")?;
        for metric in all::<Metric>() {
            writeln!(f, "    <tr>")?;
            writeln!(f, "      <th>{}</th>", metric)?;
            for tag in tags.iter() {
                writeln!(f, "      <td>{}</td>", self.0.cell(metric, tag))?;
            }
            writeln!(f, "    </tr>")?;
        }
        writeln!(f, "  </tbody>")?;
        writeln!(f, "</table>")
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum ReportParsingError {
    #[error("the report has no header")]
    MissingHeader,
    #[error("malformed CSV: {0}")]
    Malformed(String),
    #[error(transparent)]
    UnknownMetric(#[from] MetricParsingError),
    #[error("line {line}: expected {expected} fields, found {found}")]
    WrongFieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: `{value}` is not a number")]
    InvalidValue { line: usize, value: String },
}

impl From<csv::Error> for ReportParsingError {
    fn from(value: csv::Error) -> Self {
        Self::Malformed(value.to_string())
    }
}

/// Deterministic name of a report: `{model}_{split}[_unseen]_{runs}runs.{ext}`. An empty model
/// filter is named `all`.
pub fn report_file_name(
    split: &str,
    model_filter: &str,
    run_count: usize,
    unseen_only: bool,
    format: ReportFormat,
) -> String {
    let model: String = model_filter
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let model = if model.is_empty() { "all" } else { &model };
    let unseen = if unseen_only { "_unseen" } else { "" };
    format!(
        "{}_{}{}_{}runs.{}",
        model,
        split,
        unseen,
        run_count,
        format.extension()
    )
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    fn build_table() -> ScoreTable {
        let mut table = ScoreTable::new();
        table.insert(Metric::Precision, "PER", 0.9);
        table.insert(Metric::Recall, "PER", 0.75);
        table.insert(Metric::F1, "PER", 0.8181818);
        table.insert(Metric::Precision, "LOC", 1.0 / 3.0);
        table.insert(Metric::Recall, "LOC", 0.5);
        table.insert(Metric::F1, "LOC", 0.4);
        table.insert(Metric::Precision, "overall", 0.6);
        table
    }

    #[test]
    fn test_csv_round_trip() {
        let table = build_table();
        let csv = table.to_csv().unwrap();
        let read_back = ScoreTable::from_csv(&csv).unwrap();
        assert_eq!(read_back.tags(), table.tags());
        for tag in table.tags() {
            for metric in all::<Metric>() {
                match (table.get(metric, tag), read_back.get(metric, tag)) {
                    (Some(a), Some(b)) => assert!((a - b).abs() < 1e-6),
                    (None, None) => {}
                    other => panic!("mismatch for {} {}: {:?}", metric, tag, other),
                }
            }
        }
    }

    #[test]
    fn test_csv_layout() {
        let csv = build_table().to_csv().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("tag,precision,recall,f1"));
        assert_eq!(lines.next(), Some("LOC,0.33333334,0.5,0.4"));
        assert_eq!(lines.next(), Some("PER,0.9,0.75,0.8181818"));
        assert_eq!(lines.next(), Some("overall,0.6,,"));
        assert_eq!(lines.next(), None);
    }

    #[rstest]
    #[case("A,\"B\"")]
    #[case("A\nB")]
    #[case("A\r\nB")]
    fn test_csv_quoted_tag(#[case] tag: &str) {
        let mut table = ScoreTable::new();
        table.insert(Metric::F1, tag, 0.5);
        table.insert(Metric::F1, "PER", 1.0);
        let read_back = ScoreTable::from_csv(&table.to_csv().unwrap()).unwrap();
        assert_eq!(read_back.tags(), table.tags());
        assert_eq!(read_back.get(Metric::F1, tag), Some(0.5));
        assert_eq!(read_back.get(Metric::F1, "PER"), Some(1.0));
    }

    #[test]
    fn test_write_csv_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let mut table = build_table();
        table.insert(Metric::Recall, "A\nB", 0.25);
        table.write_report(ReportFormat::Csv, &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("tag,precision,recall,f1\n"));
        assert!(content.contains("\"A\nB\",,0.25,\n"));
        let read_back = ScoreTable::from_csv(&content).unwrap();
        assert_eq!(read_back.tags(), table.tags());
        assert_eq!(read_back.get(Metric::Recall, "A\nB"), Some(0.25));
    }

    #[test]
    fn test_display() {
        let expected = "Class, Precision, Recall, F1
LOC, 0.33333334, 0.5, 0.4
PER, 0.9, 0.75, 0.8181818
overall, 0.6, N/A, N/A
";
        assert_eq!(build_table().to_string(), expected);
    }

    #[test]
    fn test_from_csv_errors() {
        assert_eq!(
            ScoreTable::from_csv(""),
            Err(ReportParsingError::MissingHeader)
        );
        assert!(matches!(
            ScoreTable::from_csv("tag,accuracy\nPER,1"),
            Err(ReportParsingError::UnknownMetric(_))
        ));
        assert_eq!(
            ScoreTable::from_csv("tag,f1\nPER,abc"),
            Err(ReportParsingError::InvalidValue {
                line: 2,
                value: String::from("abc")
            })
        );
        assert_eq!(
            ScoreTable::from_csv("tag,f1\nPER,1,2"),
            Err(ReportParsingError::WrongFieldCount {
                line: 2,
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn test_markdown() {
        let expected = "| Metric | LOC | PER | overall |
| --- | --- | --- | --- |
| Precision | 0.333 | 0.900 | 0.600 |
| Recall | 0.500 | 0.750 | N/A |
| F1 | 0.400 | 0.818 | N/A |
";
        assert_eq!(build_table().markdown().to_string(), expected);
    }

    #[test]
    fn test_html_escapes_tags() {
        let mut table = ScoreTable::new();
        table.insert(Metric::F1, "<A&B>", 1.0);
        let html = table.html().to_string();
        assert!(html.contains("<th>&lt;A&amp;B&gt;</th>"));
        assert!(html.contains("<td>1.000</td>"));
        assert!(html.contains("<td>N/A</td>"));
        assert!(html.starts_with("<table"));
        assert!(html.trim_end().ends_with("</table>"));
    }

    #[rstest]
    #[case("csv", ReportFormat::Csv)]
    #[case("HTML", ReportFormat::Html)]
    #[case("markdown", ReportFormat::Markdown)]
    #[case("md", ReportFormat::Markdown)]
    fn test_parse_format(#[case] s: &str, #[case] expected: ReportFormat) {
        assert_eq!(s.parse::<ReportFormat>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unsupported_format() {
        let err = "xlsx".parse::<ReportFormat>().unwrap_err();
        assert!(err.to_string().contains("csv, html, markdown"));
    }

    #[rstest]
    #[case("xlmr", 5, false, ReportFormat::Html, "xlmr_test_5runs.html")]
    #[case("", 1, true, ReportFormat::Csv, "all_test_unseen_1runs.csv")]
    #[case("bert base/v2", 3, false, ReportFormat::Markdown, "bert_base_v2_test_3runs.md")]
    fn test_report_file_name(
        #[case] model: &str,
        #[case] runs: usize,
        #[case] unseen: bool,
        #[case] format: ReportFormat,
        #[case] expected: &str,
    ) {
        assert_eq!(
            report_file_name("test", model, runs, unseen, format),
            expected
        );
    }
}
