use std::fs::{create_dir_all, read_to_string, write};
use std::path::Path;
use tagscore::{
    evaluate, prepare_dataset, score_run, DivByZeroStrat, EvalConfigBuilder, EvalError, Metric,
    ReportFormat, ScoreTable, TagSet, TagVocabulary, OVERALL,
};
use tempfile::tempdir;

pub trait CloseEnough {
    fn are_close(&self, other: &Self, eps: f32) -> bool;
}

// Same classes, and every score within `eps`.
impl CloseEnough for ScoreTable {
    fn are_close(&self, other: &Self, eps: f32) -> bool {
        self.tags() == other.tags()
            && self.tags().into_iter().all(|tag| {
                enum_iterator::all::<Metric>().all(|m| match (self.get(m, tag), other.get(m, tag)) {
                    (Some(a), Some(b)) => f32::abs(a - b) < eps,
                    (None, None) => true,
                    _ => false,
                })
            })
    }
}

const TEST_SPLIT: &str = "\
{\"tokens\": [\"Ada\", \"Lovelace\", \"met\", \"Charles\", \"Babbage\", \"in\", \"London\"], \"ner_tags\": [1, 2, 0, 1, 2, 0, 5]}
{\"tokens\": [\"The\", \"flu\", \"hit\", \"Paris\"], \"ner_tags\": [0, 13, 0, 5]}
{\"tokens\": [\"Nothing\", \"here\"], \"ner_tags\": [0, 0]}
";

const TRAIN_SPLIT: &str = "\
{\"tokens\": [\"London\", \"is\", \"big\"], \"ner_tags\": [5, 0, 0]}
{\"tokens\": [\"Ada\", \"wrote\"], \"ner_tags\": [1, 0]}
";

fn write_fixture(root: &Path) {
    let gold = root.join("data/system_a");
    create_dir_all(&gold).unwrap();
    write(gold.join("test.json"), TEST_SPLIT).unwrap();
    write(gold.join("train.json"), TRAIN_SPLIT).unwrap();
    for (run, content) in [
        (
            "runs/xlmr/seed_1/test_predictions.txt",
            "B-PER I-PER O B-PER I-PER O B-LOC\nO B-DIS O B-LOC\nO O\n",
        ),
        (
            "runs/xlmr/seed_2/test_predictions.txt",
            "B-PER I-PER O B-PER O O B-LOC\nO O O B-ORG\nO O\n",
        ),
        ("runs/bert/seed_1/test_predictions.txt", "O O O O O O O\nO O O O\nO O\n"),
    ] {
        let path = root.join(run);
        create_dir_all(path.parent().unwrap()).unwrap();
        write(path, content).unwrap();
    }
}

#[test]
fn evaluation_matches_the_mean_of_single_runs() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    let config = EvalConfigBuilder::new().model_filter("xlmr").build();
    let evaluation = evaluate(
        dir.path().join("runs"),
        dir.path().join("data/system_a"),
        &config,
    )
    .unwrap();
    assert_eq!(evaluation.run_count(), 2);

    let gold = vec![
        vec!["B-PER", "I-PER", "O", "B-PER", "I-PER", "O", "B-LOC"],
        vec!["O", "B-DIS", "O", "B-LOC"],
        vec!["O", "O"],
    ];
    let seed_2 = vec![
        vec!["B-PER", "I-PER", "O", "B-PER", "O", "O", "B-LOC"],
        vec!["O", "O", "O", "B-ORG"],
        vec!["O", "O"],
    ];
    let second = score_run(&gold, &seed_2, DivByZeroStrat::ReplaceBy0, false).unwrap();
    // The first run is perfect.
    let expected_per_f1 = (1.0 + second["PER"].f1) / 2.0;
    let table = &evaluation.table;
    assert!(f32::abs(table.get(Metric::F1, "PER").unwrap() - expected_per_f1) < 1e-6);
    // ORG is only predicted by the second run, where its precision is 0.
    assert_eq!(table.get(Metric::Precision, "ORG"), Some(0.0));
    assert!(table.get(Metric::F1, OVERALL).unwrap() < 1.0);
}

#[test]
fn unseen_evaluation_drops_seen_pairs() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    let config = EvalConfigBuilder::new()
        .model_filter("xlmr/seed_1")
        .unseen_only(true)
        .build();
    let evaluation = evaluate(
        dir.path().join("runs"),
        dir.path().join("data/system_a"),
        &config,
    )
    .unwrap();
    // `London` as B-LOC and `Ada` as B-PER appear in the train split. The first example now
    // reads `I-PER O B-PER I-PER O`: two PER entities, the first one starting on an I tag.
    let table = &evaluation.table;
    assert_eq!(table.get(Metric::Recall, "LOC"), Some(1.0));
    assert_eq!(table.get(Metric::F1, "DIS"), Some(1.0));
    assert_eq!(table.get(Metric::F1, "PER"), Some(1.0));
    assert_eq!(evaluation.report_file_name(), "xlmr_seed_1_test_unseen_1runs.html");
}

#[test]
fn no_matching_run_is_an_error() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    let config = EvalConfigBuilder::new().model_filter("roberta").build();
    let err = evaluate(
        dir.path().join("runs"),
        dir.path().join("data/system_a"),
        &config,
    )
    .unwrap_err();
    assert!(matches!(err, EvalError::NoRuns { .. }));
}

#[test]
fn csv_report_round_trip() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    let config = EvalConfigBuilder::new()
        .format(ReportFormat::Csv)
        .output_dir(dir.path().join("reports"))
        .build();
    let evaluation = evaluate(
        dir.path().join("runs"),
        dir.path().join("data/system_a"),
        &config,
    )
    .unwrap();
    let path = evaluation.write_report().unwrap();
    assert_eq!(path.file_name().unwrap(), "all_test_3runs.csv");
    let read_back = ScoreTable::from_csv(&read_to_string(&path).unwrap()).unwrap();
    assert!(read_back.are_close(&evaluation.table, 1e-6));
}

#[test]
fn html_and_markdown_reports() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    for (format, name) in [
        (ReportFormat::Html, "bert_test_1runs.html"),
        (ReportFormat::Markdown, "bert_test_1runs.md"),
    ] {
        let config = EvalConfigBuilder::new()
            .model_filter("bert")
            .format(format)
            .output_dir(dir.path())
            .build();
        let evaluation = evaluate(
            dir.path().join("runs"),
            dir.path().join("data/system_a"),
            &config,
        )
        .unwrap();
        let path = evaluation.write_report().unwrap();
        assert_eq!(path, dir.path().join(name));
        let content = read_to_string(&path).unwrap();
        assert!(content.contains("0.000"));
        assert!(content.contains("PER"));
    }
}

#[test]
fn prepared_data_can_be_evaluated() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw");
    create_dir_all(&raw).unwrap();
    write(
        raw.join("test.json"),
        "{\"tokens\": [\"Rex\", \"barked\", \"at\", \"Ada\"], \"ner_tags\": [7, 0, 0, 1], \"lang\": \"en\"}\n\
         {\"tokens\": [\"Bach\", \"Messe\"], \"ner_tags\": [1, 21], \"lang\": \"de\"}\n",
    )
    .unwrap();
    let counts = prepare_dataset(
        &raw,
        &["test"],
        "en",
        TagSet::B,
        dir.path().join("data"),
        &TagVocabulary::multinerd(),
    )
    .unwrap();
    assert_eq!(counts["test"], 1);

    create_dir_all(dir.path().join("runs")).unwrap();
    write(
        dir.path().join("runs/predictions.txt"),
        "B-ANIM O O B-PER\n",
    )
    .unwrap();
    let evaluation = evaluate(
        dir.path().join("runs"),
        dir.path().join("data/system_b"),
        &EvalConfigBuilder::new().build(),
    )
    .unwrap();
    assert_eq!(evaluation.table.get(Metric::F1, OVERALL), Some(1.0));
}
