/*
 * This module contains the `EvalConfig` struct, which gathers every option of an evaluation. It
 * implements the default trait and can be built and customized with `EvalConfigBuilder`.
*/
use crate::metrics::DivByZeroStrat;
use crate::reporter::ReportFormat;
use std::fmt::Display;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Options of an evaluation. Passed to `evaluate` and carried into the written report.
pub struct EvalConfig {
    pub zero_division: DivByZeroStrat,
    pub suffix: bool,
    pub unseen_only: bool,
    /// Substring a prediction file path must contain. Empty keeps every run.
    pub model_filter: String,
    pub train_split: String,
    pub test_split: String,
    pub format: ReportFormat,
    pub output_dir: PathBuf,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            zero_division: DivByZeroStrat::ReplaceBy0,
            suffix: false,
            unseen_only: false,
            model_filter: String::new(),
            train_split: String::from("train"),
            test_split: String::from("test"),
            format: ReportFormat::Html,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Display for EvalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Strategy when encountering a division by zero: {}\n Prefix located at the end of the tags: {}\n Unseen tokens only: {}\n Model filter: {:?}\n Splits (train/test): {}/{}\n Report format: {}\n Output directory: {}",
            self.zero_division,
            self.suffix,
            self.unseen_only,
            self.model_filter,
            self.train_split,
            self.test_split,
            self.format,
            self.output_dir.display()
        )
    }
}

/// This builder can be used to build and customize an `EvalConfig` structure.
#[derive(Clone, Debug, Default)]
pub struct EvalConfigBuilder {
    config: EvalConfig,
}

impl EvalConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn division_by_zero(mut self, division_by_zero: DivByZeroStrat) -> Self {
        self.config.zero_division = division_by_zero;
        self
    }
    pub fn suffix(mut self, suffix: bool) -> Self {
        self.config.suffix = suffix;
        self
    }
    pub fn unseen_only(mut self, unseen_only: bool) -> Self {
        self.config.unseen_only = unseen_only;
        self
    }
    pub fn model_filter<S: Into<String>>(mut self, model_filter: S) -> Self {
        self.config.model_filter = model_filter.into();
        self
    }
    pub fn train_split<S: Into<String>>(mut self, train_split: S) -> Self {
        self.config.train_split = train_split.into();
        self
    }
    pub fn test_split<S: Into<String>>(mut self, test_split: S) -> Self {
        self.config.test_split = test_split.into();
        self
    }
    pub fn format(mut self, format: ReportFormat) -> Self {
        self.config.format = format;
        self
    }
    pub fn output_dir<P: Into<PathBuf>>(mut self, output_dir: P) -> Self {
        self.config.output_dir = output_dir.into();
        self
    }
    pub fn build(self) -> EvalConfig {
        self.config
    }
}
