//! Deterministic collaborators and fixtures for unit tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;

use crate::clock::FixedClock;
use crate::config::MemoryConfig;
use crate::error::{Error, Result};
use crate::services::{KeywordExtractor, Services, TextInference};

/// Words the default test extractor recognises, in the order it reports them.
pub const VOCABULARY: [&str; 9] = [
    "user", "opera", "music", "travel", "dessert", "cake", "mousse", "birthday", "weather",
];

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Config for a throwaway character under `dir`.
pub fn test_config(dir: &Path) -> MemoryConfig {
    MemoryConfig::default()
        .with_character("tester")
        .with_data_dir(dir)
}

/// Default test services frozen at midnight of `today`.
pub fn services_at(today: NaiveDate) -> Services {
    services_with(
        Arc::new(VocabularyExtractor::new(VOCABULARY)),
        Arc::new(JoinInference::default()),
        today,
    )
}

pub fn services_with(
    extractor: Arc<dyn KeywordExtractor>,
    inference: Arc<dyn TextInference>,
    today: NaiveDate,
) -> Services {
    Services::new(extractor, inference).with_clock(Arc::new(FixedClock::at_date(today)))
}

/// Reports the vocabulary words that occur in the text.
pub struct VocabularyExtractor {
    vocabulary: Vec<String>,
}

impl VocabularyExtractor {
    pub fn new<I, S>(vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vocabulary: vocabulary.into_iter().map(Into::into).collect(),
        }
    }
}

impl KeywordExtractor for VocabularyExtractor {
    fn extract(&self, text: &str, max: usize) -> Result<Vec<String>> {
        Ok(self
            .vocabulary
            .iter()
            .filter(|word| text.contains(word.as_str()))
            .take(max)
            .cloned()
            .collect())
    }
}

pub struct FailingExtractor;

impl KeywordExtractor for FailingExtractor {
    fn extract(&self, _text: &str, _max: usize) -> Result<Vec<String>> {
        Err(Error::Extraction("extractor offline".into()))
    }
}

pub struct FailingInference;

impl TextInference for FailingInference {
    fn run(&self, _prompt: &str) -> Result<String> {
        Err(Error::Inference("model offline".into()))
    }
}

/// Merges by joining the prompt's `- ` lines with ` & `.
#[derive(Default)]
pub struct JoinInference {
    calls: AtomicUsize,
}

impl JoinInference {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextInference for JoinInference {
    fn run(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(prompt
            .lines()
            .filter_map(|line| line.strip_prefix("- "))
            .collect::<Vec<_>>()
            .join(" & "))
    }
}
