//! External collaborators of the memory subsystem.
//!
//! The tiers never talk to a model directly. They see two narrow interfaces:
//!
//! - [`KeywordExtractor`]: text in, at most `max` broad keywords out
//! - [`TextInference`]: prompt in, text out
//!
//! Both may fail. Callers inside this crate recover with [`anchors_or_fallback`]
//! and the join fallback in consolidation, so a broken model never reaches the
//! conversational layer.
//!
//! [`CommandInference`] runs a local inference executable as `<program> --prompt <prompt>`,
//! and [`InferenceKeywordExtractor`] builds keyword extraction on top of any inference backend.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::types::normalize_anchors;

/// Extracts bounded, generic keywords ("anchors") from text.
pub trait KeywordExtractor: Send + Sync {
    /// Return an ordered list of at most `max` keywords.
    fn extract(&self, text: &str, max: usize) -> Result<Vec<String>>;
}

/// Runs a prompt through a text model.
pub trait TextInference: Send + Sync {
    fn run(&self, prompt: &str) -> Result<String>;
}

/// Collaborators shared by every tier store and the manager.
#[derive(Clone)]
pub struct Services {
    pub extractor: Arc<dyn KeywordExtractor>,
    pub inference: Arc<dyn TextInference>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Bundle the collaborators with the system clock.
    pub fn new(extractor: Arc<dyn KeywordExtractor>, inference: Arc<dyn TextInference>) -> Self {
        Self {
            extractor,
            inference,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use one inference executable for both merging and keyword extraction.
    pub fn command(program: impl Into<PathBuf>) -> Result<Self> {
        let inference: Arc<dyn TextInference> = Arc::new(CommandInference::locate(program)?);
        let extractor = Arc::new(InferenceKeywordExtractor::new(inference.clone()));
        Ok(Self::new(extractor, inference))
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Naive whitespace tokenization truncated to `max` tokens.
pub fn fallback_anchors(text: &str, max: usize) -> Vec<String> {
    normalize_anchors(text.split_whitespace().map(String::from), max)
}

/// Ask the extractor for anchors; degrade to [`fallback_anchors`] on failure
/// or when nothing usable comes back.
pub fn anchors_or_fallback(extractor: &dyn KeywordExtractor, text: &str, max: usize) -> Vec<String> {
    match extractor.extract(text, max) {
        Ok(anchors) => {
            let anchors = normalize_anchors(anchors, max);
            if anchors.is_empty() {
                debug!("Extractor returned no anchors, using whitespace fallback");
                fallback_anchors(text, max)
            } else {
                anchors
            }
        }
        Err(e) => {
            warn!("Keyword extraction failed, using whitespace fallback: {}", e);
            fallback_anchors(text, max)
        }
    }
}

/// Inference backed by a local executable.
#[derive(Debug, Clone)]
pub struct CommandInference {
    program: PathBuf,
}

impl CommandInference {
    /// Wrap an executable path without checking it.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Resolve the executable, searching `PATH` for bare names.
    pub fn locate(program: impl Into<PathBuf>) -> Result<Self> {
        let program = program.into();
        if program.exists() {
            return Ok(Self::new(program));
        }
        match which::which(&program) {
            Ok(path) => {
                debug!("Found inference program at: {:?}", path);
                Ok(Self::new(path))
            }
            Err(_) => Err(Error::CommandNotFound(program.display().to_string())),
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

impl TextInference for CommandInference {
    fn run(&self, prompt: &str) -> Result<String> {
        let output = Command::new(&self.program)
            .args(["--prompt", prompt])
            .output()
            .map_err(|e| {
                Error::Inference(format!("failed to launch {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::command_failed(
                self.program.display().to_string(),
                stderr.trim(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Keyword extraction that prompts an inference backend for a comma-separated list.
pub struct InferenceKeywordExtractor {
    inference: Arc<dyn TextInference>,
}

impl InferenceKeywordExtractor {
    pub fn new(inference: Arc<dyn TextInference>) -> Self {
        Self { inference }
    }

    fn prompt(text: &str, max: usize) -> String {
        format!(
            "Extract at most {max} broad keywords from the text below for memory retrieval.\n\
             Keep them generic (\"user\", \"birthday\", \"date\"), not detailed phrases.\n\
             Separate keywords with commas and output nothing else.\n\
             Text: {text}"
        )
    }

    /// Split a model answer into keywords.
    pub fn parse(answer: &str, max: usize) -> Vec<String> {
        normalize_anchors(
            answer
                .split([',', '，', '\n'])
                .map(str::trim)
                .filter(|kw| !kw.is_empty())
                .map(String::from),
            max,
        )
    }
}

impl KeywordExtractor for InferenceKeywordExtractor {
    fn extract(&self, text: &str, max: usize) -> Result<Vec<String>> {
        let answer = self.inference.run(&Self::prompt(text, max))?;
        let keywords = Self::parse(&answer, max);
        if keywords.is_empty() {
            return Err(Error::Extraction(format!(
                "no keywords in model output: {:?}",
                answer
            )));
        }
        Ok(keywords)
    }
}
