//! Result persistence.
//!
//! The final answer of a run is written through a `ResultSink` under a
//! filename derived from the question.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

/// Words of the question kept in a derived filename.
const MAX_FILENAME_WORDS: usize = 8;

/// Durable destination for final answers.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist `content` under `filename`, returning where it was written.
    async fn save(&self, filename: &str, content: &str) -> Result<PathBuf>;
}

/// Derive `snake_case_question_YYYYMMDD_HHMMSS.txt` from a question.
pub fn derive_filename(question: &str, at: DateTime<Utc>) -> String {
    let words: Vec<String> = question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(MAX_FILENAME_WORDS)
        .map(|w| w.to_lowercase())
        .collect();
    let stem = if words.is_empty() {
        "research".to_string()
    } else {
        words.join("_")
    };
    format!("{stem}_{}.txt", at.format("%Y%m%d_%H%M%S"))
}

/// Writes results as files inside a directory, creating it on demand.
pub struct FileResultSink {
    directory: PathBuf,
}

impl FileResultSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[async_trait]
impl ResultSink for FileResultSink {
    async fn save(&self, filename: &str, content: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.directory.join(filename);
        tokio::fs::write(&path, content).await?;
        info!(path = %path.display(), bytes = content.len(), "Saved research result");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_derive_filename_snake_case() {
        assert_eq!(
            derive_filename("What is the capital of Colorado?", fixed_time()),
            "what_is_the_capital_of_colorado_20240309_140507.txt"
        );
    }

    #[test]
    fn test_derive_filename_limits_words() {
        let name = derive_filename("one two three four five six seven eight nine ten", fixed_time());
        assert!(name.starts_with("one_two_three_four_five_six_seven_eight_2024"));
    }

    #[test]
    fn test_derive_filename_empty_question() {
        assert_eq!(
            derive_filename("?!", fixed_time()),
            "research_20240309_140507.txt"
        );
    }

    #[tokio::test]
    async fn test_file_sink_writes_content() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileResultSink::new(dir.path().join("out"));
        let path = sink.save("answer.txt", "Denver").await.unwrap();
        assert_eq!(path, dir.path().join("out").join("answer.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "Denver");
    }
}
