use serde::{Deserialize, Serialize};

/// Severity assigned to one line of transcoder output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineClass {
    Progress,
    Warning,
    Verbose,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Case-sensitive substrings marking a progress line.
    pub progress_markers: Vec<String>,
    /// Case-insensitive substrings marking a problem worth a warning.
    pub error_keywords: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            progress_markers: vec!["frame=".into(), "speed=".into()],
            error_keywords: vec![
                "error".into(),
                "failed".into(),
                "no such file or directory".into(),
                "invalid argument".into(),
            ],
        }
    }
}

#[derive(Clone, Debug)]
pub struct LineClassifier {
    progress_markers: Vec<String>,
    error_keywords: Vec<String>,
}

impl LineClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            progress_markers: config.progress_markers.clone(),
            error_keywords: config
                .error_keywords
                .iter()
                .map(|keyword| keyword.to_lowercase())
                .collect(),
        }
    }

    pub fn classify(&self, line: &str) -> LineClass {
        if self
            .progress_markers
            .iter()
            .any(|marker| line.contains(marker.as_str()))
        {
            return LineClass::Progress;
        }

        let lowered = line.to_lowercase();
        if self
            .error_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
        {
            return LineClass::Warning;
        }

        LineClass::Verbose
    }

    /// Classifies `line` and emits it at the matching level.
    pub fn log(&self, stream: &str, line: &str) -> LineClass {
        let class = self.classify(line);
        match class {
            LineClass::Progress => tracing::info!(stream = %stream, message = %line, "ffmpeg progress"),
            LineClass::Warning => tracing::warn!(stream = %stream, message = %line, "ffmpeg message"),
            LineClass::Verbose => tracing::debug!(stream = %stream, message = %line, "ffmpeg message"),
        }
        class
    }
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}
