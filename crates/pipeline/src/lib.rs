//! Hand-off from a validated Oracle reply to the final site files.
//!
//! A file-set reply replaces the current files wholesale. A patch reply is
//! run through the patch engine against the current `index.html` and
//! `styles.css`; every other file passes through untouched.

use serde::Serialize;

use pagesmith_core::dom::ParseError;
use pagesmith_core::patch::{AppliedEntry, PatchEngine, PatchSettings};
use pagesmith_core::types::FileSet;
use pagesmith_oracle::{OracleOutput, INDEX_HTML};

pub const STYLES_CSS: &str = "styles.css";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("current files have no `{0}` to patch")]
    MissingFile(&'static str),

    #[error("cannot patch index.html: {0}")]
    Parse(#[from] ParseError),
}

/// How the final files were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Files,
    Patch,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Patch => "patch",
        }
    }
}

/// Final site files plus what was done to get there.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSite {
    pub files: FileSet,
    pub mode: OutputMode,
    /// Mutated node count for patches; zero for file sets.
    pub changed: usize,
    pub applied: Vec<AppliedEntry>,
}

pub struct Pipeline {
    engine: PatchEngine,
    settings: PatchSettings,
}

impl Pipeline {
    pub fn new(engine: PatchEngine, settings: PatchSettings) -> Self {
        Self { engine, settings }
    }

    pub fn settings(&self) -> &PatchSettings {
        &self.settings
    }

    /// Turn `output` into the final file set for a job whose files are
    /// currently `current`.
    pub fn apply_output(&self, current: &FileSet, output: OracleOutput) -> Result<GeneratedSite, PipelineError> {
        match output {
            OracleOutput::Files(files) => Ok(GeneratedSite {
                files,
                mode: OutputMode::Files,
                changed: 0,
                applied: Vec::new(),
            }),
            OracleOutput::Ops { ops, root_selector } => {
                let html = current
                    .get(INDEX_HTML)
                    .ok_or(PipelineError::MissingFile(INDEX_HTML))?;
                let css = current.get(STYLES_CSS).map(String::as_str).unwrap_or_default();

                let request = self.settings.request(html.as_str(), css, ops, root_selector);
                let result = self.engine.apply(&request)?;
                tracing::debug!(
                    changed = result.changed_count,
                    ops = request.ops.len(),
                    "Patch output applied"
                );

                let mut files = current.clone();
                files.insert(INDEX_HTML.to_string(), result.html);
                if current.contains_key(STYLES_CSS) || !result.css.is_empty() {
                    files.insert(STYLES_CSS.to_string(), result.css);
                }
                Ok(GeneratedSite {
                    files,
                    mode: OutputMode::Patch,
                    changed: result.changed_count,
                    applied: result.applied_log,
                })
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PatchEngine::default(), PatchSettings::default())
    }
}
