use serde_json::{Map, Value};

use pagesmith_core::types::FileSet;

use crate::error::OracleError;

/// The one file every generated file set must contain.
pub const INDEX_HTML: &str = "index.html";

/// A structurally valid backend reply.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutput {
    /// Complete replacement file set.
    Files(FileSet),
    /// Patch operations against the current files. Operations stay raw;
    /// the patch engine decides what each one means.
    Ops {
        ops: Vec<Value>,
        root_selector: Option<String>,
    },
}

impl OracleOutput {
    /// Check the shape of a backend reply.
    ///
    /// * `{"ops": [...], "rootSelector"?: "..."}` is a patch; `ops` must be
    ///   an array.
    /// * `{"files": {...}}` or a bare `{"index.html": "...", ...}` object is
    ///   a file set; every value must be a string and `index.html` must be
    ///   present and non-blank.
    pub fn from_value(value: Value) -> Result<Self, OracleError> {
        let Value::Object(mut object) = value else {
            return Err(OracleError::InvalidOutput("reply is not a JSON object".into()));
        };

        if let Some(ops) = object.remove("ops") {
            let Value::Array(ops) = ops else {
                return Err(OracleError::InvalidOutput("`ops` is not an array".into()));
            };
            let root_selector = object
                .get("rootSelector")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from);
            return Ok(Self::Ops { ops, root_selector });
        }

        let files = match object.remove("files") {
            Some(Value::Object(files)) => files,
            Some(_) => return Err(OracleError::InvalidOutput("`files` is not an object".into())),
            None => object,
        };
        file_set(files).map(Self::Files)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Files(_) => "files",
            Self::Ops { .. } => "ops",
        }
    }
}

fn file_set(object: Map<String, Value>) -> Result<FileSet, OracleError> {
    let mut files = FileSet::new();
    for (name, content) in object {
        let Value::String(content) = content else {
            return Err(OracleError::InvalidOutput(format!("file `{name}` is not a string")));
        };
        files.insert(name, content);
    }
    match files.get(INDEX_HTML) {
        Some(html) if !html.trim().is_empty() => Ok(files),
        Some(_) => Err(OracleError::InvalidOutput(format!("`{INDEX_HTML}` is empty"))),
        None => Err(OracleError::InvalidOutput(format!("missing `{INDEX_HTML}`"))),
    }
}
