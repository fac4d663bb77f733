// Job identity and the filename <-> job id rule shared by staging and reporting.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage namespace the agent stages into.
pub const STAGING_NAMESPACE: &str = "local";
/// Folder inside the namespace owned by the agent.
pub const MANAGED_FOLDER: &str = "Autodrop3D";

const GCODE_SUFFIX: &str = ".gcode";

/// Identifier the remote queue assigned to a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Extract a job id from a bare filename or a full path.
    ///
    /// Keeps the last path segment (either separator) and strips trailing `.gcode`
    /// suffixes. Applying it to its own output changes nothing.
    pub fn from_path(path: &str) -> Self {
        let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let mut id = name;
        while let Some(stripped) = strip_gcode_suffix(id) {
            id = stripped;
        }
        JobId(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of the staged file for this job inside [`STAGING_NAMESPACE`].
    pub fn staged_path(&self) -> String {
        format!("{}/{}{}", MANAGED_FOLDER, self.0, GCODE_SUFFIX)
    }
}

fn strip_gcode_suffix(name: &str) -> Option<&str> {
    let split = name.len().checked_sub(GCODE_SUFFIX.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (stem, suffix) = name.split_at(split);
    suffix.eq_ignore_ascii_case(GCODE_SUFFIX).then_some(stem)
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A job occupying (or about to occupy) the print bed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Location inside [`STAGING_NAMESPACE`].
    pub staged_path: String,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        let staged_path = id.staged_path();
        Self { id, staged_path }
    }
}

/// True when `path` lives under the agent's managed folder.
pub fn is_managed_path(path: &str) -> bool {
    path.trim_start_matches('/').starts_with(MANAGED_FOLDER)
}
