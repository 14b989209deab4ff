//! The parts of a GitHub push event the reconciler reads.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushEvent {
    /// Fully qualified ref that was pushed, e.g. `refs/heads/master`.
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: PushRepository,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushRepository {
    /// `owner/name`.
    pub full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PushCommit {
    pub id: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl PushEvent {
    /// Branch name if the ref points at a branch.
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }
}
