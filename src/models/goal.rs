use serde::{Deserialize, Serialize};

/// A goal for one category and one period (week or month key).
/// Setting a goal for a period overwrites any previous one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub title: String,
    pub completed: bool,
}
