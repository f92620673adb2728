use serde::{Deserialize, Deserializer, Serialize};

/// Findings the analyzer produced for one source file.
///
/// Field names on the wire follow the analyzer's own JSON casing; the
/// `rename` attributes below are the mapping between the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileViolationReport {
    #[serde(rename = "FilePath")]
    pub file_path: String,
    #[serde(rename = "LinesOfCode")]
    pub lines_of_code: i64,
    #[serde(rename = "LinesOfComments")]
    pub lines_of_comments: i64,
    // Go marshals a nil slice as `null`.
    #[serde(rename = "Violations", default, deserialize_with = "null_as_empty")]
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// External rule key, e.g. `"CC"`.
    #[serde(rename = "Type")]
    pub rule_type: String,
    #[serde(rename = "Description")]
    pub description: String,
    /// Source line; zero or negative means the finding is file-level.
    #[serde(rename = "SrcLine")]
    pub src_line: i64,
}

impl Violation {
    /// Line to anchor the issue on, if the analyzer reported a usable one.
    pub fn line(&self) -> Option<u32> {
        if self.src_line > 0 {
            u32::try_from(self.src_line).ok()
        } else {
            None
        }
    }
}

/// Measures the ingestion stage records on a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Non-comment lines of code.
    #[serde(rename = "NCLOC")]
    Ncloc,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Ncloc => "NCLOC",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule identifier scoped to a rule repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleKey {
    pub repository: String,
    pub rule: String,
}

impl RuleKey {
    pub fn of(repository: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            rule: rule.into(),
        }
    }
}

impl std::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.rule)
    }
}

/// Issue submitted to the host for one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIssue {
    pub rule: RuleKey,
    pub message: String,
    /// `None` anchors the issue on the whole file.
    pub line: Option<u32>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Violation>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Violation>>::deserialize(deserializer)?.unwrap_or_default())
}
