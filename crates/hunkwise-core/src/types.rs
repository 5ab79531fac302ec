use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Upper bound of every risk score, heuristic or AI-derived.
pub const MAX_RISK_SCORE: u32 = 100;

/// The structured result of one diff comparison.
///
/// Created once per parse/reload. `generation` orders snapshots so a stale
/// background result can never replace a newer reload.
///
/// # Examples
///
/// ```
/// use hunkwise_core::ChangeSet;
///
/// let set = ChangeSet::new("main", "HEAD", Vec::new());
/// assert!(set.files.is_empty());
/// assert_eq!(set.generation, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Base side of the comparison (a ref, or `"staged"`/`"index"`).
    pub base_ref: String,
    /// Head side of the comparison.
    pub head_ref: String,
    /// Snapshot generation, assigned by the snapshot holder.
    #[serde(default)]
    pub generation: u64,
    /// Changed files, highest risk first after analysis.
    pub files: Vec<FileChange>,
}

impl ChangeSet {
    /// Create a change set at generation zero.
    pub fn new(base_ref: impl Into<String>, head_ref: impl Into<String>, files: Vec<FileChange>) -> Self {
        Self {
            base_ref: base_ref.into(),
            head_ref: head_ref.into(),
            generation: 0,
            files,
        }
    }
}

/// One file's change record with heuristic and AI-derived metadata.
///
/// # Examples
///
/// ```
/// use hunkwise_core::{FileChange, FileStatus, SemanticGroup};
///
/// let file = FileChange::new("src/lib.rs", FileStatus::Modified);
/// assert_eq!(file.risk_score, 0);
/// assert_eq!(file.semantic_group, SemanticGroup::Feature);
/// assert!(file.old_path.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Path on the new side (or the removed path for deletions).
    pub path: String,
    /// Previous path, set only when it differs from `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    /// Kind of change.
    pub status: FileStatus,
    /// Language tag derived from the file name.
    pub language: String,
    /// Hunks in diff order.
    pub hunks: Vec<Hunk>,
    /// Hunk-region text, fed to heuristics and prompts.
    pub raw_diff: String,
    /// Sum of `lines_added` over hunks.
    pub lines_added: u32,
    /// Sum of `lines_removed` over hunks.
    pub lines_removed: u32,
    /// Risk score in `0..=100`.
    pub risk_score: u32,
    /// Ordered, case-insensitively unique, at most six entries.
    pub risk_reasons: Vec<String>,
    /// Coarse intent classification.
    pub semantic_group: SemanticGroup,
    /// Optional natural-language summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Optional review checklist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist: Option<Vec<String>>,
}

impl FileChange {
    /// Create an empty record for `path` with no hunks and default analysis fields.
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            old_path: None,
            status,
            language: "plaintext".into(),
            hunks: Vec::new(),
            raw_diff: String::new(),
            lines_added: 0,
            lines_removed: 0,
            risk_score: 0,
            risk_reasons: Vec::new(),
            semantic_group: SemanticGroup::Feature,
            summary: None,
            checklist: None,
        }
    }

    /// Total changed lines (added plus removed).
    pub fn total_lines(&self) -> u32 {
        self.lines_added + self.lines_removed
    }
}

/// A single `@@`-delimited block within a file diff.
///
/// # Examples
///
/// ```
/// use hunkwise_core::Hunk;
///
/// let hunk = Hunk {
///     header: "@@ -1,2 +1,3 @@".into(),
///     content: " a\n+b\n c\n".into(),
///     lines_added: 1,
///     lines_removed: 0,
///     summary: None,
/// };
/// assert_eq!(hunk.lines_added, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    /// The `@@` header line.
    pub header: String,
    /// Raw lines including `+`/`-`/space prefixes, newline-terminated.
    pub content: String,
    /// Lines starting with `+`.
    pub lines_added: u32,
    /// Lines starting with `-`.
    pub lines_removed: u32,
    /// Optional natural-language summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Kind of change recorded for a file.
///
/// # Examples
///
/// ```
/// use hunkwise_core::FileStatus;
///
/// assert_eq!(FileStatus::Renamed.to_string(), "renamed");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Newly created file.
    Added,
    /// Existing file edited in place.
    Modified,
    /// File removed.
    Deleted,
    /// File moved, possibly with edits.
    Renamed,
    /// Binary content; no textual hunks.
    Binary,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Added => write!(f, "added"),
            FileStatus::Modified => write!(f, "modified"),
            FileStatus::Deleted => write!(f, "deleted"),
            FileStatus::Renamed => write!(f, "renamed"),
            FileStatus::Binary => write!(f, "binary"),
        }
    }
}

/// Coarse intent classification of a file change.
///
/// # Examples
///
/// ```
/// use hunkwise_core::SemanticGroup;
///
/// assert_eq!(SemanticGroup::normalize(" BugFix "), Some(SemanticGroup::Bugfix));
/// assert_eq!(SemanticGroup::normalize("chore"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticGroup {
    /// New behavior.
    Feature,
    /// Defect fix.
    Bugfix,
    /// Restructuring without behavior change.
    Refactor,
    /// Test code.
    Test,
    /// Configuration or build files.
    Config,
    /// Documentation.
    Docs,
    /// Stylesheets.
    Style,
}

impl SemanticGroup {
    /// All seven tags in display order.
    pub const ALL: [SemanticGroup; 7] = [
        SemanticGroup::Feature,
        SemanticGroup::Bugfix,
        SemanticGroup::Refactor,
        SemanticGroup::Test,
        SemanticGroup::Config,
        SemanticGroup::Docs,
        SemanticGroup::Style,
    ];

    /// Map a free-form tag onto a known group, ignoring case and surrounding
    /// whitespace. Unknown tags yield `None`.
    pub fn normalize(tag: &str) -> Option<Self> {
        tag.parse().ok()
    }

    /// Lowercase tag as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            SemanticGroup::Feature => "feature",
            SemanticGroup::Bugfix => "bugfix",
            SemanticGroup::Refactor => "refactor",
            SemanticGroup::Test => "test",
            SemanticGroup::Config => "config",
            SemanticGroup::Docs => "docs",
            SemanticGroup::Style => "style",
        }
    }
}

impl fmt::Display for SemanticGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SemanticGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "feature" => Ok(SemanticGroup::Feature),
            "bugfix" => Ok(SemanticGroup::Bugfix),
            "refactor" => Ok(SemanticGroup::Refactor),
            "test" => Ok(SemanticGroup::Test),
            "config" => Ok(SemanticGroup::Config),
            "docs" => Ok(SemanticGroup::Docs),
            "style" => Ok(SemanticGroup::Style),
            other => Err(format!("unknown semantic group: {other}")),
        }
    }
}

/// How sure the external scorer claims to be.
///
/// Unknown or missing values count as [`Confidence::Medium`].
///
/// # Examples
///
/// ```
/// use hunkwise_core::Confidence;
///
/// assert_eq!(Confidence::parse("HIGH"), Confidence::High);
/// assert_eq!(Confidence::parse("certain"), Confidence::Medium);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Low certainty.
    Low,
    /// Medium certainty; also the fallback for unrecognized values.
    #[default]
    Medium,
    /// High certainty.
    High,
}

impl Confidence {
    /// Lenient parse: anything other than `low`/`high` is medium.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" => Confidence::Low,
            "high" => Confidence::High,
            _ => Confidence::Medium,
        }
    }
}

/// Risk assessment returned by an external scorer for one file.
///
/// # Examples
///
/// ```
/// use hunkwise_core::{AiAssessment, Confidence, SemanticGroup};
///
/// let a = AiAssessment::new(140, vec!["touches auth".into()], "Feature", "high");
/// assert_eq!(a.risk_score, 100);
/// assert_eq!(a.semantic_group, Some(SemanticGroup::Feature));
/// assert_eq!(a.confidence, Confidence::High);
///
/// let b = AiAssessment::new(-5, vec![], "chore", "");
/// assert_eq!(b.risk_score, 0);
/// assert_eq!(b.semantic_group, None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAssessment {
    /// Score clamped to `0..=100`.
    pub risk_score: u32,
    /// Ordered short reasons.
    pub reasons: Vec<String>,
    /// Group, when the scorer returned one of the seven known tags.
    pub semantic_group: Option<SemanticGroup>,
    /// Claimed certainty.
    pub confidence: Confidence,
}

impl AiAssessment {
    /// Build an assessment from raw scorer output, clamping and normalizing.
    pub fn new(risk_score: i64, reasons: Vec<String>, semantic_group: &str, confidence: &str) -> Self {
        Self {
            risk_score: risk_score.clamp(0, i64::from(MAX_RISK_SCORE)) as u32,
            reasons,
            semantic_group: SemanticGroup::normalize(semantic_group),
            confidence: Confidence::parse(confidence),
        }
    }
}

/// Output format for CLI results.
///
/// # Examples
///
/// ```
/// use hunkwise_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
