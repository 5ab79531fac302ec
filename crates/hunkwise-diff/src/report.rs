use std::fmt;

use hunkwise_core::{ChangeSet, FileChange};
use serde::Serialize;

use crate::stats::{DiffStats, RiskBucket};

/// A change set ready for output, with derived statistics and the outcome of
/// any AI pass.
///
/// # Examples
///
/// ```
/// use hunkwise_core::ChangeSet;
/// use hunkwise_diff::report::Report;
///
/// let report = Report::new(ChangeSet::new("main", "HEAD", Vec::new()));
/// assert!(report.to_string().contains("main..HEAD"));
/// assert!(report.to_markdown().contains("# Diff Triage"));
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// The analyzed change set.
    pub change_set: ChangeSet,
    /// Aggregate statistics.
    pub stats: DiffStats,
    /// Error from the AI pass, if it ran and failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_error: Option<String>,
}

impl Report {
    /// Wrap `change_set`, deriving its statistics.
    pub fn new(change_set: ChangeSet) -> Self {
        let stats = DiffStats::from_change_set(&change_set);
        Self {
            change_set,
            stats,
            ai_error: None,
        }
    }

    /// Attach the error reported by the AI pass.
    pub fn with_ai_error(mut self, error: Option<String>) -> Self {
        self.ai_error = error;
        self
    }

    /// Render the report as a markdown string.
    pub fn to_markdown(&self) -> String {
        let set = &self.change_set;
        let mut out = String::new();
        out.push_str("# Diff Triage\n\n");
        out.push_str(&format!("`{}..{}`\n\n", set.base_ref, set.head_ref));

        if let Some(err) = &self.ai_error {
            out.push_str(&format!("> AI analysis failed: {err}\n\n"));
        }

        if !set.files.is_empty() {
            out.push_str("| File | Status | Group | +/- | Risk |\n");
            out.push_str("|------|--------|-------|-----|------|\n");
            for file in &set.files {
                out.push_str(&format!(
                    "| `{}` | {} | {} | +{}/-{} | {} ({}) |\n",
                    file.path,
                    file.status,
                    file.semantic_group,
                    file.lines_added,
                    file.lines_removed,
                    file.risk_score,
                    RiskBucket::from_score(file.risk_score),
                ));
            }
            out.push('\n');

            for file in set.files.iter().filter(|f| has_details(f)) {
                out.push_str(&format!("### `{}`\n\n", file.path));
                if let Some(summary) = &file.summary {
                    out.push_str(&format!("{summary}\n\n"));
                }
                for reason in &file.risk_reasons {
                    out.push_str(&format!("- {reason}\n"));
                }
                if !file.risk_reasons.is_empty() {
                    out.push('\n');
                }
                for hunk in &file.hunks {
                    if let Some(summary) = &hunk.summary {
                        out.push_str(&format!("- `{}` {summary}\n", hunk.header));
                    }
                }
                if file.hunks.iter().any(|h| h.summary.is_some()) {
                    out.push('\n');
                }
                if let Some(items) = &file.checklist {
                    out.push_str("**Review checklist**\n\n");
                    for item in items {
                        out.push_str(&format!("- [ ] {item}\n"));
                    }
                    out.push('\n');
                }
            }
        }

        out.push_str(&self.stats.to_markdown());
        out
    }
}

fn has_details(file: &FileChange) -> bool {
    !file.risk_reasons.is_empty()
        || file.summary.is_some()
        || file.checklist.is_some()
        || file.hunks.iter().any(|h| h.summary.is_some())
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = &self.change_set;
        writeln!(f, "Diff Triage ({}..{})", set.base_ref, set.head_ref)?;
        writeln!(f, "{}", "=".repeat(40))?;

        if let Some(err) = &self.ai_error {
            writeln!(f, "AI analysis failed: {err}")?;
        }

        if !set.files.is_empty() {
            writeln!(
                f,
                "{:<48} {:>9} {:>9} {:>11} {:>5}",
                "File", "Status", "Group", "+/-", "Risk"
            )?;
            writeln!(f, "{}", "-".repeat(86))?;
            for file in &set.files {
                let lines = format!("+{}/-{}", file.lines_added, file.lines_removed);
                writeln!(
                    f,
                    "{:<48} {:>9} {:>9} {:>11} {:>5}",
                    file.path,
                    file.status.to_string(),
                    file.semantic_group.to_string(),
                    lines,
                    file.risk_score
                )?;
                if let Some(summary) = &file.summary {
                    writeln!(f, "    {summary}")?;
                }
                for reason in &file.risk_reasons {
                    writeln!(f, "    - {reason}")?;
                }
                for hunk in &file.hunks {
                    if let Some(summary) = &hunk.summary {
                        writeln!(f, "    {} {summary}", hunk.header)?;
                    }
                }
                for item in file.checklist.iter().flatten() {
                    writeln!(f, "    [ ] {item}")?;
                }
            }
            writeln!(f)?;
        }

        write!(f, "{}", self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hunkwise_core::{FileChange, FileStatus, Hunk};

    fn report() -> Report {
        let mut file = FileChange::new("auth/login.go", FileStatus::Added);
        file.lines_added = 220;
        file.risk_score = 65;
        file.risk_reasons = vec!["Touches authentication/authorization code".into()];
        Report::new(ChangeSet::new("main", "feature", vec![file]))
    }

    #[test]
    fn text_lists_files_and_reasons() {
        let text = report().to_string();
        assert!(text.contains("auth/login.go"));
        assert!(text.contains("- Touches authentication/authorization code"));
        assert!(text.contains("1 files, +220 additions, -0 deletions"));
        assert!(!text.contains("AI analysis failed"));
    }

    #[test]
    fn markdown_includes_bucket_and_error() {
        let md = report()
            .with_ai_error(Some("preflight failed: down".into()))
            .to_markdown();
        assert!(md.contains("| `auth/login.go` | added | feature | +220/-0 | 65 (High) |"));
        assert!(md.contains("> AI analysis failed: preflight failed: down"));
        assert!(md.contains("## Statistics"));
    }

    fn described() -> Report {
        let mut file = FileChange::new("src/cache.rs", FileStatus::Modified);
        file.summary = Some("Adds an eviction pass.".into());
        file.hunks = vec![Hunk {
            header: "@@ -10,2 +10,6 @@".into(),
            content: "+evict()\n".into(),
            lines_added: 1,
            lines_removed: 0,
            summary: Some("Evicts stale entries on insert.".into()),
        }];
        file.checklist = Some(vec!["Check eviction under contention".into()]);
        Report::new(ChangeSet::new("main", "feature", vec![file]))
    }

    #[test]
    fn markdown_shows_hunk_summaries_and_checklist() {
        let md = described().to_markdown();
        assert!(md.contains("### `src/cache.rs`"));
        assert!(md.contains("Adds an eviction pass."));
        assert!(md.contains("- `@@ -10,2 +10,6 @@` Evicts stale entries on insert."));
        assert!(md.contains("**Review checklist**"));
        assert!(md.contains("- [ ] Check eviction under contention"));
    }

    #[test]
    fn text_shows_hunk_summaries_and_checklist() {
        let text = described().to_string();
        assert!(text.contains("    Adds an eviction pass."));
        assert!(text.contains("    @@ -10,2 +10,6 @@ Evicts stale entries on insert."));
        assert!(text.contains("    [ ] Check eviction under contention"));
    }

    #[test]
    fn json_shape() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["changeSet"]["files"][0]["riskScore"], 65);
        assert_eq!(json["stats"]["totalFiles"], 1);
        assert!(json.get("aiError").is_none());
    }
}
