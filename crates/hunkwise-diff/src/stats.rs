use std::collections::BTreeMap;
use std::fmt;

use hunkwise_core::{ChangeSet, SemanticGroup};
use serde::{Deserialize, Serialize};

/// Risk bucket used for aggregate counts.
///
/// # Examples
///
/// ```
/// use hunkwise_diff::stats::RiskBucket;
///
/// assert_eq!(RiskBucket::from_score(19), RiskBucket::Low);
/// assert_eq!(RiskBucket::from_score(20), RiskBucket::Medium);
/// assert_eq!(RiskBucket::from_score(50), RiskBucket::High);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBucket {
    /// Score below 20.
    Low,
    /// Score 20 to 49.
    Medium,
    /// Score 50 and above.
    High,
}

impl RiskBucket {
    /// Map a 0-100 score onto a bucket.
    pub fn from_score(score: u32) -> Self {
        if score >= 50 {
            RiskBucket::High
        } else if score >= 20 {
            RiskBucket::Medium
        } else {
            RiskBucket::Low
        }
    }
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskBucket::Low => write!(f, "Low"),
            RiskBucket::Medium => write!(f, "Medium"),
            RiskBucket::High => write!(f, "High"),
        }
    }
}

/// File counts per risk bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskDistribution {
    /// Files scoring 50 or more.
    pub high: usize,
    /// Files scoring 20 to 49.
    pub medium: usize,
    /// Files scoring below 20.
    pub low: usize,
}

impl RiskDistribution {
    fn record(&mut self, score: u32) {
        match RiskBucket::from_score(score) {
            RiskBucket::High => self.high += 1,
            RiskBucket::Medium => self.medium += 1,
            RiskBucket::Low => self.low += 1,
        }
    }
}

/// Aggregate statistics derived from a [`ChangeSet`].
///
/// # Examples
///
/// ```
/// use hunkwise_core::{ChangeSet, FileChange, FileStatus, SemanticGroup};
/// use hunkwise_diff::stats::DiffStats;
///
/// let mut file = FileChange::new("src/a.rs", FileStatus::Modified);
/// file.lines_added = 3;
/// file.risk_score = 55;
/// let stats = DiffStats::from_change_set(&ChangeSet::new("main", "HEAD", vec![file]));
/// assert_eq!(stats.total_files, 1);
/// assert_eq!(stats.total_added, 3);
/// assert_eq!(stats.risk_distribution.high, 1);
/// assert_eq!(stats.group_counts.get(&SemanticGroup::Feature), Some(&1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    /// Number of changed files.
    pub total_files: usize,
    /// Lines added across all files.
    pub total_added: u64,
    /// Lines removed across all files.
    pub total_removed: u64,
    /// Files per semantic group. Groups with no files are absent.
    pub group_counts: BTreeMap<SemanticGroup, usize>,
    /// Files per risk bucket.
    pub risk_distribution: RiskDistribution,
}

impl DiffStats {
    /// Derive statistics from the current state of `change_set`.
    pub fn from_change_set(change_set: &ChangeSet) -> Self {
        let mut stats = DiffStats {
            total_files: change_set.files.len(),
            ..DiffStats::default()
        };
        for file in &change_set.files {
            stats.total_added += u64::from(file.lines_added);
            stats.total_removed += u64::from(file.lines_removed);
            *stats.group_counts.entry(file.semantic_group).or_insert(0) += 1;
            stats.risk_distribution.record(file.risk_score);
        }
        stats
    }

    /// Render the statistics as a markdown string.
    ///
    /// # Examples
    ///
    /// ```
    /// use hunkwise_diff::stats::DiffStats;
    ///
    /// let md = DiffStats::default().to_markdown();
    /// assert!(md.contains("## Statistics"));
    /// ```
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("## Statistics\n\n");
        out.push_str(&format!(
            "**Files:** {} (+{} / -{})\n\n",
            self.total_files, self.total_added, self.total_removed
        ));
        let d = &self.risk_distribution;
        out.push_str(&format!(
            "**Risk:** {} high, {} medium, {} low\n\n",
            d.high, d.medium, d.low
        ));
        if !self.group_counts.is_empty() {
            out.push_str("| Group | Files |\n");
            out.push_str("|-------|-------|\n");
            for (group, count) in &self.group_counts {
                out.push_str(&format!("| {group} | {count} |\n"));
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} files, +{} additions, -{} deletions",
            self.total_files, self.total_added, self.total_removed
        )?;
        let d = &self.risk_distribution;
        writeln!(f, "Risk: {} high, {} medium, {} low", d.high, d.medium, d.low)?;
        if !self.group_counts.is_empty() {
            let groups: Vec<String> = self
                .group_counts
                .iter()
                .map(|(group, count)| format!("{group} {count}"))
                .collect();
            writeln!(f, "Groups: {}", groups.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hunkwise_core::{FileChange, FileStatus};

    fn file(score: u32, group: SemanticGroup, added: u32, removed: u32) -> FileChange {
        let mut f = FileChange::new("x.rs", FileStatus::Modified);
        f.risk_score = score;
        f.semantic_group = group;
        f.lines_added = added;
        f.lines_removed = removed;
        f
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(RiskBucket::from_score(0), RiskBucket::Low);
        assert_eq!(RiskBucket::from_score(49), RiskBucket::Medium);
        assert_eq!(RiskBucket::from_score(100), RiskBucket::High);
    }

    #[test]
    fn aggregates_counts() {
        let set = ChangeSet::new(
            "main",
            "HEAD",
            vec![
                file(65, SemanticGroup::Feature, 220, 0),
                file(25, SemanticGroup::Feature, 3, 0),
                file(0, SemanticGroup::Style, 5, 5),
            ],
        );
        let stats = DiffStats::from_change_set(&set);
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_added, 228);
        assert_eq!(stats.total_removed, 5);
        assert_eq!(
            stats.risk_distribution,
            RiskDistribution { high: 1, medium: 1, low: 1 }
        );
        assert_eq!(stats.group_counts[&SemanticGroup::Feature], 2);
        assert_eq!(stats.group_counts[&SemanticGroup::Style], 1);
        assert!(!stats.group_counts.contains_key(&SemanticGroup::Docs));
    }

    #[test]
    fn empty_set_is_all_zero() {
        let stats = DiffStats::from_change_set(&ChangeSet::new("a", "b", Vec::new()));
        assert_eq!(stats, DiffStats::default());
    }

    #[test]
    fn json_uses_group_tags_as_keys() {
        let set = ChangeSet::new("a", "b", vec![file(0, SemanticGroup::Docs, 1, 0)]);
        let json = serde_json::to_value(DiffStats::from_change_set(&set)).unwrap();
        assert_eq!(json["groupCounts"]["docs"], 1);
        assert_eq!(json["riskDistribution"]["low"], 1);
        assert_eq!(json["totalAdded"], 1);
    }

    #[test]
    fn display_and_markdown() {
        let set = ChangeSet::new("a", "b", vec![file(30, SemanticGroup::Bugfix, 2, 1)]);
        let stats = DiffStats::from_change_set(&set);
        let text = stats.to_string();
        assert!(text.contains("1 files, +2 additions, -1 deletions"));
        assert!(text.contains("Groups: bugfix 1"));
        let md = stats.to_markdown();
        assert!(md.contains("| bugfix | 1 |"));
        assert!(md.contains("0 high, 1 medium, 0 low"));
    }
}
