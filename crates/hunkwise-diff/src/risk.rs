use hunkwise_core::{ChangeSet, FileChange, FileStatus, SemanticGroup, MAX_RISK_SCORE};

use crate::language::{basename, extension};

/// Maximum number of reasons kept on a file.
pub const MAX_REASONS: usize = 6;

/// A static rule matched against a file's path and diff text.
///
/// Path substrings are checked against the lowercased path first; content
/// substrings are only consulted when no path substring hit.
#[derive(Debug)]
pub struct RiskPattern {
    /// Lowercase substrings looked for in the file path.
    pub path_substrings: &'static [&'static str],
    /// Substrings looked for (case-insensitively) in the raw diff.
    pub content_substrings: &'static [&'static str],
    /// Points added on match.
    pub score: u32,
    /// Reason appended on match.
    pub reason: &'static str,
}

/// The ordered pattern table. Order decides reason order.
pub static RISK_PATTERNS: [RiskPattern; 10] = [
    RiskPattern {
        path_substrings: &[
            "auth", "login", "session", "token", "oauth", "jwt", "credential", "password", "secret",
        ],
        content_substrings: &[],
        score: 30,
        reason: "Touches authentication/authorization code",
    },
    RiskPattern {
        path_substrings: &["crypto", "encrypt", "decrypt", "hash", "cert", "tls", "ssl"],
        content_substrings: &[],
        score: 30,
        reason: "Touches cryptography/security code",
    },
    RiskPattern {
        path_substrings: &["migration", "schema", "database", "db"],
        content_substrings: &[
            "CREATE TABLE",
            "ALTER TABLE",
            "DROP TABLE",
            "CREATE INDEX",
            "DROP INDEX",
        ],
        score: 25,
        reason: "Database schema or migration change",
    },
    RiskPattern {
        path_substrings: &[],
        content_substrings: &[
            "SELECT ", "INSERT ", "UPDATE ", "DELETE ", "exec(", "raw(", "rawQuery", "execute(",
        ],
        score: 20,
        reason: "Contains raw SQL or query execution",
    },
    RiskPattern {
        path_substrings: &["api/", "routes", "handler", "controller", "endpoint", "middleware"],
        content_substrings: &[],
        score: 20,
        reason: "Modifies public API surface or middleware",
    },
    RiskPattern {
        path_substrings: &["permission", "rbac", "role", "access", "policy", "acl"],
        content_substrings: &[],
        score: 25,
        reason: "Touches permission/access control logic",
    },
    RiskPattern {
        path_substrings: &[],
        content_substrings: &["panic(", "os.Exit", "log.Fatal", "process.exit"],
        score: 15,
        reason: "Contains abrupt termination calls",
    },
    RiskPattern {
        path_substrings: &[".env", "config", "setting"],
        content_substrings: &[],
        score: 15,
        reason: "Configuration file change",
    },
    RiskPattern {
        path_substrings: &[
            "docker", "k8s", "kubernetes", "deploy", "ci", "cd", "pipeline", "terraform", ".tf",
        ],
        content_substrings: &[],
        score: 15,
        reason: "Infrastructure/deployment configuration change",
    },
    RiskPattern {
        path_substrings: &["payment", "billing", "invoice", "stripe", "subscription", "charge"],
        content_substrings: &[],
        score: 25,
        reason: "Touches payment/billing code",
    },
];

impl RiskPattern {
    /// Whether this pattern applies to a lowercased path and lowercased diff.
    pub fn matches(&self, path_lower: &str, content_lower: &str) -> bool {
        if self.path_substrings.iter().any(|p| path_lower.contains(p)) {
            return true;
        }
        self.content_substrings
            .iter()
            .any(|c| content_lower.contains(&c.to_lowercase()))
    }
}

/// Compute the heuristic risk score and reasons for one file.
///
/// Deterministic: the same file always yields the same result. The score is
/// clamped to `0..=100` and reasons are merged (deduplicated, capped at
/// [`MAX_REASONS`]).
///
/// # Examples
///
/// ```
/// use hunkwise_core::{FileChange, FileStatus};
/// use hunkwise_diff::risk::score_risk;
///
/// let mut file = FileChange::new("src/auth/session.rs", FileStatus::Modified);
/// file.raw_diff = "@@ -1 +1 @@\n-a\n+b".into();
/// let (score, reasons) = score_risk(&file);
/// assert_eq!(score, 30);
/// assert_eq!(reasons, vec!["Touches authentication/authorization code"]);
/// ```
pub fn score_risk(file: &FileChange) -> (u32, Vec<String>) {
    let path_lower = file.path.to_lowercase();
    let content_lower = file.raw_diff.to_lowercase();
    let mut score = 0u32;
    let mut reasons: Vec<String> = Vec::new();

    for pattern in RISK_PATTERNS.iter() {
        if pattern.matches(&path_lower, &content_lower) {
            score += pattern.score;
            reasons.push(pattern.reason.to_string());
        }
    }

    let total = file.total_lines();
    let size_bonus = if total > 200 {
        Some((15, "Large change (200+ lines)"))
    } else if total > 100 {
        Some((10, "Medium-large change (100+ lines)"))
    } else if total > 50 {
        Some((5, "Moderate change (50+ lines)"))
    } else {
        None
    };
    if let Some((bonus, reason)) = size_bonus {
        score += bonus;
        reasons.push(reason.to_string());
    }

    if file.lines_removed > file.lines_added.saturating_mul(2) && file.lines_removed > 10 {
        score += 10;
        reasons.push("Significant code removal".to_string());
    }

    if removes_error_handling(&content_lower) {
        score += 15;
        reasons.push("Removes error handling".to_string());
    }

    (score.min(MAX_RISK_SCORE), merge_reasons(&reasons, &[]))
}

/// A removed line that starts, after indentation, with an error-handling construct.
fn removes_error_handling(content_lower: &str) -> bool {
    content_lower.lines().any(|line| {
        let Some(removed) = line.strip_prefix('-') else {
            return false;
        };
        let code = removed.trim_start_matches([' ', '\t']);
        code.starts_with("if err") || code.starts_with("catch") || code.starts_with("except")
    })
}

/// Assign a semantic group using a first-match decision list over path,
/// extension, diff keywords, status and line counts.
///
/// # Examples
///
/// ```
/// use hunkwise_core::{FileChange, FileStatus, SemanticGroup};
/// use hunkwise_diff::risk::classify_group;
///
/// let file = FileChange::new("pkg/server_test.go", FileStatus::Modified);
/// assert_eq!(classify_group(&file), SemanticGroup::Test);
///
/// let file = FileChange::new("README", FileStatus::Modified);
/// assert_eq!(classify_group(&file), SemanticGroup::Docs);
/// ```
pub fn classify_group(file: &FileChange) -> SemanticGroup {
    let path_lower = file.path.to_lowercase();
    let base = basename(&path_lower);
    let ext = extension(&path_lower);

    let test_markers = ["_test.", ".test.", ".spec.", "test/", "tests/", "__tests__/"];
    if test_markers.iter().any(|m| path_lower.contains(m)) || base.starts_with("test_") {
        return SemanticGroup::Test;
    }

    if matches!(ext.as_str(), ".md" | ".txt" | ".rst" | ".adoc")
        || path_lower.contains("docs/")
        || path_lower.contains("doc/")
        || matches!(base, "readme" | "changelog" | "license")
    {
        return SemanticGroup::Docs;
    }

    let config_ext = matches!(
        ext.as_str(),
        ".yaml" | ".yml" | ".toml" | ".json" | ".ini" | ".cfg" | ".conf" | ".env" | ".tf"
    );
    let config_file = matches!(
        base,
        "dockerfile"
            | "makefile"
            | ".gitignore"
            | ".dockerignore"
            | "docker-compose.yml"
            | "docker-compose.yaml"
    );
    if config_ext || config_file || path_lower.contains("config/") || path_lower.contains(".github/") {
        return SemanticGroup::Config;
    }

    if matches!(ext.as_str(), ".css" | ".scss" | ".less" | ".sass") {
        return SemanticGroup::Style;
    }

    let content_lower = file.raw_diff.to_lowercase();
    if ["fix", "bug", "patch", "hotfix"]
        .iter()
        .any(|k| content_lower.contains(k))
    {
        return SemanticGroup::Bugfix;
    }

    if file.status == FileStatus::Added {
        return SemanticGroup::Feature;
    }

    let (added, removed) = (file.lines_added, file.lines_removed);
    if added > 0 && removed == 0 {
        return SemanticGroup::Feature;
    }
    if added > 0 && removed > 0 {
        let ratio = f64::from(added) / f64::from(added + removed);
        if ratio > 0.3 && ratio < 0.7 {
            return SemanticGroup::Refactor;
        }
    }

    SemanticGroup::Feature
}

/// Fill the heuristic fields of one file in place.
pub fn apply_heuristics(file: &mut FileChange) {
    let (score, reasons) = score_risk(file);
    file.risk_score = score;
    file.risk_reasons = reasons;
    file.semantic_group = classify_group(file);
}

/// Score and classify every file, then order the set highest risk first.
///
/// # Examples
///
/// ```
/// use hunkwise_core::ChangeSet;
/// use hunkwise_diff::{parser::parse_diff, risk::analyze};
///
/// let diff = "diff --git a/src/billing/charge.rs b/src/billing/charge.rs\n\
///             @@ -1 +1 @@\n-a\n+b\n\
///             diff --git a/notes/list.rs b/notes/list.rs\n\
///             @@ -1 +1 @@\n-a\n+b\n";
/// let mut set = ChangeSet::new("main", "HEAD", parse_diff(diff));
/// analyze(&mut set);
/// assert_eq!(set.files[0].path, "src/billing/charge.rs");
/// assert_eq!(set.files[0].risk_score, 25);
/// ```
pub fn analyze(change_set: &mut ChangeSet) {
    for file in change_set.files.iter_mut() {
        apply_heuristics(file);
    }
    sort_by_risk(&mut change_set.files);
}

/// Stable sort, highest score first. Ties keep their existing order.
pub fn sort_by_risk(files: &mut [FileChange]) {
    files.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
}

/// Merge two reason lists: trim, drop empties, drop case-insensitive
/// duplicates (first occurrence wins), keep at most [`MAX_REASONS`].
///
/// # Examples
///
/// ```
/// use hunkwise_diff::risk::merge_reasons;
///
/// let merged = merge_reasons(
///     &["Touches SQL".to_string(), "  ".to_string()],
///     &["touches sql".to_string(), "Large change".to_string()],
/// );
/// assert_eq!(merged, vec!["Touches SQL", "Large change"]);
/// ```
pub fn merge_reasons(primary: &[String], secondary: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for reason in primary.iter().chain(secondary) {
        if merged.len() == MAX_REASONS {
            break;
        }
        let trimmed = reason.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        merged.push(trimmed.to_string());
    }
    merged
}

/// Merge `notice` into `reasons`, guaranteeing it survives the cap.
///
/// When the list is already full the last reason gives up its slot.
///
/// # Examples
///
/// ```
/// use hunkwise_diff::risk::{with_notice, MAX_REASONS};
///
/// let full: Vec<String> = (0..MAX_REASONS).map(|i| format!("reason {i}")).collect();
/// let out = with_notice(&full, "fallback");
/// assert_eq!(out.len(), MAX_REASONS);
/// assert_eq!(out.last().map(String::as_str), Some("fallback"));
/// ```
pub fn with_notice(reasons: &[String], notice: &str) -> Vec<String> {
    let mut merged = merge_reasons(reasons, &[]);
    let key = notice.trim().to_lowercase();
    if merged.iter().any(|r| r.to_lowercase() == key) {
        return merged;
    }
    merged.truncate(MAX_REASONS - 1);
    merged.push(notice.trim().to_string());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, status: FileStatus, added: u32, removed: u32, raw: &str) -> FileChange {
        let mut f = FileChange::new(path, status);
        f.lines_added = added;
        f.lines_removed = removed;
        f.raw_diff = raw.to_string();
        f
    }

    #[test]
    fn added_auth_file_with_sql_and_large_size() {
        let f = file(
            "auth/login.go",
            FileStatus::Added,
            220,
            0,
            "@@ -0,0 +1,220 @@\n+rows := db.Query(\"SELECT id FROM users\")",
        );
        let (score, reasons) = score_risk(&f);
        assert_eq!(score, 65);
        assert_eq!(
            reasons,
            vec![
                "Touches authentication/authorization code",
                "Contains raw SQL or query execution",
                "Large change (200+ lines)",
            ]
        );
        assert_eq!(classify_group(&f), SemanticGroup::Feature);
    }

    #[test]
    fn stylesheet_without_keywords_is_zero_risk_style() {
        let f = file(
            "styles/app.css",
            FileStatus::Modified,
            5,
            5,
            "@@ -1,5 +1,5 @@\n-  color: blue;\n+  color: red;",
        );
        assert_eq!(score_risk(&f), (0, Vec::new()));
        assert_eq!(classify_group(&f), SemanticGroup::Style);
    }

    #[test]
    fn migration_path_scores_schema_pattern() {
        let f = file(
            "db/migrations/0001_init.sql",
            FileStatus::Modified,
            3,
            0,
            "@@ -0,0 +1,3 @@\n+CREATE TABLE users (\n+  id INTEGER\n+);",
        );
        let (score, reasons) = score_risk(&f);
        assert_eq!(score, 25);
        assert_eq!(reasons, vec!["Database schema or migration change"]);
        assert_eq!(classify_group(&f), SemanticGroup::Feature);

        let fixed = file(
            "db/migrations/0001_init.sql",
            FileStatus::Modified,
            3,
            0,
            "@@ -0,0 +1,3 @@\n+-- fix column type\n+CREATE TABLE users (\n+);",
        );
        assert_eq!(classify_group(&fixed), SemanticGroup::Bugfix);
    }

    #[test]
    fn content_only_checked_without_path_hit() {
        let f = file(
            "src/store.rs",
            FileStatus::Modified,
            1,
            0,
            "@@ -1 +1 @@\n+ALTER TABLE accounts ADD COLUMN x",
        );
        let (score, reasons) = score_risk(&f);
        assert_eq!(score, 25);
        assert_eq!(reasons, vec!["Database schema or migration change"]);
    }

    #[test]
    fn size_bonuses_are_exclusive() {
        let at = |n: u32| score_risk(&file("src/a.rs", FileStatus::Modified, n, 0, "")).0;
        assert_eq!(at(50), 0);
        assert_eq!(at(51), 5);
        assert_eq!(at(101), 10);
        assert_eq!(at(201), 15);
    }

    #[test]
    fn deletion_heavy_and_error_handling_removal() {
        let f = file(
            "src/worker.rs",
            FileStatus::Modified,
            2,
            12,
            "@@ -1,12 +1,2 @@\n-\tif err != nil {\n-\t\treturn err\n-\t}",
        );
        let (score, reasons) = score_risk(&f);
        assert_eq!(score, 25);
        assert_eq!(reasons, vec!["Significant code removal", "Removes error handling"]);

        let py = file("src/a.py", FileStatus::Modified, 1, 1, "-    except ValueError:\n+    pass");
        assert_eq!(score_risk(&py).0, 15);

        let added_only = file("src/a.py", FileStatus::Modified, 1, 0, "+    except ValueError:");
        assert_eq!(score_risk(&added_only).0, 0);
    }

    #[test]
    fn score_is_clamped_and_reasons_capped() {
        let f = file(
            "api/auth/crypto/db/permission/config/payment.go",
            FileStatus::Modified,
            300,
            0,
            "+SELECT panic(",
        );
        let (score, reasons) = score_risk(&f);
        assert_eq!(score, MAX_RISK_SCORE);
        assert_eq!(reasons.len(), MAX_REASONS);
    }

    #[test]
    fn classification_order() {
        let g = |path: &str, status, a, r, raw: &str| classify_group(&file(path, status, a, r, raw));
        assert_eq!(g("tests/fix_bug.rs", FileStatus::Modified, 1, 1, "fix"), SemanticGroup::Test);
        assert_eq!(g("src/test_utils.py", FileStatus::Modified, 1, 1, ""), SemanticGroup::Test);
        assert_eq!(g("docs/guide.html", FileStatus::Modified, 1, 1, ""), SemanticGroup::Docs);
        assert_eq!(g("CHANGELOG", FileStatus::Modified, 1, 1, ""), SemanticGroup::Docs);
        assert_eq!(g("Cargo.toml", FileStatus::Modified, 1, 1, ""), SemanticGroup::Config);
        assert_eq!(g(".github/CODEOWNERS", FileStatus::Modified, 1, 1, ""), SemanticGroup::Config);
        assert_eq!(g("deploy/.env", FileStatus::Modified, 1, 1, ""), SemanticGroup::Config);
        assert_eq!(g("web/theme.less", FileStatus::Modified, 1, 1, ""), SemanticGroup::Style);
        assert_eq!(g("src/a.rs", FileStatus::Added, 1, 1, "+hotfix"), SemanticGroup::Bugfix);
        assert_eq!(g("src/a.rs", FileStatus::Added, 1, 9, ""), SemanticGroup::Feature);
        assert_eq!(g("src/a.rs", FileStatus::Modified, 5, 5, ""), SemanticGroup::Refactor);
        assert_eq!(g("src/a.rs", FileStatus::Modified, 1, 9, ""), SemanticGroup::Feature);
        assert_eq!(g("src/a.rs", FileStatus::Modified, 0, 0, ""), SemanticGroup::Feature);
    }

    #[test]
    fn analyze_sorts_descending_and_stable() {
        let files = vec![
            file("src/a.rs", FileStatus::Modified, 1, 0, ""),
            file("src/auth.rs", FileStatus::Modified, 1, 0, ""),
            file("src/b.rs", FileStatus::Modified, 1, 0, ""),
        ];
        let mut set = ChangeSet::new("main", "HEAD", files);
        analyze(&mut set);
        let paths: Vec<_> = set.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/auth.rs", "src/a.rs", "src/b.rs"]);
    }

    #[test]
    fn merge_dedups_and_caps() {
        let primary: Vec<String> = ["A", "b", " a ", "", "C"].iter().map(|s| s.to_string()).collect();
        let secondary: Vec<String> = ["B", "d", "e", "f", "g", "h"].iter().map(|s| s.to_string()).collect();
        let merged = merge_reasons(&primary, &secondary);
        assert_eq!(merged, vec!["A", "b", "C", "d", "e", "f"]);
    }

    #[test]
    fn notice_is_not_duplicated() {
        let reasons = vec!["Fallback".to_string()];
        assert_eq!(with_notice(&reasons, "fallback"), vec!["Fallback"]);
        assert_eq!(with_notice(&[], "fallback"), vec!["fallback"]);
    }
}
