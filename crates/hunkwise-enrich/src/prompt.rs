use hunkwise_core::{AiAssessment, FileChange, Hunk, HunkwiseError, Result};
use serde::Deserialize;

/// Diff characters included in a file summary prompt.
pub const SUMMARY_DIFF_CHARS: usize = 4000;
/// Hunk characters included in a hunk summary prompt.
pub const HUNK_DIFF_CHARS: usize = 3000;

const TRUNCATION_MARKER: &str = "\n... (truncated)";

const RISK_INSTRUCTIONS: &str = "\
You are a staff engineer triaging the risk of one file in a git diff.

Return ONLY a JSON object of exactly this shape:
{\"riskScore\": number, \"reasons\": [string], \"semanticGroup\": \"feature|bugfix|refactor|test|config|docs|style\", \"confidence\": \"low|medium|high\"}

Rules:
- riskScore ranges from 0 (trivial) to 100 (very risky).
- reasons holds 2-5 short, concrete reasons tied to THIS diff.
- semanticGroup is one of the listed values.
- confidence reflects how certain you are.
- No markdown code fences and no extra text.";

/// Build the risk triage prompt for one file.
///
/// Includes the heuristic verdict so the model can confirm or correct it.
/// The diff is cut to `max_diff_chars`.
///
/// # Examples
///
/// ```
/// use hunkwise_core::{FileChange, FileStatus};
/// use hunkwise_enrich::prompt::build_risk_prompt;
///
/// let mut file = FileChange::new("src/auth.rs", FileStatus::Modified);
/// file.raw_diff = "@@ -1 +1 @@\n-a\n+b".into();
/// let prompt = build_risk_prompt(&file, 2200);
/// assert!(prompt.contains("File: src/auth.rs"));
/// assert!(prompt.contains("+b"));
/// ```
pub fn build_risk_prompt(file: &FileChange, max_diff_chars: usize) -> String {
    format!(
        "{RISK_INSTRUCTIONS}\n\n\
         File: {}\n\
         Status: {}\n\
         Language: {}\n\
         Lines added: {}\n\
         Lines removed: {}\n\
         Heuristic risk: {}\n\
         Heuristic reasons: {}\n\
         Heuristic semantic group: {}\n\n\
         Diff:\n{}",
        file.path,
        file.status,
        file.language,
        file.lines_added,
        file.lines_removed,
        file.risk_score,
        file.risk_reasons.join(", "),
        file.semantic_group,
        truncate(&file.raw_diff, max_diff_chars),
    )
}

/// Build the 1-2 sentence file summary prompt.
pub fn build_summary_prompt(file: &FileChange) -> String {
    format!(
        "You are a senior software engineer reviewing a code diff. \
         Summarize in 1-2 sentences what changed in this file and why it matters.\n\n\
         File: {}\n\
         Status: {}\n\
         Language: {}\n\
         Lines added: {}\n\
         Lines removed: {}\n\n\
         Diff:\n{}\n\n\
         Respond with ONLY the summary, no preamble or formatting.",
        file.path,
        file.status,
        file.language,
        file.lines_added,
        file.lines_removed,
        truncate(&file.raw_diff, SUMMARY_DIFF_CHARS),
    )
}

/// Build the one-sentence hunk summary prompt.
pub fn build_hunk_prompt(file: &FileChange, hunk: &Hunk) -> String {
    format!(
        "You are a senior software engineer reviewing a code diff. \
         Summarize in one sentence what this specific change does.\n\n\
         File: {} ({})\n\
         Hunk header: {}\n\n\
         Diff content:\n{}\n\n\
         Respond with ONLY the summary, no preamble or formatting.",
        file.path,
        file.language,
        hunk.header,
        truncate(&hunk.content, HUNK_DIFF_CHARS),
    )
}

/// Build the review checklist prompt.
pub fn build_checklist_prompt(file: &FileChange) -> String {
    format!(
        "You are a senior software engineer writing a code review checklist. \
         From this diff, list 3-7 specific, actionable items to verify. Focus on \
         likely bugs, security issues, edge cases and correctness concerns in THIS \
         diff, not generic advice.\n\n\
         File: {}\n\
         Status: {}\n\
         Language: {}\n\
         Risk reasons: {}\n\n\
         Diff:\n{}\n\n\
         Respond with ONLY a JSON array of strings, one per item. Example:\n\
         [\"Check that the SQL query uses bound parameters\", \"Verify the error reaches the caller\"]",
        file.path,
        file.status,
        file.language,
        file.risk_reasons.join(", "),
        truncate(&file.raw_diff, SUMMARY_DIFF_CHARS),
    )
}

/// Cut `text` to at most `max_bytes` (on a char boundary) and mark the cut.
///
/// # Examples
///
/// ```
/// use hunkwise_enrich::prompt::truncate;
///
/// assert_eq!(truncate("short", 10), "short");
/// assert_eq!(truncate("abcdef", 3), "abc\n... (truncated)");
/// ```
pub fn truncate(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{TRUNCATION_MARKER}", &text[..end])
}

/// Remove a surrounding markdown code fence, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// The outermost `{...}` span of a model reply, fences removed.
///
/// # Examples
///
/// ```
/// use hunkwise_enrich::prompt::extract_json_object;
///
/// let reply = "```json\n{\"riskScore\": 10}\n```";
/// assert_eq!(extract_json_object(reply), "{\"riskScore\": 10}");
/// ```
pub fn extract_json_object(text: &str) -> &str {
    outermost(strip_code_fences(text), '{', '}')
}

/// The outermost `[...]` span of a model reply, fences removed.
pub fn extract_json_array(text: &str) -> &str {
    outermost(strip_code_fences(text), '[', ']')
}

fn outermost(text: &str, open: char, close: char) -> &str {
    match (text.find(open), text.rfind(close)) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssessment {
    risk_score: Option<f64>,
    #[serde(default)]
    reasons: Vec<serde_json::Value>,
    #[serde(default)]
    semantic_group: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
}

/// Parse a model reply into an [`AiAssessment`].
///
/// The score is rounded and clamped; non-string reasons are dropped; an
/// unknown group is ignored; unknown confidence counts as medium.
///
/// # Errors
///
/// Returns [`HunkwiseError::Parse`] when the reply holds no JSON object or
/// lacks a numeric `riskScore`.
///
/// # Examples
///
/// ```
/// use hunkwise_core::SemanticGroup;
/// use hunkwise_enrich::prompt::parse_assessment;
///
/// let reply = r#"Sure! {"riskScore": 72, "reasons": ["raw SQL"], "semanticGroup": "Bugfix", "confidence": "high"}"#;
/// let a = parse_assessment(reply).unwrap();
/// assert_eq!(a.risk_score, 72);
/// assert_eq!(a.semantic_group, Some(SemanticGroup::Bugfix));
/// ```
pub fn parse_assessment(reply: &str) -> Result<AiAssessment> {
    let raw: RawAssessment = serde_json::from_str(extract_json_object(reply))
        .map_err(|e| HunkwiseError::Parse(format!("invalid risk assessment JSON: {e}")))?;
    let score = raw
        .risk_score
        .ok_or_else(|| HunkwiseError::Parse("risk assessment has no riskScore".into()))?;

    let reasons = raw
        .reasons
        .into_iter()
        .filter_map(|r| r.as_str().map(str::to_string))
        .collect();

    Ok(AiAssessment::new(
        score.round() as i64,
        reasons,
        raw.semantic_group.as_deref().unwrap_or_default(),
        raw.confidence.as_deref().unwrap_or_default(),
    ))
}

/// Parse a checklist reply: a JSON string array, or failing that one item
/// per non-empty line with bullet markers removed.
///
/// # Examples
///
/// ```
/// use hunkwise_enrich::prompt::parse_checklist;
///
/// assert_eq!(parse_checklist(r#"["a", "b"]"#), vec!["a", "b"]);
/// assert_eq!(parse_checklist("- first\n* second\n\n"), vec!["first", "second"]);
/// ```
pub fn parse_checklist(reply: &str) -> Vec<String> {
    let candidate = extract_json_array(reply);
    if let Ok(items) = serde_json::from_str::<Vec<String>>(candidate) {
        return items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
    }

    strip_code_fences(reply)
        .lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .unwrap_or(line)
                .trim()
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use hunkwise_core::{Confidence, FileStatus, SemanticGroup};

    use super::*;

    fn file() -> FileChange {
        let mut f = FileChange::new("db/query.go", FileStatus::Modified);
        f.language = "go".into();
        f.lines_added = 4;
        f.lines_removed = 1;
        f.risk_score = 20;
        f.risk_reasons = vec!["Contains raw SQL or query execution".into()];
        f.raw_diff = "@@ -1 +1,4 @@\n+db.Exec(q)".into();
        f
    }

    #[test]
    fn risk_prompt_carries_heuristics_and_truncates() {
        let mut f = file();
        f.raw_diff = "x".repeat(5000);
        let prompt = build_risk_prompt(&f, 2200);
        assert!(prompt.contains("Heuristic risk: 20"));
        assert!(prompt.contains("Heuristic reasons: Contains raw SQL or query execution"));
        assert!(prompt.contains("Heuristic semantic group: feature"));
        assert!(prompt.ends_with("... (truncated)"));
        assert!(!prompt.contains(&"x".repeat(2201)));
    }

    #[test]
    fn summary_prompts() {
        let f = file();
        assert!(build_summary_prompt(&f).contains("1-2 sentences"));
        assert!(build_checklist_prompt(&f).contains("JSON array"));
        let hunk = Hunk {
            header: "@@ -1 +1,4 @@".into(),
            content: "+db.Exec(q)\n".into(),
            lines_added: 1,
            lines_removed: 0,
            summary: None,
        };
        let prompt = build_hunk_prompt(&f, &hunk);
        assert!(prompt.contains("File: db/query.go (go)"));
        assert!(prompt.contains("Hunk header: @@ -1 +1,4 @@"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "ééé";
        assert_eq!(truncate(text, 3), "é\n... (truncated)");
    }

    #[test]
    fn fences_and_prose_are_stripped() {
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(extract_json_object("none here"), "none here");
        assert_eq!(extract_json_array("items: [\"a\"] done"), "[\"a\"]");
    }

    #[test]
    fn assessment_parsing() {
        let a = parse_assessment(
            "```json\n{\"riskScore\": 130.4, \"reasons\": [\"x\", 3, \"y\"], \"semanticGroup\": \"chore\"}\n```",
        )
        .unwrap();
        assert_eq!(a.risk_score, 100);
        assert_eq!(a.reasons, vec!["x", "y"]);
        assert_eq!(a.semantic_group, None);
        assert_eq!(a.confidence, Confidence::Medium);

        let low = parse_assessment("{\"riskScore\": -3, \"confidence\": \"LOW\", \"semanticGroup\": \" test \"}").unwrap();
        assert_eq!(low.risk_score, 0);
        assert_eq!(low.confidence, Confidence::Low);
        assert_eq!(low.semantic_group, Some(SemanticGroup::Test));
    }

    #[test]
    fn malformed_assessments_are_errors() {
        assert!(matches!(parse_assessment("I cannot help"), Err(HunkwiseError::Parse(_))));
        assert!(matches!(
            parse_assessment("{\"reasons\": []}"),
            Err(HunkwiseError::Parse(_))
        ));
        assert!(parse_assessment("{\"riskScore\": \"high\"}").is_err());
    }

    #[test]
    fn checklist_parsing() {
        assert_eq!(
            parse_checklist("```json\n[\"Check bounds\", \" \", \"Verify errors\"]\n```"),
            vec!["Check bounds", "Verify errors"]
        );
        assert_eq!(
            parse_checklist("1. not json\n- Verify the lock is released"),
            vec!["1. not json", "Verify the lock is released"]
        );
        assert!(parse_checklist("").is_empty());
    }

    #[test]
    fn checklist_bullets_survive_stray_brackets() {
        let reply = "Review notes:\n- Confirm [x] is cleared on logout\n- Check the retry [limit]\n";
        assert_eq!(
            parse_checklist(reply),
            vec![
                "Review notes:",
                "Confirm [x] is cleared on logout",
                "Check the retry [limit]"
            ]
        );
        assert_eq!(
            parse_checklist("```\n- Verify input\n- Check output\n```"),
            vec!["Verify input", "Check output"]
        );
    }
}
