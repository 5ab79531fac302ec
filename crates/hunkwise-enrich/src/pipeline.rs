//! Batch AI re-scoring of heuristically analyzed files.
//!
//! One preflight, then at most N concurrent per-file assessments, each under
//! its own timeout. The first failure trips a shared cancellation token so
//! assessments that have not started yet are skipped. Each worker owns a
//! clone of its file and hands the outcome back by index; only the joining
//! task writes to the file list.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hunkwise_core::{
    AiAssessment, AnalysisConfig, Confidence, FileChange, HunkwiseError, Result, ScorePolicy,
    MAX_RISK_SCORE,
};
use hunkwise_diff::risk::{merge_reasons, sort_by_risk, with_notice};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scorer::RiskScorer;

/// Reason added to every file when a batch could not be fully AI-scored.
pub const FALLBACK_NOTICE: &str = "AI analysis unavailable; using heuristic risk";

/// Reason used when a successful assessment returns no reasons.
pub const NO_RISKS_PLACEHOLDER: &str = "No specific risks identified";

/// Tuning for one enrichment batch.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use hunkwise_core::AnalysisConfig;
/// use hunkwise_enrich::pipeline::EnrichOptions;
///
/// let options = EnrichOptions::from(&AnalysisConfig::default());
/// assert_eq!(options.preflight_timeout, Duration::from_secs(4));
/// assert_eq!(options.per_file_timeout, Duration::from_secs(25));
/// assert_eq!(options.concurrency, None);
/// ```
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Overrides the scorer's own concurrency when set.
    pub concurrency: Option<usize>,
    /// Budget for the preflight check.
    pub preflight_timeout: Duration,
    /// Budget for each per-file assessment.
    pub per_file_timeout: Duration,
    /// How AI scores combine with heuristic ones.
    pub score_policy: ScorePolicy,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

impl From<&AnalysisConfig> for EnrichOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            preflight_timeout: config.preflight_timeout(),
            per_file_timeout: config.per_file_timeout(),
            score_policy: config.score_policy,
        }
    }
}

/// Re-score `files` through `scorer`, then sort them highest risk first.
///
/// On success every assessed file carries AI-derived fields and no fallback
/// notice. On failure (preflight or any per-file error) successful
/// assessments are kept, every file gains [`FALLBACK_NOTICE`], and the
/// triggering error is returned. The list is sorted in both cases.
///
/// # Errors
///
/// Returns [`HunkwiseError::Preflight`] when the availability check fails,
/// otherwise the first per-file error (including [`HunkwiseError::Timeout`]).
pub async fn enrich_files(
    files: &mut [FileChange],
    scorer: Arc<dyn RiskScorer>,
    options: &EnrichOptions,
) -> Result<()> {
    if files.is_empty() {
        return Ok(());
    }

    if let Err(err) = run_preflight(scorer.as_ref(), options.preflight_timeout).await {
        warn!(error = %err, "AI risk analysis skipped");
        mark_fallback(files);
        sort_by_risk(files);
        return Err(err);
    }

    let concurrency = options
        .concurrency
        .unwrap_or_else(|| scorer.concurrency())
        .max(1);
    debug!(files = files.len(), concurrency, "dispatching risk assessments");

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let cancel = CancellationToken::new();
    let first_failure: Arc<Mutex<Option<HunkwiseError>>> = Arc::new(Mutex::new(None));
    let mut tasks = JoinSet::new();

    for (idx, file) in files.iter().enumerate() {
        let file = file.clone();
        let scorer = Arc::clone(&scorer);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let first_failure = Arc::clone(&first_failure);
        let per_file_timeout = options.per_file_timeout;

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (idx, None);
            };
            if cancel.is_cancelled() {
                return (idx, None);
            }

            let outcome = match timeout(per_file_timeout, scorer.assess_risk(&file, &cancel)).await {
                Ok(result) => result,
                Err(_) => Err(HunkwiseError::Timeout {
                    what: format!("risk assessment for {}", file.path),
                    after: per_file_timeout,
                }),
            };

            match outcome {
                Ok(assessment) => (idx, Some(assessment)),
                Err(err) => {
                    warn!(path = %file.path, error = %err, "AI risk assessment failed");
                    record_failure(&first_failure, &cancel, err);
                    (idx, None)
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, Some(assessment))) => {
                apply_assessment(&mut files[idx], assessment, options.score_policy);
            }
            Ok((_, None)) => {}
            Err(join_err) => record_failure(
                &first_failure,
                &cancel,
                HunkwiseError::Llm(format!("risk assessment task failed: {join_err}")),
            ),
        }
    }

    let failure = first_failure
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();

    match failure {
        Some(err) => {
            warn!(error = %err, "AI risk analysis failed fast");
            mark_fallback(files);
            sort_by_risk(files);
            Err(err)
        }
        None => {
            sort_by_risk(files);
            info!(files = files.len(), "AI risk analysis complete");
            Ok(())
        }
    }
}

async fn run_preflight(scorer: &dyn RiskScorer, budget: Duration) -> Result<()> {
    match timeout(budget, scorer.preflight()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err @ HunkwiseError::Preflight(_))) => Err(err),
        Ok(Err(err)) => Err(HunkwiseError::Preflight(err.to_string())),
        Err(_) => Err(HunkwiseError::Preflight(
            HunkwiseError::Timeout {
                what: "availability check".into(),
                after: budget,
            }
            .to_string(),
        )),
    }
}

fn record_failure(slot: &Mutex<Option<HunkwiseError>>, cancel: &CancellationToken, err: HunkwiseError) {
    let mut first = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if first.is_none() {
        *first = Some(err);
    }
    cancel.cancel();
}

fn mark_fallback(files: &mut [FileChange]) {
    for file in files.iter_mut() {
        file.risk_reasons = with_notice(&file.risk_reasons, FALLBACK_NOTICE);
    }
}

/// Write a successful assessment onto its file.
pub fn apply_assessment(file: &mut FileChange, assessment: AiAssessment, policy: ScorePolicy) {
    let ai_score = assessment.risk_score.min(MAX_RISK_SCORE);
    let reasons = match policy {
        ScorePolicy::Replace => {
            file.risk_score = ai_score;
            merge_reasons(&assessment.reasons, &[])
        }
        ScorePolicy::Blend => {
            file.risk_score = blend_risk_scores(file.risk_score, ai_score, assessment.confidence);
            merge_reasons(&assessment.reasons, &file.risk_reasons)
        }
    };
    file.risk_reasons = if reasons.is_empty() {
        vec![NO_RISKS_PLACEHOLDER.to_string()]
    } else {
        reasons
    };
    if let Some(group) = assessment.semantic_group {
        file.semantic_group = group;
    }
}

/// Confidence-weighted mix of a heuristic and an AI score, rounded and
/// clamped to `0..=100`.
///
/// # Examples
///
/// ```
/// use hunkwise_core::Confidence;
/// use hunkwise_enrich::pipeline::blend_risk_scores;
///
/// assert_eq!(blend_risk_scores(20, 80, Confidence::High), 62);
/// assert_eq!(blend_risk_scores(20, 80, Confidence::Medium), 53);
/// assert_eq!(blend_risk_scores(20, 80, Confidence::Low), 44);
/// ```
pub fn blend_risk_scores(heuristic: u32, ai: u32, confidence: Confidence) -> u32 {
    let weight = match confidence {
        Confidence::High => 0.7,
        Confidence::Low => 0.4,
        Confidence::Medium => 0.55,
    };
    let blended = f64::from(heuristic) * (1.0 - weight) + f64::from(ai) * weight;
    (blended.round() as i64).clamp(0, i64::from(MAX_RISK_SCORE)) as u32
}

#[cfg(test)]
mod tests {
    use hunkwise_core::{FileStatus, SemanticGroup};

    use super::*;

    fn heuristic_file() -> FileChange {
        let mut f = FileChange::new("src/auth.rs", FileStatus::Modified);
        f.risk_score = 30;
        f.risk_reasons = vec!["Touches authentication/authorization code".into()];
        f.semantic_group = SemanticGroup::Refactor;
        f
    }

    #[test]
    fn replace_policy_overwrites_score_and_reasons() {
        let mut f = heuristic_file();
        let a = AiAssessment::new(80, vec!["token stored in plain text".into()], "bugfix", "high");
        apply_assessment(&mut f, a, ScorePolicy::Replace);
        assert_eq!(f.risk_score, 80);
        assert_eq!(f.risk_reasons, vec!["token stored in plain text"]);
        assert_eq!(f.semantic_group, SemanticGroup::Bugfix);
    }

    #[test]
    fn empty_reasons_get_placeholder_and_unknown_group_is_ignored() {
        let mut f = heuristic_file();
        let a = AiAssessment::new(10, vec!["  ".into()], "chore", "low");
        apply_assessment(&mut f, a, ScorePolicy::Replace);
        assert_eq!(f.risk_score, 10);
        assert_eq!(f.risk_reasons, vec![NO_RISKS_PLACEHOLDER]);
        assert_eq!(f.semantic_group, SemanticGroup::Refactor);
    }

    #[test]
    fn blend_policy_mixes_scores_and_keeps_heuristic_reasons() {
        let mut f = heuristic_file();
        let a = AiAssessment::new(90, vec!["new session cache".into()], "", "medium");
        apply_assessment(&mut f, a, ScorePolicy::Blend);
        assert_eq!(f.risk_score, 63);
        assert_eq!(
            f.risk_reasons,
            vec!["new session cache", "Touches authentication/authorization code"]
        );
    }

    #[test]
    fn blend_is_clamped() {
        assert_eq!(blend_risk_scores(100, 100, Confidence::High), 100);
        assert_eq!(blend_risk_scores(0, 0, Confidence::Low), 0);
        assert_eq!(blend_risk_scores(0, 1, Confidence::Medium), 1);
    }

    #[test]
    fn fallback_marking_is_idempotent() {
        let mut files = vec![heuristic_file()];
        mark_fallback(&mut files);
        mark_fallback(&mut files);
        assert_eq!(
            files[0].risk_reasons,
            vec!["Touches authentication/authorization code", FALLBACK_NOTICE]
        );
    }
}
