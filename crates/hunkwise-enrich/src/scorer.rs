use async_trait::async_trait;
use hunkwise_core::{AiAssessment, AnalysisConfig, FileChange, HunkwiseError, Result};
use tokio_util::sync::CancellationToken;

use crate::llm::LlmClient;
use crate::prompt::{build_risk_prompt, parse_assessment};

/// A capability that assesses the risk of one file change.
///
/// Implementations must be shareable across tasks. `cancel` is tripped when
/// another file in the same batch has failed; honoring it is optional.
#[async_trait]
pub trait RiskScorer: Send + Sync {
    /// Parallel assessments the backend tolerates.
    fn concurrency(&self) -> usize;

    /// Short availability check run once before a batch.
    async fn preflight(&self) -> Result<()>;

    /// Assess one file.
    async fn assess_risk(&self, file: &FileChange, cancel: &CancellationToken) -> Result<AiAssessment>;
}

/// [`RiskScorer`] backed by an [`LlmClient`].
///
/// # Examples
///
/// ```
/// use hunkwise_core::{AnalysisConfig, LlmConfig, Provider};
/// use hunkwise_enrich::llm::LlmClient;
/// use hunkwise_enrich::scorer::{LlmScorer, RiskScorer};
///
/// let client = LlmClient::new(&LlmConfig {
///     provider: Provider::Ollama,
///     ..LlmConfig::default()
/// })
/// .unwrap();
/// let scorer = LlmScorer::new(client, &AnalysisConfig::default());
/// assert_eq!(scorer.concurrency(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct LlmScorer {
    client: LlmClient,
    max_prompt_chars: usize,
}

impl LlmScorer {
    /// Wrap `client`, taking the prompt budget from `analysis`.
    pub fn new(client: LlmClient, analysis: &AnalysisConfig) -> Self {
        Self {
            client,
            max_prompt_chars: analysis.max_prompt_chars,
        }
    }
}

#[async_trait]
impl RiskScorer for LlmScorer {
    fn concurrency(&self) -> usize {
        self.client.concurrency()
    }

    async fn preflight(&self) -> Result<()> {
        self.client.preflight().await
    }

    async fn assess_risk(&self, file: &FileChange, cancel: &CancellationToken) -> Result<AiAssessment> {
        if cancel.is_cancelled() {
            return Err(HunkwiseError::Llm(format!(
                "risk assessment for {} cancelled",
                file.path
            )));
        }
        let prompt = build_risk_prompt(file, self.max_prompt_chars);
        let reply = self.client.complete(&prompt).await?;
        parse_assessment(&reply)
    }
}
