use std::sync::Arc;

use hunkwise_core::ChangeSet;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::holder::SnapshotHolder;
use crate::pipeline::{enrich_files, EnrichOptions};
use crate::scorer::RiskScorer;

/// Re-score `snapshot` in a background task and publish the result.
///
/// The in-progress flag is raised before this returns. The task works on a
/// private clone and settles through [`SnapshotHolder::finish_analysis`], so
/// a run overtaken by a newer snapshot leaves the holder's state to the newer
/// run. Awaiting the returned handle is optional.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_background_analysis(
    holder: Arc<SnapshotHolder>,
    scorer: Arc<dyn RiskScorer>,
    snapshot: Arc<ChangeSet>,
    options: EnrichOptions,
) -> JoinHandle<()> {
    holder.begin_analysis(snapshot.generation);

    tokio::spawn(async move {
        let mut working: ChangeSet = (*snapshot).clone();
        drop(snapshot);

        let error = match enrich_files(&mut working.files, scorer, &options).await {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, generation = working.generation, "background analysis failed");
                Some(err.to_string())
            }
        };

        let generation = working.generation;
        if holder.finish_analysis(working, error) {
            info!(generation, "background analysis published");
        }
    })
}
