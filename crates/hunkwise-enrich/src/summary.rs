use std::sync::Arc;

use hunkwise_core::{FileChange, Hunk, HunkwiseError, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::llm::CompletionBackend;
use crate::prompt::{build_checklist_prompt, build_hunk_prompt, build_summary_prompt, parse_checklist};

/// A file whose summary could not be generated.
#[derive(Debug)]
pub struct SummaryFailure {
    /// Path of the file.
    pub path: String,
    /// Header of the hunk, for hunk summaries.
    pub hunk: Option<String>,
    /// What went wrong.
    pub error: HunkwiseError,
}

/// Which write-ups [`describe_all`] asks the backend for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Describe {
    /// One or two sentences per file.
    pub file_summaries: bool,
    /// One sentence per hunk.
    pub hunk_summaries: bool,
    /// Review checklist per file.
    pub checklists: bool,
}

#[derive(Debug, Clone, Copy)]
enum Job {
    File,
    Hunk(usize),
    Checklist,
}

enum Written {
    File(String),
    Hunk(usize, String),
    Checklist(Vec<String>),
}

/// One or two sentences describing what changed in `file`.
///
/// # Errors
///
/// Propagates backend errors.
pub async fn summarize_file(backend: &dyn CompletionBackend, file: &FileChange) -> Result<String> {
    let reply = backend.complete(&build_summary_prompt(file)).await?;
    Ok(reply.trim().to_string())
}

/// One sentence describing a single hunk.
///
/// # Errors
///
/// Propagates backend errors.
pub async fn summarize_hunk(
    backend: &dyn CompletionBackend,
    file: &FileChange,
    hunk: &Hunk,
) -> Result<String> {
    let reply = backend.complete(&build_hunk_prompt(file, hunk)).await?;
    Ok(reply.trim().to_string())
}

/// Specific review items for `file`.
///
/// # Errors
///
/// Propagates backend errors. Replies that are not JSON fall back to one
/// item per line rather than failing.
pub async fn generate_checklist(backend: &dyn CompletionBackend, file: &FileChange) -> Result<Vec<String>> {
    let reply = backend.complete(&build_checklist_prompt(file)).await?;
    Ok(parse_checklist(&reply))
}

/// Summarize every file that has no summary yet, at most `concurrency` at a
/// time.
///
/// Failures do not stop the batch; they are returned alongside the files
/// that succeeded.
pub async fn summarize_all(
    backend: Arc<dyn CompletionBackend>,
    files: &mut [FileChange],
    concurrency: usize,
) -> Vec<SummaryFailure> {
    let only_files = Describe {
        file_summaries: true,
        ..Describe::default()
    };
    describe_all(backend, files, concurrency, only_files).await
}

/// Fill in the write-ups selected by `what`, at most `concurrency` backend
/// calls at a time.
///
/// Anything already present is left alone. Failures do not stop the batch;
/// they are returned alongside the write-ups that succeeded.
pub async fn describe_all(
    backend: Arc<dyn CompletionBackend>,
    files: &mut [FileChange],
    concurrency: usize,
    what: Describe,
) -> Vec<SummaryFailure> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (idx, file) in files.iter().enumerate() {
        let mut jobs = Vec::new();
        if what.file_summaries && file.summary.is_none() {
            jobs.push(Job::File);
        }
        if what.hunk_summaries {
            jobs.extend(
                file.hunks
                    .iter()
                    .enumerate()
                    .filter(|(_, hunk)| hunk.summary.is_none())
                    .map(|(h, _)| Job::Hunk(h)),
            );
        }
        if what.checklists && file.checklist.is_none() {
            jobs.push(Job::Checklist);
        }
        if jobs.is_empty() {
            continue;
        }

        let shared = Arc::new(file.clone());
        for job in jobs {
            let file = Arc::clone(&shared);
            let backend = Arc::clone(&backend);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => run_job(backend.as_ref(), &file, job).await,
                    Err(e) => Err(HunkwiseError::Llm(format!("summary pool closed: {e}"))),
                };
                (idx, job, result)
            });
        }
    }

    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, _, Ok(written))) => {
                let file = &mut files[idx];
                match written {
                    Written::File(summary) => file.summary = Some(summary),
                    Written::Hunk(h, summary) => {
                        if let Some(hunk) = file.hunks.get_mut(h) {
                            hunk.summary = Some(summary);
                        }
                    }
                    Written::Checklist(items) => file.checklist = Some(items),
                }
            }
            Ok((idx, job, Err(error))) => {
                let file = &files[idx];
                let hunk = match job {
                    Job::Hunk(h) => file.hunks.get(h).map(|hunk| hunk.header.clone()),
                    Job::File | Job::Checklist => None,
                };
                warn!(path = %file.path, ?job, %error, "AI write-up failed");
                failures.push(SummaryFailure {
                    path: file.path.clone(),
                    hunk,
                    error,
                });
            }
            Err(join_err) => failures.push(SummaryFailure {
                path: String::new(),
                hunk: None,
                error: HunkwiseError::Llm(format!("summary task failed: {join_err}")),
            }),
        }
    }
    debug!(failed = failures.len(), "summaries complete");
    failures
}

async fn run_job(backend: &dyn CompletionBackend, file: &FileChange, job: Job) -> Result<Written> {
    match job {
        Job::File => summarize_file(backend, file).await.map(Written::File),
        Job::Hunk(h) => {
            let hunk = file
                .hunks
                .get(h)
                .ok_or_else(|| HunkwiseError::Llm(format!("no hunk {h} in {}", file.path)))?;
            summarize_hunk(backend, file, hunk)
                .await
                .map(|summary| Written::Hunk(h, summary))
        }
        Job::Checklist => generate_checklist(backend, file).await.map(Written::Checklist),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use hunkwise_core::FileStatus;

    use super::*;

    struct Canned {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionBackend for Canned {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.contains("File: broken.rs") {
                return Err(HunkwiseError::Llm("backend exploded".into()));
            }
            if prompt.contains("JSON array") {
                return Ok("```json\n[\"Check the bounds\"]\n```".into());
            }
            Ok("  Adds a helper.\n".into())
        }
    }

    fn canned() -> Arc<Canned> {
        Arc::new(Canned {
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn single_file_helpers() {
        let backend = canned();
        let file = FileChange::new("src/util.rs", FileStatus::Added);
        assert_eq!(summarize_file(backend.as_ref(), &file).await.unwrap(), "Adds a helper.");
        assert_eq!(
            generate_checklist(backend.as_ref(), &file).await.unwrap(),
            vec!["Check the bounds"]
        );
        let hunk = Hunk {
            header: "@@ -0,0 +1 @@".into(),
            content: "+fn helper() {}\n".into(),
            lines_added: 1,
            lines_removed: 0,
            summary: None,
        };
        assert_eq!(
            summarize_hunk(backend.as_ref(), &file, &hunk).await.unwrap(),
            "Adds a helper."
        );
    }

    #[tokio::test]
    async fn summarize_all_skips_done_and_collects_failures() {
        let backend = canned();
        let mut done = FileChange::new("done.rs", FileStatus::Modified);
        done.summary = Some("already".into());
        let mut files = vec![
            FileChange::new("a.rs", FileStatus::Modified),
            done,
            FileChange::new("broken.rs", FileStatus::Modified),
        ];

        let failures = summarize_all(backend.clone(), &mut files, 2).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, "broken.rs");
        assert_eq!(files[0].summary.as_deref(), Some("Adds a helper."));
        assert_eq!(files[1].summary.as_deref(), Some("already"));
        assert!(files[2].summary.is_none());
        assert_eq!(backend.prompts.lock().unwrap().len(), 2);
    }

    fn everything(checklists: bool) -> Describe {
        Describe {
            file_summaries: true,
            hunk_summaries: true,
            checklists,
        }
    }

    fn hunk(header: &str, summary: Option<&str>) -> Hunk {
        Hunk {
            header: header.into(),
            content: "+x\n".into(),
            lines_added: 1,
            lines_removed: 0,
            summary: summary.map(String::from),
        }
    }

    #[tokio::test]
    async fn describe_all_fills_hunks_and_checklists() {
        let backend = canned();
        let mut file = FileChange::new("src/lib.rs", FileStatus::Modified);
        file.hunks = vec![hunk("@@ -1 +1 @@", None), hunk("@@ -9 +9 @@", Some("kept"))];
        let mut broken = FileChange::new("broken.rs", FileStatus::Modified);
        broken.hunks = vec![hunk("@@ -3 +3 @@", None)];
        let mut files = vec![file, broken];

        let failures = describe_all(backend.clone(), &mut files, 3, everything(true)).await;

        assert_eq!(files[0].summary.as_deref(), Some("Adds a helper."));
        assert_eq!(files[0].hunks[0].summary.as_deref(), Some("Adds a helper."));
        assert_eq!(files[0].hunks[1].summary.as_deref(), Some("kept"));
        assert_eq!(files[0].checklist.as_deref(), Some(&["Check the bounds".to_string()][..]));
        assert!(files[1].summary.is_none());
        assert!(files[1].checklist.is_none());

        assert_eq!(failures.len(), 3);
        assert!(failures.iter().all(|f| f.path == "broken.rs"));
        assert_eq!(
            failures.iter().filter_map(|f| f.hunk.as_deref()).collect::<Vec<_>>(),
            vec!["@@ -3 +3 @@"]
        );
        // file summary, one hunk and the checklist for src/lib.rs plus three for broken.rs
        assert_eq!(backend.prompts.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn describe_all_without_checklists_leaves_them_unset() {
        let backend = canned();
        let mut file = FileChange::new("src/lib.rs", FileStatus::Modified);
        file.hunks = vec![hunk("@@ -1 +1 @@", None)];
        let mut files = vec![file];

        let failures = describe_all(backend, &mut files, 1, everything(false)).await;
        assert!(failures.is_empty());
        assert!(files[0].checklist.is_none());
        assert_eq!(files[0].hunks[0].summary.as_deref(), Some("Adds a helper."));
    }
}
