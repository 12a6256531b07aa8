//! Version-control commits of changed records.
//!
//! The repository is a single git working copy, so commits go through one
//! queue with one consumer: a bounded channel of capacity 1 feeding a task
//! that runs the [`Committer`] for each request in turn. Record writes stay
//! fully parallel; only the commits are serialized. A failed commit is
//! logged and dropped.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::config::StoreConfig;

/// Commits one changed file in the repository working copy.
#[async_trait]
pub trait Committer: Send + Sync {
    async fn commit(
        &self,
        repository_root: &Path,
        relative_path: &Path,
        message: &str,
    ) -> io::Result<()>;
}

/// [`Committer`] that shells out to `git`.
#[derive(Debug, Clone)]
pub struct GitCommitter {
    author_name: String,
    author_email: String,
    always_staged: Vec<String>,
}

impl GitCommitter {
    /// `author` is `"Name <email>"`; a bare name gets a localhost address.
    pub fn new(author: &str, always_staged: Vec<String>) -> Self {
        let (author_name, author_email) = parse_author(author);
        Self {
            author_name,
            author_email,
            always_staged,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.commit_author, config.always_staged.clone())
    }

    async fn git(&self, repository_root: &Path, args: &[&str]) -> io::Result<()> {
        let output = Command::new("git")
            .arg("-C")
            .arg(repository_root)
            .args(args)
            .env("GIT_AUTHOR_NAME", &self.author_name)
            .env("GIT_AUTHOR_EMAIL", &self.author_email)
            .env("GIT_COMMITTER_NAME", &self.author_name)
            .env("GIT_COMMITTER_EMAIL", &self.author_email)
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[async_trait]
impl Committer for GitCommitter {
    async fn commit(
        &self,
        repository_root: &Path,
        relative_path: &Path,
        message: &str,
    ) -> io::Result<()> {
        let relative = relative_path.to_string_lossy();
        let mut paths = vec![relative.as_ref()];
        for extra in &self.always_staged {
            if repository_root.join(extra).exists() {
                paths.push(extra.as_str());
            }
        }

        let mut add = vec!["add", "--"];
        add.extend(paths.iter().copied());
        self.git(repository_root, &add).await?;

        let mut commit = vec!["commit", "-m", message, "--"];
        commit.extend(paths.iter().copied());
        self.git(repository_root, &commit).await
    }
}

fn parse_author(author: &str) -> (String, String) {
    match author.split_once('<') {
        Some((name, rest)) => (
            name.trim().to_string(),
            rest.trim_end_matches('>').trim().to_string(),
        ),
        None => (author.trim().to_string(), "lightbox@localhost".to_string()),
    }
}

enum CommitRequest {
    Commit(PathBuf),
    Flush(oneshot::Sender<()>),
}

/// Handle to the single-consumer commit queue.
#[derive(Clone)]
pub struct CommitQueue {
    tx: mpsc::Sender<CommitRequest>,
}

impl CommitQueue {
    /// Spawn the consumer task. Must be called inside a tokio runtime.
    ///
    /// The consumer exits once every handle has been dropped.
    pub fn start(repository_root: PathBuf, committer: Arc<dyn Committer>) -> Self {
        let (tx, mut rx) = mpsc::channel::<CommitRequest>(1);

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                match request {
                    CommitRequest::Commit(relative_path) => {
                        let message = commit_message(&relative_path);
                        match committer
                            .commit(&repository_root, &relative_path, &message)
                            .await
                        {
                            Ok(()) => tracing::debug!("{message}"),
                            Err(e) => tracing::warn!("Commit of {:?} failed: {e}", relative_path),
                        }
                    }
                    CommitRequest::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { tx }
    }

    /// Queue a commit of one file, given relative to the repository root.
    pub async fn submit(&self, relative_path: PathBuf) {
        if self
            .tx
            .send(CommitRequest::Commit(relative_path))
            .await
            .is_err()
        {
            tracing::warn!("Commit queue closed; commit dropped");
        }
    }

    /// Wait until every commit submitted before this call has been handled.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(CommitRequest::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

/// `Updated <path>` with forward slashes on every platform.
pub fn commit_message(relative_path: &Path) -> String {
    let path = relative_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("Updated {path}")
}
