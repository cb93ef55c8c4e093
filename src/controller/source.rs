// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/controller/source.rs

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::SourceError;

/// Events delivered by a watch subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// The document (probably) changed; re-fetch and diff.
    Changed,
    /// The subscription broke; the controller falls back to polling.
    Lost(String),
}

/// A live watch subscription. Dropping it tears the watch down.
pub struct Subscription {
    events: mpsc::Receiver<SourceEvent>,
    // Keeps the OS-level watch alive for the subscription's lifetime.
    _watcher: Option<RecommendedWatcher>,
}

impl Subscription {
    /// Wraps a bare channel; used by in-memory sources in tests.
    pub fn from_receiver(events: mpsc::Receiver<SourceEvent>) -> Self {
        Self {
            events,
            _watcher: None,
        }
    }

    /// Next event, or `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<SourceEvent> {
        self.events.recv().await
    }
}

/// Where tenant overrides come from: something fetchable and watchable.
#[async_trait]
pub trait OverridesSource: Send + Sync + 'static {
    /// Reads the full document text.
    async fn fetch(&self) -> Result<String, SourceError>;

    /// Subscribes to change events.
    async fn subscribe(&self) -> Result<Subscription, SourceError>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

/// The shipped source: an overrides document mounted as a file, the way
/// cluster orchestrators materialize keyed configuration blobs.
pub struct FileOverridesSource {
    path: PathBuf,
}

impl FileOverridesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn watch_dir(&self) -> &Path {
        // Watch the parent directory: orchestrators update mounted files by
        // swapping symlinks, which a watch on the file itself misses.
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

#[async_trait]
impl OverridesSource for FileOverridesSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Unreadable {
                path: self.path.display().to_string(),
                source,
            })
    }

    async fn subscribe(&self) -> Result<Subscription, SourceError> {
        let (tx, rx) = mpsc::channel(16);

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            let event = match result {
                // Any event under the directory triggers a re-fetch; the
                // diff in the controller makes spurious wakeups harmless.
                Ok(_) => SourceEvent::Changed,
                Err(e) => SourceEvent::Lost(e.to_string()),
            };
            // A full channel already holds a pending Changed event, so a
            // dropped send loses nothing.
            let _ = tx.try_send(event);
        })
        .map_err(|e| SourceError::WatchFailed {
            message: e.to_string(),
        })?;

        watcher
            .watch(self.watch_dir(), RecursiveMode::NonRecursive)
            .map_err(|e| SourceError::WatchFailed {
                message: e.to_string(),
            })?;

        debug!(path = %self.path.display(), "watching overrides document");
        Ok(Subscription {
            events: rx,
            _watcher: Some(watcher),
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
