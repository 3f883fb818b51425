//! Periodic auto-save sessions
//!
//! A session polls a snapshot function on a fixed interval. Its first
//! successful write is a `save`; every later one updates the design that
//! save created. The design id lives in the session, so several sessions
//! (one per customizable slot, say) never share state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use customizer_common::{Error, Result};

use super::designs::DesignStore;
use crate::domain::entities::{DesignDraft, DesignPatch, StoredDesign};

type Snapshot = Box<dyn Fn() -> Option<DesignDraft> + Send + Sync>;

enum Command {
    SaveNow(oneshot::Sender<Option<String>>),
    Stop,
}

/// Handle to a running auto-save task
pub struct AutoSaveSession {
    commands: mpsc::Sender<Command>,
    design_id: watch::Receiver<Option<String>>,
    task: JoinHandle<()>,
}

struct Worker {
    store: Arc<DesignStore>,
    snapshot: Snapshot,
    design_id: watch::Sender<Option<String>>,
}

impl Worker {
    async fn persist(&self) -> Result<Option<StoredDesign>> {
        let Some(draft) = (self.snapshot)() else {
            return Ok(None);
        };

        let existing = self.design_id.borrow().clone();
        let stored = match existing {
            Some(id) => match self.store.update(&id, DesignPatch::from(draft.clone())).await {
                Ok(stored) => stored,
                Err(Error::NotFound(_)) => {
                    // Evicted or removed underneath us; start a fresh record
                    tracing::info!(design_id = %id, "Auto-saved design is gone, saving anew");
                    self.store.save(draft).await?
                }
                Err(e) => return Err(e),
            },
            None => self.store.save(draft).await?,
        };

        self.design_id.send_replace(Some(stored.id.clone()));
        Ok(Some(stored))
    }

    /// One tick; failures are logged and the next tick retries
    async fn tick(&self) {
        match self.persist().await {
            Ok(Some(stored)) => {
                tracing::debug!(design_id = %stored.id, "Auto-saved design");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    design_id = ?self.design_id.borrow().as_deref(),
                    error = %e,
                    "Auto-save failed"
                );
            }
        }
    }

    async fn run(self, period: Duration, mut commands: mpsc::Receiver<Command>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                command = commands.recv() => match command {
                    Some(Command::SaveNow(reply)) => {
                        self.tick().await;
                        let _ = reply.send(self.design_id.borrow().clone());
                    }
                    Some(Command::Stop) | None => break,
                },
            }
        }
        tracing::debug!(design_id = ?self.design_id.borrow().as_deref(), "Auto-save stopped");
    }
}

impl AutoSaveSession {
    fn spawn(
        store: Arc<DesignStore>,
        design_id: Option<String>,
        snapshot: Snapshot,
        period: Duration,
    ) -> Self {
        let (commands, receiver) = mpsc::channel(8);
        let (id_tx, id_rx) = watch::channel(design_id);
        let worker = Worker {
            store,
            snapshot,
            design_id: id_tx,
        };
        let task = tokio::spawn(worker.run(period, receiver));

        Self {
            commands,
            design_id: id_rx,
            task,
        }
    }

    /// Design this session writes to, once it has saved
    pub fn design_id(&self) -> Option<String> {
        self.design_id.borrow().clone()
    }

    /// Run a tick immediately and return the session's design id.
    ///
    /// A write failure is logged the same way a timed tick logs it.
    pub async fn save_now(&self) -> Option<String> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::SaveNow(reply)).await.is_err() {
            return self.design_id();
        }
        response.await.unwrap_or_else(|_| self.design_id())
    }

    /// Stop scheduling ticks, letting an in-flight tick finish
    pub async fn stop(self) -> Option<String> {
        let _ = self.commands.send(Command::Stop).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Auto-save task ended abnormally");
        }
        self.design_id.borrow().clone()
    }
}

impl DesignStore {
    /// Start auto-saving snapshots into a new design
    pub fn start_auto_save<F>(self: &Arc<Self>, snapshot: F, interval: Duration) -> AutoSaveSession
    where
        F: Fn() -> Option<DesignDraft> + Send + Sync + 'static,
    {
        AutoSaveSession::spawn(Arc::clone(self), None, Box::new(snapshot), interval)
    }

    /// Start auto-saving snapshots into an existing design
    pub fn resume_auto_save<F>(
        self: &Arc<Self>,
        design_id: impl Into<String>,
        snapshot: F,
        interval: Duration,
    ) -> AutoSaveSession
    where
        F: Fn() -> Option<DesignDraft> + Send + Sync + 'static,
    {
        AutoSaveSession::spawn(
            Arc::clone(self),
            Some(design_id.into()),
            Box::new(snapshot),
            interval,
        )
    }
}
