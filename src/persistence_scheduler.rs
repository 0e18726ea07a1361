// src/persistence_scheduler.rs - Debounced persistence of published snapshots
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{debug, error, info, trace};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};

use crate::{AppData, CardsError, DataStore, KeyValueStore, Result};

#[derive(Debug, Clone, Default)]
pub struct PersistenceStatus {
    /// Whether the scheduler task is running
    pub is_running: bool,
    /// Whether a snapshot is waiting for its quiet period to elapse
    pub pending: bool,
    /// Number of successful writes
    pub saves_completed: usize,
    /// The time the last successful write finished
    pub last_save_time: Option<DateTime<Utc>>,
    /// Message of the most recent failed write, cleared by the next success
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub enum SchedulerCommand {
    /// Write the pending snapshot immediately, if there is one
    FlushNow(oneshot::Sender<Result<()>>),
    /// Write the pending snapshot, if any, then stop
    Stop,
}

/// Watches published snapshots and writes the latest one once no further
/// change has arrived for the debounce window.
///
/// The snapshot current when [`start`](Self::start) is called counts as
/// already persisted, so the state produced by the initial load is never
/// written back.
pub struct PersistenceScheduler<S> {
    /// Quiet period after the last change
    debounce: Duration,

    /// Channel to send commands to the scheduler task
    command_tx: Option<mpsc::Sender<SchedulerCommand>>,

    /// Handle to the scheduler task
    scheduler_task: Option<JoinHandle<()>>,

    /// Shared with the scheduler task
    status: Arc<Mutex<PersistenceStatus>>,

    store: Arc<DataStore<S>>,
}

impl<S: KeyValueStore> PersistenceScheduler<S> {
    pub fn new(store: Arc<DataStore<S>>, debounce: Duration) -> Self {
        debug!("Initializing persistence scheduler with {:?} debounce", debounce);

        Self {
            debounce,
            command_tx: None,
            scheduler_task: None,
            status: Arc::new(Mutex::new(PersistenceStatus::default())),
            store,
        }
    }

    /// Starts observing `snapshots`. Must be called from within a tokio runtime.
    pub fn start(&mut self, mut snapshots: watch::Receiver<Arc<AppData>>) -> Result<()> {
        if self.scheduler_task.is_some() {
            debug!("Persistence scheduler already running");
            return Ok(());
        }

        info!("Starting persistence scheduler...");
        // Whatever is current now was just loaded; only later changes count.
        snapshots.mark_unchanged();

        let (command_tx, mut command_rx) = mpsc::channel(10);
        self.command_tx = Some(command_tx);

        let debounce = self.debounce;
        let store = Arc::clone(&self.store);
        let status = Arc::clone(&self.status);

        let task = tokio::spawn(async move {
            let mut pending: Option<Arc<AppData>> = None;
            let deadline = time::sleep(debounce);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    changed = snapshots.changed() => match changed {
                        Ok(()) => {
                            pending = Some(Arc::clone(&snapshots.borrow_and_update()));
                            deadline.as_mut().reset(Instant::now() + debounce);
                            set_pending(&status, true);
                            trace!("Snapshot changed, write scheduled in {:?}", debounce);
                        }
                        Err(_) => {
                            debug!("Snapshot publisher closed");
                            if let Some(snapshot) = pending.take() {
                                let _ = persist(&store, &status, snapshot).await;
                            }
                            break;
                        }
                    },
                    () = &mut deadline, if pending.is_some() => {
                        if let Some(snapshot) = pending.take() {
                            let _ = persist(&store, &status, snapshot).await;
                        }
                    }
                    cmd = command_rx.recv() => {
                        // Pick up a change published just before the command.
                        if snapshots.has_changed().unwrap_or(false) {
                            pending = Some(Arc::clone(&snapshots.borrow_and_update()));
                        }

                        match cmd {
                            Some(SchedulerCommand::FlushNow(ack)) => {
                                let result = match pending.take() {
                                    Some(snapshot) => persist(&store, &status, snapshot).await,
                                    None => Ok(()),
                                };
                                let _ = ack.send(result);
                            }
                            Some(SchedulerCommand::Stop) | None => {
                                info!("Persistence scheduler stopping...");
                                if let Some(snapshot) = pending.take() {
                                    let _ = persist(&store, &status, snapshot).await;
                                }
                                break;
                            }
                        }
                    }
                }
            }

            if let Ok(mut status) = status.lock() {
                status.is_running = false;
                status.pending = false;
            }
        });

        self.scheduler_task = Some(task);
        if let Ok(mut status) = self.status.lock() {
            status.is_running = true;
        }

        Ok(())
    }

    /// Writes the pending snapshot right away instead of waiting for the window
    pub async fn flush(&self) -> Result<()> {
        let Some(command_tx) = self.command_tx.as_ref().filter(|_| self.is_running()) else {
            return Err(CardsError::PersistenceFailed {
                message: "Persistence scheduler is not running".to_string(),
            });
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        command_tx
            .send(SchedulerCommand::FlushNow(ack_tx))
            .await
            .map_err(|e| CardsError::PersistenceFailed {
                message: format!("Failed to send flush command: {}", e),
            })?;

        ack_rx.await.map_err(|e| CardsError::PersistenceFailed {
            message: format!("Persistence scheduler dropped flush request: {}", e),
        })?
    }

    /// Stops the scheduler, letting an in-flight write finish and writing a
    /// still-pending snapshot once. Nothing is written afterwards.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.scheduler_task.take() {
            if let Some(command_tx) = self.command_tx.take() {
                if let Err(e) = command_tx.send(SchedulerCommand::Stop).await {
                    error!("Failed to send stop command to persistence scheduler: {}", e);
                }
            }

            if let Err(e) = task.await {
                let error_msg = format!("Failed to stop persistence scheduler: {}", e);
                error!("{}", error_msg);
                return Err(CardsError::PersistenceFailed { message: error_msg });
            }

            info!("Persistence scheduler stopped");
        } else {
            debug!("Persistence scheduler is not running");
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running
    }

    /// Get the current status of the persistence scheduler
    pub fn status(&self) -> PersistenceStatus {
        self.status
            .lock()
            .map(|status| status.clone())
            .unwrap_or_default()
    }
}

fn set_pending(status: &Mutex<PersistenceStatus>, pending: bool) {
    if let Ok(mut status) = status.lock() {
        status.pending = pending;
    }
}

/// The single write path. Failures are logged and recorded, never retried
/// here: the next change schedules another write.
async fn persist<S: KeyValueStore>(
    store: &DataStore<S>,
    status: &Mutex<PersistenceStatus>,
    snapshot: Arc<AppData>,
) -> Result<()> {
    set_pending(status, false);

    let result = store.save(&snapshot).await;
    if let Ok(mut status) = status.lock() {
        match &result {
            Ok(()) => {
                status.saves_completed += 1;
                status.last_save_time = Some(Utc::now());
                status.last_error = None;
            }
            Err(e) => status.last_error = Some(e.to_string()),
        }
    }

    match &result {
        Ok(()) => debug!("Persisted snapshot with {} cards", snapshot.cards.len()),
        Err(e) => error!("Failed to persist snapshot, keeping in-memory state: {}", e),
    }
    result
}
