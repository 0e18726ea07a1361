//! The process-wide card store.
//!
//! `CardStore` owns the current snapshot and is the only place the reducer is
//! called from. It is built once at start-up and handed to the presentation
//! layer by reference; there is no global instance.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use tokio::sync::{watch, Mutex as TokioMutex};

use crate::{
    parse_app_data, reduce, Action, AppData, Config, DataStore, FileStore, ImportMode,
    ImportSummary, KeyValueStore, PersistenceScheduler, PersistenceStatus, Result, StateView,
};

/// Readiness flags and the actions that arrived before the initial load.
#[derive(Debug)]
struct Readiness {
    loading: bool,
    load_error: Option<String>,
    queued: Vec<Action>,
}

pub struct CardStore<S> {
    /// Latest published snapshot; every subscriber reads from here
    snapshot_tx: watch::Sender<Arc<AppData>>,

    /// Serializes dispatches so snapshots are totally ordered
    readiness: Mutex<Readiness>,

    scheduler: TokioMutex<PersistenceScheduler<S>>,

    store: Arc<DataStore<S>>,

    pretty_export: bool,
}

impl CardStore<FileStore> {
    /// Builds a store persisting to a file under `config.data_dir`
    pub fn from_config(config: &Config) -> Self {
        let backend = FileStore::new(&config.data_dir);
        Self::new(DataStore::new(backend, config.storage_key.clone()), config)
    }
}

impl<S: KeyValueStore> CardStore<S> {
    /// Creates the store in its loading state, holding the empty aggregate.
    ///
    /// Call [`initialize`](Self::initialize) before relying on the contents.
    pub fn new(store: DataStore<S>, config: &Config) -> Self {
        let store = Arc::new(store);
        let (snapshot_tx, _) = watch::channel(Arc::new(AppData::empty()));
        let scheduler = PersistenceScheduler::new(Arc::clone(&store), config.debounce());

        Self {
            snapshot_tx,
            readiness: Mutex::new(Readiness {
                loading: true,
                load_error: None,
                queued: Vec::new(),
            }),
            scheduler: TokioMutex::new(scheduler),
            store,
            pretty_export: config.pretty_export,
        }
    }

    fn readiness(&self) -> MutexGuard<'_, Readiness> {
        self.readiness
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the persisted aggregate and starts persistence.
    ///
    /// The loaded data goes through the `Load` action like any other change,
    /// but is not written back. Actions dispatched while loading are applied
    /// right after it, in the order they arrived.
    pub async fn initialize(&self) -> Result<()> {
        if !self.readiness().loading {
            return Ok(());
        }

        let outcome = self.store.load().await;
        let mut scheduler = self.scheduler.lock().await;

        let mut readiness = self.readiness();
        if !readiness.loading {
            return Ok(());
        }

        self.apply(Action::Load(outcome.data));
        readiness.loading = false;
        if let Some(e) = outcome.error {
            warn!("Starting with empty data after load failure: {}", e);
            readiness.load_error = Some(e.to_string());
        }

        scheduler.start(self.snapshot_tx.subscribe())?;

        let queued = std::mem::take(&mut readiness.queued);
        if !queued.is_empty() {
            debug!("Replaying {} actions dispatched during load", queued.len());
        }
        for action in queued {
            self.apply(action);
        }

        info!("Card store ready");
        Ok(())
    }

    /// Runs `action` through the reducer and publishes the result.
    ///
    /// Returns the snapshot current after the action. While the initial load
    /// is still running the action is queued and the current (empty)
    /// snapshot is returned.
    pub fn dispatch(&self, action: Action) -> Arc<AppData> {
        let mut readiness = self.readiness();
        if readiness.loading {
            debug!("Queueing {} until the initial load completes", action.kind());
            readiness.queued.push(action);
            return self.snapshot_tx.borrow().clone();
        }

        self.apply(action)
    }

    /// Must be called with the readiness lock held.
    fn apply(&self, action: Action) -> Arc<AppData> {
        debug!("Dispatching {}", action.kind());
        self.snapshot_tx.send_if_modified(|current| {
            let next = reduce(&**current, action);
            if next == **current {
                return false;
            }
            *current = Arc::new(next);
            true
        });
        self.snapshot_tx.borrow().clone()
    }

    /// Current snapshot plus readiness flags
    pub fn state(&self) -> StateView {
        let readiness = self.readiness();
        StateView {
            data: self.snapshot_tx.borrow().clone(),
            loading: readiness.loading,
            load_error: readiness.load_error.clone(),
        }
    }

    /// Current snapshot only
    pub fn snapshot(&self) -> Arc<AppData> {
        self.snapshot_tx.borrow().clone()
    }

    /// Receives every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppData>> {
        self.snapshot_tx.subscribe()
    }

    /// Serializes the whole aggregate for sharing
    pub fn export_json(&self) -> Result<String> {
        let snapshot = self.snapshot();
        let json = if self.pretty_export {
            serde_json::to_string_pretty(&*snapshot)?
        } else {
            serde_json::to_string(&*snapshot)?
        };

        info!(
            "Exported {} cards and {} groups",
            snapshot.cards.len(),
            snapshot.groups.len()
        );
        Ok(json)
    }

    /// Validates `text` and, if it is a well-formed aggregate, applies it.
    ///
    /// Rejected imports leave the state untouched and report whether the text
    /// was not JSON or had the wrong shape.
    pub fn import_json(&self, text: &str, mode: ImportMode) -> Result<ImportSummary> {
        let data = parse_app_data(text).map_err(|e| {
            warn!("Rejected import: {}", e);
            e
        })?;

        let cards_in_payload = data.cards.len();
        let groups_in_payload = data.groups.len();
        let snapshot = self.dispatch(Action::Import { data, mode });

        info!(
            "Imported {} cards and {} groups ({:?})",
            cards_in_payload, groups_in_payload, mode
        );
        Ok(ImportSummary {
            mode,
            cards_in_payload,
            groups_in_payload,
            total_cards: snapshot.cards.len(),
            total_groups: snapshot.groups.len(),
        })
    }

    /// Writes any pending snapshot now instead of waiting for the window
    pub async fn flush(&self) -> Result<()> {
        self.scheduler.lock().await.flush().await
    }

    pub async fn persistence_status(&self) -> PersistenceStatus {
        self.scheduler.lock().await.status()
    }

    /// Stops persistence, writing a still-pending snapshot first
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down card store");
        self.scheduler.lock().await.stop().await
    }
}
