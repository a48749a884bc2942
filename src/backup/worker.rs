use crate::backup::coordinator::{BackupBundle, BackupCoordinator, RestoreReport};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::store::PersistenceStore;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

pub type SharedStore = Box<dyn PersistenceStore + Send>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackupJob {
    Export,
    Import(PathBuf),
}

#[derive(Debug)]
pub enum BackupEvent {
    Exported(BackupBundle),
    Imported(RestoreReport),
    Failed { job: BackupJob, error: Error },
}

/// Single background thread running backup jobs one at a time, in order
///
/// Completion of every job is reported on the event channel returned by
/// [`spawn`](Self::spawn). When a store is handed over, imports close and
/// reopen it around the swap; [`shutdown`](Self::shutdown) gives it back.
pub struct BackupWorker {
    job_tx: Option<Sender<BackupJob>>,
    handle: Option<JoinHandle<Option<SharedStore>>>,
}

impl BackupWorker {
    pub fn spawn(
        coordinator: Arc<BackupCoordinator>,
        store: Option<SharedStore>,
    ) -> Result<(Self, Receiver<BackupEvent>)> {
        let (job_tx, job_rx) = channel();
        let (event_tx, event_rx) = channel();
        let handle = std::thread::Builder::new()
            .name("backup-worker".into())
            .spawn(move || run(coordinator, store, job_rx, event_tx))?;

        Ok((
            Self {
                job_tx: Some(job_tx),
                handle: Some(handle),
            },
            event_rx,
        ))
    }

    pub fn request_backup(&self) -> Result<()> {
        self.submit(BackupJob::Export)
    }

    pub fn request_import<P: Into<PathBuf>>(&self, archive: P) -> Result<()> {
        self.submit(BackupJob::Import(archive.into()))
    }

    fn submit(&self, job: BackupJob) -> Result<()> {
        match &self.job_tx {
            Some(tx) => Ok(tx.send(job)?),
            None => Err(Error::ChannelSendError(format!(
                "Backup worker stopped, dropping {:?}",
                job
            ))),
        }
    }

    /// Finishes queued jobs, stops the thread and returns the store.
    pub fn shutdown(mut self) -> Option<SharedStore> {
        self.stop()
    }

    fn stop(&mut self) -> Option<SharedStore> {
        self.job_tx.take();
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(store) => store,
            Err(_) => {
                tracing::error!("Backup worker panicked");
                None
            }
        }
    }
}

impl Drop for BackupWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    coordinator: Arc<BackupCoordinator>,
    mut store: Option<SharedStore>,
    jobs: Receiver<BackupJob>,
    events: Sender<BackupEvent>,
) -> Option<SharedStore> {
    for job in jobs {
        tracing::debug!("Running backup job {:?}", job);
        let res = match &job {
            BackupJob::Export => coordinator.request_backup().map(BackupEvent::Exported),
            BackupJob::Import(archive) => match store.as_deref_mut() {
                Some(store) => coordinator.import_file_into_store(store, archive),
                None => coordinator.import_file(archive),
            }
            .map(BackupEvent::Imported),
        };
        let event = res.unwrap_or_else(|error| BackupEvent::Failed { job, error });

        if events.send(event).is_err() {
            tracing::warn!("Backup event receiver dropped, stopping worker");
            break;
        }
    }
    tracing::debug!("Backup worker finished");
    store
}
