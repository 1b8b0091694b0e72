use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use args::DaemonConfig;
use collection::{
    collector::{Backoff, CollectionModule},
    event::InputEvent,
    listener::{GenericInputListener, InputListener, InputSink},
};
use processing::{
    handle::CounterHandle,
    scheduler::{FlushPolicy, PersistenceScheduler},
    tally::Tally,
    ProcessingModule,
};
use storage::{
    entities::DayKey,
    history_storage::{HistoryStorage, HistoryStorageImpl, HISTORY_FILE_NAME},
    save_worker::SaveWorker,
};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::utils::clock::{Clock, DefaultClock};

pub mod args;
pub mod collection;
pub mod processing;
pub mod shutdown;
pub mod storage;

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, config: DaemonConfig) -> Result<()> {
    let dir = std::path::absolute(dir)?;
    std::env::set_current_dir("/")?;

    let listener = GenericInputListener::new()?;
    let shutdown_token = CancellationToken::new();

    // History is loaded before the listener is armed.
    let (processor, sender, handle) =
        create_processor(dir.join(HISTORY_FILE_NAME), config, &shutdown_token, DefaultClock)
            .await?;
    let collector = create_collector(sender, listener, &shutdown_token, DefaultClock);

    let (_, collection_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(handle.clone()),
        collector.run(),
        processor.run(),
    );

    if let Err(collection_result) = collection_result {
        error!("Collection module got an error {:?}", collection_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    info!(
        "Stopped, {} ended at {:?}",
        handle.current_day(),
        handle.current_counts()
    );
    Ok(())
}

fn create_collector(
    sender: mpsc::UnboundedSender<InputEvent>,
    listener: impl InputListener + 'static,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> CollectionModule {
    let tap_disabled = Arc::new(Notify::new());
    CollectionModule::new(
        Box::new(listener),
        InputSink::new(sender, tap_disabled.clone()),
        tap_disabled,
        shutdown_token.clone(),
        Backoff::default(),
        Box::new(clock),
    )
}

type Processor = ProcessingModule<Tally>;

async fn create_processor(
    history_path: PathBuf,
    config: DaemonConfig,
    shutdown_token: &CancellationToken,
    clock: impl Clock + Clone,
) -> Result<(Processor, mpsc::UnboundedSender<InputEvent>, CounterHandle)> {
    let storage = HistoryStorageImpl::new(history_path, Box::new(clock.clone()))?;
    let history = storage.load().await?;
    let today = DayKey::of(&clock.time());

    let scheduler = PersistenceScheduler::new(
        FlushPolicy::every(config.flush_every),
        SaveWorker::spawn(storage),
    );
    let tally = Tally::new(today, history, scheduler);
    let handle = tally.handle(shutdown_token.clone());
    info!("Counting {today} from {:?}", handle.current_counts());

    let (sender, receiver) = mpsc::unbounded_channel();
    let processor = ProcessingModule::new(receiver, tally, shutdown_token.clone());
    Ok((processor, sender, handle))
}
