mod cli;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cli::Cli;
use shinyhunt::capture::CameraSource;
use shinyhunt::config::Settings;
use shinyhunt::controller::BridgeController;
use shinyhunt::hunter::{HuntOutcome, Hunter};
use shinyhunt::listener::CommandListener;
use shinyhunt::sequencer::{EncounterSequencer, ScreenLayout};
use shinyhunt::snapshots::SnapshotWriter;
use shinyhunt::status::{ControlFlags, StatusHub};
use shinyhunt::telegram::{Messenger, TelegramBot};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "shinyhunt=info",
        1 => "shinyhunt=debug",
        _ => "shinyhunt=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let settings = Settings::load(&cli.config)?;
    let start_iteration = cli.iteration.unwrap_or(settings.iteration);
    info!(
        config = %cli.config.display(),
        start_iteration,
        "settings loaded"
    );

    // No automation without a frame source: a camera that will not open is
    // a fatal startup error.
    let camera = CameraSource::open(
        settings.camera.index,
        settings.camera.width,
        settings.camera.height,
    )
    .context("camera initialization failed")?;

    let controller = BridgeController::connect(&settings.bridge.addr)?;

    let messenger = Arc::new(TelegramBot::new(
        &settings.telegram.token,
        settings.telegram.user_id,
    ));
    let hub = Arc::new(StatusHub::new());
    let flags = Arc::new(ControlFlags::new());
    let listener_shutdown = Arc::new(AtomicBool::new(false));

    // SIGINT takes the same graceful path as the operator's /stop command.
    {
        let flags = Arc::clone(&flags);
        ctrlc::set_handler(move || {
            info!("interrupt received, stopping after the current iteration");
            flags.request_stop();
        })
        .context("failed to install interrupt handler")?;
    }

    if let Err(e) = messenger.send_text("ShinyHunter has started!") {
        warn!(error = %e, "failed to send start notice");
    }

    let listener = CommandListener::new(
        Arc::clone(&messenger),
        Arc::clone(&hub),
        Arc::clone(&flags),
        Arc::clone(&listener_shutdown),
        Duration::from_secs(settings.hunt.poll_interval_secs),
    );
    let listener_thread = std::thread::spawn(move || listener.run());

    let sequencer = EncounterSequencer::new(
        camera,
        controller,
        ScreenLayout::default(),
        SnapshotWriter::new(&settings.hunt.output_dir),
    );
    let mut hunter = Hunter::new(
        sequencer,
        Arc::clone(&messenger),
        Arc::clone(&hub),
        Arc::clone(&flags),
    );

    let outcome = hunter.hunt(start_iteration);

    // Teardown runs on every exit path, including a failed hunt.
    if let Err(e) = hunter.shutdown() {
        warn!(error = %e, "controller disconnect failed");
    }
    if let Err(e) = messenger.send_text("Shutting down, goodbye!") {
        warn!(error = %e, "failed to send goodbye notice");
    }
    listener_shutdown.store(true, Ordering::SeqCst);
    if listener_thread.join().is_err() {
        warn!("command listener thread panicked");
    }

    match outcome? {
        HuntOutcome::RareFound { iteration } => {
            info!(iteration, "rare variant found, run complete");
        }
        HuntOutcome::Stopped { next_iteration } => {
            info!(
                next_iteration,
                "stopped on request, seed the next session with this iteration"
            );
        }
    }
    Ok(())
}
