extern crate tokio;

use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};
use miette::{IntoDiagnostic, Result};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

use mayara_navico::brand::navico::{NavicoReceiver, RadarProfile, ReceiverHandle};
use mayara_navico::navdata::NavigationData;
use mayara_navico::radar::spoke::to_radar_message_bytes;
use mayara_navico::radar::{RadarError, SharedRadarState};
use mayara_navico::{Cli, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let log_level = args.verbose.log_level_filter();
    env_logger::Builder::from_env(Env::default())
        .filter_level(log_level)
        .init();

    info!("Mayara Navico {} loglevel {}", VERSION, log_level);
    if args.output {
        warn!("Output mode activated; 'protobuf' formatted RadarMessage sent to stdout");
    }

    let profile = RadarProfile::from_cli(&args);
    let navigation = Arc::new(NavigationData::from_cli(&args));
    let state = SharedRadarState::new(&profile.name);
    let receiver = NavicoReceiver::new(profile, navigation, state.clone()).into_diagnostic()?;
    let handle = receiver.handle();
    let output = args.output;
    let statistics_interval = args.statistics_interval;

    Toplevel::new(move |s| async move {
        s.start(SubsystemBuilder::new("Navico", |_| receiver.run()));
        s.start(SubsystemBuilder::new("Stop", |a| stop_receiver(a, handle)));
        let events_state = state.clone();
        s.start(SubsystemBuilder::new("Events", move |a| {
            log_events(a, events_state, statistics_interval)
        }));
        if output {
            s.start(SubsystemBuilder::new("Output", |a| forward_output(a, state)));
        }
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_millis(5000))
    .await
    .map_err(Into::into)
}

async fn stop_receiver(subsys: SubsystemHandle, handle: ReceiverHandle) -> Result<(), RadarError> {
    subsys.on_shutdown_requested().await;
    handle.shutdown();
    Ok(())
}

async fn log_events(
    subsys: SubsystemHandle,
    state: SharedRadarState,
    statistics_interval: u64,
) -> Result<(), RadarError> {
    let mut events = state.subscribe_events();
    let period = Duration::from_secs(statistics_interval.max(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let key = state.name();

    loop {
        tokio::select! { biased;
            _ = subsys.on_shutdown_requested() => {
                return Ok(());
            },
            r = events.recv() => match r {
                Ok(event) => info!("{}: {}", key, event),
                Err(RecvError::Lagged(n)) => warn!("{}: {} events lost", key, n),
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = interval.tick(), if statistics_interval > 0 => {
                let stats = state.statistics();
                info!("{}: {}", key, stats);
                if let Ok(json) = serde_json::to_string(&state.snapshot()) {
                    debug!("{}: {}", key, json);
                }
            },
        }
    }
}

async fn forward_output(subsys: SubsystemHandle, state: SharedRadarState) -> Result<(), RadarError> {
    let mut spokes = state.subscribe_spokes();
    let key = state.name();

    loop {
        tokio::select! { biased;
            _ = subsys.on_shutdown_requested() => {
                return Ok(());
            },
            r = spokes.recv() => match r {
                Ok(spokes) => match to_radar_message_bytes(1, &spokes) {
                    Ok(bytes) => {
                        let mut stdout = std::io::stdout().lock();
                        stdout.write_all(&bytes)?;
                        stdout.flush()?;
                    }
                    Err(e) => warn!("{}: cannot encode RadarMessage: {}", key, e),
                },
                Err(RecvError::Lagged(n)) => warn!("{}: {} spoke messages not written", key, n),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}
