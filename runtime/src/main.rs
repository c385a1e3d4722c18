//! Stepsync - developer harness for the reconciliation runtime.
//!
//! Wires an in-memory session, a synthetic sensor and a channel-backed
//! lifecycle source to the engine, then takes commands from stdin so the
//! foreground/background flow can be driven by hand.

use std::sync::Arc;

use serde::Serialize;
use stepsync_engine::{AppPhase, Decision, Identity, PendingResult, Timestamp};
use stepsync_runtime::{
    ChannelLifecycle, Config, InMemorySession, ReconciliationEngine, SessionProvider,
    SyntheticSensor, SystemClock, Trigger,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "commands: active | background | inactive | login <id> | logout | check | status | peek | accept | discard | sensor on|off | quit";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    identity: Option<Identity>,
    phase: AppPhase,
    cursor: Option<Timestamp>,
    in_flight: bool,
    sensor_available: bool,
    pending: Option<PendingResult>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stepsync_runtime=debug,stepsync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        threshold = config.threshold,
        sensor_rate = config.sensor_rate,
        "Starting stepsync harness"
    );

    let session = Arc::new(InMemorySession::new());
    if let Some(identity) = &config.identity {
        session.login(identity.clone());
    }

    let engine = ReconciliationEngine::from_config(&config, session.clone(), Arc::new(SystemClock));
    let sensor = Arc::new(SyntheticSensor::new(config.sensor_rate));
    engine.install_sensor(sensor.clone());

    let (lifecycle, phases) = ChannelLifecycle::new();
    let handle = engine.start(&lifecycle, config.debounce);

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        match command {
            "active" | "background" | "inactive" => {
                if phases.send(AppPhase::from_name(command)).is_err() {
                    tracing::warn!("Lifecycle subscription closed");
                }
            }
            "login" => match words.next() {
                Some(identity) => session.login(identity),
                None => println!("usage: login <id>"),
            },
            "logout" => session.logout(),
            "check" => {
                let outcome = engine.trigger(Trigger::Manual).await;
                println!("{outcome:?}");
            }
            "status" => {
                let identity = session.current_identity();
                let status = Status {
                    phase: handle.phase(),
                    cursor: identity.as_deref().and_then(|id| engine.cursor(id)),
                    in_flight: identity
                        .as_deref()
                        .is_some_and(|id| engine.is_in_flight(id)),
                    sensor_available: sensor.permission_granted() && !sensor.is_released(),
                    pending: engine.peek_current(),
                    identity,
                };
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            "peek" => match engine.peek_current() {
                Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                None => println!("nothing pending"),
            },
            "accept" | "discard" => {
                let decision = if command == "accept" {
                    Decision::Accept
                } else {
                    Decision::Discard
                };
                match session.current_identity() {
                    Some(identity) => match engine.acknowledge(&identity, decision).await {
                        Some(ack) => println!("{}", serde_json::to_string(&ack)?),
                        None => println!("nothing pending"),
                    },
                    None => println!("not logged in"),
                }
            }
            "sensor" => match words.next() {
                Some("on") => sensor.set_available(true),
                Some("off") => sensor.set_available(false),
                _ => println!("usage: sensor on|off"),
            },
            "quit" | "exit" => break,
            _ => println!("{HELP}"),
        }
    }

    handle.shutdown();
    engine.release_sensor();
    tracing::info!("Harness stopped");

    Ok(())
}
