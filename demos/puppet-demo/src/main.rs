//! Command-line puppet
//!
//! Connects to the host (or an in-memory one with `--offline`), plays an
//! emotion and a line of speech, prints the controller status and exits.
//! With `--duration 0` it runs until Ctrl-C.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use marionette_runtime::{init_logging, load_config, AvatarController};
use marionette_transport::{HostConnector, ScriptedConnector, WsConnector};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive a VTuber avatar from the command line", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./marionette.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host address
    #[arg(long)]
    host: Option<String>,

    /// Preferred host port
    #[arg(short, long)]
    port: Option<u16>,

    /// Use an in-memory host instead of the network
    #[arg(long)]
    offline: bool,

    /// Emotion to play after connecting
    #[arg(short, long, default_value = "happy")]
    emotion: String,

    /// Emotion intensity
    #[arg(long, default_value_t = 0.8)]
    intensity: f64,

    /// Line of speech to run through emotion detection
    #[arg(short, long)]
    say: Option<String>,

    /// Seconds to keep animating; 0 runs until Ctrl-C
    #[arg(short, long, default_value_t = 5)]
    duration: u64,

    /// Log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> HashMap<String, String> {
        let mut overrides = HashMap::new();
        if let Some(host) = &self.host {
            overrides.insert("host".to_string(), host.clone());
        }
        if let Some(port) = self.port {
            overrides.insert("port".to_string(), port.to_string());
        }
        if let Some(level) = &self.log_level {
            overrides.insert("log_level".to_string(), level.clone());
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), Some(&cli.overrides())) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("puppet-demo: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.log_level);

    let connector: Arc<dyn HostConnector> = if cli.offline {
        info!("Running against an in-memory host");
        Arc::new(ScriptedConnector::new())
    } else {
        Arc::new(WsConnector::new(config.plugin.to_plugin_info()))
    };

    let avatar = AvatarController::new(config, connector);
    if !avatar.initialize().await {
        error!("No connection tier available");
        println!("{}", avatar.get_status().to_json());
        return ExitCode::FAILURE;
    }

    if !avatar.set_emotion(&cli.emotion, cli.intensity, 2.0, "ease_in_out") {
        error!("Emotion {} has no profile", cli.emotion);
    }

    if let Some(line) = &cli.say {
        let detected = avatar.detect_and_apply_speech(line, 1.0).await;
        info!("Detected emotions: {:?}", detected);
    }

    if cli.duration == 0 {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for Ctrl-C: {}", e);
        }
    } else {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(cli.duration)) => {}
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        }
    }

    println!("{}", avatar.get_status().to_json());
    avatar.shutdown().await;
    ExitCode::SUCCESS
}
