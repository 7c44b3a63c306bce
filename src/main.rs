// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use landmark_streamer::config::{apply_env_overrides, load_config_with_env, LoggingConfig};
use landmark_streamer::{
    AutoReconnectService, CaptureEvent, CapturePipeline, ConnectionRegistry, FixedCadence,
    InboundMessage, KinematicGate, ReconnectPolicy, Sample, StreamerConfig, WebSocketConnector,
    WindowTransmitter,
};

/// Landmark Streamer - stream pose landmarks to remote classifiers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Classifier endpoint (repeatable, overrides config file)
    #[arg(short, long)]
    endpoint: Vec<String>,

    /// NDJSON file of samples, one per line ("-" for stdin)
    #[arg(short, long, default_value = "-")]
    input: String,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_lowercase()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match logging.format.as_str() {
        "compact" => builder.compact().try_init(),
        _ => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}

fn load(args: &Args) -> Result<StreamerConfig> {
    let mut config = if args.config.exists() {
        load_config_with_env(&args.config)?
    } else {
        let mut config = StreamerConfig::default();
        apply_env_overrides(&mut config)?;
        config
    };

    // Apply CLI overrides
    if !args.endpoint.is_empty() {
        config.endpoints.addresses = args.endpoint.clone();
    }

    Ok(config)
}

async fn open_input(input: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    if input == "-" {
        return Ok(Box::new(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("Failed to open input {}", input))?;
    Ok(Box::new(file))
}

/// Feed samples line by line until EOF
async fn feed(pipeline: Arc<CapturePipeline>, input: Box<dyn AsyncRead + Unpin + Send>) -> Result<()> {
    let mut lines = BufReader::new(input).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Sample>(&line) {
            Ok(sample) => {
                pipeline.push_sample(sample);
            }
            Err(e) => warn!("Skipping line {}: {}", line_no, e),
        }
    }

    info!("Input exhausted after {} lines", line_no);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    let config = load(&args)?;
    init_tracing(&config.logging)?;

    info!("Starting Landmark Streamer");
    info!("Loaded configuration from: {:?}", args.config);
    info!("Endpoints: {:?}", config.endpoints.addresses);

    let connector = Arc::new(WebSocketConnector::new(config.endpoints.connect_timeout()));
    let registry = ConnectionRegistry::new(connector, config.endpoints.secure_origin);

    registry.subscribe(|state| {
        info!(
            "Connections: {:?} ({}/{} connected, {} connecting, {} errored)",
            state.global_status, state.connected, state.total, state.connecting, state.errored
        );
    });

    let reconnect = Arc::new(AutoReconnectService::new(
        registry.clone(),
        ReconnectPolicy::from(&config.reconnect),
    ));

    let records = registry.open_many_with(
        config.endpoints.addresses.as_slice(),
        config.endpoints.auto_reconnect,
    );
    for record in records {
        registry.add_listener(&record.id, |id, message| match message {
            InboundMessage::ClassificationResult { data } => info!(
                "[{}] prediction '{}' (confidence {:.2})",
                id, data.prediction, data.confidence
            ),
            InboundMessage::Unknown => warn!("[{}] unrecognized message", id),
            _ => {}
        });
    }

    if config.endpoints.auto_reconnect {
        reconnect.start();
    }

    let transmitter = Arc::new(WindowTransmitter::new(registry.clone()));
    let pipeline = Arc::new(CapturePipeline::new(
        Arc::new(KinematicGate::new(config.capture.admission)),
        Arc::new(FixedCadence::new(config.capture.buffer_duration())),
        transmitter,
        config.capture.send_first_frame,
    ));

    let mut events = pipeline.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let CaptureEvent::SlowDown { frames, .. } = event {
                warn!("Slow down: last {} frames moved too fast", frames);
            }
        }
    });

    pipeline.start();
    pipeline.start_capture();

    let input = open_input(&args.input).await?;

    tokio::select! {
        result = feed(pipeline.clone(), input) => {
            if let Err(e) = result {
                error!("Input error: {}", e);
            }
            // Push out whatever the last partial window holds
            pipeline.flush_now();
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Cleanup
    pipeline.stop();
    reconnect.stop();
    registry.close_all();
    info!("Landmark Streamer shut down successfully");

    Ok(())
}
