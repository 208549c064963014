// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

mod broadcast;
mod config;
mod logging;
mod pipeline;
mod source;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use tracing::info;

use specview_dsp::{FftFactory, SpectrumAnalyzer};

use broadcast::BroadcastSink;
use config::ServerConfig;

type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - spectrum analysis daemon");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// IP address for the WebSocket listener
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the WebSocket listener
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_toml());
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };

    let errors = cfg.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("config error: {}", e);
        }
        std::process::exit(1);
    }

    logging::init(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let addr = SocketAddr::new(
        cli.listen.unwrap_or(cfg.listen.listen),
        cli.port.unwrap_or(cfg.listen.port),
    );

    let settings = cfg.spectrum.settings.sanitized();
    info!(
        "Starting specview-server (fft: {} pts, window: {:?}, averaging: {:?} x{})",
        settings.fft_size, settings.window, settings.averaging_mode, settings.averaging_depth
    );

    // Warm the engine pool across the supported size range so runtime
    // reconfiguration never pays FFT planning latency.
    let factory = Arc::new(FftFactory::new());
    factory.preallocate(
        specview_dsp::MIN_FFT_SIZE.trailing_zeros(),
        specview_dsp::MAX_FFT_SIZE.trailing_zeros(),
        1,
        0,
        settings.fft_implementation,
    );

    let analyzer = Arc::new(SpectrumAnalyzer::new(Arc::clone(&factory), &settings));
    analyzer.handle_signal_change(cfg.source.center_frequency_hz, cfg.source.sample_rate);

    let (frame_tx, _) = tokio::sync::broadcast::channel::<Bytes>(broadcast::FRAME_CHANNEL_CAPACITY);
    analyzer.add_frame_sink(Box::new(BroadcastSink::new(frame_tx.clone())));
    analyzer.start();

    let iq_source = source::build_source(&cfg.source);
    pipeline::start(
        iq_source,
        cfg.source.sample_rate,
        cfg.source.block_size,
        cfg.spectrum.positive_only,
        Arc::clone(&analyzer),
    )?;

    broadcast::serve(addr, frame_tx)
        .await
        .map_err(|e| format!("spectrum server error: {}", e))?;

    analyzer.stop();
    info!("specview-server stopped");
    Ok(())
}
