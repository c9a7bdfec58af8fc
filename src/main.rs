/*
 *  main.rs
 *
 *  EcuMonS - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Startup, hardware acquisition and graceful shutdown
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use chrono::Local;
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};

use tokio::signal::unix::{signal, SignalKind};

use ecumons::button::ButtonSource;
use ecumons::config::{self, Cli, Config, DriverKind};
use ecumons::controller::{DashController, DashSettings};
use ecumons::display::{LogSink, RenderSink};
use ecumons::housekeeping::prune_stale_logs;
use ecumons::runner;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Waits for SIGINT, SIGTERM or SIGHUP and logs which one arrived.
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal_handler().await {
        error!("Signal handlers unavailable ({}), falling back to Ctrl-C", e);
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn open_sink(cfg: &Config) -> anyhow::Result<Box<dyn RenderSink>> {
    match cfg.driver() {
        DriverKind::Log => {
            info!("Headless: frames are written to the log");
            Ok(Box::new(LogSink::new()))
        }
        DriverKind::Ssd1306 => open_panel(cfg),
    }
}

#[cfg(feature = "driver-ssd1306")]
fn open_panel(cfg: &Config) -> anyhow::Result<Box<dyn RenderSink>> {
    use anyhow::Context;
    use ecumons::display::{OledSink, Ssd1306Driver};

    let (bus, address) = cfg.i2c();
    let display_cfg = cfg.display.clone().unwrap_or_default();
    let driver = Ssd1306Driver::new_i2c(&bus, address, &display_cfg)
        .with_context(|| format!("opening SSD1306 on {} at 0x{:02X}", bus, address))?;
    let sink = OledSink::new(driver).context("initialising SSD1306")?;
    Ok(Box::new(sink))
}

#[cfg(not(feature = "driver-ssd1306"))]
fn open_panel(_cfg: &Config) -> anyhow::Result<Box<dyn RenderSink>> {
    anyhow::bail!("built without the driver-ssd1306 feature; run with --headless")
}

#[cfg(feature = "gpio-button")]
fn open_button(cfg: &Config) -> anyhow::Result<Box<dyn ButtonSource>> {
    use anyhow::Context;

    let pin = cfg.button_pin();
    let button = ecumons::button::GpioButton::open(pin, cfg.button_active_low(), cfg.button_timing())
        .with_context(|| format!("claiming button on GPIO{}", pin))?;
    Ok(Box::new(button))
}

#[cfg(not(feature = "gpio-button"))]
fn open_button(_cfg: &Config) -> anyhow::Result<Box<dyn ButtonSource>> {
    Err(ecumons::button::InputError::Unsupported.into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = config::load(&cli)?;

    if cli.dump_config {
        println!("{}", serde_yaml::to_string(&cfg)?);
        return Ok(());
    }

    let level = if cli.debug { "debug" } else { cfg.log_level.as_deref().unwrap_or("info") };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("This {} worth the Squeeze", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let settings = DashSettings::from_config(&cfg);
    info!(
        "Watching {} for .{} every {:?}",
        settings.log_dir.display(),
        settings.extensions.join("/."),
        cfg.poll_interval()
    );

    if cfg.prune_old_logs() {
        let removed = prune_stale_logs(&settings.log_dir, &settings.extensions, Local::now().date_naive());
        info!("Pruned {} datalog(s) from previous days", removed);
    }

    let mut sink = match open_sink(&cfg) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Display unavailable: {:#}", e);
            return Err(e.into());
        }
    };

    // a headless run on a dev box has no GPIO; anywhere else the button is required
    let mut button = match open_button(&cfg) {
        Ok(button) => Some(button),
        Err(e) if cfg.driver() == DriverKind::Log => {
            warn!("Button disabled: {:#}", e);
            None
        }
        Err(e) => {
            error!("Button unavailable: {:#}", e);
            let _ = sink.release();
            return Err(e.into());
        }
    };

    let mut dash = DashController::new(settings);
    runner::run(
        &mut dash,
        sink.as_mut(),
        button.as_mut().map(|b| &mut **b as &mut dyn ButtonSource),
        cfg.poll_interval(),
        shutdown_signal(),
    )
    .await;

    // GPIO pin and I2C bus are released on drop
    drop(button);
    drop(sink);
    info!("Shutdown complete");
    Ok(())
}
