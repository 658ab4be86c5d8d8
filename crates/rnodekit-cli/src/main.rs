use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rnodekit_core::cache::{DeviceTypeCache, FileCache, MemoryCache};
use rnodekit_core::kiss::{BT_CTRL_PAIR, BT_CTRL_STOP, bt_ctrl_frame};
use rnodekit_core::platform::BtleplugBackend;
use rnodekit_core::serial::{SerialBridge, UsbSerialBridge};
use rnodekit_core::validation::{ValidationMode, validate};
use rnodekit_core::{DiscoveryEngine, ScanFilter, ScanOptions};
use rnodekit_types::{RadioConfig, builtin_regions, region_by_id};

#[derive(Parser)]
#[command(name = "rnodekit")]
#[command(author, version, about = "Commissioning tool for RNode LoRa radios", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for RNode radios over BLE and USB serial
    Scan {
        /// Scan window in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// List the built-in regulatory regions
    Regions,

    /// List the channel slots of a region at a given bandwidth
    Slots {
        /// Region id (e.g. EU_868_M)
        #[arg(short, long)]
        region: String,

        /// Modem bandwidth in Hz
        #[arg(short, long, default_value = "125000")]
        bandwidth: u32,
    },

    /// Validate a radio configuration file
    Validate {
        /// Path to a TOML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Region id to validate against
        #[arg(short, long)]
        region: Option<String>,
    },

    /// Put a USB-attached radio into Bluetooth pairing mode
    PairMode {
        /// Serial port (e.g. /dev/ttyACM0)
        #[arg(short, long)]
        port: String,

        /// Leave pairing mode instead of entering it
        #[arg(long)]
        exit: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Scan { timeout } => scan(timeout).await,
        Commands::Regions => {
            regions();
            Ok(())
        }
        Commands::Slots { region, bandwidth } => slots(&region, bandwidth),
        Commands::Validate { config, region } => validate_config(&config, region.as_deref()),
        Commands::PairMode { port, exit } => pair_mode(&port, exit).await,
    }
}

fn device_type_cache() -> Arc<dyn DeviceTypeCache> {
    let path = dirs::cache_dir().map(|dir| dir.join("rnodekit").join("device-types.json"));
    match path.and_then(|path| FileCache::open(&path).ok()) {
        Some(cache) => Arc::new(cache),
        None => {
            tracing::warn!("No usable cache directory, device types will not persist");
            Arc::new(MemoryCache::new())
        }
    }
}

async fn scan(timeout: u64) -> Result<()> {
    let bluetooth = Arc::new(BtleplugBackend::new().await?);
    let serial = Arc::new(UsbSerialBridge::new());
    let options = ScanOptions {
        duration: Duration::from_secs(timeout),
        filter: ScanFilter::rnode(),
        ..ScanOptions::default()
    };
    let engine = DiscoveryEngine::with_options(bluetooth, serial, device_type_cache(), options);

    let report = engine.scan().await;

    for device in &report.devices {
        println!(
            "{}  {}  {}  rssi={}  bonded={}",
            device.address,
            device.name.as_deref().unwrap_or("-"),
            device.transport,
            device
                .rssi
                .map_or_else(|| "-".to_string(), |rssi| rssi.to_string()),
            device.bonded
        );
    }
    for usb in &report.usb_devices {
        println!(
            "{}  {}  usb {:04x}:{:04x}",
            usb.id,
            usb.product.as_deref().unwrap_or("-"),
            usb.vendor_id,
            usb.product_id
        );
    }
    for failure in &report.failures {
        eprintln!("warning: {:?} step failed: {}", failure.step, failure.error);
    }
    if report.found_nothing() {
        println!("No devices found.");
    }
    Ok(())
}

fn regions() {
    println!(
        "{:<12} {:<22} {:>12} {:>12} {:>8} {:>6}",
        "ID", "NAME", "START (Hz)", "END (Hz)", "TX (dBm)", "DUTY"
    );
    for region in builtin_regions() {
        let duty = if region.is_duty_restricted() {
            format!("{}%", region.duty_cycle_pct)
        } else {
            "-".to_string()
        };
        println!(
            "{:<12} {:<22} {:>12} {:>12} {:>8} {:>6}",
            region.id, region.name, region.start_hz, region.end_hz, region.max_tx_power_dbm, duty
        );
    }
}

fn slots(region_id: &str, bandwidth: u32) -> Result<()> {
    let region = region_by_id(region_id)
        .with_context(|| format!("unknown region '{region_id}', see `rnodekit regions`"))?;

    let count = region.slot_count(bandwidth);
    let default = region.default_slot(bandwidth);
    println!(
        "{} at {} Hz bandwidth: {} slot(s)",
        region.name, bandwidth, count
    );
    for slot in 0..count {
        let frequency = region.frequency_for_slot(bandwidth, slot)?;
        let marker = if slot == default { "  (default)" } else { "" };
        println!("  {:>4}  {:.4} MHz{}", slot, frequency as f64 / 1e6, marker);
    }
    Ok(())
}

fn validate_config(path: &PathBuf, region_id: Option<&str>) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: RadioConfig =
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;

    let region = match region_id {
        Some(id) => Some(
            region_by_id(id).with_context(|| format!("unknown region '{id}'"))?,
        ),
        None => None,
    };

    let outcome = validate(&config, region, ValidationMode::Submit);
    for warning in &outcome.warnings {
        println!("warning: {warning:?}");
    }
    if outcome.is_valid() {
        println!("'{}' is valid.", config.name);
        Ok(())
    } else {
        for error in &outcome.errors {
            eprintln!("error: {:?}: {}", error.field, error.message);
        }
        bail!("{} validation error(s)", outcome.errors.len());
    }
}

async fn pair_mode(port: &str, exit: bool) -> Result<()> {
    let serial = UsbSerialBridge::new();
    serial.connect(port).await?;

    let frame = bt_ctrl_frame(if exit { BT_CTRL_STOP } else { BT_CTRL_PAIR });
    let result = serial.write(&frame).await;
    serial.disconnect().await;

    let written = result?;
    if written != frame.len() {
        bail!("short write: {written} of {} bytes", frame.len());
    }
    if exit {
        println!("Radio on {port} left pairing mode.");
    } else {
        println!("Radio on {port} is now in pairing mode and advertising.");
    }
    Ok(())
}
