//! usb-printer-bridge
//!
//! Drives USB label printers, receipt printers and cash drawers from the
//! command line, or serves the printer methods as JSON lines over stdio.

use anyhow::{Context, Result, anyhow, bail};
use bridge::config::{self, BridgeConfig};
use bridge::methods::PrinterChannel;
use bridge::usb::{LibusbHost, resolve_bulk_out, spawn_usb_worker};
use clap::{Parser, Subcommand};
use common::{UsbBridge, UsbCommand, UsbEvent, create_usb_bridge, setup_logging};
use protocol::PrintJob;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-printer-bridge")]
#[command(
    author,
    version,
    about = "Print labels and receipts on USB printers and open cash drawers"
)]
#[command(long_about = "
Talks to USB label printers (TSPL), receipt printers and cash drawers
(ESC/POS) directly through libusb.

EXAMPLES:
    # List attached devices
    usb-printer-bridge devices

    # Print a sheet of barcode labels
    usb-printer-bridge print-label --name \"Kopi Susu\" --barcode 8991234567890 \\
        --device /dev/bus/usb/001/004

    # Print a receipt from a file
    usb-printer-bridge print-receipt --file receipt.txt --device /dev/bus/usb/001/005

    # Serve JSON method calls on stdin/stdout
    usb-printer-bridge serve

CONFIGURATION:
    The bridge looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-printer-bridge/bridge.toml
    3. /etc/usb-printer-bridge/bridge.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached USB devices
    Devices,

    /// Check or request access to a device (first attached device by default)
    RequestPermission {
        #[arg(long)]
        device: Option<String>,
    },

    /// Print a sheet of barcode labels
    PrintLabel {
        #[arg(long)]
        name: String,
        #[arg(long)]
        barcode: String,
        #[arg(long)]
        device: String,
    },

    /// Print a plain text receipt
    PrintReceipt {
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        #[arg(long)]
        device: String,
    },

    /// Kick the cash drawer attached to a receipt printer
    OpenDrawer {
        #[arg(long)]
        device: String,
    },

    /// Read JSON method calls from stdin, one per line
    Serve,

    /// Write the default configuration and exit
    SaveConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.as_deref().map(config::expand_path);

    // Handle save-config early (before loading config)
    if let Command::SaveConfig = args.command {
        let path = config_path.unwrap_or_else(BridgeConfig::default_path);
        BridgeConfig::default()
            .save(&path)
            .context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(path) = config_path {
        BridgeConfig::load(Some(path)).context("Failed to load configuration")?
    } else {
        BridgeConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.bridge.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    debug!("usb-printer-bridge v{}", env!("CARGO_PKG_VERSION"));

    let host = LibusbHost::new(config.permission_polling())
        .context("Failed to initialize libusb context")?;

    let (usb_bridge, worker) = create_usb_bridge();
    let usb_worker_handle = spawn_usb_worker(worker, host, config.worker_settings())
        .context("Failed to spawn USB worker thread")?;

    let channel = PrinterChannel::new(usb_bridge.clone());
    let result = run_command(args.command, &channel, &config).await;

    debug!("Shutting down USB subsystem...");
    if let Err(e) = shutdown_usb_worker(usb_bridge).await {
        error!("Error shutting down USB worker: {:#}", e);
    }

    // Wait for USB thread to exit
    if let Err(e) = usb_worker_handle.join() {
        error!("USB worker thread panicked: {:?}", e);
    }

    result
}

async fn run_command(
    command: Command,
    channel: &PrinterChannel,
    config: &BridgeConfig,
) -> Result<()> {
    match command {
        Command::Devices => list_devices(channel).await,
        Command::RequestPermission { device } => {
            request_permission(channel, device, config).await
        }
        Command::PrintLabel {
            name,
            barcode,
            device,
        } => run_job(channel, &device, PrintJob::Label { name, barcode }).await,
        Command::PrintReceipt { text, file, device } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read receipt file: {}", path.display()))?,
                (None, None) => bail!("Either --text or --file is required"),
            };
            run_job(channel, &device, PrintJob::Receipt { text }).await
        }
        Command::OpenDrawer { device } => run_job(channel, &device, PrintJob::DrawerKick).await,
        Command::Serve => serve(channel).await,
        Command::SaveConfig => Ok(()),
    }
}

/// List devices with their identity strings
async fn list_devices(channel: &PrinterChannel) -> Result<()> {
    let devices = channel.list_devices().await;

    if devices.is_empty() {
        println!("No USB devices found");
        return Ok(());
    }

    println!("Found {} USB device(s):", devices.len());
    for device in devices {
        let bulk_out = if resolve_bulk_out(&device.interfaces).is_some() {
            "yes"
        } else {
            "no"
        };
        let access = if device.permission_granted {
            "granted"
        } else {
            "denied"
        };
        println!("  {}", device.identity.identity_string());
        println!(
            "    {} {}  bulk-out: {}  access: {}",
            device.manufacturer.as_deref().unwrap_or("Unknown"),
            device.product.as_deref().unwrap_or("Unknown"),
            bulk_out,
            access
        );
    }

    Ok(())
}

/// Ask for access and wait for the host's answer if it is not immediate
async fn request_permission(
    channel: &PrinterChannel,
    device: Option<String>,
    config: &BridgeConfig,
) -> Result<()> {
    let devices = channel.list_devices().await;
    let attached = match &device {
        Some(name) => devices.iter().any(|d| d.identity.matches(name)),
        None => !devices.is_empty(),
    };
    if !attached {
        bail!("No matching USB device attached");
    }

    if channel.request_usb_permission(device).await {
        println!("granted");
        return Ok(());
    }

    let wait = config.permission_polling().timeout + Duration::from_secs(1);
    let granted = tokio::time::timeout(wait, async {
        while let Some(event) = channel.next_event().await {
            if let UsbEvent::PermissionResult { granted, .. } = event {
                return Some(granted);
            }
        }
        None
    })
    .await
    .ok()
    .flatten();

    match granted {
        Some(true) => {
            println!("granted");
            Ok(())
        }
        _ => Err(anyhow!("USB permission not granted")),
    }
}

/// Run one job and wait for the transfer to finish
async fn run_job(channel: &PrinterChannel, device: &str, job: PrintJob) -> Result<()> {
    let kind = job.kind();
    let written = channel
        .submit_and_wait(device, job)
        .await
        .with_context(|| format!("{} on {} failed", kind, device))?;
    info!("{} sent: {} bytes", kind, written);
    Ok(())
}

/// Serve JSON method calls until stdin closes or Ctrl+C
async fn serve(channel: &PrinterChannel) -> Result<()> {
    info!("Serving printer methods on stdin/stdout");

    let events = channel.clone();
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.next_event().await {
            match event {
                UsbEvent::PermissionResult { device, granted } => {
                    info!("Permission for {}: {}", device.name, granted)
                }
                UsbEvent::JobFinished { job_id, kind, .. } => {
                    debug!("Job {} ({}) finished", job_id, kind)
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping");
                break;
            }
        };

        let Some(line) = line else {
            debug!("stdin closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = channel.handle_json(&line).await;
        let mut out = serde_json::to_vec(&response).context("Failed to encode response")?;
        out.push(b'\n');
        stdout.write_all(&out).await.context("Failed to write stdout")?;
        stdout.flush().await.context("Failed to flush stdout")?;
    }

    event_task.abort();
    Ok(())
}

/// Shutdown USB worker thread gracefully
async fn shutdown_usb_worker(usb_bridge: UsbBridge) -> Result<()> {
    usb_bridge
        .send_command(UsbCommand::Shutdown)
        .await
        .context("Failed to send Shutdown command")?;
    Ok(())
}
