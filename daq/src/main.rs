//! Log the lock-in magnitude and the diode temperature of the cryostat to a CSV file.
//!
//! Run with `RUST_LOG=info cryostat-daq --port /dev/ttyUSB0 --samples 60` to take one sample per
//! second for about a minute.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;

use ametek_7270::{LockIn7270, PRODUCT_ID, UsbInterfaceLockIn, VENDOR_ID};
use cryostat_daq::run_session;
use srs_sim922::{DEFAULT_BAUD_RATE, DEFAULT_ESCAPE, DEFAULT_MODULE, SerialInterfaceSim922, Sim922};

/// Poll an AMETEK 7270 lock-in amplifier and an SRS SIM922 diode monitor.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Serial port of the SIM900 mainframe.
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Baud rate of the SIM900 mainframe.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Slot of the SIM922 in the mainframe.
    #[arg(short, long, default_value_t = DEFAULT_MODULE)]
    module: u8,

    /// SIM922 channel of the diode.
    #[arg(short, long, default_value_t = 1)]
    channel: usize,

    /// Seconds between two samples.
    #[arg(short, long, default_value_t = 1.0)]
    interval: f64,

    /// Number of samples to take.
    #[arg(short = 'n', long, default_value_t = 60)]
    samples: usize,

    /// CSV file to append the samples to.
    #[arg(short, long, default_value = "measurements.csv")]
    output: PathBuf,

    /// USB vendor id of the lock-in amplifier, decimal or hex with `0x` prefix.
    #[arg(long, default_value_t = VENDOR_ID, value_parser = parse_usb_id)]
    vendor_id: u16,

    /// USB product id of the lock-in amplifier, decimal or hex with `0x` prefix.
    #[arg(long, default_value_t = PRODUCT_ID, value_parser = parse_usb_id)]
    product_id: u16,
}

fn parse_usb_id(val: &str) -> Result<u16, String> {
    let parsed = match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => val.parse(),
    };
    parsed.map_err(|err| format!("Invalid USB id {val}: {err}"))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let interval = Duration::try_from_secs_f64(args.interval)
        .with_context(|| format!("Invalid interval {} s", args.interval))?;

    let usb_inst = UsbInterfaceLockIn::with_ids(args.vendor_id, args.product_id)
        .context("Failed to open the lock-in amplifier")?;
    let lockin = LockIn7270::try_new(usb_inst).context("Failed to connect to the 7270")?;

    let serial_inst = SerialInterfaceSim922::with_baud_rate(&args.port, args.baud)
        .with_context(|| format!("Failed to open serial port {}", args.port))?;
    let thermo = Sim922::try_new_with(serial_inst, args.module, DEFAULT_ESCAPE)
        .context("Failed to connect to the SIM922")?;

    println!(
        "Taking {} samples every {:?}, writing to {}",
        args.samples,
        interval,
        args.output.display()
    );
    run_session(
        lockin,
        thermo,
        args.channel,
        interval,
        args.samples,
        &args.output,
    )
    .context("Acquisition aborted")?;
    println!("Done.");
    Ok(())
}
