//! InstrumentRs: the transport layer of the cryostat lab toolkit.
//!
//! This crate provides the [`InstrumentInterface`] trait that the instrument drivers of this
//! workspace (the AMETEK 7270 lock-in amplifier and the SRS SIM922 diode temperature monitor) are
//! written against, together with its implementations:
//!
//! - [`Instrument`]: a general interface over anything that implements [`std::io::Read`] and
//!   [`std::io::Write`].
//! - [`SerialInterface`]: blocking serial ports via the [`serialport`] crate (feature `serial`).
//! - [`TcpIpInterface`]: blocking TCP/IP, e.g., for serial-to-ethernet bridges.
//! - [`UsbInterface`]: raw USB bulk transfers via the [`rusb`] crate (feature `usb`).
//! - [`LoopbackInterfaceString`] and [`LoopbackInterfaceBytes`]: simulated instruments to test
//!   drivers without hardware.
//!
//! All operations are blocking. Every read is bounded by the timeout of the interface, so a
//! device that never replies results in an [`InstrumentError::Timeout`] or
//! [`InstrumentError::TimeoutQuery`] instead of a hanging call.
//!
//! Drivers return [`InstrumentError`] for everything that can go wrong, such that errors can be
//! propagated with the `?` operator up to the caller.
//!
//! # License
//!
//! Licensed under either of
//!
//! - Apache License, Version 2.0 ([LICENSE-APACHE](http://www.apache.org/licenses/LICENSE-2.0))
//! - MIT license ([LICENSE-MIT](http://opensource.org/licenses/MIT))
//!
//! at your option.

#![warn(missing_docs)]

mod instrument;
mod loopback;
#[cfg(feature = "serial")]
mod serial;
mod tcp_ip;
#[cfg(feature = "usb")]
mod usb;

use std::time::{Duration, Instant};

pub use instrument::{Instrument, InstrumentError};
pub use loopback::{LoopbackInterfaceBytes, LoopbackInterfaceString};
#[cfg(feature = "serial")]
pub use serial::SerialInterface;
pub use tcp_ip::TcpIpInterface;
#[cfg(feature = "usb")]
pub use usb::UsbInterface;

/// The `InstrumentInterface` trait defines how drivers talk to their instruments.
///
/// Implementors only have to provide [`read_exact`](InstrumentInterface::read_exact) and
/// [`write_raw`](InstrumentInterface::write_raw). Everything else, i.e., terminated commands,
/// reading a reply up to the terminator, and queries, is built on top of these two.
pub trait InstrumentInterface {
    /// Read exactly `buf.len()` bytes from the instrument.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError>;

    /// Write all the given bytes to the instrument and flush the interface.
    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError>;

    /// Get the terminator of the interface. Defaults to `"\n"`.
    fn get_terminator(&self) -> &str {
        "\n"
    }

    /// Set the terminator of an interface from a `&str`.
    ///
    /// Interfaces that do not store a terminator ignore this call.
    fn set_terminator(&mut self, _terminator: &str) {}

    /// Get the timeout for reading a reply. Defaults to three seconds.
    fn get_timeout(&self) -> Duration {
        Duration::from_secs(3)
    }

    /// Discard input that has been received but not read yet, e.g., a reply that arrived after
    /// its query timed out.
    ///
    /// Interfaces that cannot buffer input do nothing.
    fn clear_input(&mut self) -> Result<(), InstrumentError> {
        Ok(())
    }

    /// Write a string to the instrument as is, without appending the terminator.
    fn write(&mut self, data: &str) -> Result<(), InstrumentError> {
        log::trace!("Writing {data:?}");
        self.write_raw(data.as_bytes())
    }

    /// Send a command to the instrument.
    ///
    /// The terminator is appended to the command before it is written.
    fn sendcmd(&mut self, cmd: &str) -> Result<(), InstrumentError> {
        let cmd = format!("{cmd}{}", self.get_terminator());
        self.write(&cmd)
    }

    /// Read from the instrument until the terminator is received.
    ///
    /// The terminator is stripped and surrounding whitespace is trimmed from the reply. Bytes that
    /// are not valid UTF-8 are skipped with a warning. Reads that the transport reports as timed
    /// out are retried until the interface timeout has elapsed, at which point an
    /// [`InstrumentError::Timeout`] is returned.
    fn read_until_terminator(&mut self) -> Result<String, InstrumentError> {
        let terminator = self.get_terminator().to_string();
        let timeout = self.get_timeout();
        let mut response = String::new();
        let mut single_buf = [0u8];

        let tic = Instant::now();
        while tic.elapsed() < timeout {
            match self.read_exact(&mut single_buf) {
                Ok(()) => {}
                Err(InstrumentError::Io(e)) if is_transient(&e) => continue,
                Err(e) => return Err(e),
            }
            match std::str::from_utf8(&single_buf) {
                Ok(val) => response.push_str(val),
                Err(_) => log::warn!("Received invalid UTF-8 data: {single_buf:?}"),
            }
            if let Some(reply) = response.strip_suffix(terminator.as_str()) {
                log::trace!("Received {reply:?}");
                return Ok(reply.trim().to_string());
            }
        }

        Err(InstrumentError::Timeout(timeout))
    }

    /// Query the instrument with a command and return the reply as a `String`.
    ///
    /// Stale input is discarded before the command is sent, such that a late reply to an earlier
    /// query is never taken for the reply to this one. A timeout while waiting for the reply is
    /// reported as [`InstrumentError::TimeoutQuery`], which contains the command that was sent.
    fn query(&mut self, cmd: &str) -> Result<String, InstrumentError> {
        self.clear_input()?;
        self.sendcmd(cmd)?;
        self.read_until_terminator().map_err(|err| match err {
            InstrumentError::Timeout(timeout) => InstrumentError::TimeoutQuery {
                query: cmd.to_string(),
                timeout,
            },
            err => err,
        })
    }
}

/// Transport errors after which the read can simply be retried.
fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::Interrupted
    )
}
