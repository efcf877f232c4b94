//! Acquisition loop for the cryostat: lock-in magnitude and diode temperature over time.
//!
//! An [`Acquisition`] polls the magnitude of an AMETEK 7270 lock-in amplifier and the temperature
//! and diode voltage of one SIM922 channel, strictly one after the other, and hands each sample
//! as a [`Record`] to a [`RecordWriter`]. Every record is flushed to its file right away, so an
//! aborted run keeps all samples taken so far. [`RecordWriter::append_to`] never overwrites an
//! existing file.
//!
//! [`run_session`] wraps a complete run and releases both instruments afterwards, also when the
//! run fails.
//!
//! The sampling period is only approximate: the loop sleeps for the interval after each sample,
//! on top of the time the instruments take to answer.

#![warn(missing_docs)]

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use ametek_7270::LockIn7270;
use chrono::{DateTime, Utc};
use instrumentrs::{InstrumentError, InstrumentInterface};
use serde::{Deserialize, Serialize};
use srs_sim922::{Channel, Sim922};
use thiserror::Error;

/// Errors that end an acquisition.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// An instrument could not be read.
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
    /// A record could not be written.
    #[error("Failed to write record: {0}")]
    Csv(#[from] csv::Error),
    /// The output file could not be opened.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One sample of the acquisition, written as one row of the output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Time at which the sample was started.
    pub timestamp: DateTime<Utc>,
    /// Seconds since the start of the run.
    pub elapsed_s: f64,
    /// Lock-in magnitude in volts.
    pub magnitude_v: f64,
    /// Diode temperature in kelvin, from the curve of the SIM922.
    pub temperature_k: f64,
    /// Diode voltage in volts.
    pub diode_voltage_v: f64,
    /// SIM922 channel the diode is connected to.
    pub channel: usize,
}

/// Writes [`Record`]s as CSV rows and flushes after each one.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    /// Create a record writer on top of any writer.
    ///
    /// # Arguments
    /// * `writer` - Destination of the rows.
    /// * `write_header` - Write the column names before the first record.
    pub fn new(writer: W, write_header: bool) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(writer);
        RecordWriter { writer }
    }

    /// Write one record and flush it.
    pub fn write(&mut self, record: &Record) -> Result<(), AcquisitionError> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Return the underlying writer.
    pub fn into_inner(self) -> Result<W, AcquisitionError> {
        self.writer
            .into_inner()
            .map_err(|err| AcquisitionError::Io(err.into_error()))
    }
}

impl RecordWriter<File> {
    /// Open a file for appending records, creating it if needed.
    ///
    /// The header is only written if the file is empty, such that several runs can be collected
    /// in the same file.
    pub fn append_to(path: impl AsRef<Path>) -> Result<Self, AcquisitionError> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let write_header = file.metadata()?.len() == 0;
        log::info!(
            "Appending records to {}{}",
            path.display(),
            if write_header { " (new file)" } else { "" }
        );
        Ok(Self::new(file, write_header))
    }
}

/// Polls a lock-in amplifier and a thermodiode channel at a fixed interval.
pub struct Acquisition<L: InstrumentInterface, T: InstrumentInterface> {
    lockin: LockIn7270<L>,
    thermometer: Channel<T>,
    interval: Duration,
}

impl<L: InstrumentInterface, T: InstrumentInterface> Acquisition<L, T> {
    /// Create a new acquisition.
    ///
    /// # Arguments
    /// * `lockin` - The lock-in amplifier, its magnitude is recorded.
    /// * `thermometer` - The SIM922 channel of the diode.
    /// * `interval` - Time to sleep between two samples.
    pub fn new(lockin: LockIn7270<L>, thermometer: Channel<T>, interval: Duration) -> Self {
        Acquisition {
            lockin,
            thermometer,
            interval,
        }
    }

    /// Take one sample: lock-in magnitude first, then diode temperature and voltage.
    ///
    /// # Arguments
    /// * `start` - Start of the run, for the elapsed time of the record.
    pub fn poll_once(&mut self, start: Instant) -> Result<Record, InstrumentError> {
        let timestamp = Utc::now();
        let elapsed_s = start.elapsed().as_secs_f64();
        let magnitude = self.lockin.get_magnitude()?;
        let temperature = self.thermometer.get_temperature()?;
        let voltage = self.thermometer.get_voltage()?;
        Ok(Record {
            timestamp,
            elapsed_s,
            magnitude_v: magnitude.as_volts(),
            temperature_k: temperature.as_kelvin(),
            diode_voltage_v: voltage.as_volts(),
            channel: self.thermometer.number(),
        })
    }

    /// Take `samples` samples and write each one before sleeping for the interval.
    ///
    /// The first failing read or write ends the run. Records written up to then stay in the
    /// output.
    pub fn run<W: Write>(
        &mut self,
        samples: usize,
        writer: &mut RecordWriter<W>,
    ) -> Result<(), AcquisitionError> {
        let start = Instant::now();
        for idx in 0..samples {
            let record = self.poll_once(start)?;
            writer.write(&record)?;
            log::debug!(
                "Sample {}/{samples}: {:.6e} V, {:.3} K",
                idx + 1,
                record.magnitude_v,
                record.temperature_k
            );
            if idx + 1 < samples {
                thread::sleep(self.interval);
            }
        }
        log::info!("Acquired {samples} samples");
        Ok(())
    }
}

/// Record `samples` samples of one SIM922 channel into a file, then close both instruments.
///
/// The instruments are closed whether the run succeeds or not, such that the SIM900 mainframe
/// always gets its link back. If both the run and closing fail, the error of the run is returned.
///
/// # Arguments
/// * `lockin` - The lock-in amplifier.
/// * `thermometer` - The SIM922, with the link to its slot open.
/// * `channel` - SIM922 channel of the diode.
/// * `interval` - Time to sleep between two samples.
/// * `samples` - Number of samples to take.
/// * `output` - CSV file the records are appended to.
pub fn run_session<L: InstrumentInterface, T: InstrumentInterface>(
    mut lockin: LockIn7270<L>,
    mut thermometer: Sim922<T>,
    channel: usize,
    interval: Duration,
    samples: usize,
    output: &Path,
) -> Result<(), AcquisitionError> {
    let result = acquire(&lockin, &mut thermometer, channel, interval, samples, output);

    lockin.close();
    let closed = thermometer.close();
    if let (Err(_), Err(err)) = (&result, &closed) {
        log::warn!("Failed to release the SIM900 link: {err}");
    }
    result?;
    Ok(closed?)
}

fn acquire<L: InstrumentInterface, T: InstrumentInterface>(
    lockin: &LockIn7270<L>,
    thermometer: &mut Sim922<T>,
    channel: usize,
    interval: Duration,
    samples: usize,
    output: &Path,
) -> Result<(), AcquisitionError> {
    let channel = thermometer.get_channel(channel)?;
    let mut writer = RecordWriter::append_to(output)?;
    Acquisition::new(lockin.clone(), channel, interval).run(samples, &mut writer)
}
