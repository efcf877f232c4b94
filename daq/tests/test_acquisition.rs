//! Tests for the acquisition loop, with simulated instruments.

use std::{fs, io::Write, time::Duration};

use rstest::*;

use ametek_7270::LockIn7270;
use cryostat_daq::*;
use instrumentrs::{InstrumentError, LoopbackInterfaceString};
use srs_sim922::Sim922;

const HEADER: &str = "timestamp,elapsed_s,magnitude_v,temperature_k,diode_voltage_v,channel";

type AcquisitionLbk = Acquisition<LoopbackInterfaceString, LoopbackInterfaceString>;

/// Create a lock-in amplifier that is queried once for each magnitude reply.
fn crt_lockin(magnitudes: Vec<&str>) -> LockIn7270<LoopbackInterfaceString> {
    let mut h2i = vec!["ID".to_string()];
    let mut i2h = vec!["7270\0\u{1}\0".to_string()];
    for mag in magnitudes {
        h2i.push("MAG.".to_string());
        i2h.push(format!("{mag}\0\u{1}\0"));
    }
    LockIn7270::try_new(LoopbackInterfaceString::new(h2i, i2h, "")).unwrap()
}

/// Create a SIM922 that is queried on channel 1 for each pair of temperature and voltage
/// replies. If `closed`, the escape string must be sent at the end.
fn crt_sim922(thermo: Vec<(&str, &str)>, closed: bool) -> Sim922<LoopbackInterfaceString> {
    let mut h2i = vec!["CONN 4,\"xxyyzz\"".to_string(), "*IDN?".to_string()];
    let mut i2h = vec!["Stanford_Research_Systems,SIM922,s/n012345,ver2.3".to_string()];
    for (temp, volt) in thermo {
        h2i.push("TVAL? 1".to_string());
        h2i.push("VOLT? 1".to_string());
        i2h.push(temp.to_string());
        i2h.push(volt.to_string());
    }
    if closed {
        h2i.push("xxyyzz".to_string());
    }
    Sim922::try_new(LoopbackInterfaceString::new(h2i, i2h, "\r\n")).unwrap()
}

/// Create an acquisition from the magnitude replies of the lock-in amplifier and the temperature
/// and voltage replies of channel 1 of the SIM922.
fn crt_acquisition(magnitudes: Vec<&str>, thermo: Vec<(&str, &str)>) -> AcquisitionLbk {
    let channel = crt_sim922(thermo, false).get_channel(1).unwrap();
    Acquisition::new(crt_lockin(magnitudes), channel, Duration::from_millis(10))
}

fn read_records(data: &[u8]) -> Vec<Record> {
    csv::Reader::from_reader(data)
        .deserialize()
        .collect::<Result<Vec<Record>, _>>()
        .unwrap()
}

/// A single poll reads all three values.
#[rstest]
fn test_poll_once() {
    let mut acq = crt_acquisition(vec!["1.234E-03"], vec![("+7.700000E+1", "+9.920000E-1")]);
    let record = acq.poll_once(std::time::Instant::now()).unwrap();
    assert_eq!(record.magnitude_v, 0.001234);
    assert_eq!(record.temperature_k, 77.0);
    assert_eq!(record.diode_voltage_v, 0.992);
    assert_eq!(record.channel, 1);
}

/// Two iterations give two rows in order, with increasing timestamps.
#[rstest]
fn test_run_two_iterations() {
    let mut acq = crt_acquisition(
        vec!["1.0E-03", "2.0E-03"],
        vec![("+2.973000E+2", "+4.359000E-1"), ("+7.700000E+1", "+9.920000E-1")],
    );
    let mut writer = RecordWriter::new(Vec::new(), true);
    acq.run(2, &mut writer).unwrap();

    let data = writer.into_inner().unwrap();
    let text = String::from_utf8(data.clone()).unwrap();
    assert!(text.starts_with(&format!("{HEADER}\n")));
    assert_eq!(text.lines().count(), 3);

    let records = read_records(&data);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].magnitude_v, 1e-3);
    assert_eq!(records[1].magnitude_v, 2e-3);
    assert_eq!(records[0].temperature_k, 297.3);
    assert_eq!(records[1].temperature_k, 77.0);
    assert!(records[1].timestamp > records[0].timestamp);
    assert!(records[1].elapsed_s >= records[0].elapsed_s + 0.01);
}

/// A failing read ends the run, but records taken before stay in the output.
#[rstest]
fn test_run_aborts_on_error() {
    let mut acq = crt_acquisition(
        vec!["1.0E-03", "garbage"],
        vec![("+7.700000E+1", "+9.920000E-1")],
    );
    let mut writer = RecordWriter::new(Vec::new(), true);
    let result = acq.run(3, &mut writer);
    assert!(matches!(
        result,
        Err(AcquisitionError::Instrument(InstrumentError::ResponseParseError(_)))
    ));

    let records = read_records(&writer.into_inner().unwrap());
    assert_eq!(records.len(), 1);
}

/// Appending to an existing file keeps its content and writes the header only once.
#[rstest]
fn test_append_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("measurements.csv");

    for _ in 0..2 {
        let mut acq = crt_acquisition(vec!["1.0E-03"], vec![("+7.700000E+1", "+9.920000E-1")]);
        let mut writer = RecordWriter::append_to(&path).unwrap();
        acq.run(1, &mut writer).unwrap();
    }

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.matches("timestamp").count(), 1);
    assert_eq!(read_records(text.as_bytes()).len(), 2);
}

/// A file that already holds rows gets no header in the middle.
#[rstest]
fn test_append_to_non_empty_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    file.flush().unwrap();

    let mut acq = crt_acquisition(vec!["1.0E-03"], vec![("+7.700000E+1", "+9.920000E-1")]);
    let mut writer = RecordWriter::append_to(file.path()).unwrap();
    acq.run(1, &mut writer).unwrap();

    let text = fs::read_to_string(file.path()).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert_eq!(read_records(text.as_bytes())[0].channel, 1);
}

/// A complete session writes its rows and hands the link back to the mainframe.
#[rstest]
fn test_run_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("measurements.csv");
    let lockin = crt_lockin(vec!["1.0E-03"]);
    let sim922 = crt_sim922(vec![("+7.700000E+1", "+9.920000E-1")], true);

    run_session(lockin, sim922, 1, Duration::from_millis(10), 1, &path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(read_records(text.as_bytes())[0].temperature_k, 77.0);
}

/// An invalid channel aborts the session, the escape string is still sent.
#[rstest]
fn test_run_session_invalid_channel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("measurements.csv");
    let lockin = crt_lockin(vec![]);
    let sim922 = crt_sim922(vec![], true);

    let result = run_session(lockin, sim922, 9, Duration::from_millis(10), 1, &path);
    assert!(matches!(
        result,
        Err(AcquisitionError::Instrument(
            InstrumentError::ChannelIndexOutOfRange { idx: 9, .. }
        ))
    ));
    assert!(!path.exists());
}

/// An output file that cannot be created aborts the session, the escape string is still sent.
#[rstest]
fn test_run_session_bad_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("measurements.csv");
    let lockin = crt_lockin(vec![]);
    let sim922 = crt_sim922(vec![], true);

    let result = run_session(lockin, sim922, 1, Duration::from_millis(10), 1, &path);
    assert!(matches!(result, Err(AcquisitionError::Io(_))));
}
