//! Tests for the AMETEK 7270 lock-in amplifier driver.

use std::time::Duration;

use measurements::Frequency;
use rstest::*;

use instrumentrs::{InstrumentError, LoopbackInterfaceBytes, LoopbackInterfaceString};

use ametek_7270::*;

// Type alias for the loopback interface with the LockIn7270 driver.
type LockInLbk = LockIn7270<LoopbackInterfaceString>;

/// Status byte of a successfully completed command.
const OK: char = '\u{1}';

/// A reply as the 7270 sends it: payload, NUL, status byte, overload byte.
fn reply(payload: &str) -> String {
    format!("{payload}\0{OK}\0")
}

/// Function that creates a new LockIn7270 instance with the given commands and reply payloads.
///
/// The identification exchange that happens on initialization is prepended automatically.
fn crt_inst(host2inst: Vec<&str>, inst2host: Vec<&str>) -> LockInLbk {
    let mut h2i = vec!["ID".to_string()];
    let mut i2h = vec![reply("7270")];
    h2i.extend(host2inst.iter().map(|s| s.to_string()));
    i2h.extend(inst2host.iter().map(|s| reply(s)));
    // Commands carry no terminator and replies carry their own.
    let interface = LoopbackInterfaceString::new(h2i, i2h, "");
    LockIn7270::try_new(interface).unwrap()
}

#[fixture]
fn emp_inst() -> LockInLbk {
    crt_inst(vec![], vec![])
}

/// Empty initialization should always pass.
#[rstest]
fn test_initialization(_emp_inst: LockInLbk) {}

/// A device that answers with a different model is rejected.
#[rstest]
fn test_initialization_wrong_device() {
    let interface =
        LoopbackInterfaceString::new(vec!["ID".to_string()], vec![reply("7265")], "");
    match LockIn7270::try_new(interface) {
        Err(InstrumentError::NotIdentified { expected, response }) => {
            assert_eq!(expected, "7270");
            assert_eq!(response, "7265");
        }
        _ => panic!("Expected identification error"),
    }
}

#[rstest]
fn test_get_firmware_version() {
    let mut inst = crt_inst(vec!["VER"], vec!["2.11"]);
    assert_eq!(inst.get_firmware_version().unwrap(), "2.11");
}

/// Every legal value of every setting can be set and read back.
#[rstest]
fn test_setting_round_trip() {
    for setting in Setting::ALL {
        for value in setting.legal_values() {
            let set_cmd = format!("{} {value}", setting.mnemonic());
            let val_str = value.to_string();
            let mut inst = crt_inst(
                vec![set_cmd.as_str(), setting.mnemonic()],
                vec!["", val_str.as_str()],
            );
            inst.set_setting(setting, value).unwrap();
            assert_eq!(inst.get_setting(setting).unwrap(), value);
        }
    }
}

/// Values outside of the legal range are rejected before anything is sent.
#[rstest]
#[case(Setting::Sensitivity, 0)]
#[case(Setting::Sensitivity, 28)]
#[case(Setting::TimeConstant, 31)]
#[case(Setting::ReferenceMode, 3)]
#[case(Setting::InputMode, 4)]
#[case(Setting::ReferenceSource, 3)]
#[case(Setting::Coupling, 2)]
#[case(Setting::FloatingGround, 2)]
#[case(Setting::InputDevice, 255)]
fn test_set_setting_invalid(
    mut emp_inst: LockInLbk,
    #[case] setting: Setting,
    #[case] value: u8,
) {
    assert!(matches!(
        emp_inst.set_setting(setting, value),
        Err(InstrumentError::IntValueOutOfRange { .. })
    ));
}

/// The instrument flags an invalid parameter in the status byte.
#[rstest]
fn test_set_setting_not_acknowledged() {
    let interface = LoopbackInterfaceString::new(
        vec!["ID".to_string(), "SEN 1".to_string()],
        vec![reply("7270"), "\0\u{5}\0".to_string()],
        "",
    );
    let mut inst = LockIn7270::try_new(interface).unwrap();
    assert!(matches!(
        inst.set_setting(Setting::Sensitivity, 1),
        Err(InstrumentError::NotAcknowledged(_))
    ));
}

/// The default setup sends all settings and an automatic sensitivity search.
#[rstest]
fn test_setup_default() {
    let mut inst = crt_inst(
        vec![
            "REFMODE 0",
            "VMODE 3",
            "IE 0",
            "DCCOUPLE 0",
            "FLOAT 1",
            "TC 12",
            "FET 0",
            "AS",
        ],
        vec![""; 8],
    );
    inst.setup_default().unwrap();
}

/// A setup with an invalid value sends nothing at all.
#[rstest]
fn test_setup_invalid(mut emp_inst: LockInLbk) {
    let settings = [(Setting::TimeConstant, 12), (Setting::InputMode, 9)];
    assert!(emp_inst.setup(&settings).is_err());
}

#[rstest]
fn test_auto_phase() {
    let mut inst = crt_inst(vec!["AQN"], vec![""]);
    inst.auto_phase().unwrap();
}

#[rstest]
fn test_get_sensitivity() {
    let mut inst = crt_inst(vec!["SEN"], vec!["18"]);
    assert!((inst.get_sensitivity().unwrap().as_volts() - 1e-3).abs() < 1e-15);
}

#[rstest]
fn test_get_time_constant() {
    let mut inst = crt_inst(vec!["TC"], vec!["12"]);
    assert_eq!(inst.get_time_constant().unwrap(), Duration::from_millis(100));
}

#[rstest]
fn test_oscillator_frequency() {
    let mut inst = crt_inst(vec!["OF. 1000", "OF."], vec!["", "1.0000E+03"]);
    inst.set_oscillator_frequency(Frequency::from_hertz(1000.0)).unwrap();
    assert_eq!(inst.get_oscillator_frequency().unwrap().as_hertz(), 1000.0);
}

#[rstest]
#[case(-1.0)]
#[case(250_001.0)]
fn test_oscillator_frequency_invalid(mut emp_inst: LockInLbk, #[case] hz: f64) {
    assert!(matches!(
        emp_inst.set_oscillator_frequency(Frequency::from_hertz(hz)),
        Err(InstrumentError::FloatValueOutOfRange { .. })
    ));
}

#[rstest]
fn test_get_reference_frequency() {
    let mut inst = crt_inst(vec!["FRQ."], vec!["1.3370E+02"]);
    assert_eq!(inst.get_reference_frequency().unwrap().as_hertz(), 133.7);
}

/// Front panel values are parsed exactly.
#[rstest]
#[case(Measurand::X, "X.", "1.234E-03", 0.001234)]
#[case(Measurand::Y, "Y.", "-2.5E-06", -2.5e-6)]
#[case(Measurand::Magnitude, "MAG.", "1.234E-03", 0.001234)]
#[case(Measurand::Phase, "PHA.", "45.12", 45.12)]
fn test_read_value(
    #[case] measurand: Measurand,
    #[case] cmd: &str,
    #[case] resp: &str,
    #[case] expected: f64,
) {
    let mut inst = crt_inst(vec![cmd], vec![resp]);
    assert_eq!(inst.read_value(measurand).unwrap(), expected);
}

#[rstest]
fn test_read_value_malformed() {
    let mut inst = crt_inst(vec!["MAG."], vec!["1.2.3"]);
    match inst.read_value(Measurand::Magnitude) {
        Err(InstrumentError::ResponseParseError(resp)) => assert_eq!(resp, "1.2.3"),
        _ => panic!("Expected parse error"),
    }
}

#[rstest]
fn test_typed_outputs() {
    let mut inst = crt_inst(
        vec!["X.", "Y.", "MAG.", "PHA."],
        vec!["1.0E-03", "-1.0E-03", "1.5E-03", "-45.0"],
    );
    assert_eq!(inst.get_x().unwrap().as_volts(), 1e-3);
    assert_eq!(inst.get_y().unwrap().as_volts(), -1e-3);
    assert_eq!(inst.get_magnitude().unwrap().as_volts(), 1.5e-3);
    assert!((inst.get_phase().unwrap().as_degrees() + 45.0).abs() < 1e-9);
}

#[rstest]
fn test_get_xy() {
    let mut inst = crt_inst(vec!["XY.", "XY."], vec!["1.0E-03,2.0E-03", "1.0E-03"]);
    let (x, y) = inst.get_xy().unwrap();
    assert_eq!(x.as_volts(), 1e-3);
    assert_eq!(y.as_volts(), 2e-3);
    assert!(inst.get_xy().is_err());
}

#[rstest]
fn test_setup_curve_buffer() {
    let mut inst = crt_inst(
        vec!["NC", "CMODE 0", "CBD 59", "LEN 100000", "STR 10000", "TD", "HC"],
        vec![""; 7],
    );
    inst.setup_curve_buffer(&CurveBufferConfig::default()).unwrap();
    inst.start_curve_acquisition().unwrap();
    inst.halt_curve_acquisition().unwrap();
}

#[rstest]
fn test_get_curve_status() {
    let mut inst = crt_inst(vec!["M"], vec!["5,1,1,1000"]);
    let status = inst.get_curve_status().unwrap();
    assert_eq!(status.state, CurveAcquisitionState::Halted);
    assert_eq!(status.points, 1000);
}

/// A curve is dumped as a binary block of big-endian 16 bit values.
#[rstest]
fn test_read_curve() {
    let from_host = vec![b"ID".to_vec(), b"M".to_vec(), b"DCB 0".to_vec()];
    let mut block = vec![0x27, 0x10, 0xd8, 0xf0, 0x00, 0x12];
    block.extend([0x00, 0x01, 0x00]);
    let from_inst = vec![
        b"7270\0\x01\0".to_vec(),
        b"0,1,1,3\0\x01\0".to_vec(),
        block,
    ];
    let interface = LoopbackInterfaceBytes::new(from_host, from_inst);
    let mut inst = LockIn7270::try_new(interface).unwrap();
    assert_eq!(inst.read_curve(Curve::X).unwrap(), vec![10000, -10000, 18]);
}

/// A point count beyond the size of the curve buffer is a malformed reply, nothing is dumped.
#[rstest]
#[case("0,1,1,100001")]
#[case("0,1,1,9223372036854775808")]
fn test_read_curve_invalid_points(#[case] status: &str) {
    let mut inst = crt_inst(vec!["M"], vec![status]);
    match inst.read_curve(Curve::X) {
        Err(InstrumentError::ResponseParseError(resp)) => assert_eq!(resp, status),
        other => panic!("Expected parse error, got {other:?}"),
    }
}

/// A silent instrument makes the query fail with the command attached.
#[rstest]
fn test_timeout() {
    use std::{collections::VecDeque, io};

    use instrumentrs::Instrument;

    /// Replies to the identification query, then stays silent.
    struct Silent {
        replies: VecDeque<u8>,
    }

    impl io::Read for Silent {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.replies.pop_front() {
                Some(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                None => {
                    std::thread::sleep(Duration::from_millis(5));
                    Err(io::ErrorKind::TimedOut.into())
                }
            }
        }
    }

    impl io::Write for Silent {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let port = Silent {
        replies: b"7270\0\x01\0".iter().copied().collect(),
    };
    let interface = Instrument::new(port, Duration::from_millis(50));
    let mut inst = LockIn7270::try_new(interface).unwrap();
    match inst.read_value(Measurand::Magnitude) {
        Err(InstrumentError::TimeoutQuery { query, timeout }) => {
            assert_eq!(query, "MAG.");
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("Expected timeout, got {other:?}"),
    }
}

/// Closing is idempotent and shared between clones.
#[rstest]
fn test_close(emp_inst: LockInLbk) {
    let mut inst = emp_inst;
    let mut clone = inst.clone();
    inst.close();
    inst.close();
    assert!(matches!(
        clone.read_value(Measurand::X),
        Err(InstrumentError::Closed)
    ));
}
