//! Loopback interface implemented for testing instruments that communicate by sending strings.
//!
//! End-of-command is in these cases always determined by a terminator string, usually `"\n"` or
//! similar.

use std::collections::VecDeque;

use crate::{
    InstrumentError, InstrumentInterface,
    loopback::{IncrIndex, check_leftovers},
};

/// An interface that allows you to simply write tests for your instrument driver.
///
/// # Example
///
/// A minimal thermometer driver that queries the temperature of its first channel, and a test
/// for it using the [`LoopbackInterfaceString`].
///
/// ```
/// use instrumentrs::{InstrumentError, InstrumentInterface, LoopbackInterfaceString};
///
/// struct Thermometer<T: InstrumentInterface> {
///     interface: T,
/// }
///
/// impl<T: InstrumentInterface> Thermometer<T> {
///     fn get_kelvin(&mut self) -> Result<f64, InstrumentError> {
///         let resp = self.interface.query("TVAL? 1")?;
///         resp.parse()
///             .map_err(|_| InstrumentError::ResponseParseError(resp))
///     }
/// }
///
/// let host2inst = vec!["TVAL? 1".to_string()];
/// let inst2host = vec!["7.700000E+1".to_string()];
///
/// // The interface panics when dropped with unused commands, or when an unexpected command is
/// // written to it.
/// let interface = LoopbackInterfaceString::new(host2inst, inst2host, "\n");
/// let mut thermometer = Thermometer { interface };
/// assert_eq!(thermometer.get_kelvin().unwrap(), 77.0);
/// ```
pub struct LoopbackInterfaceString {
    from_host: Vec<String>,
    from_inst: Vec<String>,
    terminator_exp: String,
    from_host_index: IncrIndex,
    from_inst_index: IncrIndex,
    curr_bytes: VecDeque<u8>,
    terminator: String,
}

impl LoopbackInterfaceString {
    /// Create a new loopback instrument with given commands to and from instrument.
    ///
    /// The commands are used in order. When the [`LoopbackInterfaceString`] is dropped, the
    /// `finalize` function checks that all of them have been used and panics otherwise. Writing a
    /// command that is not the next expected one panics as well.
    ///
    /// # Arguments:
    /// * `from_host` - Commands from host to instrument, without terminator.
    /// * `from_inst` - Replies from instrument to host, without terminator.
    /// * `terminator_exp` - The terminator that is appended to every command and reply. Pass an
    ///   empty string if the commands and replies already carry their terminators.
    pub fn new(from_host: Vec<String>, from_inst: Vec<String>, terminator_exp: &str) -> Self {
        LoopbackInterfaceString {
            from_host,
            from_inst,
            terminator_exp: terminator_exp.to_string(),
            from_host_index: IncrIndex::default(),
            from_inst_index: IncrIndex::default(),
            curr_bytes: VecDeque::new(),
            terminator: "\n".to_string(), // default terminator, as interfaces
        }
    }

    /// This command panics if not all commands in the [`LoopbackInterfaceString`] have been used.
    ///
    /// It is automatically called when the [`LoopbackInterfaceString`] is dropped, but you can
    /// also call it manually.
    pub fn finalize(&mut self) {
        let from_host_leftover = self.from_host.get(self.from_host_index.next());
        let from_inst_leftover = self.from_inst.get(self.from_inst_index.next());
        check_leftovers("host to instrument", from_host_leftover);
        check_leftovers("instrument to host", from_inst_leftover);
    }

    /// Get the next command from host to instrument as a string including the terminator.
    fn get_next_from_host_with_terminator(&mut self) -> String {
        let cmd = self
            .from_host
            .get(self.from_host_index.next())
            .expect("No more commands were expected from host to instrument.");
        format!("{cmd}{}", self.terminator_exp)
    }

    /// Get the next reply from instrument to host as a string including the terminator.
    fn get_next_from_inst_with_terminator(&mut self) -> String {
        let resp = self
            .from_inst
            .get(self.from_inst_index.next())
            .expect("No more commands were expected from instrument to host.");
        format!("{resp}{}", self.terminator_exp)
    }

    /// Read exactly one byte from the current reply, moving on to the next reply if needed.
    ///
    /// Panics if no reply is left, which is the right thing to do in a test interface.
    fn read_one_byte(&mut self) -> u8 {
        match self.curr_bytes.pop_front() {
            Some(byte) => byte,
            None => {
                let next_resp = self.get_next_from_inst_with_terminator();
                self.curr_bytes = next_resp.as_bytes().iter().copied().collect();
                self.read_one_byte()
            }
        }
    }
}

impl InstrumentInterface for LoopbackInterfaceString {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        for byte in buf.iter_mut() {
            *byte = self.read_one_byte();
        }
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        self.terminator.as_str()
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn write_raw(&mut self, cmd: &[u8]) -> Result<(), InstrumentError> {
        let exp = self.get_next_from_host_with_terminator();
        assert_eq!(
            exp.as_bytes(),
            cmd,
            "Expected sendcmd {0:?}, got {1:?}",
            exp,
            String::from_utf8_lossy(cmd)
        );
        Ok(())
    }
}

impl Drop for LoopbackInterfaceString {
    fn drop(&mut self) {
        self.finalize();
    }
}
