//! Loopback interface for instrument drivers that exchange raw byte packages.
//!
//! There is no terminator involved: every expected write and every reply is given as a complete
//! vector of bytes. This is useful for binary replies, e.g., curve dumps.

use std::collections::VecDeque;

use crate::{
    InstrumentError, InstrumentInterface,
    loopback::{IncrIndex, check_leftovers},
};

/// A loopback interface that checks raw writes and plays back raw replies.
///
/// The terminator can still be set, such that drivers that use
/// [`InstrumentInterface::read_until_terminator`] can be tested: the terminator bytes then simply
/// have to be part of the replies.
pub struct LoopbackInterfaceBytes {
    from_host: Vec<Vec<u8>>,
    from_inst: Vec<Vec<u8>>,
    from_host_index: IncrIndex,
    from_inst_index: IncrIndex,
    curr_bytes: VecDeque<u8>,
    terminator: String,
}

impl LoopbackInterfaceBytes {
    /// Create a new loopback instrument with given byte packages to and from instrument.
    ///
    /// The packages are used in order. When the [`LoopbackInterfaceBytes`] is dropped, the
    /// `finalize` function checks that all of them have been used and panics otherwise. Writing
    /// bytes that are not the next expected package panics as well.
    ///
    /// # Arguments:
    /// * `from_host` - Byte packages from host to instrument.
    /// * `from_inst` - Byte packages from instrument to host.
    pub fn new(from_host: Vec<Vec<u8>>, from_inst: Vec<Vec<u8>>) -> Self {
        LoopbackInterfaceBytes {
            from_host,
            from_inst,
            from_host_index: IncrIndex::default(),
            from_inst_index: IncrIndex::default(),
            curr_bytes: VecDeque::new(),
            terminator: "\n".to_string(),
        }
    }

    /// This command panics if not all packages in the [`LoopbackInterfaceBytes`] have been used.
    ///
    /// It is automatically called when the [`LoopbackInterfaceBytes`] is dropped, but you can also
    /// call it manually.
    pub fn finalize(&mut self) {
        let from_host_leftover = self.from_host.get(self.from_host_index.next());
        let from_inst_leftover = self.from_inst.get(self.from_inst_index.next());
        check_leftovers("host to instrument", from_host_leftover);
        check_leftovers("instrument to host", from_inst_leftover);
    }

    /// Read exactly one byte from the current package, moving on to the next package if needed.
    fn read_one_byte(&mut self) -> u8 {
        match self.curr_bytes.pop_front() {
            Some(byte) => byte,
            None => {
                let next_package = self
                    .from_inst
                    .get(self.from_inst_index.next())
                    .expect("No more bytes were expected from instrument to host.");
                self.curr_bytes = next_package.iter().copied().collect();
                self.read_one_byte()
            }
        }
    }
}

impl InstrumentInterface for LoopbackInterfaceBytes {
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
        let exp = self
            .from_host
            .get(self.from_host_index.next())
            .expect("No more bytes were expected from host to instrument.");
        assert_eq!(
            exp.as_slice(),
            cmd,
            "Expected sendcmd {0:?}, got {1:?}",
            exp,
            String::from_utf8_lossy(cmd)
        );
        Ok(())
    }
}

impl Drop for LoopbackInterfaceBytes {
    fn drop(&mut self) {
        self.finalize();
    }
}
