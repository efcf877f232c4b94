//! The loopback module provides instrument simulators for testing purposes.
//!
//! The [`LoopbackInterfaceString`] simulates instruments that communicate with strings and a fixed
//! terminator, the [`LoopbackInterfaceBytes`] simulates instruments that exchange raw byte
//! packages. Both check every write against a list of expected commands and play back a list of
//! replies, in order.

mod loopback_interface_bytes;
mod loopback_interface_string;

pub use loopback_interface_bytes::*;
pub use loopback_interface_string::*;

/// A self-incrementing index structure that by default starts at 0 and increments whenever `next`
/// is called.
#[derive(Debug, Default)]
struct IncrIndex {
    index: usize,
}

impl IncrIndex {
    fn next(&mut self) -> usize {
        let current = self.index;
        self.index += 1;
        current
    }
}

/// Panic if an expectation list still holds unused entries.
///
/// Nothing is checked while the thread is already panicking, e.g., when a loopback interface is
/// dropped after a failed assertion, as a second panic would abort the test run.
fn check_leftovers<T: std::fmt::Debug>(direction: &str, leftover: Option<&T>) {
    if std::thread::panicking() {
        return;
    }
    if let Some(fil) = leftover {
        panic!("Leftover expected commands found from {direction}: {fil:?}");
    }
}
