//! Provide a USB interface for the 7270.

use std::time::Duration;

use instrumentrs::{InstrumentError, UsbInterface};

/// USB vendor id of AMETEK Signal Recovery.
pub const VENDOR_ID: u16 = 0x0a2d;

/// USB product id of the 7270.
pub const PRODUCT_ID: u16 = 0x001b;

/// A UsbInterface for the 7270.
///
/// The 7270 does not enumerate as a serial port, but talks over two raw bulk endpoints.
#[derive(Debug)]
pub struct UsbInterfaceLockIn {}

impl UsbInterfaceLockIn {
    /// Open the first 7270 that is connected, with a timeout of three seconds.
    pub fn simple() -> Result<UsbInterface, InstrumentError> {
        Self::with_ids(VENDOR_ID, PRODUCT_ID)
    }

    /// Open the first device with the given vendor and product id, with a timeout of three
    /// seconds.
    ///
    /// Arguments:
    /// * `vendor_id` - USB vendor id.
    /// * `product_id` - USB product id.
    pub fn with_ids(vendor_id: u16, product_id: u16) -> Result<UsbInterface, InstrumentError> {
        UsbInterface::full(vendor_id, product_id, Duration::from_secs(3))
    }
}
