//! This module provides an interface for instruments that talk over raw USB bulk endpoints, using
//! the [`rusb`] crate.
//!
//! Such instruments do not show up as a serial port. Commands are written to the bulk OUT endpoint
//! and replies are read from the bulk IN endpoint, one packet at a time.

use std::{collections::VecDeque, time::Duration};

use rusb::{ConfigDescriptor, Device, DeviceHandle, Direction, GlobalContext, TransferType};

use crate::{InstrumentError, InstrumentInterface};

/// Bulk endpoints of the claimed USB interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BulkEndpoints {
    interface: u8,
    address_in: u8,
    address_out: u8,
    max_packet_size: usize,
}

/// A blocking USB bulk interface.
///
/// Reads are buffered per packet: [`InstrumentInterface::read_exact`] requests new packets from
/// the device until enough bytes are available. Every USB transfer is bounded by the timeout of
/// the interface.
pub struct UsbInterface {
    handle: DeviceHandle<GlobalContext>,
    endpoints: BulkEndpoints,
    pending: VecDeque<u8>,
    terminator: String,
    timeout: Duration,
}

impl UsbInterface {
    /// Open the first USB device with the given vendor and product id and a timeout of three
    /// seconds.
    ///
    /// # Arguments
    /// * `vendor_id` - USB vendor id of the device.
    /// * `product_id` - USB product id of the device.
    pub fn simple(vendor_id: u16, product_id: u16) -> Result<Self, InstrumentError> {
        Self::full(vendor_id, product_id, Duration::from_secs(3))
    }

    /// Open the first USB device with the given vendor and product id.
    ///
    /// The active configuration is (re)applied and the first interface with a bulk IN and a bulk
    /// OUT endpoint is claimed. Returns [`InstrumentError::DeviceNotFound`] if no such device is
    /// connected or if it has no bulk endpoints.
    ///
    /// # Arguments
    /// * `vendor_id` - USB vendor id of the device.
    /// * `product_id` - USB product id of the device.
    /// * `timeout` - Timeout of every single USB transfer.
    pub fn full(
        vendor_id: u16,
        product_id: u16,
        timeout: Duration,
    ) -> Result<Self, InstrumentError> {
        let address = format!("USB device {vendor_id:04x}:{product_id:04x}");
        let device = find_device(vendor_id, product_id)?
            .ok_or_else(|| InstrumentError::DeviceNotFound(address.clone()))?;
        let config = device.active_config_descriptor()?;
        let endpoints = find_bulk_endpoints(&config).ok_or_else(|| {
            InstrumentError::DeviceNotFound(format!("{address} has no bulk endpoints"))
        })?;

        let handle = device.open()?;
        // Not supported on all platforms, in which case there is no kernel driver to detach.
        let _ = handle.set_auto_detach_kernel_driver(true);
        handle.set_active_configuration(config.number())?;
        handle.claim_interface(endpoints.interface)?;
        log::info!("Opened {address} with endpoints {endpoints:?}");

        Ok(UsbInterface {
            handle,
            endpoints,
            pending: VecDeque::new(),
            terminator: "\n".to_string(),
            timeout,
        })
    }

    /// Set the timeout of every single USB transfer.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Read one packet from the bulk IN endpoint into the pending buffer.
    fn read_packet(&mut self) -> Result<(), InstrumentError> {
        let mut packet = vec![0u8; self.endpoints.max_packet_size];
        match self
            .handle
            .read_bulk(self.endpoints.address_in, &mut packet, self.timeout)
        {
            Ok(len) => {
                log::trace!("Received USB packet {:?}", &packet[..len]);
                self.pending.extend(&packet[..len]);
                Ok(())
            }
            Err(rusb::Error::Timeout) => Err(InstrumentError::Timeout(self.timeout)),
            Err(err) => Err(err.into()),
        }
    }
}

impl InstrumentInterface for UsbInterface {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        let len = buf.len();
        while self.pending.len() < len {
            self.read_packet()?;
        }
        for (byte, received) in buf.iter_mut().zip(self.pending.drain(..len)) {
            *byte = received;
        }
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        let written = match self
            .handle
            .write_bulk(self.endpoints.address_out, data, self.timeout)
        {
            Ok(written) => written,
            Err(rusb::Error::Timeout) => return Err(InstrumentError::Timeout(self.timeout)),
            Err(err) => return Err(err.into()),
        };
        if written != data.len() {
            return Err(InstrumentError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("only {written} of {} bytes were written", data.len()),
            )));
        }
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        self.terminator.as_str()
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_input(&mut self) -> Result<(), InstrumentError> {
        if !self.pending.is_empty() {
            log::debug!("Discarding {} stale bytes", self.pending.len());
            self.pending.clear();
        }
        Ok(())
    }
}

impl Drop for UsbInterface {
    fn drop(&mut self) {
        if let Err(err) = self.handle.release_interface(self.endpoints.interface) {
            log::warn!("Failed to release USB interface: {err}");
        }
    }
}

/// Find the first connected device with the given vendor and product id.
fn find_device(
    vendor_id: u16,
    product_id: u16,
) -> Result<Option<Device<GlobalContext>>, InstrumentError> {
    let device = rusb::devices()?.iter().find(|dev| {
        dev.device_descriptor()
            .map(|desc| desc.vendor_id() == vendor_id && desc.product_id() == product_id)
            .unwrap_or(false)
    });
    Ok(device)
}

/// The parts of an endpoint descriptor that are needed to pick the bulk endpoints.
#[derive(Debug, Clone, Copy)]
struct EndpointInfo {
    transfer_type: TransferType,
    direction: Direction,
    address: u8,
    max_packet_size: u16,
}

/// Find the first interface that has both a bulk IN and a bulk OUT endpoint.
fn find_bulk_endpoints(config: &ConfigDescriptor) -> Option<BulkEndpoints> {
    config
        .interfaces()
        .flat_map(|interface| interface.descriptors())
        .find_map(|desc| {
            let endpoints = desc
                .endpoint_descriptors()
                .map(|ep| EndpointInfo {
                    transfer_type: ep.transfer_type(),
                    direction: ep.direction(),
                    address: ep.address(),
                    max_packet_size: ep.max_packet_size(),
                })
                .collect::<Vec<_>>();
            pick_bulk_pair(desc.interface_number(), &endpoints)
        })
}

/// Pick the first bulk IN and the first bulk OUT endpoint of an interface.
fn pick_bulk_pair(interface: u8, endpoints: &[EndpointInfo]) -> Option<BulkEndpoints> {
    let find = |direction: Direction| {
        endpoints
            .iter()
            .find(|ep| ep.transfer_type == TransferType::Bulk && ep.direction == direction)
    };
    let ep_in = find(Direction::In)?;
    let ep_out = find(Direction::Out)?;
    Some(BulkEndpoints {
        interface,
        address_in: ep_in.address,
        address_out: ep_out.address,
        max_packet_size: usize::from(ep_in.max_packet_size).max(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(transfer_type: TransferType, direction: Direction, address: u8) -> EndpointInfo {
        EndpointInfo {
            transfer_type,
            direction,
            address,
            max_packet_size: 64,
        }
    }

    #[test]
    fn test_pick_bulk_pair() {
        let endpoints = [
            endpoint(TransferType::Interrupt, Direction::In, 0x83),
            endpoint(TransferType::Bulk, Direction::Out, 0x02),
            endpoint(TransferType::Bulk, Direction::In, 0x81),
        ];
        let found = pick_bulk_pair(0, &endpoints).unwrap();
        assert_eq!(found.interface, 0);
        assert_eq!(found.address_in, 0x81);
        assert_eq!(found.address_out, 0x02);
        assert_eq!(found.max_packet_size, 64);
    }

    #[test]
    fn test_pick_bulk_pair_missing_direction() {
        let endpoints = [
            endpoint(TransferType::Bulk, Direction::In, 0x81),
            endpoint(TransferType::Interrupt, Direction::Out, 0x02),
        ];
        assert_eq!(pick_bulk_pair(0, &endpoints), None);
    }

    /// A device that reports a zero packet size still gets a usable read buffer.
    #[test]
    fn test_pick_bulk_pair_zero_packet_size() {
        let mut ep_in = endpoint(TransferType::Bulk, Direction::In, 0x81);
        ep_in.max_packet_size = 0;
        let endpoints = [ep_in, endpoint(TransferType::Bulk, Direction::Out, 0x01)];
        assert_eq!(pick_bulk_pair(1, &endpoints).unwrap().max_packet_size, 1);
    }
}
