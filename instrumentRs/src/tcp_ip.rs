//! This module provides the implementation for an instrument controlled via TCP/IP.
//!
//! This covers instruments that sit behind a serial-to-ethernet bridge, e.g., a SIM900 mainframe
//! that is not wired to the lab computer directly.

use std::{
    io::{ErrorKind, Read},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use crate::{Instrument, InstrumentError};

/// A blocking TCP/IP implementation using the [`std::net::TcpStream`] struct.
#[derive(Debug)]
pub struct TcpIpInterface {}

impl TcpIpInterface {
    /// Connect to a socket address with a read and write timeout of three seconds.
    ///
    /// # Arguments
    /// * `sock_addr` - Socket address.
    pub fn simple<A: ToSocketAddrs>(
        sock_addr: A,
    ) -> Result<Instrument<TcpStream>, InstrumentError> {
        Self::full(sock_addr, Duration::from_secs(3))
    }

    /// Connect to a socket address with the given read and write timeout.
    ///
    /// A zero timeout is rejected, as the stream would otherwise block forever. Data that is
    /// already waiting on the socket is discarded before every query.
    ///
    /// # Arguments
    /// * `sock_addr` - Socket address.
    /// * `timeout` - Read and write timeout.
    pub fn full<A: ToSocketAddrs>(
        sock_addr: A,
        timeout: Duration,
    ) -> Result<Instrument<TcpStream>, InstrumentError> {
        if timeout.is_zero() {
            return Err(InstrumentError::InvalidArgument(
                "TCP/IP timeout must be larger than zero.".to_string(),
            ));
        }
        let stream = TcpStream::connect(sock_addr)?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_read_timeout(Some(timeout))?;
        log::info!("Connected to {:?}", stream.peer_addr());
        Ok(Instrument::new(stream, timeout).with_input_clear(drain_stream))
    }
}

/// Read and drop everything that is waiting on the socket, without blocking.
fn drain_stream(stream: &mut TcpStream) -> Result<(), InstrumentError> {
    stream.set_nonblocking(true)?;
    let mut buf = [0u8; 256];
    let drained = loop {
        match stream.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(len) => log::debug!("Discarding {len} stale bytes"),
            Err(err) if err.kind() == ErrorKind::WouldBlock => break Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => break Err(err),
        }
    };
    stream.set_nonblocking(false)?;
    drained?;
    Ok(())
}
