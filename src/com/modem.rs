use std::{
    collections::VecDeque,
    io::{ErrorKind, Read, Write},
    time::Duration,
};

use serial::prelude::*;

use crate::{data::Modem, protocol::TransmissionError, TransferResult};

use super::Com;

/// How long a poll for incoming bytes may block.
const POLL_TIMEOUT: Duration = Duration::from_millis(10);
/// Upper bound for reads while discarding input.
const MAX_DRAIN_READS: usize = 64;

pub struct ComModemImpl {
    modem: Modem,
    port: Option<serial::SystemPort>,
    buf: VecDeque<u8>,
}

impl ComModemImpl {
    pub fn new(modem: Modem) -> Self {
        Self {
            modem,
            port: None,
            buf: VecDeque::new(),
        }
    }

    fn port(&mut self) -> TransferResult<&mut serial::SystemPort> {
        match self.port.as_mut() {
            Some(port) => Ok(port),
            None => Err(TransmissionError::Transport(format!("{} is not open", self.modem.device)).into()),
        }
    }

    /// Moves whatever the port has ready into the local buffer.
    fn fill_buffer(&mut self) -> TransferResult<()> {
        let mut data = [0; 1024];
        let port = self.port()?;
        match port.read(&mut data) {
            Ok(size) => {
                self.buf.extend(&data[0..size]);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Com for ComModemImpl {
    fn get_name(&self) -> &'static str {
        "Modem"
    }

    fn open(&mut self) -> TransferResult<()> {
        let modem = &self.modem;
        let mut port = serial::open(&modem.device)?;
        port.reconfigure(&|settings| {
            settings.set_baud_rate(serial::BaudRate::from_speed(modem.baud_rate))?;
            settings.set_char_size(modem.char_size);
            settings.set_parity(modem.parity);
            settings.set_stop_bits(modem.stop_bits);
            settings.set_flow_control(modem.flow_control);
            Ok(())
        })?;
        port.set_timeout(POLL_TIMEOUT)?;
        log::debug!("opened {} at {} baud", modem.device, modem.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> TransferResult<()> {
        self.port = None;
        self.buf.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn discard_input_buffer(&mut self) -> TransferResult<()> {
        self.buf.clear();
        let quiet = drain(MAX_DRAIN_READS, || {
            self.fill_buffer()?;
            let len = self.buf.len();
            self.buf.clear();
            Ok(len)
        })?;
        if !quiet {
            log::warn!("{} keeps delivering data, continuing without a clean input buffer", self.modem.device);
        }
        Ok(())
    }

    fn discard_output_buffer(&mut self) -> TransferResult<()> {
        // the serial crate can't purge the driver queue, flushing is the closest we get
        self.port()?.flush()?;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> TransferResult<usize> {
        self.port()?.write_all(buf)?;
        Ok(buf.len())
    }

    fn bytes_available(&mut self) -> TransferResult<usize> {
        self.fill_buffer()?;
        Ok(self.buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> TransferResult<usize> {
        if self.buf.is_empty() {
            self.fill_buffer()?;
        }
        let size = buf.len().min(self.buf.len());
        for (dst, src) in buf.iter_mut().zip(self.buf.drain(0..size)) {
            *dst = src;
        }
        Ok(size)
    }
}

/// Calls `read_chunk` until it reads nothing, at most `max_reads` times.
/// Returns false if the line never went quiet.
fn drain(max_reads: usize, mut read_chunk: impl FnMut() -> TransferResult<usize>) -> TransferResult<bool> {
    for _ in 0..max_reads {
        if read_chunk()? == 0 {
            return Ok(true);
        }
    }
    Ok(false)
}
