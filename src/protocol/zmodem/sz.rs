use std::{cmp::min, thread, time::Duration};

use web_time::Instant;

use crate::{
    com::Com,
    crc::{Crc16, Crc32},
    data::TransferOptions,
    protocol::FileDescriptor,
};

use super::{
    encode_subpacket_crc32, error::TransmissionError, subpacket_sequence, zfile_flag, zrinit_flag, Header, ResponseHeader, ZFrameType,
    OVER_AND_OUT, ZBIN, ZBIN32, ZCRCW, ZDLE, ZPAD,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    AwaitingInit,
    FileNegotiation,
    DataTransfer,
    AwaitingEof,
    Finishing,
    Done,
    Failed,
}

/// Bounded resend loop: at most `max_attempts` tries, sleeping `delay` in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn run<T>(&self, mut attempt: impl FnMut(usize) -> Option<T>) -> Option<T> {
        for i in 0..self.max_attempts {
            if let Some(res) = attempt(i) {
                return Some(res);
            }
            if i + 1 < self.max_attempts {
                thread::sleep(self.delay);
            }
        }
        None
    }
}

/// What a sent frame waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation<'a> {
    /// Write only.
    Nothing,
    /// Poll once and return whatever header arrived, never resend.
    Any,
    /// Resend until one of these arrives or the retry budget is spent.
    OneOf(&'a [ZFrameType]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    Resume(u32),
    Skip,
    Failed,
}

/// Sender side of one ZMODEM session. Borrows the transport exclusively for the upload.
pub struct Sz<'a> {
    com: &'a mut dyn Com,
    options: TransferOptions,
    state: SendState,
    crc16: Crc16,
    crc32: Crc32,
    receiver_capabilities: u8,
    pub errors: usize,
}

impl<'a> Sz<'a> {
    pub fn new(com: &'a mut dyn Com, options: TransferOptions) -> Self {
        Self {
            com,
            options,
            state: SendState::Idle,
            crc16: Crc16::new(),
            crc32: Crc32::new(),
            receiver_capabilities: 0,
            errors: 0,
        }
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn receiver_capabilities(&self) -> u8 {
        self.receiver_capabilities
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.options.max_retries,
            delay: self.options.retry_delay,
        }
    }

    fn set_state(&mut self, state: SendState) {
        log::info!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Runs the whole session. Returns true if the receiver accepted the file and acknowledged its end.
    pub fn send(&mut self, file: &FileDescriptor) -> bool {
        let start = Instant::now();
        self.set_state(SendState::AwaitingInit);
        if !self.prepare_transport() || !self.send_zrqinit() {
            self.set_state(SendState::Failed);
            return false;
        }

        self.set_state(SendState::FileNegotiation);
        let negotiation = self.send_zfile(file);

        let (negotiated, data_sent) = match negotiation {
            Negotiation::Resume(offset) => {
                self.set_state(SendState::DataTransfer);
                (true, self.send_data(&file.data, offset))
            }
            Negotiation::Skip => {
                log::info!("Receiver got {} already, skipping.", file.file_name);
                (false, true)
            }
            Negotiation::Failed => {
                self.set_state(SendState::DataTransfer);
                (false, self.send_data(&file.data, 0))
            }
        };

        self.set_state(SendState::AwaitingEof);
        let eof_acked = self.send_zeof(file.data.len() as u32);

        self.set_state(SendState::Finishing);
        if !self.send_zfin() {
            log::warn!("receiver didn't confirm ZFIN");
        }
        self.send_frame(OVER_AND_OUT, Expectation::Nothing);

        let success = negotiated && data_sent && eof_acked;
        self.set_state(if success { SendState::Done } else { SendState::Failed });
        log::info!("Took: {}ms, {} errors", start.elapsed().as_millis(), self.errors);
        success
    }

    fn prepare_transport(&mut self) -> bool {
        let res = (|| {
            if self.com.is_open() {
                self.com.close()?;
            }
            self.com.open()?;
            self.com.discard_input_buffer()?;
            self.com.discard_output_buffer()
        })();
        if let Err(err) = res {
            log::error!("can't prepare {}: {err}", self.com.get_name());
            return false;
        }
        true
    }

    /// Sent by the sending program, to trigger the receiving program to send its ZRINIT header.
    fn send_zrqinit(&mut self) -> bool {
        let frame = Header::empty(ZFrameType::RQInit).build_hex(&mut self.crc16);
        let retry = self.retry_policy();
        let res = retry.run(|_| {
            let res = self.exchange(&frame)?;
            match res.frame_type {
                Some(ZFrameType::RInit) => Some(res),
                Some(ZFrameType::Challenge) => {
                    // answer with the challenge data in ZP0..ZP3
                    let ack = Header {
                        frame_type: ZFrameType::Ack,
                        data: res.data,
                    }
                    .build_hex(&mut self.crc16);
                    let res = self.exchange(&ack)?;
                    if res.is_type(ZFrameType::RInit) {
                        Some(res)
                    } else {
                        self.mismatch(&res, ZFrameType::RInit)
                    }
                }
                _ => self.mismatch(&res, ZFrameType::RInit),
            }
        });

        match res {
            Some(zrinit) => {
                self.receiver_capabilities = zrinit.data[3];
                log::debug!("receiver capabilities x{:02X}", self.receiver_capabilities);
                if self.receiver_capabilities & zrinit_flag::CANFC32 == 0 {
                    log::warn!("receiver doesn't announce 32 bit frame checks");
                }
                true
            }
            None => {
                log::warn!("{}", TransmissionError::RetriesExhausted(ZFrameType::RInit));
                false
            }
        }
    }

    /// ZFILE header followed by a ZCRCW subpacket with name, length and modification date.
    fn send_zfile(&mut self, file: &FileDescriptor) -> Negotiation {
        let header = Header::from_flags(
            ZFrameType::File,
            zfile_flag::ZXNONE,
            zfile_flag::ZTNONE,
            zfile_flag::ZMNEWL,
            zfile_flag::ZCBIN,
        )
        .build_bin32(&mut self.crc32);
        let subpacket = encode_subpacket_crc32(ZCRCW, &file.get_file_info(), &mut self.crc32);

        let retry = self.retry_policy();
        let res = retry.run(|_| {
            self.send_frame(&header, Expectation::Nothing);
            let res = self.exchange(&subpacket)?;
            match res.frame_type {
                Some(ZFrameType::RPos) => Some(Negotiation::Resume(res.requested_offset.unwrap_or(0))),
                Some(ZFrameType::Skip) => Some(Negotiation::Skip),
                Some(ZFrameType::Crc) => self.answer_zcrc(&res, &file.data),
                _ => self.mismatch(&res, ZFrameType::RPos),
            }
        });
        res.unwrap_or_else(|| {
            log::warn!("{}", TransmissionError::RetriesExhausted(ZFrameType::RPos));
            Negotiation::Failed
        })
    }

    /// The receiver has a file with the same name and length and asks for the CRC-32
    /// of the first ZP0..ZP3 bytes (0 = whole file).
    fn answer_zcrc(&mut self, request: &ResponseHeader, data: &[u8]) -> Option<Negotiation> {
        let count = request.number() as usize;
        let len = if count == 0 { data.len() } else { min(count, data.len()) };
        let crc = self.crc32.compute(&data[..len]);
        log::debug!("ZCRC requested for {len} bytes: x{crc:08X}");

        let answer = Header::from_number(ZFrameType::Crc, crc).build_hex(&mut self.crc16);
        let res = self.exchange(&answer)?;
        match res.frame_type {
            Some(ZFrameType::RPos) => Some(Negotiation::Resume(res.requested_offset.unwrap_or(0))),
            Some(ZFrameType::Skip) => Some(Negotiation::Skip),
            _ => self.mismatch(&res, ZFrameType::RPos),
        }
    }

    /// ZDATA header followed by the file in subpackets. A ZRPOS in between restarts at the requested position.
    fn send_data(&mut self, data: &[u8], offset: u32) -> bool {
        let mut pos = min(offset as usize, data.len());
        let mut chunk_size = self.options.chunk_size.max(1);
        let mut restarts = 0;

        self.send_zdata(pos);
        while pos < data.len() {
            let end_pos = min(data.len(), pos + chunk_size);
            let crc_byte = subpacket_sequence(end_pos, data.len());
            let p = encode_subpacket_crc32(crc_byte, &data[pos..end_pos], &mut self.crc32);
            let res = self.send_frame(&p, Expectation::Any);
            pos = end_pos;

            let Some(res) = res else {
                continue;
            };
            match res.frame_type {
                Some(ZFrameType::Ack) => {
                    log::trace!("ZACK at {}", res.requested_offset.unwrap_or(0));
                }
                Some(ZFrameType::RInit) => {
                    // receiver can't overlap serial and disk I/O, ZP0/ZP1 hold its buffer length
                    let buffer_len = u16::from_le_bytes([res.data[0], res.data[1]]) as usize;
                    if buffer_len > 0 && buffer_len < chunk_size {
                        log::debug!("receiver buffer is {buffer_len} bytes, reducing subpacket size");
                        chunk_size = buffer_len;
                    }
                }
                Some(ZFrameType::RPos) => {
                    restarts += 1;
                    self.errors += 1;
                    let new_pos = res.requested_offset.unwrap_or(0) as usize;
                    if restarts > self.options.max_retries || new_pos > data.len() {
                        log::warn!("giving up resending from {new_pos} after {restarts} restarts");
                        return false;
                    }
                    log::info!("Receiver requested resend from {new_pos}");
                    pos = new_pos;
                    self.send_zdata(pos);
                }
                Some(ZFrameType::FErr) | Some(ZFrameType::Can) | Some(ZFrameType::Abort) => {
                    log::warn!("receiver aborted the transfer: {res}");
                    return false;
                }
                _ => {
                    log::debug!("ignoring {res} during data transfer");
                }
            }
        }
        log::info!("Done sending file data.");
        true
    }

    fn send_zdata(&mut self, pos: usize) {
        let header = Header::build_data32(ZFrameType::Data, pos as u32, &mut self.crc32);
        self.send_frame(&header, Expectation::Nothing);
    }

    fn send_zeof(&mut self, size: u32) -> bool {
        let frame = Header::from_number(ZFrameType::Eof, size).build_hex(&mut self.crc16);
        self.send_frame(&frame, Expectation::OneOf(&[ZFrameType::RInit])).is_some()
    }

    fn send_zfin(&mut self) -> bool {
        let frame = Header::empty(ZFrameType::Fin).build_hex(&mut self.crc16);
        self.send_frame(&frame, Expectation::OneOf(&[ZFrameType::Fin])).is_some()
    }

    /// Writes `frame` and waits for a response according to `expectation`.
    pub fn send_frame(&mut self, frame: &[u8], expectation: Expectation) -> Option<ResponseHeader> {
        match expectation {
            Expectation::Nothing => {
                self.write(frame);
                None
            }
            Expectation::Any => self.exchange(frame),
            Expectation::OneOf(frame_types) => {
                let retry = self.retry_policy();
                let res = retry.run(|_| {
                    let res = self.exchange(frame)?;
                    match res.frame_type {
                        Some(frame_type) if frame_types.contains(&frame_type) => Some(res),
                        _ => self.mismatch(&res, frame_types),
                    }
                });
                if res.is_none() {
                    log::warn!("no {frame_types:?} received, retries exhausted");
                }
                res
            }
        }
    }

    fn mismatch<T>(&mut self, res: &ResponseHeader, expected: impl std::fmt::Debug) -> Option<T> {
        log::warn!("expected {expected:?} got {res}");
        self.errors += 1;
        None
    }

    /// One write, settle, one poll.
    fn exchange(&mut self, frame: &[u8]) -> Option<ResponseHeader> {
        if !self.write(frame) {
            self.errors += 1;
            return None;
        }
        thread::sleep(self.options.settle_delay);
        self.read_response()
    }

    fn write(&mut self, frame: &[u8]) -> bool {
        let res = (|| {
            if !self.com.is_open() {
                self.com.open()?;
            }
            self.com.write(frame)
        })();
        match res {
            Ok(_) => {
                log::debug!("Send {}", describe_frame(frame));
                true
            }
            Err(err) => {
                log::error!("error writing to {}: {err}", self.com.get_name());
                false
            }
        }
    }

    fn read_response(&mut self) -> Option<ResponseHeader> {
        let res = (|| {
            let available = self.com.bytes_available()?;
            if available == 0 {
                return Ok(None);
            }
            let mut buf = vec![0; available];
            let size = self.com.read(&mut buf)?;
            buf.truncate(size);
            anyhow::Ok(Some(buf))
        })();

        match res {
            Ok(Some(buf)) => match ResponseHeader::try_parse(&buf) {
                Ok(header) => {
                    log::debug!("Recv header {header}");
                    Some(header)
                }
                Err(err) => {
                    log::warn!("malformed response ({} bytes): {err}", buf.len());
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                log::error!("error reading from {}: {err}", self.com.get_name());
                None
            }
        }
    }
}

fn describe_frame(frame: &[u8]) -> String {
    if let [ZPAD, ZDLE, ZBIN | ZBIN32, rest @ ..] = frame {
        let mut block = Vec::with_capacity(5);
        let mut bytes = rest.iter();
        while block.len() < 5 {
            match bytes.next() {
                Some(&ZDLE) => match bytes.next() {
                    Some(b) => block.push(b ^ 0x40),
                    None => break,
                },
                Some(b) => block.push(*b),
                None => break,
            }
        }
        if block.len() == 5 {
            let header = Header {
                frame_type: ZFrameType::from_code(block[0]),
                data: [block[1], block[2], block[3], block[4]],
            };
            return format!("binary header {header}");
        }
    }
    match ResponseHeader::try_parse(frame) {
        Ok(header) => format!("hex header {header}"),
        Err(_) => format!("{} bytes", frame.len()),
    }
}
