use std::collections::{HashMap, VecDeque};

use crate::{
    crc::{get_crc16, get_crc32, Crc16},
    protocol::{zrinit_flag, Header, ResponseHeader, TransmissionError, ZFrameType, ABORT_SEQ, OVER_AND_OUT, XON, ZBIN, ZBIN32, ZCRCE, ZCRCW, ZDLE, ZPAD},
    TransferResult,
};

use super::Com;

/// Everything the fake receiver reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Header(ZFrameType),
    /// A data subpacket following a header of this type.
    Subpacket(ZFrameType),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nothing,
    Header(Header),
    Raw(Vec<u8>),
}

/// One write of the sender, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Hex(Header),
    Bin16(Header),
    Bin32(Header),
    Subpacket { end: u8, data: Vec<u8>, crc_ok: bool },
    OverAndOut,
    Abort,
    Unknown(Vec<u8>),
}

/// Scripted ZMODEM receiver. Every write is decoded into a [`Frame`], replies are queued
/// per [`Trigger`] and the last queued reply for a trigger repeats forever.
#[derive(Debug, Default)]
pub struct TestCom {
    is_open: bool,
    pub open_count: usize,
    pub close_count: usize,
    pending: VecDeque<u8>,
    replies: HashMap<Trigger, VecDeque<Reply>>,
    last_header: Option<ZFrameType>,

    pub frames: Vec<Frame>,
    pub file_info: Option<Vec<u8>>,
    /// File data reassembled from the first ZDATA offset on.
    pub received: Vec<u8>,
    data_start: Option<u32>,

    pub fail_open: bool,
    pub fail_reads: bool,
    /// 1 based numbers of the writes that fail.
    pub fail_writes: Vec<usize>,
    write_count: usize,
}

impl TestCom {
    /// Never answers.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Answers a plain upload: ZRINIT, ZRPOS 0, ZRINIT after ZEOF, ZFIN.
    pub fn receiver() -> Self {
        let mut com = Self::default();
        com.reply(
            Trigger::Header(ZFrameType::RQInit),
            vec![Reply::Header(Header::from_flags(
                ZFrameType::RInit,
                0,
                0,
                0,
                zrinit_flag::CANFDX | zrinit_flag::CANOVIO | zrinit_flag::CANFC32,
            ))],
        );
        com.reply(
            Trigger::Subpacket(ZFrameType::File),
            vec![Reply::Header(Header::from_number(ZFrameType::RPos, 0))],
        );
        com.reply(Trigger::Header(ZFrameType::Eof), vec![Reply::Header(Header::empty(ZFrameType::RInit))]);
        com.reply(Trigger::Header(ZFrameType::Fin), vec![Reply::Header(Header::empty(ZFrameType::Fin))]);
        com
    }

    pub fn reply(&mut self, trigger: Trigger, replies: Vec<Reply>) {
        self.replies.insert(trigger, replies.into());
    }

    pub fn set_open(&mut self, is_open: bool) {
        self.is_open = is_open;
    }

    pub fn headers(&self) -> Vec<&Header> {
        self.frames
            .iter()
            .filter_map(|f| match f {
                Frame::Hex(h) | Frame::Bin16(h) | Frame::Bin32(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    pub fn frame_types(&self) -> Vec<ZFrameType> {
        self.headers().iter().map(|h| h.frame_type).collect()
    }

    pub fn subpackets(&self) -> Vec<(u8, &[u8])> {
        self.frames
            .iter()
            .filter_map(|f| match f {
                Frame::Subpacket { end, data, .. } => Some((*end, data.as_slice())),
                _ => None,
            })
            .collect()
    }

    pub fn all_crc_ok(&self) -> bool {
        self.frames.iter().all(|f| !matches!(f, Frame::Subpacket { crc_ok: false, .. }))
    }

    fn next_reply(&mut self, trigger: Trigger) -> Reply {
        match self.replies.get_mut(&trigger) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Nothing),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Nothing),
            None => Reply::Nothing,
        }
    }

    fn receive(&mut self, buf: &[u8]) {
        let frame = decode_frame(buf);
        let trigger = match &frame {
            Frame::Hex(h) | Frame::Bin16(h) | Frame::Bin32(h) => {
                self.last_header = Some(h.frame_type);
                if h.frame_type == ZFrameType::Data {
                    let pos = h.number();
                    let start = *self.data_start.get_or_insert(pos);
                    self.received.truncate(pos.saturating_sub(start) as usize);
                }
                Some(Trigger::Header(h.frame_type))
            }
            Frame::Subpacket { data, .. } => match self.last_header {
                Some(ZFrameType::File) => {
                    self.file_info = Some(data.clone());
                    Some(Trigger::Subpacket(ZFrameType::File))
                }
                Some(ZFrameType::Data) => {
                    self.received.extend_from_slice(data);
                    Some(Trigger::Subpacket(ZFrameType::Data))
                }
                Some(frame_type) => Some(Trigger::Subpacket(frame_type)),
                None => None,
            },
            _ => None,
        };
        self.frames.push(frame);

        if let Some(trigger) = trigger {
            match self.next_reply(trigger) {
                Reply::Nothing => {}
                Reply::Header(header) => {
                    self.pending.extend(header.build_hex(&mut Crc16::new()));
                    self.pending.push_back(XON);
                }
                Reply::Raw(data) => self.pending.extend(data),
            }
        }
    }
}

/// Undoes ZDLE escaping, stops after a ZDLE ZCRCx marker and returns (data, marker, rest).
fn zdle_decode(buf: &[u8]) -> (Vec<u8>, Option<u8>, &[u8]) {
    let mut res = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == ZDLE && i + 1 < buf.len() {
            let b = buf[i + 1];
            i += 2;
            if (ZCRCE..=ZCRCW).contains(&b) {
                return (res, Some(b), &buf[i..]);
            }
            res.push(b ^ 0x40);
        } else {
            res.push(buf[i]);
            i += 1;
        }
    }
    (res, None, &[])
}

fn decode_frame(buf: &[u8]) -> Frame {
    if buf == OVER_AND_OUT.as_slice() {
        return Frame::OverAndOut;
    }
    if buf == ABORT_SEQ.as_slice() {
        return Frame::Abort;
    }
    if buf.starts_with(&[ZPAD, ZPAD]) {
        return match ResponseHeader::try_parse(buf) {
            Ok(ResponseHeader {
                frame_type: Some(frame_type),
                data,
                ..
            }) => Frame::Hex(Header { frame_type, data }),
            _ => Frame::Unknown(buf.to_vec()),
        };
    }
    if buf.len() > 3 && buf[0] == ZPAD && buf[1] == ZDLE && (buf[2] == ZBIN || buf[2] == ZBIN32) {
        let (block, _, _) = zdle_decode(&buf[3..]);
        let crc_len = if buf[2] == ZBIN32 { 4 } else { 2 };
        if block.len() != 5 + crc_len {
            return Frame::Unknown(buf.to_vec());
        }
        let header = Header {
            frame_type: ZFrameType::from_code(block[0]),
            data: [block[1], block[2], block[3], block[4]],
        };
        return if buf[2] == ZBIN32 {
            if get_crc32(&block[0..5]).to_le_bytes() != block[5..9] {
                return Frame::Unknown(buf.to_vec());
            }
            Frame::Bin32(header)
        } else {
            if get_crc16(&block[0..5]).to_le_bytes() != block[5..7] {
                return Frame::Unknown(buf.to_vec());
            }
            Frame::Bin16(header)
        };
    }

    match zdle_decode(buf) {
        (data, Some(end), rest) => {
            let (trailer, _, _) = zdle_decode(rest);
            let mut checked = data.clone();
            checked.push(end);
            let crc_ok = match trailer.len() {
                4 => get_crc32(&checked).to_le_bytes() == trailer[..],
                2 => get_crc16(&checked).to_le_bytes() == trailer[..],
                _ => false,
            };
            Frame::Subpacket { end, data, crc_ok }
        }
        _ => Frame::Unknown(buf.to_vec()),
    }
}

impl Com for TestCom {
    fn get_name(&self) -> &'static str {
        "Test_Com"
    }

    fn open(&mut self) -> TransferResult<()> {
        if self.fail_open {
            return Err(TransmissionError::Transport("can't open".to_string()).into());
        }
        self.is_open = true;
        self.open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> TransferResult<()> {
        self.is_open = false;
        self.close_count += 1;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }

    fn discard_input_buffer(&mut self) -> TransferResult<()> {
        self.pending.clear();
        Ok(())
    }

    fn discard_output_buffer(&mut self) -> TransferResult<()> {
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> TransferResult<usize> {
        self.write_count += 1;
        if self.fail_writes.contains(&self.write_count) {
            return Err(TransmissionError::Transport(format!("write {} failed", self.write_count)).into());
        }
        self.receive(buf);
        Ok(buf.len())
    }

    fn bytes_available(&mut self) -> TransferResult<usize> {
        if self.fail_reads {
            return Err(TransmissionError::Transport("line dropped".to_string()).into());
        }
        Ok(self.pending.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> TransferResult<usize> {
        let size = buf.len().min(self.pending.len());
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(0..size)) {
            *dst = src;
        }
        Ok(size)
    }
}
