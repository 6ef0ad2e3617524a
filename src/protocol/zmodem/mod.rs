//
// ZModem protocol specification http://cristal.inria.fr/~doligez/zmodem/zmodem.txt

pub mod constants;
use std::path::Path;

pub use constants::*;
mod header;
pub use header::*;

mod sz;
pub use sz::*;

mod error;
pub use error::TransmissionError;


use super::FileDescriptor;
use crate::{
    com::Com,
    crc::{Crc16, Crc32},
    data::TransferOptions,
    TransferResult,
};

const ZEDZAP_BLOCK_LEN: usize = 8 * 1024;

/// Single file ZMODEM sender. Owns the transport for its whole lifetime.
pub struct Zmodem {
    com: Box<dyn Com>,
    options: TransferOptions,
}

impl Zmodem {
    pub fn new(com: Box<dyn Com>, options: TransferOptions) -> Self {
        Self { com, options }
    }

    pub fn get_name(&self) -> &str {
        if self.options.chunk_size < ZEDZAP_BLOCK_LEN {
            "Zmodem"
        } else {
            "ZedZap (Zmodem 8k)"
        }
    }

    /// Uploads a local file. Errors reading the file are returned, protocol failures yield `Ok(false)`.
    pub fn upload_file<P: AsRef<Path>>(&mut self, path: P) -> TransferResult<bool> {
        let file = FileDescriptor::create(path.as_ref())?;
        self.upload(&file)
    }

    /// Uploads an in-memory buffer under a generated temporary file name.
    pub fn upload_data(&mut self, data: Vec<u8>) -> TransferResult<bool> {
        let file = FileDescriptor::from_data(data);
        self.upload(&file)
    }

    pub fn upload(&mut self, file: &FileDescriptor) -> TransferResult<bool> {
        if u32::try_from(file.size).is_err() {
            return Err(anyhow::anyhow!("{} is too large for zmodem ({} bytes)", file.file_name, file.size));
        }
        log::info!("{}: sending {} ({} bytes)", self.get_name(), file.file_name, file.size);
        let mut sz = Sz::new(self.com.as_mut(), self.options.clone());
        Ok(sz.send(file))
    }

    pub fn cancel(&mut self) -> TransferResult<()> {
        self.com.write(&ABORT_SEQ)?;
        Ok(())
    }
}

/// Wraps `data` into a data subpacket: escaped data, ZDLE, `zcrc_byte` and the escaped
/// CRC-16 of data and `zcrc_byte`.
pub fn encode_subpacket_crc16(zcrc_byte: u8, data: &[u8], crc: &mut Crc16) -> Vec<u8> {
    crc.reset();
    crc.update(data);
    crc.update(&[zcrc_byte]);
    let mut v = zdle_encode(data);
    v.extend_from_slice(&[ZDLE, zcrc_byte]);
    append_zdle_encoded(&mut v, &u16::to_le_bytes(crc.finalize()));
    v
}

/// Same as [`encode_subpacket_crc16`] with a CRC-32 trailer.
pub fn encode_subpacket_crc32(zcrc_byte: u8, data: &[u8], crc: &mut Crc32) -> Vec<u8> {
    crc.reset();
    crc.update(data);
    crc.update(&[zcrc_byte]);
    let mut v = zdle_encode(data);
    v.extend_from_slice(&[ZDLE, zcrc_byte]);
    append_zdle_encoded(&mut v, &u32::to_le_bytes(crc.finalize()));
    v
}

/// ZCRCG while more data follows, ZCRCE for the last subpacket of a file.
pub fn subpacket_sequence(end_pos: usize, total_len: usize) -> u8 {
    if end_pos < total_len {
        ZCRCG
    } else {
        ZCRCE
    }
}

pub fn zdle_encode(data: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(data.len());
    append_zdle_encoded(&mut v, data);
    v
}

pub fn append_zdle_encoded(v: &mut Vec<u8>, data: &[u8]) {
    for b in data {
        match *b {
            ZDLE => v.extend_from_slice(&[ZDLE, ZDLEE]),
            b if ESCAPED_BYTES.contains(&b) || ESCAPED_EOL_BYTES.contains(&b) => v.extend_from_slice(&[ZDLE, b | 0x40]),
            b => v.push(b),
        }
    }
}

fn get_hex(n: u8) -> u8 {
    if n < 10 {
        return b'0' + n;
    }
    b'a' + (n - 10)
}

fn from_hex(n: u8) -> Result<u8, TransmissionError> {
    match n {
        b'0'..=b'9' => Ok(n - b'0'),
        b'A'..=b'F' => Ok(10 + n - b'A'),
        b'a'..=b'f' => Ok(10 + n - b'a'),
        _ => Err(TransmissionError::HexNumberExpected(n)),
    }
}
