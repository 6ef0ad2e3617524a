use thiserror::Error;

use super::ZFrameType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransmissionError {
    #[error("response header has {0} bytes, expected 20 or 21")]
    ResponseLength(usize),

    #[error("hex number expected got {} (0x{:X})", char::from(*.0), .0)]
    HexNumberExpected(u8),

    #[error("ZPAD expected got {} (0x{:X})", char::from(*.0), .0)]
    ZPADExpected(u8),

    #[error("ZDLE expected got {} (0x{:X})", char::from(*.0), .0)]
    ZDLEExpected(u8),

    #[error("crc16 mismatch got 0x{0:04X} expected 0x{1:04X}")]
    CRC16Mismatch(u16, u16),

    #[error("unknown frame indicator {} (0x{:X})", char::from(*.0), .0)]
    UnknownFrameIndicator(u8),

    #[error("no {0:?} received, retries exhausted")]
    RetriesExhausted(ZFrameType),

    #[error("transport error: {0}")]
    Transport(String),
}
