use std::fmt::Display;

use crate::crc::{Crc16, Crc32};

use super::{
    append_zdle_encoded, error::TransmissionError, from_hex, get_hex, CR, HEX_HEADER_LEN, HEX_HEADER_LEN_XON, LF, ZBIN, ZBIN32,
    ZDLE, ZHEX, ZPAD,
};

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum HeaderType {
    Bin,
    Bin32,
    Hex,
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum ZFrameType {
    /// Request receive init (s->r)
    RQInit,
    /// Receive init (r->s)
    RInit,
    // Send init sequence (optional) (s->r)
    Sinit,
    // ACK to RQInit, RInit or SInit (s<->r)
    Ack,
    /// File name from sender (s->r)
    File,
    /// To sender: skip this file (r->s)
    Skip,
    /// Last packet was garbled
    Nak,
    /// Abort batch transfers
    Abort,
    /// Finish session (s<->r)
    Fin,
    /// Resume data trans at this position (r->s)
    RPos,
    /// Data packet(s) follow (s->r)
    Data,
    /// End of file (s->r)
    Eof,
    /// Fatal Read or Write error Detected
    FErr,
    /// Request for file CRC and response
    Crc,
    /// Receiver's Challenge (r->s)
    Challenge,
    /// Request is complete
    Compl,
    /// Other end canned session with CAN*5
    Can,
    /// Request for free bytes on filesystem (s->r)
    FreeCnt,
    /// Command from sending program (s->r)
    Command,
    /// Output to standard error, data follows
    StdErr,
    /// Frame code outside of 0..=19
    Unknown(u8),
}

impl ZFrameType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ZFrameType::RQInit,
            1 => ZFrameType::RInit,
            2 => ZFrameType::Sinit,
            3 => ZFrameType::Ack,
            4 => ZFrameType::File,
            5 => ZFrameType::Skip,
            6 => ZFrameType::Nak,
            7 => ZFrameType::Abort,
            8 => ZFrameType::Fin,
            9 => ZFrameType::RPos,
            10 => ZFrameType::Data,
            11 => ZFrameType::Eof,
            12 => ZFrameType::FErr,
            13 => ZFrameType::Crc,
            14 => ZFrameType::Challenge,
            15 => ZFrameType::Compl,
            16 => ZFrameType::Can,
            17 => ZFrameType::FreeCnt,
            18 => ZFrameType::Command,
            19 => ZFrameType::StdErr,
            unk => ZFrameType::Unknown(unk),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ZFrameType::RQInit => 0,
            ZFrameType::RInit => 1,
            ZFrameType::Sinit => 2,
            ZFrameType::Ack => 3,
            ZFrameType::File => 4,
            ZFrameType::Skip => 5,
            ZFrameType::Nak => 6,
            ZFrameType::Abort => 7,
            ZFrameType::Fin => 8,
            ZFrameType::RPos => 9,
            ZFrameType::Data => 10,
            ZFrameType::Eof => 11,
            ZFrameType::FErr => 12,
            ZFrameType::Crc => 13,
            ZFrameType::Challenge => 14,
            ZFrameType::Compl => 15,
            ZFrameType::Can => 16,
            ZFrameType::FreeCnt => 17,
            ZFrameType::Command => 18,
            ZFrameType::StdErr => 19,
            ZFrameType::Unknown(code) => code,
        }
    }
}

/// Little endian split of a file offset into ZP0..ZP3.
pub fn pack_offset(offset: u32) -> [u8; 4] {
    u32::to_le_bytes(offset)
}

pub fn unpack_offset(p: [u8; 4]) -> u32 {
    u32::from_le_bytes(p)
}

/// Checksum of the 5 byte `[type, p0, p1, p2, p3]` block of a binary header.
#[derive(PartialEq, Clone, Debug)]
pub struct HeaderChecksum {
    pub value: u32,
    /// Little endian checksum bytes, ZDLE escaped.
    pub encoded: Vec<u8>,
}

impl HeaderChecksum {
    pub fn crc16(frame_type: ZFrameType, data: [u8; 4], crc: &mut Crc16) -> Self {
        let value = crc.compute(&header_block(frame_type, data));
        let mut encoded = Vec::new();
        append_zdle_encoded(&mut encoded, &u16::to_le_bytes(value));
        Self { value: value as u32, encoded }
    }

    pub fn crc32(frame_type: ZFrameType, data: [u8; 4], crc: &mut Crc32) -> Self {
        let value = crc.compute(&header_block(frame_type, data));
        let mut encoded = Vec::new();
        append_zdle_encoded(&mut encoded, &u32::to_le_bytes(value));
        Self { value, encoded }
    }
}

fn header_block(frame_type: ZFrameType, data: [u8; 4]) -> [u8; 5] {
    [frame_type.code(), data[0], data[1], data[2], data[3]]
}

#[derive(PartialEq, Clone, Debug)]
pub struct Header {
    pub frame_type: ZFrameType,
    pub data: [u8; 4],
}

impl Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.frame_type {
            ZFrameType::RPos | ZFrameType::Eof | ZFrameType::FreeCnt | ZFrameType::Data => {
                write!(f, "[Header with {:?} number = {}]", self.frame_type, self.number())
            }
            ZFrameType::Crc | ZFrameType::Challenge => write!(f, "[Header with {:?} number = x{:08X}]", self.frame_type, self.number()),
            _ => write!(
                f,
                "[Header with {:?} frame flags = x{:02X}, x{:02X}, x{:02X}, x{:02X}]",
                self.frame_type,
                self.f3(),
                self.f2(),
                self.f1(),
                self.f0()
            ),
        }
    }
}

impl Header {
    pub fn empty(frame_type: ZFrameType) -> Self {
        Self { frame_type, data: [0, 0, 0, 0] }
    }

    pub fn from_flags(frame_type: ZFrameType, f3: u8, f2: u8, f1: u8, f0: u8) -> Self {
        Self {
            frame_type,
            data: [f3, f2, f1, f0],
        }
    }

    /// Parameters are truncated to their low byte.
    pub fn from_params(frame_type: ZFrameType, p0: u32, p1: u32, p2: u32, p3: u32) -> Self {
        Self {
            frame_type,
            data: [p0 as u8, p1 as u8, p2 as u8, p3 as u8],
        }
    }

    pub fn from_number(frame_type: ZFrameType, number: u32) -> Self {
        Self {
            frame_type,
            data: pack_offset(number),
        }
    }

    pub fn f0(&self) -> u8 {
        self.data[3]
    }

    pub fn f1(&self) -> u8 {
        self.data[2]
    }

    pub fn f2(&self) -> u8 {
        self.data[1]
    }

    pub fn f3(&self) -> u8 {
        self.data[0]
    }

    pub fn number(&self) -> u32 {
        unpack_offset(self.data)
    }

    pub fn build(&self, header_type: HeaderType, crc16: &mut Crc16, crc32: &mut Crc32) -> Vec<u8> {
        match header_type {
            HeaderType::Bin => self.build_bin16(crc16),
            HeaderType::Bin32 => self.build_bin32(crc32),
            HeaderType::Hex => self.build_hex(crc16),
        }
    }

    /// `**<ZDLE>B` followed by type, parameters and CRC-16 as lower case hex digits, terminated by CR LF.
    pub fn build_hex(&self, crc16: &mut Crc16) -> Vec<u8> {
        let mut res = Vec::with_capacity(HEX_HEADER_LEN);
        res.extend_from_slice(&[ZPAD, ZPAD, ZDLE, ZHEX]);
        push_hex(&mut res, self.frame_type.code());
        for b in self.data {
            push_hex(&mut res, b);
        }
        let crc = crc16.compute(&header_block(self.frame_type, self.data));
        // big endian here, binary headers and subpackets carry their CRC-16 little endian (see DESIGN.md)
        for b in u16::to_be_bytes(crc) {
            push_hex(&mut res, b);
        }
        res.extend_from_slice(&[CR, LF]);
        res
    }

    pub fn build_bin16(&self, crc16: &mut Crc16) -> Vec<u8> {
        let mut res = vec![ZPAD, ZDLE, ZBIN];
        append_zdle_encoded(&mut res, &header_block(self.frame_type, self.data));
        res.extend_from_slice(&HeaderChecksum::crc16(self.frame_type, self.data, crc16).encoded);
        res
    }

    pub fn build_bin32(&self, crc32: &mut Crc32) -> Vec<u8> {
        let mut res = vec![ZPAD, ZDLE, ZBIN32];
        append_zdle_encoded(&mut res, &header_block(self.frame_type, self.data));
        res.extend_from_slice(&HeaderChecksum::crc32(self.frame_type, self.data, crc32).encoded);
        res
    }

    /// A ZDATA style header: same wire shape as [`Header::build_bin16`], P0..P3 hold the data offset.
    pub fn build_data16(frame_type: ZFrameType, offset: u32, crc16: &mut Crc16) -> Vec<u8> {
        Header::from_number(frame_type, offset).build_bin16(crc16)
    }

    /// A ZDATA style header: same wire shape as [`Header::build_bin32`], P0..P3 hold the data offset.
    pub fn build_data32(frame_type: ZFrameType, offset: u32, crc32: &mut Crc32) -> Vec<u8> {
        Header::from_number(frame_type, offset).build_bin32(crc32)
    }
}

fn push_hex(res: &mut Vec<u8>, b: u8) {
    res.push(get_hex(b >> 4));
    res.push(get_hex(b & 0xF));
}

fn read_hex_byte(hi: u8, lo: u8) -> Result<u8, TransmissionError> {
    Ok(from_hex(hi)? << 4 | from_hex(lo)?)
}

/// A hex header as sent back by the receiver.
#[derive(PartialEq, Clone, Debug, Default)]
pub struct ResponseHeader {
    /// `**<ZDLE>`
    pub prefix: [u8; 3],
    pub frame_indicator: u8,
    /// `None` if nothing usable was received.
    pub frame_type: Option<ZFrameType>,
    /// ZP0..ZP3
    pub data: [u8; 4],
    /// Only set for ZRPOS and ZACK.
    pub requested_offset: Option<u32>,
}

impl Display for ResponseHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.frame_type {
            Some(frame_type) => Header {
                frame_type,
                data: self.data,
            }
            .fmt(f),
            None => write!(f, "[no header]"),
        }
    }
}

impl ResponseHeader {
    /// Parses a received hex header. Buffers longer than 21 bytes are cut down to their
    /// last 21 bytes, stale input may precede the header.
    pub fn try_parse(buffer: &[u8]) -> Result<Self, TransmissionError> {
        let buffer = if buffer.len() > HEX_HEADER_LEN_XON {
            &buffer[buffer.len() - HEX_HEADER_LEN_XON..]
        } else {
            buffer
        };
        if buffer.len() < HEX_HEADER_LEN {
            return Err(TransmissionError::ResponseLength(buffer.len()));
        }

        if buffer[0] != ZPAD {
            return Err(TransmissionError::ZPADExpected(buffer[0]));
        }
        if buffer[2] != ZDLE {
            return Err(TransmissionError::ZDLEExpected(buffer[2]));
        }
        if buffer[3] != ZHEX {
            return Err(TransmissionError::UnknownFrameIndicator(buffer[3]));
        }

        let mut block = [0u8; 5];
        for (i, b) in block.iter_mut().enumerate() {
            *b = read_hex_byte(buffer[4 + 2 * i], buffer[5 + 2 * i])?;
        }
        let check_crc = u16::from_be_bytes([read_hex_byte(buffer[14], buffer[15])?, read_hex_byte(buffer[16], buffer[17])?]);
        let crc = Crc16::new().compute(&block);
        if crc != check_crc {
            return Err(TransmissionError::CRC16Mismatch(crc, check_crc));
        }

        let frame_type = ZFrameType::from_code(block[0]);
        let data = [block[1], block[2], block[3], block[4]];
        let requested_offset = match frame_type {
            ZFrameType::RPos | ZFrameType::Ack => Some(unpack_offset(data)),
            _ => None,
        };

        Ok(Self {
            prefix: [buffer[0], buffer[1], buffer[2]],
            frame_indicator: buffer[3],
            frame_type: Some(frame_type),
            data,
            requested_offset,
        })
    }

    /// Like [`ResponseHeader::try_parse`] but malformed input yields the empty header.
    pub fn parse(buffer: &[u8]) -> Self {
        match Self::try_parse(buffer) {
            Ok(header) => header,
            Err(err) => {
                log::warn!("malformed response: {err}");
                Self::default()
            }
        }
    }

    pub fn is_type(&self, frame_type: ZFrameType) -> bool {
        self.frame_type == Some(frame_type)
    }

    pub fn number(&self) -> u32 {
        unpack_offset(self.data)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        crc::{Crc16, Crc32},
        protocol::zmodem::*,
    };

    #[test]
    fn test_from_number() {
        assert_eq!(
            Header::from_number(ZFrameType::Fin, 2).build_hex(&mut Crc16::new()),
            vec![0x2a, 0x2a, 0x18, 0x42, 0x30, 0x38, 0x30, 0x32, 0x30, 0x30, 0x30, 0x30, 0x30, 0x30, 0x65, 0x66, 0x34, 0x35, 0x0d, 0x0a]
        );
    }

    #[test]
    fn test_build_by_header_type() {
        let header = Header::from_number(ZFrameType::RPos, 1024);
        let (mut crc16, mut crc32) = (Crc16::new(), Crc32::new());
        assert_eq!(header.build_hex(&mut Crc16::new()), header.build(HeaderType::Hex, &mut crc16, &mut crc32));
        assert_eq!(header.build_bin16(&mut Crc16::new()), header.build(HeaderType::Bin, &mut crc16, &mut crc32));
        assert_eq!(header.build_bin32(&mut Crc32::new()), header.build(HeaderType::Bin32, &mut crc16, &mut crc32));
        assert_eq!(ZBIN, header.build(HeaderType::Bin, &mut crc16, &mut crc32)[2]);
        assert_eq!(ZBIN32, header.build(HeaderType::Bin32, &mut crc16, &mut crc32)[2]);
    }

    #[test]
    fn test_bin32_header_data() {
        assert_eq!(
            Header::empty(ZFrameType::Data).build_bin32(&mut Crc32::new()),
            vec![ZPAD, ZDLE, ZBIN32, 0x0A, 0, 0, 0, 0, 0xBC, 0xEF, 0x92, 0x8C]
        );
        assert_eq!(
            Header::build_data32(ZFrameType::Data, 0, &mut Crc32::new()),
            Header::empty(ZFrameType::Data).build_bin32(&mut Crc32::new())
        );
    }

    #[test]
    fn test_hex_header_data() {
        assert_eq!(
            Header::empty(ZFrameType::RPos).build_hex(&mut Crc16::new()),
            vec![ZPAD, ZPAD, ZDLE, ZHEX, b'0', b'9', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'0', b'a', b'8', b'7', b'c', b'\r', b'\n']
        );

        let mut crc = Crc16::new();
        assert_eq!(
            "**\x18B00000000000000\r\n".to_string(),
            String::from_utf8(Header::from_flags(ZFrameType::RQInit, 0, 0, 0, 0).build_hex(&mut crc)).unwrap()
        );
        assert_eq!(
            "**\x18B0100000000aa51\r\n".to_string(),
            String::from_utf8(Header::from_flags(ZFrameType::RInit, 0, 0, 0, 0).build_hex(&mut crc)).unwrap()
        );
        assert_eq!(
            "**\x18B02000000004483\r\n".to_string(),
            String::from_utf8(Header::from_flags(ZFrameType::Sinit, 0, 0, 0, 0).build_hex(&mut crc)).unwrap()
        );
        assert_eq!(
            "**\x18B0300000000eed2\r\n".to_string(),
            String::from_utf8(Header::from_flags(ZFrameType::Ack, 0, 0, 0, 0).build_hex(&mut crc)).unwrap()
        );
        assert_eq!(
            "**\x18B087e0400003ec2\r\n".to_string(),
            String::from_utf8(Header::from_flags(ZFrameType::Fin, 126, 4, 0, 0).build_hex(&mut crc)).unwrap()
        );
    }

    #[test]
    fn test_hex_header_is_reproducible() {
        let mut crc = Crc16::new();
        for code in 0..20 {
            let frame_type = ZFrameType::from_code(code);
            let first = Header::from_params(frame_type, 0, 0, 0, 0).build_hex(&mut crc);
            // dirty the engine, the next build has to start over
            crc.update(b"noise");
            let second = Header::from_params(frame_type, 0, 0, 0, 0).build_hex(&mut Crc16::new());
            assert_eq!(first, second);
            assert_eq!(HEX_HEADER_LEN, first.len());
            assert_eq!(b"**\x18B", &first[0..4]);
            assert_eq!(format!("{code:02x}").as_bytes(), &first[4..6]);
            assert_eq!(b"00000000", &first[6..14]);
            assert!(first[14..18].iter().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b)));
            assert_eq!(b"\r\n", &first[18..20]);
        }
    }

    #[test]
    fn test_params_are_truncated() {
        assert_eq!(
            Header::from_params(ZFrameType::Eof, 0x1FF, 0x100, 2, 3).data,
            [0xFF, 0x00, 2, 3]
        );
    }

    #[test]
    fn test_header_checksum() {
        let crc16 = HeaderChecksum::crc16(ZFrameType::File, [0, 0, 0, 0], &mut Crc16::new());
        assert_eq!(35078, crc16.value);
        assert_eq!(vec![6, 137], crc16.encoded);

        let crc32 = HeaderChecksum::crc32(ZFrameType::File, [0, 0, 0, 0], &mut Crc32::new());
        assert_eq!(866_275_805, crc32.value);
        assert_eq!(vec![221, 81, 162, 51], crc32.encoded);
    }

    #[test]
    fn test_bin16_header() {
        assert_eq!(
            Header::empty(ZFrameType::File).build_bin16(&mut Crc16::new()),
            vec![ZPAD, ZDLE, ZBIN, 4, 0, 0, 0, 0, 6, 137]
        );
        assert_eq!(
            Header::build_data16(ZFrameType::Data, 0, &mut Crc16::new()),
            Header::empty(ZFrameType::Data).build_bin16(&mut Crc16::new())
        );
    }

    #[test]
    fn test_bin_header_escapes_params() {
        let header = Header::from_number(ZFrameType::Data, 0x11).build_bin32(&mut Crc32::new());
        assert_eq!(&[ZPAD, ZDLE, ZBIN32, 0x0A, ZDLE, 0x51, 0, 0, 0], &header[0..9]);
    }

    #[test]
    fn test_offset_packing() {
        assert_eq!([0, 0, 0, 0], pack_offset(0));
        assert_eq!([255, 0, 0, 0], pack_offset(255));
        assert_eq!([0, 4, 0, 0], pack_offset(1024));
        assert_eq!([0, 32, 0, 0], pack_offset(8192));
        assert_eq!([0, 64, 0, 0], pack_offset(16384));
        assert_eq!([0, 0, 128, 0], pack_offset(8_388_608));
        assert_eq!([0, 0, 0, 16], pack_offset(268_435_456));

        for offset in [0, 1, 255, 256, 65_535, 1 << 24, 0xDEAD_BEEF, u32::MAX] {
            assert_eq!(offset, unpack_offset(pack_offset(offset)));
        }
    }

    #[test]
    fn test_frame_type_codes() {
        for code in 0..=255u8 {
            assert_eq!(code, ZFrameType::from_code(code).code());
        }
        assert_eq!(ZFrameType::Unknown(20), ZFrameType::from_code(20));
        assert_eq!(ZFrameType::StdErr, ZFrameType::from_code(19));
    }

    fn rpos(offset: u32) -> Vec<u8> {
        let mut res = Header::from_number(ZFrameType::RPos, offset).build_hex(&mut Crc16::new());
        res.push(XON);
        res
    }

    #[test]
    fn test_parse_response() {
        let header = ResponseHeader::try_parse(&rpos(8192)).unwrap();
        assert_eq!([ZPAD, ZPAD, ZDLE], header.prefix);
        assert_eq!(ZHEX, header.frame_indicator);
        assert_eq!(Some(ZFrameType::RPos), header.frame_type);
        assert_eq!([0, 32, 0, 0], header.data);
        assert_eq!(Some(8192), header.requested_offset);

        // 20 bytes, no trailing XON
        let fin = Header::empty(ZFrameType::Fin).build_hex(&mut Crc16::new());
        let header = ResponseHeader::try_parse(&fin).unwrap();
        assert!(header.is_type(ZFrameType::Fin));
        assert_eq!(None, header.requested_offset);
    }

    #[test]
    fn test_parse_response_upper_case_hex() {
        let header = ResponseHeader::try_parse(b"**\x18B0100000000AA51\r\n").unwrap();
        assert!(header.is_type(ZFrameType::RInit));
    }

    #[test]
    fn test_parse_response_trims_stale_bytes() {
        let mut buffer = b"garbage".to_vec();
        buffer.extend_from_slice(&rpos(1024));
        let header = ResponseHeader::parse(&buffer);
        assert_eq!(Some(1024), header.requested_offset);
    }

    #[test]
    fn test_parse_response_wrong_length() {
        assert_eq!(ResponseHeader::default(), ResponseHeader::parse(&[0, 1, 2, 3, 4]));
        assert_eq!(ResponseHeader::default(), ResponseHeader::parse(&[0; 19]));
        assert_eq!(ResponseHeader::default(), ResponseHeader::parse(&[0; 22]));
        assert_eq!(ResponseHeader::default(), ResponseHeader::parse(&[]));
        assert_eq!(Err(TransmissionError::ResponseLength(19)), ResponseHeader::try_parse(&[0; 19]));

        let header = ResponseHeader::parse(&[0; 19]);
        assert_eq!(None, header.frame_type);
        assert_eq!([0, 0, 0, 0], header.data);
        assert_eq!(None, header.requested_offset);
    }

    #[test]
    fn test_parse_response_malformed() {
        let mut broken = rpos(0);
        broken[6] = b'x';
        assert_eq!(Err(TransmissionError::HexNumberExpected(b'x')), ResponseHeader::try_parse(&broken));

        let mut broken = rpos(0);
        broken[10] = b'1';
        assert!(matches!(ResponseHeader::try_parse(&broken), Err(TransmissionError::CRC16Mismatch(_, _))));

        let mut broken = rpos(0);
        broken[3] = ZBIN32;
        assert_eq!(Err(TransmissionError::UnknownFrameIndicator(ZBIN32)), ResponseHeader::try_parse(&broken));
    }
}
