#![allow(dead_code)]

//
// Constants taken from:
//
//   Z M O D E M . H     Manifest constants for ZMODEM
//    application to application file transfer protocol
//    Copyright 1991 Omen Technology Inc All Rights Reserved
//    04-17-89  Chuck Forsberg Omen Technology Inc
//
// See https://www.rpi.edu/dept/acm/packages/zmodem/3.17/sun4c_41/src/

pub const ZPAD: u8 = b'*'; // 052 Padding character begins frames
pub const ZDLE: u8 = 0x18; // Ctrl-X Zmodem escape - `ala BISYNC DLE
pub const ZDLEE: u8 = ZDLE ^ 0x40; // Escaped ZDLE as transmitted
pub const ZBIN: u8 = b'A'; // Binary frame indicator (CRC-16)
pub const ZHEX: u8 = b'B'; // HEX frame indicator
pub const ZBIN32: u8 = b'C'; // Binary frame with 32 bit FCS
pub const ZMAXSPLEN: usize = 1024; // Max subpacket length  NEVER CHANGE

pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';
pub const RI: u8 = CR | 0x80;
pub const DLE: u8 = 0x10;
pub const DLE_0X80: u8 = DLE | 0x80;
pub const XON: u8 = 0x11;
pub const XOFF: u8 = 0x13;
pub const XON_0X80: u8 = XON | 0x80;
pub const XOFF_0X80: u8 = XOFF | 0x80;

/// Bytes that never leave the sender unescaped.
pub const ESCAPED_BYTES: [u8; 7] = [ZDLE, XON, XOFF, XON_0X80, XOFF_0X80, DLE, DLE_0X80];

/// Escaped unconditionally, guards against the Telenet CR-@-CR command escape.
pub const ESCAPED_EOL_BYTES: [u8; 2] = [CR, RI];

/// Session terminator ("over and out"), sent after the final ZFIN.
pub const OVER_AND_OUT: &[u8; 2] = b"OO";

pub const ABORT_SEQ: [u8; 18] = [
    0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, /* 8 CAN */
    0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, /* 10 BS */
];

/// Length of a hex header as received: `**<ZDLE>B` + 14 hex digits + CR LF.
pub const HEX_HEADER_LEN: usize = 20;
/// Hex header followed by the XON most receivers append.
pub const HEX_HEADER_LEN_XON: usize = 21;

/* ZDLE sequences */
/// CRC next, frame ends, header packet follows
pub const ZCRCE: u8 = b'h';
/// CRC next, frame continues nonstop
pub const ZCRCG: u8 = b'i';
/// CRC next, frame continues, ZACK expected
pub const ZCRCQ: u8 = b'j';
/// CRC next, ZACK expected, end of frame
pub const ZCRCW: u8 = b'k';

pub mod zfile_flag {
    /* Conversion options, one of these in ZF0 */
    pub const ZCBIN: u8 = 1; /* Binary transfer - inhibit conversion */
    pub const ZCNL: u8 = 2; /* Convert NL to local end of line convention */
    pub const ZCRESUM: u8 = 3; /* Resume interrupted file transfer */

    /* Management options, one of these ored in ZF1 */
    pub const ZMNEWL: u8 = 1; /* Transfer if source newer or longer */
    pub const ZMCRC: u8 = 2; /* Transfer if different file CRC or length */
    pub const ZMAPND: u8 = 3; /* Append contents to existing file (if any) */
    pub const ZMCLOB: u8 = 4; /* Replace existing file */
    pub const ZMNEW: u8 = 5; /* Transfer if source newer */

    /* Transport options, one of these in ZF2 */
    pub const ZTNONE: u8 = 0;

    /* Extended options for ZF3, bit encoded */
    pub const ZXNONE: u8 = 0;
}

pub mod zrinit_flag {
    // Bit Masks for ZRINIT flags byte ZF0
    pub const CANFDX: u8 = 0x01; // Rx can send and receive true full duplex
    pub const CANOVIO: u8 = 0x02; // Rx can receive data during disk I/O
    pub const CANBRK: u8 = 0x04; // Rx can send a break signal
    pub const CANCRY: u8 = 0x08; // Receiver can decode RLE
    pub const CANLZW: u8 = 0x10; // Receiver can uncompress
    pub const CANFC32: u8 = 0x20; // Receiver can use 32 bit Frame Check
    pub const ESCCTL: u8 = 0x40; // Receiver expects ctl chars to be escaped
    pub const ESC8: u8 = 0x80; // Receiver expects 8th bit to be escaped
}
