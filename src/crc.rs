//! Table driven CRC-16/XMODEM and CRC-32 (the reflected PKZIP variant) used to
//! check every ZMODEM frame.
//!
//! Both engines are streaming: call [`Crc16::update`] / [`Crc32::update`] as often as
//! needed and [`Crc16::finalize`] / [`Crc32::finalize`] once. `finalize` doesn't consume
//! the accumulator, call `reset` before starting the next frame.

const CRC16_POLYNOMIAL: u16 = 0x1021;
const CRC32_POLYNOMIAL: u32 = 0x04C1_1DB7;
const CRC32_INIT: u32 = 0xFFFF_FFFF;
const CRC32_FINAL_XOR: u32 = 0xFFFF_FFFF;

const fn crc16_table(polynomial: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut t = 0;
    while t < 256 {
        let mut val = 0u16;
        let mut mask = 0x80u8;
        while mask != 0 {
            if t as u8 & mask != 0 {
                val ^= 0x8000;
            }
            if val & 0x8000 != 0 {
                val = (val << 1) ^ polynomial;
            } else {
                val <<= 1;
            }
            mask >>= 1;
        }
        table[t] = val;
        t += 1;
    }
    table
}

// Same bit simulation as CRC16 but every entry is mirrored, this yields the
// reflected (LSB first) table.
const fn crc32_table(polynomial: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut t = 0;
    while t < 256 {
        let mut val = 0u32;
        let mut mask = 0x80u8;
        while mask != 0 {
            if t as u8 & mask != 0 {
                val ^= 0x8000_0000;
            }
            if val & 0x8000_0000 != 0 {
                val = (val << 1) ^ polynomial;
            } else {
                val <<= 1;
            }
            mask >>= 1;
        }
        table[(t as u8).reverse_bits() as usize] = val.reverse_bits();
        t += 1;
    }
    table
}

static CRC16_TABLE: [u16; 256] = crc16_table(CRC16_POLYNOMIAL);
static CRC32_TABLE: [u32; 256] = crc32_table(CRC32_POLYNOMIAL);

#[derive(Debug, Clone)]
pub struct Crc16 {
    value: u16,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    pub fn new() -> Self {
        Self { value: 0 }
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }

    pub fn update(&mut self, data: &[u8]) {
        for b in data {
            self.value = update_crc16(self.value, *b);
        }
    }

    pub fn finalize(&self) -> u16 {
        self.value
    }

    /// Resets the engine and returns the checksum of `data`.
    pub fn compute(&mut self, data: &[u8]) -> u16 {
        self.reset();
        self.update(data);
        self.finalize()
    }
}

#[derive(Debug, Clone)]
pub struct Crc32 {
    value: u32,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    pub fn new() -> Self {
        Self { value: CRC32_INIT }
    }

    pub fn reset(&mut self) {
        self.value = CRC32_INIT;
    }

    pub fn update(&mut self, data: &[u8]) {
        for b in data {
            self.value = update_crc32(self.value, *b);
        }
    }

    pub fn finalize(&self) -> u32 {
        self.value ^ CRC32_FINAL_XOR
    }

    /// Resets the engine and returns the checksum of `data`.
    pub fn compute(&mut self, data: &[u8]) -> u32 {
        self.reset();
        self.update(data);
        self.finalize()
    }
}

pub fn update_crc16(crc: u16, b: u8) -> u16 {
    let index = ((crc >> 8) as u8 ^ b) as usize;
    (crc << 8) ^ CRC16_TABLE[index]
}

pub fn update_crc32(crc: u32, b: u8) -> u32 {
    let index = ((crc ^ b as u32) & 0xFF) as usize;
    (crc >> 8) ^ CRC32_TABLE[index]
}

pub fn get_crc16(data: &[u8]) -> u16 {
    Crc16::new().compute(data)
}

pub fn get_crc32(data: &[u8]) -> u32 {
    Crc32::new().compute(data)
}
