use std::ops::{Bound, RangeBounds};

use web_time::{SystemTime, UNIX_EPOCH};

pub struct Rng {
    state: i32,
}

impl Rng {
    pub fn from_seed(seed: i32) -> Self {
        // 0 is a fixed point of the generator
        Self { state: seed.max(1) }
    }

    // Lehmer random number generator
    pub fn next(&mut self) -> i32 {
        self.state = ((self.state as u64).wrapping_mul(48271) % 0x7fff_ffff) as i32;
        self.state
    }

    pub fn gen_range<R: RangeBounds<u8>>(&mut self, arg: R) -> u32 {
        let bounds = (arg.start_bound(), arg.end_bound());
        let res = match bounds {
            (Bound::Included(a), Bound::Included(b)) => (*a as usize) + (self.next() as usize) % (*b as usize + 1 - *a as usize),
            (Bound::Included(a), Bound::Excluded(b)) => (*a as usize) + (self.next() as usize) % (*b as usize - *a as usize),
            _ => (self.next() as usize) % 256,
        };

        res as u32
    }

    /// Name in the style of a system temp file, `tmpXXXX.tmp` with upper case hex digits.
    pub fn temp_file_name(&mut self) -> String {
        let mut name = String::from("tmp");
        for _ in 0..4 {
            let digit = self.gen_range(0..16);
            name.push(char::from_digit(digit, 16).unwrap_or('0').to_ascii_uppercase());
        }
        name.push_str(".tmp");
        name
    }
}

impl Default for Rng {
    fn default() -> Self {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or(1);
        Self::from_seed((nanos & 0x7fff_ffff) as i32)
    }
}
