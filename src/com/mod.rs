#[cfg(test)]
pub mod test_com;

pub mod modem;
pub use modem::*;

use crate::TransferResult;

/// Duplex byte channel the sender talks through.
pub trait Com {
    fn get_name(&self) -> &'static str;

    fn open(&mut self) -> TransferResult<()>;
    fn close(&mut self) -> TransferResult<()>;
    fn is_open(&self) -> bool;

    /// Drops everything received but not read yet.
    fn discard_input_buffer(&mut self) -> TransferResult<()>;
    /// Drops everything written but not transmitted yet.
    fn discard_output_buffer(&mut self) -> TransferResult<()>;

    fn write(&mut self, buf: &[u8]) -> TransferResult<usize>;

    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> TransferResult<usize>;
    /// Reads up to `buf.len()` bytes, returns the number of bytes read.
    fn read(&mut self, buf: &mut [u8]) -> TransferResult<usize>;
}
