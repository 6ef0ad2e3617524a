pub mod com;
pub mod crc;
pub mod data;
pub mod protocol;
pub mod util;

pub use data::{Modem, TransferOptions};
pub use protocol::{FileDescriptor, Zmodem};

pub type TransferResult<T> = anyhow::Result<T>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
