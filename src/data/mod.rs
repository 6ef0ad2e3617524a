pub mod modem;
pub use modem::*;

pub mod options;
pub use options::*;
