mod rng;
pub use rng::*;
