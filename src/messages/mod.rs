// Helper functions for the handful of protocol messages the core builds itself.
// Everything else on the wire belongs to the codec and the sub-processors.

// Declare submodules
pub mod constants;
pub mod error;
pub mod protocol;

// Re-export public items
pub use error::MysqlError;
pub use protocol::{frame_packet, ok_packet};

// Re-export protocol constants
pub use constants::*;
