//! Seam to the external sealing capability plus the sector naming convention
//! shared by every component that touches staged objects.

pub mod command;
pub mod invoker;

pub use command::CommandSealer;
pub use invoker::{SealerParams, SealingInvoker, SectorNaming};
