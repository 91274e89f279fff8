//! Object transfer between the local staging root and the coordinator's object
//! store: directory layout, the `ObjectTransfer` seam, and its HTTP client.

pub mod client;
pub mod layout;

pub use client::{HttpObjectTransfer, ObjectTransfer, TransferError};
pub use layout::{SectorCategory, StorageLayout};
