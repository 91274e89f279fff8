//! Coordinator JSON-RPC plumbing: authentication, client options, and the
//! `CoordinatorClient` seam the intake loop talks through.

pub mod auth;
pub mod client;
pub mod options;

pub use client::{AsyncRpcClient, CoordinatorClient, RpcError};
pub use options::RpcClientOptions;
