//! Caller side: the RPC caller and terminal formatting of its results.

pub mod format;
mod rpc;

pub use rpc::{exchange, RpcCaller};
