//! In-memory key/value store with an ASCII line protocol, executed under
//! scee's dual-execution checking.
//!
//! The store is the engine's worked example of a versioned data structure:
//! every shared read follows a versioned pointer, every update publishes an
//! immutable new version, and every request runs twice: once to answer the
//! client, once to cross-check the answer on the paired validator.

pub mod map;
pub mod ops;
pub mod proto;
pub mod server;
pub mod types;

pub use map::KvStore;
pub use server::{serve, Server};
pub use types::{Key, Lookup, RetCode, Val, KEY_LEN, VAL_LEN};
