//! [`Database`]-related implementations.

#[cfg(feature = "inmem")]
pub mod inmem;

use derive_more::{Display, Error as StdError, From};

#[cfg(feature = "inmem")]
pub use self::inmem::InMemory;

/// Database operation.
pub use common::Handler as Database;

/// [`Database`] error.
#[derive(Clone, Copy, Debug, Display, From, StdError)]
pub enum Error {
    #[cfg(feature = "inmem")]
    /// [`InMemory`] error.
    InMemory(inmem::Error),
}
