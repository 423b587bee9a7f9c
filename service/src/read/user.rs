//! [`User`] read model definition.
//!
//! [`User`]: crate::domain::User

use crate::domain::User;

/// Wrapper around a [`User`] indicating a broker account currently
/// accepting [`Mandate`]s.
///
/// [`Mandate`]: crate::domain::Mandate
#[derive(Clone, Debug)]
pub struct ActiveBroker(pub User);

/// Wrapper around a [`User`] indicating a platform administrator.
#[derive(Clone, Debug)]
pub struct Admin(pub User);
