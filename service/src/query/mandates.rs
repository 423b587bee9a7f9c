//! [`Query`] collection related to multiple [`Mandate`]s.

use common::operations::By;

use crate::domain::{user, Mandate};
#[cfg(doc)]
use crate::Query;

use super::DatabaseQuery;

/// Queries all the [`Mandate`]s the [`User`] with the provided [`user::Id`]
/// participates in, newest first.
///
/// [`User`]: crate::domain::User
pub type ByParticipant = DatabaseQuery<By<Vec<Mandate>, user::Id>>;
