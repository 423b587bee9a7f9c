//! [`Query`] collection related to multiple [`Notification`]s.

use common::operations::By;

use crate::domain::{user, Notification};
#[cfg(doc)]
use crate::Query;

use super::DatabaseQuery;

/// Queries all the [`Notification`]s addressed to the [`User`] with the
/// provided [`user::Id`], newest first.
///
/// [`User`]: crate::domain::User
pub type ByRecipient = DatabaseQuery<By<Vec<Notification>, user::Id>>;
