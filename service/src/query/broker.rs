//! [`Query`] collection related to a single broker.

use common::operations::By;

use crate::{domain::user, read::user::ActiveBroker};
#[cfg(doc)]
use crate::Query;

use super::DatabaseQuery;

/// Queries an [`ActiveBroker`] by their [`user::Phone`] number.
pub type ByPhone = DatabaseQuery<By<Option<ActiveBroker>, user::Phone>>;
