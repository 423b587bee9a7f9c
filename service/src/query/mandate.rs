//! [`Query`] collection related to a single [`Mandate`].

use common::operations::By;

use crate::{
    domain::{mandate, realty, Mandate},
    read,
};
#[cfg(doc)]
use crate::Query;

use super::DatabaseQuery;

/// Queries a [`Mandate`] by its [`mandate::Id`].
pub type ById = DatabaseQuery<By<Option<Mandate>, mandate::Id>>;

/// Queries the open [`Mandate`] upon a [`Realty`] by the latter's
/// [`realty::Id`].
///
/// [`Realty`]: crate::domain::Realty
pub type OpenByRealty =
    DatabaseQuery<By<Option<read::mandate::Open<Mandate>>, realty::Id>>;
