//! [`Mandate`]-related read definitions.
//!
//! [`Mandate`]: crate::domain::Mandate

use crate::domain::mandate;

/// Wrapper around a [`Mandate`] indicating that it's open: either
/// [`Pending`] or [`Active`], and so standing in the way of concluding
/// another [`Mandate`] upon the same [`Realty`].
///
/// [`Active`]: mandate::Status::Active
/// [`Mandate`]: crate::domain::Mandate
/// [`Pending`]: mandate::Status::Pending
/// [`Realty`]: crate::domain::Realty
#[derive(Clone, Copy, Debug)]
pub struct Open<T>(pub T);

/// Selector of [`Pending`] [`Mandate`]s whose acceptance window has closed
/// by the wrapped moment.
///
/// [`Mandate`]: crate::domain::Mandate
/// [`Pending`]: mandate::Status::Pending
#[derive(Clone, Copy, Debug)]
pub struct AcceptanceOverdue(pub mandate::AcceptanceDateTime);

/// Selector of [`Active`] [`Mandate`]s whose end date has been reached by
/// the wrapped day.
///
/// [`Active`]: mandate::Status::Active
/// [`Mandate`]: crate::domain::Mandate
#[derive(Clone, Copy, Debug)]
pub struct ValidityOverdue(pub mandate::EndDate);

/// Selector of [`Active`] [`Mandate`]s ending on or before the wrapped day
/// and not warned about it yet.
///
/// [`Active`]: mandate::Status::Active
/// [`Mandate`]: crate::domain::Mandate
#[derive(Clone, Copy, Debug)]
pub struct NearExpiry(pub mandate::EndDate);
