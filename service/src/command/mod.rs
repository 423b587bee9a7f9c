//! [`Command`] definition.

pub mod cancel_mandate;
pub mod create_mandate;
pub mod reject_mandate;
pub mod renew_mandate;
pub mod sign_mandate;

/// [`Command`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Command;

pub use self::{
    cancel_mandate::CancelMandate, create_mandate::CreateMandate,
    reject_mandate::RejectMandate, renew_mandate::RenewMandate,
    sign_mandate::SignMandate,
};
