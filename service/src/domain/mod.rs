//! Domain definitions.

pub mod mandate;
pub mod notification;
pub mod realty;
pub mod user;

pub use self::{
    mandate::Mandate, notification::Notification, realty::Realty, user::User,
};
