//! Read entities definitions.

pub mod mandate;
pub mod user;
