//! [`Realty`] definitions.

use std::sync::LazyLock;

#[cfg(doc)]
use common::DateTime;
use common::{unit, DateTimeOf};
use derive_more::{AsRef, Display, From, FromStr, Into};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user;
#[cfg(doc)]
use crate::domain::{Mandate, User};

/// Realty listed for sale.
///
/// The listings catalog itself lives outside this service; only the fields
/// the [`Mandate`] workflow reads are modeled here.
#[derive(Clone, Debug)]
pub struct Realty {
    /// ID of this [`Realty`].
    pub id: Id,

    /// Human-readable [`Title`] of this [`Realty`].
    pub title: Title,

    /// ID of the [`User`] owning this [`Realty`].
    pub owner_id: user::Id,

    /// [`DateTime`] when this [`Realty`] was created.
    pub created_at: CreationDateTime,
}

/// [`DateTime`] when a [`Realty`] was created.
pub type CreationDateTime = DateTimeOf<(Realty, unit::Creation)>;

/// ID of a [`Realty`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    FromStr,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random [`Id`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Human-readable title of a [`Realty`] listing.
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
pub struct Title(String);

impl Title {
    /// Creates a new [`Title`] if the given `title` is valid.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Option<Self> {
        let title = title.into();
        Self::check(&title).then_some(Self(title))
    }

    /// Checks whether the given `title` is a valid [`Title`].
    fn check(title: impl AsRef<str>) -> bool {
        /// Regular expression checking [`Title`] format.
        static REGEX: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^\S(.{0,510}\S)?$").expect("valid regex")
        });

        REGEX.is_match(title.as_ref())
    }
}

impl FromStr for Title {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Title`")
    }
}
