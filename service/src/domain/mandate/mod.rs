//! [`Mandate`] definitions.

pub mod lifecycle;

#[cfg(doc)]
use common::{Date, DateTime};
use common::{define_kind, unit, DateOf, DateTimeOf, Money, Percent};
use derive_more::{AsRef, Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{realty, user};
#[cfg(doc)]
use crate::domain::{Realty, User};

pub use self::lifecycle::{Role, TransitionError, Windows};

/// Listing agreement between a seller and a broker (or the platform itself)
/// governing the sale of a [`Realty`].
#[derive(Clone, Debug)]
pub struct Mandate {
    /// ID of this [`Mandate`].
    pub id: Id,

    /// ID of the [`Realty`] this [`Mandate`] is concluded about.
    pub realty_id: realty::Id,

    /// ID of the [`User`] selling the [`Realty`].
    pub seller_id: user::Id,

    /// ID of the [`User`] brokering the deal.
    ///
    /// [`None`] on a [`DealType::WithPlatform`] deal, where the platform
    /// itself acts as the broker.
    pub broker_id: Option<user::Id>,

    /// [`Party`] having initiated this [`Mandate`].
    pub initiated_by: Party,

    /// [`DealType`] of this [`Mandate`].
    pub deal_type: DealType,

    /// Current [`Status`] of this [`Mandate`].
    pub status: Status,

    /// Whether this [`Mandate`] grants its broker exclusivity over the
    /// [`Realty`].
    pub is_exclusive: bool,

    /// Remuneration [`Terms`] of this [`Mandate`].
    pub terms: Terms,

    /// [`Signature`] of the seller, once provided.
    pub seller_signature: Option<Signature>,

    /// [`Signature`] of the broker (or of the platform on the broker's
    /// behalf), once provided.
    pub broker_signature: Option<Signature>,

    /// [`DateTime`] when the acceptance window of this [`Mandate`] closes.
    ///
    /// A [`Status::Pending`] [`Mandate`] not signed by this moment expires.
    pub acceptance_expires_at: AcceptanceDateTime,

    /// First [`Date`] this [`Mandate`] is in force, set on activation.
    pub start_date: Option<StartDate>,

    /// Last [`Date`] this [`Mandate`] is in force.
    ///
    /// Set on activation, and overwritten with the termination day whenever
    /// this [`Mandate`] is cancelled by one of its parties.
    pub end_date: Option<EndDate>,

    /// Whether the near-expiry warning has been sent for this [`Mandate`]
    /// already.
    ///
    /// Flips to `true` at most once and never reverts.
    pub is_near_expiry_notified: bool,

    /// Reason the counter-party provided when rejecting this [`Mandate`].
    pub rejection_reason: Option<RejectionReason>,

    /// ID of the [`Mandate`] this one was renewed from, if any.
    ///
    /// Audit trail only: linked [`Mandate`]s never affect each other's
    /// lifecycle.
    pub renewed_from: Option<Id>,

    /// [`DateTime`] when this [`Mandate`] was created.
    pub created_at: CreationDateTime,
}

impl Mandate {
    /// Indicates whether the given [`User`] takes part in this [`Mandate`]
    /// as its seller or its broker.
    #[must_use]
    pub fn has_participant(&self, user_id: user::Id) -> bool {
        self.seller_id == user_id || self.broker_id == Some(user_id)
    }
}

/// [`DateTime`] when a [`Mandate`] was created.
pub type CreationDateTime = DateTimeOf<(Mandate, unit::Creation)>;

/// Acceptance of a [`Mandate`] by its counter-party.
#[derive(Clone, Copy, Debug)]
pub struct Acceptance;

/// [`DateTime`] when the acceptance window of a [`Mandate`] closes.
pub type AcceptanceDateTime = DateTimeOf<(Mandate, Acceptance)>;

/// Coming of a [`Mandate`] into force.
#[derive(Clone, Copy, Debug)]
pub struct Commencement;

/// First [`Date`] a [`Mandate`] is in force.
pub type StartDate = DateOf<(Mandate, Commencement)>;

/// Going of a [`Mandate`] out of force.
#[derive(Clone, Copy, Debug)]
pub struct Expiry;

/// Last [`Date`] a [`Mandate`] is in force.
pub type EndDate = DateOf<(Mandate, Expiry)>;

/// ID of a [`Mandate`].
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

define_kind! {
    #[doc = "Status of a [`Mandate`]."]
    enum Status {
        #[doc = "The [`Mandate`] awaits the counter-party's signature."]
        Pending = 1,

        #[doc = "The [`Mandate`] is in force."]
        Active = 2,

        #[doc = "The [`Mandate`] ran out its acceptance or validity \
                 window."]
        Expired = 3,

        #[doc = "The [`Mandate`] was rejected by its counter-party."]
        Rejected = 4,

        #[doc = "The [`Mandate`] was cancelled by one of its parties."]
        TerminatedByUser = 5,
    }
}

impl Status {
    /// Indicates whether this [`Status`] is a sink, meaning that no further
    /// transition out of it is permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        match self {
            Self::Expired | Self::Rejected | Self::TerminatedByUser => true,
            Self::Pending | Self::Active => false,
        }
    }
}

define_kind! {
    #[doc = "Side of a [`Mandate`] deal."]
    enum Party {
        #[doc = "The [`User`] selling the [`Realty`]."]
        Seller = 1,

        #[doc = "The [`User`] brokering the deal."]
        Broker = 2,
    }
}

define_kind! {
    #[doc = "Kind of a [`Mandate`] deal."]
    enum DealType {
        #[doc = "Deal concluded directly between a seller and a broker."]
        Direct = 1,

        #[doc = "Deal mediated by the platform itself."]
        WithPlatform = 2,
    }
}

/// Remuneration terms of a [`Mandate`].
///
/// Copied verbatim into the successor whenever a [`Mandate`] is renewed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Terms {
    /// Commission rate the broker earns upon a successful sale.
    pub commission_rate: Option<Percent>,

    /// Fixed remuneration [`Money`] amount, complementing or replacing the
    /// commission.
    pub fixed_amount: Option<Money>,
}

/// Reference to the uploaded artifact backing a [`Mandate`] party's consent.
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
pub struct Signature(String);

impl Signature {
    /// Creates a new [`Signature`] if the given `reference` is valid.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Option<Self> {
        let reference = reference.into();
        Self::check(&reference).then_some(Self(reference))
    }

    /// Checks whether the given `reference` is a valid [`Signature`].
    fn check(reference: impl AsRef<str>) -> bool {
        let reference = reference.as_ref();
        reference.trim() == reference
            && !reference.is_empty()
            && reference.len() <= 512
    }
}

impl FromStr for Signature {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Signature`")
    }
}

/// Reason provided by a counter-party rejecting a [`Mandate`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
pub struct RejectionReason(String);

impl RejectionReason {
    /// Creates a new [`RejectionReason`] if the given `reason` is valid.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Option<Self> {
        let reason = reason.into();
        Self::check(&reason).then_some(Self(reason))
    }

    /// Checks whether the given `reason` is a valid [`RejectionReason`].
    fn check(reason: impl AsRef<str>) -> bool {
        let reason = reason.as_ref();
        reason.trim() == reason && !reason.is_empty() && reason.len() <= 512
    }
}

impl Default for RejectionReason {
    fn default() -> Self {
        Self("No reason provided".into())
    }
}

impl FromStr for RejectionReason {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `RejectionReason`")
    }
}
