//! [`Notification`] definitions.

use common::{unit, DateTime, DateTimeOf};
use derive_more::{AsRef, Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{mandate, user};
#[cfg(doc)]
use crate::domain::{Mandate, User};

/// In-app message addressed to a [`User`], persisted for later reading.
#[derive(Clone, Debug)]
pub struct Notification {
    /// ID of this [`Notification`].
    pub id: Id,

    /// ID of the [`User`] this [`Notification`] is addressed to.
    pub recipient_id: user::Id,

    /// [`Title`] of this [`Notification`].
    pub title: Title,

    /// [`Message`] body of this [`Notification`].
    pub message: Message,

    /// [`ActionUrl`] this [`Notification`] points its recipient at, if any.
    pub action_url: Option<ActionUrl>,

    /// Whether the recipient has read this [`Notification`].
    pub is_read: bool,

    /// [`DateTime`] when this [`Notification`] was created.
    pub created_at: CreationDateTime,
}

/// [`DateTime`] when a [`Notification`] was created.
pub type CreationDateTime = DateTimeOf<(Notification, unit::Creation)>;

/// ID of a [`Notification`].
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

/// Title of a [`Notification`].
#[derive(AsRef, Clone, Debug, Display, Eq, From, PartialEq)]
#[as_ref(str, String)]
#[from(&str, String)]
pub struct Title(String);

/// Body of a [`Notification`].
#[derive(AsRef, Clone, Debug, Display, Eq, From, PartialEq)]
#[as_ref(str, String)]
#[from(&str, String)]
pub struct Message(String);

/// Relative link a [`Notification`] points its recipient at.
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
pub struct ActionUrl(String);

impl ActionUrl {
    /// Builds the [`ActionUrl`] of the given [`Mandate`]'s page.
    #[must_use]
    pub fn mandate(id: mandate::Id) -> Self {
        Self(format!("/mandates/{id}"))
    }

    /// Builds the [`ActionUrl`] of the given [`Mandate`]'s administration
    /// page.
    #[must_use]
    pub fn admin_mandate(id: mandate::Id) -> Self {
        Self(format!("/admin/mandates/{id}"))
    }
}

/// Pending [`Notification`] owed by a [`Mandate`] transition.
///
/// Carries everything except the concrete recipients, which are resolved at
/// dispatch once the transition itself is durable.
#[derive(Clone, Debug)]
pub struct Intent {
    /// [`Audience`] to deliver to.
    pub to: Audience,

    /// [`Title`] of the pending [`Notification`].
    pub title: Title,

    /// [`Message`] body of the pending [`Notification`].
    pub message: Message,

    /// [`ActionUrl`] of the pending [`Notification`], if any.
    pub action_url: Option<ActionUrl>,
}

impl Intent {
    /// Materializes this [`Intent`] into a [`Notification`] record addressed
    /// to the given recipient.
    #[must_use]
    pub fn into_notification(
        self,
        recipient_id: user::Id,
        now: DateTime,
    ) -> Notification {
        Notification {
            id: Id::new(),
            recipient_id,
            title: self.title,
            message: self.message,
            action_url: self.action_url,
            is_read: false,
            created_at: now.coerce(),
        }
    }
}

/// Addressee set of an [`Intent`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Audience {
    /// Single [`User`].
    User(user::Id),

    /// Every [`User`] administering the platform.
    PlatformAdmins,
}
