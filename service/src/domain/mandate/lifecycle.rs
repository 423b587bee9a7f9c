//! [`Mandate`] lifecycle state machine.
//!
//! Pure transition logic: given a [`Mandate`], the acting [`Role`] and an
//! explicit moment in time, each function decides whether the transition is
//! legal, computes the resulting [`Mandate`] state, and emits the
//! [`Intent`]s the transition owes. Nothing here reads the wall clock or
//! touches storage, so every decision is reproducible in tests.

use std::time::Duration;

use common::{Date, DateTime};
use derive_more::{Display, Error};
use smart_default::SmartDefault;

use crate::domain::{
    notification::{ActionUrl, Audience, Intent},
    user, Realty, User,
};

use super::{
    AcceptanceDateTime, DealType, EndDate, Id, Mandate, Party,
    RejectionReason, Signature, StartDate, Status, Terms,
};

/// Time windows driving [`Mandate`] lifecycle decisions.
#[derive(Clone, Copy, Debug, SmartDefault)]
pub struct Windows {
    /// Period after creation within which the counter-party may sign a
    /// [`Mandate`] before it expires.
    #[default(Duration::from_secs(7 * 24 * 60 * 60))]
    pub acceptance: Duration,

    /// Period after activation during which a [`Mandate`] stays in force.
    #[default(Duration::from_secs(90 * 24 * 60 * 60))]
    pub validity: Duration,

    /// Period before the end date within which the one-shot near-expiry
    /// warning is due.
    #[default(Duration::from_secs(7 * 24 * 60 * 60))]
    pub near_expiry: Duration,
}

/// Relation of a [`User`] to a [`Mandate`], resolved once per operation and
/// branched on afterwards.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// The [`User`] is the seller on the [`Mandate`].
    Seller,

    /// The [`User`] is the broker on the [`Mandate`].
    Broker,

    /// The [`User`] administers the platform and acts on its behalf.
    Staff,
}

impl Mandate {
    /// Resolves the [`Role`] the given [`User`] plays on this [`Mandate`].
    ///
    /// [`None`] is returned for a [`User`] having no relation to it.
    #[must_use]
    pub fn role_of(&self, user: &User) -> Option<Role> {
        if user.id == self.seller_id {
            Some(Role::Seller)
        } else if Some(user.id) == self.broker_id {
            Some(Role::Broker)
        } else if user.is_staff {
            Some(Role::Staff)
        } else {
            None
        }
    }
}

/// Reason of a [`Mandate`] transition being refused.
#[derive(Clone, Copy, Debug, Display, Eq, Error, PartialEq)]
pub enum TransitionError {
    /// Acting party's signature slot is filled already.
    #[display("`{_0}` side has signed this `Mandate` already")]
    AlreadySigned(#[error(not(source))] Party),

    /// Direct deal initiated by a seller lacks a broker.
    #[display("direct deal requires a broker")]
    BrokerRequired,

    /// Acting [`User`] has no standing on the [`Mandate`], or their [`Role`]
    /// doesn't permit the transition.
    #[display("actor has no standing on this `Mandate`")]
    Forbidden,

    /// Transition was attempted from a [`Status`] not permitting it.
    #[display("`Mandate` in status `{_0}` doesn't permit this transition")]
    InvalidState(#[error(not(source))] Status),

    /// [`User`] supposed to broker the deal is not an active broker.
    #[display("`User(id: {_0})` is not an active broker")]
    NotBroker(#[error(not(source))] user::Id),
}

/// Request to initiate a new [`Mandate`], as accepted by [`initiate()`].
#[derive(Clone, Debug)]
pub struct Initiate<'a> {
    /// [`Realty`] the new [`Mandate`] is concluded about.
    pub realty: &'a Realty,

    /// [`User`] initiating the [`Mandate`].
    pub initiator: &'a User,

    /// [`Party`] the initiator takes on the deal.
    pub initiated_by: Party,

    /// [`DealType`] of the new [`Mandate`].
    pub deal_type: DealType,

    /// Hired broker, required for a [`DealType::Direct`] deal initiated by
    /// the seller and ignored otherwise.
    pub broker: Option<&'a User>,

    /// Whether the new [`Mandate`] grants its broker exclusivity.
    pub is_exclusive: bool,

    /// Remuneration [`Terms`] of the new [`Mandate`].
    pub terms: Terms,

    /// [`Signature`] of the initiator, recorded into their own slot right
    /// away, if provided.
    pub signature: Option<Signature>,
}

/// Decides the `initiate` transition: builds a new [`Status::Pending`]
/// [`Mandate`] out of the provided request, along with the [`Intent`]s
/// announcing it to the counter-party (or to platform administrators, for a
/// [`DealType::WithPlatform`] deal).
///
/// # Errors
///
/// - [`TransitionError::BrokerRequired`] if a [`DealType::Direct`] deal is
///   initiated by the seller without naming a broker.
/// - [`TransitionError::Forbidden`] if a seller-initiated deal comes from a
///   [`User`] not owning the [`Realty`].
/// - [`TransitionError::NotBroker`] if the [`User`] supposed to broker the
///   deal is not an active broker.
pub fn initiate(
    req: Initiate<'_>,
    now: DateTime,
    windows: &Windows,
) -> Result<(Mandate, Vec<Intent>), TransitionError> {
    use TransitionError as E;

    let Initiate {
        realty,
        initiator,
        initiated_by,
        deal_type,
        broker,
        is_exclusive,
        terms,
        signature,
    } = req;

    let (seller_id, broker_id) = match initiated_by {
        Party::Broker => {
            if !initiator.is_active_broker {
                return Err(E::NotBroker(initiator.id));
            }
            (realty.owner_id, Some(initiator.id))
        }
        Party::Seller => {
            if initiator.id != realty.owner_id {
                return Err(E::Forbidden);
            }
            match deal_type {
                // The platform itself takes the broker side.
                DealType::WithPlatform => (initiator.id, None),
                DealType::Direct => {
                    let broker = broker.ok_or(E::BrokerRequired)?;
                    if !broker.is_active_broker {
                        return Err(E::NotBroker(broker.id));
                    }
                    (initiator.id, Some(broker.id))
                }
            }
        }
    };

    let (seller_signature, broker_signature) = match initiated_by {
        Party::Seller => (signature, None),
        Party::Broker => (None, signature),
    };

    let mandate = Mandate {
        id: Id::new(),
        realty_id: realty.id,
        seller_id,
        broker_id,
        initiated_by,
        deal_type,
        status: Status::Pending,
        is_exclusive,
        terms,
        seller_signature,
        broker_signature,
        acceptance_expires_at: (now + windows.acceptance).coerce(),
        start_date: None,
        end_date: None,
        is_near_expiry_notified: false,
        rejection_reason: None,
        renewed_from: None,
        created_at: now.coerce(),
    };

    let intents = match (initiated_by, deal_type) {
        (Party::Seller, DealType::WithPlatform) => vec![Intent {
            to: Audience::PlatformAdmins,
            title: "New Platform Mandate Request".into(),
            message: format!(
                "{} has initiated a mandate with the platform for {}.",
                initiator.name, realty.title,
            )
            .into(),
            action_url: Some(ActionUrl::admin_mandate(mandate.id)),
        }],
        (Party::Seller, DealType::Direct)
        | (Party::Broker, DealType::Direct | DealType::WithPlatform) => {
            let counter_party = match initiated_by {
                Party::Seller => mandate.broker_id,
                Party::Broker => Some(mandate.seller_id),
            };
            counter_party
                .map(|to| Intent {
                    to: Audience::User(to),
                    title: "New Mandate Request".into(),
                    message: format!(
                        "{} has initiated a mandate request for {}.",
                        initiator.name, realty.title,
                    )
                    .into(),
                    action_url: Some(ActionUrl::mandate(mandate.id)),
                })
                .into_iter()
                .collect()
        }
    };

    Ok((mandate, intents))
}

/// Decides the `sign` transition: records the actor's [`Signature`] into
/// their slot and brings the [`Mandate`] into force, stamping its validity
/// period.
///
/// A [`Role::Staff`] actor signs the broker slot of a
/// [`DealType::WithPlatform`] deal on the platform's behalf.
///
/// # Errors
///
/// - [`TransitionError::Forbidden`] if the actor has no [`Role`] on the
///   [`Mandate`], or is [`Role::Staff`] on a [`DealType::Direct`] deal.
/// - [`TransitionError::InvalidState`] if the [`Mandate`] is not
///   [`Status::Pending`].
/// - [`TransitionError::AlreadySigned`] if the actor's slot is filled.
pub fn sign(
    mandate: &Mandate,
    role: Option<Role>,
    signature: Signature,
    realty: &Realty,
    now: DateTime,
    windows: &Windows,
) -> Result<(Mandate, Vec<Intent>), TransitionError> {
    use TransitionError as E;

    let signs_as = match role.ok_or(E::Forbidden)? {
        Role::Seller => Party::Seller,
        Role::Broker => Party::Broker,
        Role::Staff => {
            if mandate.deal_type != DealType::WithPlatform {
                return Err(E::Forbidden);
            }
            Party::Broker
        }
    };
    if mandate.status != Status::Pending {
        return Err(E::InvalidState(mandate.status));
    }

    let mut signed = mandate.clone();
    let slot = match signs_as {
        Party::Seller => &mut signed.seller_signature,
        Party::Broker => &mut signed.broker_signature,
    };
    if slot.is_some() {
        return Err(E::AlreadySigned(signs_as));
    }
    *slot = Some(signature);

    let start: StartDate = now.date();
    signed.status = Status::Active;
    signed.start_date = Some(start);
    signed.end_date = Some((start + windows.validity).coerce());

    let counter_party = match signs_as {
        // The platform counter-signs on its own behalf, so a seller
        // accepting its deal leaves nobody to notify.
        Party::Seller => (mandate.deal_type == DealType::Direct)
            .then_some(signed.broker_id)
            .flatten(),
        Party::Broker => Some(signed.seller_id),
    };
    let intents = counter_party
        .map(|to| Intent {
            to: Audience::User(to),
            title: "Mandate Accepted".into(),
            message: format!(
                "Your mandate for {} has been accepted and signed.",
                realty.title,
            )
            .into(),
            action_url: Some(ActionUrl::mandate(signed.id)),
        })
        .into_iter()
        .collect();

    Ok((signed, intents))
}

/// Decides the `reject` transition: records the refusal [`RejectionReason`]
/// and notifies the initiating [`Party`].
///
/// # Errors
///
/// - [`TransitionError::Forbidden`] if the actor has no [`Role`] on the
///   [`Mandate`].
/// - [`TransitionError::InvalidState`] if the [`Mandate`] is not
///   [`Status::Pending`].
pub fn reject(
    mandate: &Mandate,
    role: Option<Role>,
    reason: RejectionReason,
    realty: &Realty,
) -> Result<(Mandate, Vec<Intent>), TransitionError> {
    use TransitionError as E;

    if role.is_none() {
        return Err(E::Forbidden);
    }
    if mandate.status != Status::Pending {
        return Err(E::InvalidState(mandate.status));
    }

    let mut rejected = mandate.clone();
    rejected.status = Status::Rejected;
    rejected.rejection_reason = Some(reason.clone());

    let initiator_id = match mandate.initiated_by {
        Party::Seller => Some(mandate.seller_id),
        Party::Broker => mandate.broker_id,
    };
    let intents = initiator_id
        .map(|to| Intent {
            to: Audience::User(to),
            title: "Mandate Rejected".into(),
            message: format!(
                "Your mandate request for {} was rejected. Reason: {reason}",
                realty.title,
            )
            .into(),
            action_url: Some(ActionUrl::mandate(mandate.id)),
        })
        .into_iter()
        .collect();

    Ok((rejected, intents))
}

/// Decides the `cancel` transition: terminates the [`Mandate`] and stamps
/// the termination day as its end date.
///
/// No notification is owed by this transition.
///
/// # Errors
///
/// - [`TransitionError::Forbidden`] if the actor has no [`Role`] on the
///   [`Mandate`].
/// - [`TransitionError::InvalidState`] if the [`Mandate`] is neither
///   [`Status::Pending`] nor [`Status::Active`].
pub fn cancel(
    mandate: &Mandate,
    role: Option<Role>,
    today: Date,
) -> Result<Mandate, TransitionError> {
    use TransitionError as E;

    if role.is_none() {
        return Err(E::Forbidden);
    }
    if !matches!(mandate.status, Status::Pending | Status::Active) {
        return Err(E::InvalidState(mandate.status));
    }

    let mut cancelled = mandate.clone();
    cancelled.status = Status::TerminatedByUser;
    cancelled.end_date = Some(today.coerce());
    Ok(cancelled)
}

/// Decides the `renew` transition: builds a fresh [`Status::Pending`]
/// successor of the [`Mandate`], copying its parties, deal shape and
/// [`Terms`], and pointing back at it via [`Mandate::renewed_from`].
///
/// Renewal is open to a [`Status::Expired`] [`Mandate`], or to a
/// [`Status::Active`] one the near-expiry warning has been sent for.
///
/// # Errors
///
/// - [`TransitionError::Forbidden`] if the actor is not the seller or the
///   broker of the [`Mandate`].
/// - [`TransitionError::InvalidState`] if the [`Mandate`] is not eligible
///   for renewal.
pub fn renew(
    mandate: &Mandate,
    role: Option<Role>,
    now: DateTime,
    windows: &Windows,
) -> Result<Mandate, TransitionError> {
    use TransitionError as E;

    let initiated_by = match role.ok_or(E::Forbidden)? {
        Role::Seller => Party::Seller,
        Role::Broker => Party::Broker,
        Role::Staff => return Err(E::Forbidden),
    };
    let renewable = mandate.status == Status::Expired
        || (mandate.status == Status::Active
            && mandate.is_near_expiry_notified);
    if !renewable {
        return Err(E::InvalidState(mandate.status));
    }

    Ok(Mandate {
        id: Id::new(),
        realty_id: mandate.realty_id,
        seller_id: mandate.seller_id,
        broker_id: mandate.broker_id,
        initiated_by,
        deal_type: mandate.deal_type,
        status: Status::Pending,
        is_exclusive: mandate.is_exclusive,
        terms: mandate.terms,
        seller_signature: None,
        broker_signature: None,
        acceptance_expires_at: (now + windows.acceptance).coerce(),
        start_date: None,
        end_date: None,
        is_near_expiry_notified: false,
        rejection_reason: None,
        renewed_from: Some(mandate.id),
        created_at: now.coerce(),
    })
}

/// Decides the acceptance-timeout transition: a [`Status::Pending`]
/// [`Mandate`] whose acceptance window has closed by the `now` moment
/// becomes [`Status::Expired`].
///
/// [`None`] is returned when the [`Mandate`] is not due, making a re-run
/// over the same moment a no-op.
#[must_use]
pub fn expire_unaccepted(mandate: &Mandate, now: DateTime) -> Option<Mandate> {
    let now: AcceptanceDateTime = now.coerce();

    (mandate.status == Status::Pending
        && mandate.acceptance_expires_at <= now)
        .then(|| Mandate {
            status: Status::Expired,
            ..mandate.clone()
        })
}

/// Decides the validity-timeout transition: a [`Status::Active`] [`Mandate`]
/// whose end date has been reached by the `today` day becomes
/// [`Status::Expired`].
///
/// [`None`] is returned when the [`Mandate`] is not due, making a re-run
/// over the same day a no-op.
#[must_use]
pub fn expire_lapsed(mandate: &Mandate, today: Date) -> Option<Mandate> {
    let today: EndDate = today.coerce();

    (mandate.status == Status::Active
        && mandate.end_date.is_some_and(|end| end <= today))
        .then(|| Mandate {
            status: Status::Expired,
            ..mandate.clone()
        })
}

/// Decides the near-expiry warning: a [`Status::Active`] [`Mandate`] ending
/// within [`Windows::near_expiry`] after the `today` day gets its
/// [`Mandate::is_near_expiry_notified`] flag raised, along with warning
/// [`Intent`]s for the seller and the broker (if any).
///
/// A [`Mandate`] ending on or before `today` is never warned: the
/// validity-timeout transition takes precedence over the warning. Neither is
/// an already warned one, keeping the warning one-shot.
#[must_use]
pub fn flag_near_expiry(
    mandate: &Mandate,
    today: Date,
    windows: &Windows,
    realty: &Realty,
) -> Option<(Mandate, Vec<Intent>)> {
    let today: EndDate = today.coerce();

    if mandate.status != Status::Active || mandate.is_near_expiry_notified {
        return None;
    }
    let end = mandate.end_date?;
    if end <= today || end > today + windows.near_expiry {
        return None;
    }

    let mut warned = mandate.clone();
    warned.is_near_expiry_notified = true;

    let mut intents = vec![Intent {
        to: Audience::User(mandate.seller_id),
        title: "Mandate Expiring Soon".into(),
        message: format!(
            "Your mandate for {} expires on {end}. Please renew if you wish \
             to continue.",
            realty.title,
        )
        .into(),
        action_url: Some(ActionUrl::mandate(mandate.id)),
    }];
    if let Some(broker_id) = mandate.broker_id {
        intents.push(Intent {
            to: Audience::User(broker_id),
            title: "Mandate Expiring Soon".into(),
            message: format!(
                "Mandate for {} expires on {end}.",
                realty.title,
            )
            .into(),
            action_url: Some(ActionUrl::mandate(mandate.id)),
        });
    }

    Some((warned, intents))
}
