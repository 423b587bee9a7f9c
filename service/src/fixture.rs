//! Fixtures shared by tests across the crate.

use std::time::Duration;

use common::{operations::Insert, DateTime, Percent};
use rust_decimal::Decimal;

use crate::{
    domain::{mandate, realty, user, Realty, User},
    infra::{Database as _, InMemory},
    task, Config, Service,
};

/// Assembles a [`Service`] on top of the provided [`InMemory`] database,
/// with the default [`mandate::Windows`].
pub(crate) fn service(db: InMemory) -> Service<InMemory> {
    service_with(mandate::Windows::default(), db)
}

/// Assembles a [`Service`] on top of the provided [`InMemory`] database,
/// with the provided [`mandate::Windows`].
///
/// The background runner is dropped: tests drive tasks directly.
pub(crate) fn service_with(
    windows: mandate::Windows,
    db: InMemory,
) -> Service<InMemory> {
    let config = Config {
        windows,
        check_mandates: task::check_mandates::Config {
            interval: Duration::from_secs(60 * 60),
        },
    };
    Service::new(config, db).0
}

/// Persists a new plain [`User`] with the given name.
pub(crate) async fn seller(db: &InMemory, name: &str) -> User {
    let user = unsaved(name);
    db.execute(Insert(user.clone())).await.unwrap();
    user
}

/// Persists a new active broker [`User`] with the given name.
pub(crate) async fn broker(db: &InMemory, name: &str) -> User {
    let user = User {
        is_active_broker: true,
        ..unsaved(name)
    };
    db.execute(Insert(user.clone())).await.unwrap();
    user
}

/// Persists a new active broker [`User`] with the given name and phone
/// number.
pub(crate) async fn broker_with_phone(
    db: &InMemory,
    name: &str,
    phone: &str,
) -> User {
    let user = User {
        phone: Some(user::Phone::new(phone).unwrap()),
        is_active_broker: true,
        ..unsaved(name)
    };
    db.execute(Insert(user.clone())).await.unwrap();
    user
}

/// Persists a new platform administrator [`User`] with the given name.
pub(crate) async fn staff(db: &InMemory, name: &str) -> User {
    let user = User {
        is_staff: true,
        ..unsaved(name)
    };
    db.execute(Insert(user.clone())).await.unwrap();
    user
}

/// Persists a new [`Realty`] with the given title, owned by the given
/// [`User`].
pub(crate) async fn realty(db: &InMemory, title: &str, owner: &User) -> Realty {
    let realty = Realty {
        id: realty::Id::new(),
        title: realty::Title::new(title).unwrap(),
        owner_id: owner.id,
        created_at: DateTime::now().coerce(),
    };
    db.execute(Insert(realty.clone())).await.unwrap();
    realty
}

/// Builds remuneration [`mandate::Terms`] with a 2% commission.
pub(crate) fn terms() -> mandate::Terms {
    mandate::Terms {
        commission_rate: Some(Percent::new(Decimal::TWO).unwrap()),
        fixed_amount: None,
    }
}

/// Builds a [`mandate::Signature`] reference for the given [`User`].
pub(crate) fn signature(signer: &User) -> mandate::Signature {
    mandate::Signature::new(format!("Signed via OTP by {}", signer.name))
        .unwrap()
}

fn unsaved(name: &str) -> User {
    User {
        id: user::Id::new(),
        name: user::Name::new(name).unwrap(),
        email: None,
        phone: None,
        is_staff: false,
        is_active_broker: false,
        created_at: DateTime::now().coerce(),
    }
}
