//! [`Command`] for initiating a new [`Mandate`].

use common::{
    operations::{By, Commit, Insert, Lock, Select, Transact, Transacted},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        mandate::{self, lifecycle},
        realty, user, Mandate, Notification, Realty, User,
    },
    infra::{database, Database},
    read, Service,
};

use super::Command;

/// [`Command`] for initiating a new [`Mandate`].
#[derive(Clone, Debug)]
pub struct CreateMandate {
    /// ID of the [`Realty`] the new [`Mandate`] is concluded about.
    pub realty_id: realty::Id,

    /// ID of the [`User`] initiating the [`Mandate`].
    pub initiator_id: user::Id,

    /// [`mandate::Party`] the initiator takes on the deal.
    pub initiated_by: mandate::Party,

    /// [`mandate::DealType`] of the new [`Mandate`].
    pub deal_type: mandate::DealType,

    /// ID of the hired broker, required for a [`mandate::DealType::Direct`]
    /// deal initiated by the seller.
    pub broker_id: Option<user::Id>,

    /// Whether the new [`Mandate`] grants its broker exclusivity.
    pub is_exclusive: bool,

    /// Remuneration [`mandate::Terms`] of the new [`Mandate`].
    pub terms: mandate::Terms,

    /// [`mandate::Signature`] of the initiator, recorded into their own slot
    /// right away, if provided.
    pub signature: Option<mandate::Signature>,
}

impl<Db> Command<CreateMandate> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Realty>, realty::Id>>,
            Ok = Option<Realty>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<User>, user::Id>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        > + Database<Insert<Notification>, Ok = (), Err = Traced<database::Error>>
        + Database<
            Select<By<Vec<read::user::Admin>, ()>>,
            Ok = Vec<read::user::Admin>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Select<By<Option<read::mandate::Open<Mandate>>, realty::Id>>,
            Ok = Option<read::mandate::Open<Mandate>>,
            Err = Traced<database::Error>,
        > + Database<Insert<Mandate>, Ok = (), Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Transacted<Db>:
        Database<Lock<By<Realty, realty::Id>>, Err = Traced<database::Error>>,
{
    type Ok = Mandate;
    type Err = Traced<ExecutionError>;

    #[expect(clippy::too_many_lines, reason = "still readable")]
    async fn execute(&self, cmd: CreateMandate) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreateMandate {
            realty_id,
            initiator_id,
            initiated_by,
            deal_type,
            broker_id,
            is_exclusive,
            terms,
            signature,
        } = cmd;
        let now = DateTime::now();

        let realty = self
            .database()
            .execute(Select(By::<Option<Realty>, _>::new(realty_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::RealtyNotExists(realty_id))
            .map_err(tracerr::wrap!())?;

        let initiator = self
            .database()
            .execute(Select(By::<Option<User>, _>::new(initiator_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::UserNotExists(initiator_id))
            .map_err(tracerr::wrap!())?;

        let broker = match broker_id {
            Some(id) => Some(
                self.database()
                    .execute(Select(By::<Option<User>, _>::new(id)))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?
                    .ok_or(E::UserNotExists(id))
                    .map_err(tracerr::wrap!())?,
            ),
            None => None,
        };

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent actions upon the same `Realty`.
        tx.execute(Lock(By::new(realty.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let open = tx
            .execute(Select(By::<
                Option<read::mandate::Open<Mandate>>,
                _,
            >::new(realty.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if open.is_some() {
            return Err(tracerr::new!(E::AlreadyMandated(realty.id)));
        }

        let (mandate, intents) = lifecycle::initiate(
            lifecycle::Initiate {
                realty: &realty,
                initiator: &initiator,
                initiated_by,
                deal_type,
                broker: broker.as_ref(),
                is_exclusive,
                terms,
                signature,
            },
            now,
            &self.config().windows,
        )
        .map_err(tracerr::from_and_wrap!(=> E))?;

        tx.execute(Insert(mandate.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        self.deliver(intents, now).await;

        Ok(mandate)
    }
}

/// Error of [`CreateMandate`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Realty`] with the provided ID has an open [`Mandate`] already.
    #[display("`Realty(id: {_0})` has an open `Mandate` already")]
    AlreadyMandated(#[error(not(source))] realty::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Realty`] with the provided ID doesn't exist.
    #[display("`Realty(id: {_0})` doesn't exist")]
    RealtyNotExists(#[error(not(source))] realty::Id),

    /// [`Mandate`] lifecycle refused the transition.
    #[display("transition refused: {_0}")]
    #[from]
    Refused(lifecycle::TransitionError),

    /// [`User`] with the provided ID doesn't exist.
    #[display("`User(id: {_0})` doesn't exist")]
    UserNotExists(#[error(not(source))] user::Id),
}

#[cfg(test)]
mod spec {
    use common::operations::{By, Select};
    use futures::future;

    use crate::{
        domain::{mandate, realty, user, Mandate, Notification, Realty, User},
        fixture,
        infra::InMemory,
        Command as _,
    };

    use super::{CreateMandate, ExecutionError};

    fn cmd(
        realty: &Realty,
        initiator: &User,
        broker_id: Option<user::Id>,
    ) -> CreateMandate {
        CreateMandate {
            realty_id: realty.id,
            initiator_id: initiator.id,
            initiated_by: mandate::Party::Seller,
            deal_type: mandate::DealType::Direct,
            broker_id,
            is_exclusive: false,
            terms: fixture::terms(),
            signature: Some(fixture::signature(initiator)),
        }
    }

    #[tokio::test]
    async fn creates_pending_mandate_and_notifies_broker() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let seller = fixture::seller(&db, "Asha Rao").await;
        let agent = fixture::broker(&db, "Ravi Kumar").await;
        let realty = fixture::realty(&db, "2BHK in Koramangala", &seller).await;

        let created = svc
            .execute(cmd(&realty, &seller, Some(agent.id)))
            .await
            .unwrap();

        assert_eq!(created.status, mandate::Status::Pending);
        assert_eq!(created.seller_id, seller.id);
        assert_eq!(created.broker_id, Some(agent.id));
        assert!(created.seller_signature.is_some());
        assert!(created.broker_signature.is_none());

        let stored = db
            .execute(Select(By::<Option<Mandate>, _>::new(created.id)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, mandate::Status::Pending);

        let inbox = db
            .execute(Select(By::<Vec<Notification>, _>::new(agent.id)))
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title.to_string(), "New Mandate Request");
        assert_eq!(
            inbox[0].message.to_string(),
            format!(
                "{} has initiated a mandate request for {}.",
                seller.name, realty.title,
            ),
        );
        assert_eq!(
            inbox[0].action_url.as_ref().map(ToString::to_string),
            Some(format!("/mandates/{}", created.id)),
        );
    }

    #[tokio::test]
    async fn platform_mandate_notifies_every_admin() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let seller = fixture::seller(&db, "Asha Rao").await;
        let first = fixture::staff(&db, "Priya Iyer").await;
        let second = fixture::staff(&db, "Vikram Singh").await;
        let realty = fixture::realty(&db, "Villa in Whitefield", &seller).await;

        let created = svc
            .execute(CreateMandate {
                realty_id: realty.id,
                initiator_id: seller.id,
                initiated_by: mandate::Party::Seller,
                deal_type: mandate::DealType::WithPlatform,
                broker_id: None,
                is_exclusive: true,
                terms: fixture::terms(),
                signature: None,
            })
            .await
            .unwrap();

        assert_eq!(created.broker_id, None);

        for admin in [&first, &second] {
            let inbox = db
                .execute(Select(By::<Vec<Notification>, _>::new(admin.id)))
                .await
                .unwrap();
            assert_eq!(inbox.len(), 1);
            assert_eq!(
                inbox[0].title.to_string(),
                "New Platform Mandate Request",
            );
            assert_eq!(
                inbox[0].action_url.as_ref().map(ToString::to_string),
                Some(format!("/admin/mandates/{}", created.id)),
            );
        }
    }

    #[tokio::test]
    async fn refuses_unknown_realty() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let seller = fixture::seller(&db, "Asha Rao").await;
        let agent = fixture::broker(&db, "Ravi Kumar").await;

        let missing = realty::Id::new();
        let err = svc
            .execute(CreateMandate {
                realty_id: missing,
                initiator_id: seller.id,
                initiated_by: mandate::Party::Seller,
                deal_type: mandate::DealType::Direct,
                broker_id: Some(agent.id),
                is_exclusive: false,
                terms: fixture::terms(),
                signature: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::RealtyNotExists(id) if *id == missing,
        ));
    }

    #[tokio::test]
    async fn refuses_second_open_mandate_upon_same_realty() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let seller = fixture::seller(&db, "Asha Rao").await;
        let agent = fixture::broker(&db, "Ravi Kumar").await;
        let other = fixture::broker(&db, "Mohan Das").await;
        let realty = fixture::realty(&db, "2BHK in Koramangala", &seller).await;

        svc.execute(cmd(&realty, &seller, Some(agent.id)))
            .await
            .unwrap();
        let err = svc
            .execute(cmd(&realty, &seller, Some(other.id)))
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::AlreadyMandated(id) if *id == realty.id,
        ));
    }

    #[tokio::test]
    async fn concurrent_initiations_elect_single_winner() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let seller = fixture::seller(&db, "Asha Rao").await;
        let agent = fixture::broker(&db, "Ravi Kumar").await;
        let realty = fixture::realty(&db, "2BHK in Koramangala", &seller).await;

        let request = cmd(&realty, &seller, Some(agent.id));
        let (first, second) =
            future::join(svc.execute(request.clone()), svc.execute(request))
                .await;

        assert!(first.is_ok() ^ second.is_ok());
        let err = first.err().or(second.err()).unwrap();
        assert!(matches!(
            err.as_ref(),
            ExecutionError::AlreadyMandated(id) if *id == realty.id,
        ));
    }
}
