//! [`Command`] for terminating a [`Mandate`] early.

use common::{
    operations::{By, Commit, Lock, Select, Transact, Transacted, Update},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        mandate::{self, lifecycle},
        user, Mandate, User,
    },
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for terminating an open [`Mandate`] early, by either of its
/// participants.
#[derive(Clone, Copy, Debug)]
pub struct CancelMandate {
    /// ID of the [`Mandate`] to terminate.
    pub mandate_id: mandate::Id,

    /// ID of the [`User`] terminating the [`Mandate`].
    pub user_id: user::Id,
}

impl<Db> Command<CancelMandate> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<User>, user::Id>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Select<By<Option<Mandate>, mandate::Id>>,
            Ok = Option<Mandate>,
            Err = Traced<database::Error>,
        > + Database<Update<Mandate>, Ok = (), Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
        Lock<By<Mandate, mandate::Id>>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Mandate;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: CancelMandate) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CancelMandate { mandate_id, user_id } = cmd;
        let today = DateTime::now().date();

        let user = self
            .database()
            .execute(Select(By::<Option<User>, _>::new(user_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::UserNotExists(user_id))
            .map_err(tracerr::wrap!())?;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent transitions of the same `Mandate`.
        tx.execute(Lock(By::new(mandate_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mandate = tx
            .execute(Select(By::<Option<Mandate>, _>::new(mandate_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::MandateNotExists(mandate_id))
            .map_err(tracerr::wrap!())?;

        let cancelled =
            lifecycle::cancel(&mandate, mandate.role_of(&user), today)
                .map_err(tracerr::from_and_wrap!(=> E))?;

        tx.execute(Update(cancelled.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(cancelled)
    }
}

/// Error of [`CancelMandate`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Mandate`] with the provided ID doesn't exist.
    #[display("`Mandate(id: {_0})` doesn't exist")]
    MandateNotExists(#[error(not(source))] mandate::Id),

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

    use crate::{
        command::{CreateMandate, SignMandate},
        domain::{
            mandate::{self, TransitionError},
            Mandate, Notification, User,
        },
        fixture,
        infra::InMemory,
        Command as _, Service,
    };

    use super::{CancelMandate, ExecutionError};

    async fn direct_pending(
        svc: &Service<InMemory>,
        db: &InMemory,
    ) -> (User, User, Mandate) {
        let seller = fixture::seller(db, "Asha Rao").await;
        let agent = fixture::broker(db, "Ravi Kumar").await;
        let realty = fixture::realty(db, "2BHK in Koramangala", &seller).await;
        let pending = svc
            .execute(CreateMandate {
                realty_id: realty.id,
                initiator_id: seller.id,
                initiated_by: mandate::Party::Seller,
                deal_type: mandate::DealType::Direct,
                broker_id: Some(agent.id),
                is_exclusive: false,
                terms: fixture::terms(),
                signature: Some(fixture::signature(&seller)),
            })
            .await
            .unwrap();
        (seller, agent, pending)
    }

    #[tokio::test]
    async fn participant_terminates_active_mandate() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let (seller, agent, pending) = direct_pending(&svc, &db).await;

        svc.execute(SignMandate {
            mandate_id: pending.id,
            user_id: agent.id,
            signature: fixture::signature(&agent),
        })
        .await
        .unwrap();

        let cancelled = svc
            .execute(CancelMandate {
                mandate_id: pending.id,
                user_id: seller.id,
            })
            .await
            .unwrap();

        assert_eq!(cancelled.status, mandate::Status::TerminatedByUser);
        assert!(cancelled.end_date.is_some());

        let stored = db
            .execute(Select(By::<Option<Mandate>, _>::new(pending.id)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, mandate::Status::TerminatedByUser);
    }

    #[tokio::test]
    async fn pending_mandate_cancellable_without_notifying() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let (seller, agent, pending) = direct_pending(&svc, &db).await;

        let cancelled = svc
            .execute(CancelMandate {
                mandate_id: pending.id,
                user_id: seller.id,
            })
            .await
            .unwrap();
        assert_eq!(cancelled.status, mandate::Status::TerminatedByUser);

        // Only the initial request announcement must be in the inbox.
        let inbox = db
            .execute(Select(By::<Vec<Notification>, _>::new(agent.id)))
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title.to_string(), "New Mandate Request");
    }

    #[tokio::test]
    async fn stranger_cannot_cancel() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let (_, _, pending) = direct_pending(&svc, &db).await;
        let stranger = fixture::seller(&db, "Sunil Shetty").await;

        let err = svc
            .execute(CancelMandate {
                mandate_id: pending.id,
                user_id: stranger.id,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::Refused(TransitionError::Forbidden),
        ));
    }

    #[tokio::test]
    async fn terminated_mandate_not_cancellable_again() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let (seller, _, pending) = direct_pending(&svc, &db).await;

        svc.execute(CancelMandate {
            mandate_id: pending.id,
            user_id: seller.id,
        })
        .await
        .unwrap();
        let err = svc
            .execute(CancelMandate {
                mandate_id: pending.id,
                user_id: seller.id,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::Refused(TransitionError::InvalidState(
                mandate::Status::TerminatedByUser,
            )),
        ));
    }
}
