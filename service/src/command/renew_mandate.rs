//! [`Command`] for renewing a [`Mandate`].

use common::{
    operations::{By, Commit, Insert, Lock, Select, Transact, Transacted},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        mandate::{self, lifecycle},
        realty, user, Mandate, Realty, User,
    },
    infra::{database, Database},
    read, Service,
};

use super::Command;

/// [`Command`] for renewing a [`Mandate`]: concluding a fresh
/// [`Status::Pending`] successor of an expired (or expiring) one.
///
/// [`Status::Pending`]: mandate::Status::Pending
#[derive(Clone, Copy, Debug)]
pub struct RenewMandate {
    /// ID of the [`Mandate`] to renew.
    pub mandate_id: mandate::Id,

    /// ID of the [`User`] renewing the [`Mandate`].
    pub user_id: user::Id,
}

impl<Db> Command<RenewMandate> for Service<Db>
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
        > + Database<
            Select<By<Option<read::mandate::Open<Mandate>>, realty::Id>>,
            Ok = Option<read::mandate::Open<Mandate>>,
            Err = Traced<database::Error>,
        > + Database<Insert<Mandate>, Ok = (), Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Lock<By<Mandate, mandate::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Lock<By<Realty, realty::Id>>,
            Err = Traced<database::Error>,
        >,
{
    type Ok = Mandate;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: RenewMandate) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let RenewMandate { mandate_id, user_id } = cmd;
        let now = DateTime::now();

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
        tx.execute(Lock(By::<Mandate, _>::new(mandate_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mandate = tx
            .execute(Select(By::<Option<Mandate>, _>::new(mandate_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::MandateNotExists(mandate_id))
            .map_err(tracerr::wrap!())?;

        // Avoid concurrent conclusions upon the same `Realty`.
        tx.execute(Lock(By::<Realty, _>::new(mandate.realty_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let open = tx
            .execute(Select(By::<
                Option<read::mandate::Open<Mandate>>,
                _,
            >::new(mandate.realty_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if let Some(read::mandate::Open(existing)) = open {
            // The mandate being renewed may well be the open one itself.
            if existing.id != mandate.id {
                return Err(tracerr::new!(E::AlreadyMandated(
                    mandate.realty_id,
                )));
            }
        }

        let successor = lifecycle::renew(
            &mandate,
            mandate.role_of(&user),
            now,
            &self.config().windows,
        )
        .map_err(tracerr::from_and_wrap!(=> E))?;

        tx.execute(Insert(successor.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(successor)
    }
}

/// Error of [`RenewMandate`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Realty`] of the [`Mandate`] has another open [`Mandate`] already.
    #[display("`Realty(id: {_0})` has an open `Mandate` already")]
    AlreadyMandated(#[error(not(source))] realty::Id),

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
