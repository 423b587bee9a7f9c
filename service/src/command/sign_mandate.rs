//! [`Command`] for signing a [`Mandate`].

use common::{
    operations::{
        By, Commit, Insert, Lock, Select, Transact, Transacted, Update,
    },
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

/// [`Command`] for signing a [`Mandate`], bringing it into force once the
/// acting side's slot completes the required signatures.
#[derive(Clone, Debug)]
pub struct SignMandate {
    /// ID of the [`Mandate`] to sign.
    pub mandate_id: mandate::Id,

    /// ID of the [`User`] signing the [`Mandate`].
    pub user_id: user::Id,

    /// [`mandate::Signature`] reference to record.
    pub signature: mandate::Signature,
}

impl<Db> Command<SignMandate> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
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
            Select<By<Option<Mandate>, mandate::Id>>,
            Ok = Option<Mandate>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Realty>, realty::Id>>,
            Ok = Option<Realty>,
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

    async fn execute(&self, cmd: SignMandate) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let SignMandate {
            mandate_id,
            user_id,
            signature,
        } = cmd;
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

        let realty = tx
            .execute(Select(By::<Option<Realty>, _>::new(mandate.realty_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::RealtyNotExists(mandate.realty_id))
            .map_err(tracerr::wrap!())?;

        let (signed, intents) = lifecycle::sign(
            &mandate,
            mandate.role_of(&user),
            signature,
            &realty,
            now,
            &self.config().windows,
        )
        .map_err(tracerr::from_and_wrap!(=> E))?;

        tx.execute(Update(signed.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        self.deliver(intents, now).await;

        Ok(signed)
    }
}

/// Error of [`SignMandate`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Mandate`] with the provided ID doesn't exist.
    #[display("`Mandate(id: {_0})` doesn't exist")]
    MandateNotExists(#[error(not(source))] mandate::Id),

    /// [`Realty`] of the [`Mandate`] doesn't exist.
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
