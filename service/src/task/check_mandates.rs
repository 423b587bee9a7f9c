//! [`CheckMandates`] [`Task`].

use std::{convert::Infallible, error::Error, time};

use common::{
    operations::{
        By, Commit, Insert, Lock, Perform, Select, Start, Transact,
        Transacted, Update,
    },
    Date, DateTime,
};
use derive_more::Display;
use tokio::time::interval;
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        mandate::{self, lifecycle},
        realty, Mandate, Notification, Realty,
    },
    infra::{database, Database},
    read, Service,
};

use super::Task;

/// Configuration for [`CheckMandates`] [`Task`].
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Interval between [`Mandate`] sweeps.
    pub interval: time::Duration,
}

/// [`Task`] sweeping [`Mandate`]s through their time-driven transitions:
/// expiring overdue ones and warning about the ones ending soon.
#[derive(Clone, Copy, Debug)]
pub struct CheckMandates<S> {
    /// [`Config`] of this [`Task`].
    config: Config,

    /// [`Service`] instance.
    service: S,
}

/// Outcome of a single [`CheckMandates`] sweep.
#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq)]
#[display(
    "{expired_pending} pending expired, {expired_active} active expired, \
     {warnings_sent} warnings sent"
)]
pub struct Outcome {
    /// Number of [`Mandate`]s expired for outliving their acceptance window.
    pub expired_pending: usize,

    /// Number of [`Mandate`]s expired for reaching their end date.
    pub expired_active: usize,

    /// Number of [`Mandate`]s warned about their approaching end date.
    pub warnings_sent: usize,
}

impl<Db> Task<Start<By<CheckMandates<Self>, Config>>> for Service<Db>
where
    CheckMandates<Service<Db>>:
        Task<Perform<DateTime>, Ok = Outcome, Err: Error>
            + Send
            + Sync
            + 'static,
    Self: Clone,
{
    type Ok = ();
    type Err = Infallible;

    async fn execute(
        &self,
        Start(by): Start<By<CheckMandates<Self>, Config>>,
    ) -> Result<Self::Ok, Self::Err> {
        let config = by.into_inner();
        let task = CheckMandates {
            config,
            service: self.clone(),
        };

        let mut interval = interval(task.config.interval);
        loop {
            let _ = interval.tick().await;
            match task.execute(Perform(DateTime::now())).await {
                Ok(outcome) => {
                    log::info!("`task::CheckMandates` finished: {outcome}");
                }
                Err(e) => log::error!("`task::CheckMandates` failed: {e}"),
            }
        }
    }
}

impl<Db> Task<Perform<DateTime>> for CheckMandates<Service<Db>>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Vec<mandate::Id>, read::mandate::AcceptanceOverdue>>,
            Ok = Vec<mandate::Id>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Vec<mandate::Id>, read::mandate::ValidityOverdue>>,
            Ok = Vec<mandate::Id>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Vec<mandate::Id>, read::mandate::NearExpiry>>,
            Ok = Vec<mandate::Id>,
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
    Transacted<Db>:
        Database<Lock<By<Mandate, mandate::Id>>, Err = Traced<database::Error>>,
{
    type Ok = Outcome;
    type Err = ExecutionError;

    async fn execute(
        &self,
        Perform(now): Perform<DateTime>,
    ) -> Result<Self::Ok, Self::Err> {
        let today: Date = now.date();
        let mut outcome = Outcome::default();

        let overdue = self
            .service
            .database()
            .execute(Select(By::<Vec<mandate::Id>, _>::new(
                read::mandate::AcceptanceOverdue(now.coerce()),
            )))
            .await
            .map_err(tracerr::wrap!())?;
        for id in overdue {
            match self.expire_unaccepted(id, now).await {
                Ok(expired) => {
                    outcome.expired_pending += usize::from(expired);
                }
                Err(e) => {
                    log::warn!("failed to expire `Mandate(id: {id})`: {e}");
                }
            }
        }

        let lapsed = self
            .service
            .database()
            .execute(Select(By::<Vec<mandate::Id>, _>::new(
                read::mandate::ValidityOverdue(today.coerce()),
            )))
            .await
            .map_err(tracerr::wrap!())?;
        for id in lapsed {
            match self.expire_lapsed(id, today).await {
                Ok(expired) => {
                    outcome.expired_active += usize::from(expired);
                }
                Err(e) => {
                    log::warn!("failed to expire `Mandate(id: {id})`: {e}");
                }
            }
        }

        let ending = self
            .service
            .database()
            .execute(Select(By::<Vec<mandate::Id>, _>::new(
                read::mandate::NearExpiry(
                    (today + self.service.config().windows.near_expiry)
                        .coerce(),
                ),
            )))
            .await
            .map_err(tracerr::wrap!())?;
        for id in ending {
            match self.warn_near_expiry(id, now, today).await {
                Ok(warned) => {
                    outcome.warnings_sent += usize::from(warned);
                }
                Err(e) => {
                    log::warn!("failed to warn about `Mandate(id: {id})`: {e}");
                }
            }
        }

        Ok(outcome)
    }
}

impl<Db> CheckMandates<Service<Db>> {
    /// Expires the [`Status::Pending`] [`Mandate`] with the provided ID, if
    /// it's still due.
    ///
    /// Returns whether the [`Mandate`] was transitioned: a [`Mandate`] gone
    /// or transitioned meanwhile is skipped.
    ///
    /// [`Status::Pending`]: mandate::Status::Pending
    async fn expire_unaccepted(
        &self,
        id: mandate::Id,
        now: DateTime,
    ) -> Result<bool, Traced<database::Error>>
    where
        Db: Database<Transact, Err = Traced<database::Error>>,
        Transacted<Db>: Database<
                Select<By<Option<Mandate>, mandate::Id>>,
                Ok = Option<Mandate>,
                Err = Traced<database::Error>,
            > + Database<Update<Mandate>, Ok = (), Err = Traced<database::Error>>
            + Database<Commit, Err = Traced<database::Error>>
            + Database<
                Lock<By<Mandate, mandate::Id>>,
                Err = Traced<database::Error>,
            >,
    {
        let tx = self
            .service
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::wrap!())?;
        tx.execute(Lock(By::new(id)))
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;

        let Some(mandate) = tx
            .execute(Select(By::<Option<Mandate>, _>::new(id)))
            .await
            .map_err(tracerr::wrap!())?
        else {
            return Ok(false);
        };
        let Some(expired) = lifecycle::expire_unaccepted(&mandate, now) else {
            return Ok(false);
        };

        tx.execute(Update(expired))
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;
        tx.execute(Commit)
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;
        Ok(true)
    }

    /// Expires the [`Status::Active`] [`Mandate`] with the provided ID, if
    /// it's still due.
    ///
    /// Returns whether the [`Mandate`] was transitioned.
    ///
    /// [`Status::Active`]: mandate::Status::Active
    async fn expire_lapsed(
        &self,
        id: mandate::Id,
        today: Date,
    ) -> Result<bool, Traced<database::Error>>
    where
        Db: Database<Transact, Err = Traced<database::Error>>,
        Transacted<Db>: Database<
                Select<By<Option<Mandate>, mandate::Id>>,
                Ok = Option<Mandate>,
                Err = Traced<database::Error>,
            > + Database<Update<Mandate>, Ok = (), Err = Traced<database::Error>>
            + Database<Commit, Err = Traced<database::Error>>
            + Database<
                Lock<By<Mandate, mandate::Id>>,
                Err = Traced<database::Error>,
            >,
    {
        let tx = self
            .service
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::wrap!())?;
        tx.execute(Lock(By::new(id)))
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;

        let Some(mandate) = tx
            .execute(Select(By::<Option<Mandate>, _>::new(id)))
            .await
            .map_err(tracerr::wrap!())?
        else {
            return Ok(false);
        };
        let Some(expired) = lifecycle::expire_lapsed(&mandate, today) else {
            return Ok(false);
        };

        tx.execute(Update(expired))
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;
        tx.execute(Commit)
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;
        Ok(true)
    }

    /// Raises the near-expiry flag of the [`Status::Active`] [`Mandate`]
    /// with the provided ID, delivering the warning [`Notification`]s once
    /// the flag is durable.
    ///
    /// Returns whether the [`Mandate`] was warned.
    ///
    /// [`Status::Active`]: mandate::Status::Active
    async fn warn_near_expiry(
        &self,
        id: mandate::Id,
        now: DateTime,
        today: Date,
    ) -> Result<bool, Traced<database::Error>>
    where
        Db: Database<Transact, Err = Traced<database::Error>>
            + Database<
                Insert<Notification>,
                Ok = (),
                Err = Traced<database::Error>,
            > + Database<
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
            + Database<Commit, Err = Traced<database::Error>>
            + Database<
                Lock<By<Mandate, mandate::Id>>,
                Err = Traced<database::Error>,
            >,
    {
        let tx = self
            .service
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::wrap!())?;
        tx.execute(Lock(By::new(id)))
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;

        let Some(mandate) = tx
            .execute(Select(By::<Option<Mandate>, _>::new(id)))
            .await
            .map_err(tracerr::wrap!())?
        else {
            return Ok(false);
        };
        let Some(realty) = tx
            .execute(Select(By::<Option<Realty>, _>::new(mandate.realty_id)))
            .await
            .map_err(tracerr::wrap!())?
        else {
            return Ok(false);
        };
        let Some((warned, intents)) = lifecycle::flag_near_expiry(
            &mandate,
            today,
            &self.service.config().windows,
            &realty,
        ) else {
            return Ok(false);
        };

        tx.execute(Update(warned))
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;
        tx.execute(Commit)
            .await
            .map_err(tracerr::wrap!())
            .map(drop)?;

        self.service.deliver(intents, now).await;
        Ok(true)
    }
}

/// Error of [`CheckMandates`] execution.
pub type ExecutionError = Traced<database::Error>;

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use common::{
        operations::{By, Perform, Select},
        DateTime,
    };

    use crate::{
        command::{CreateMandate, SignMandate},
        domain::{mandate, Mandate, Notification, Realty, User},
        fixture,
        infra::InMemory,
        Service, Task as _,
    };

    use super::{CheckMandates, Config, Outcome};

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn sweeper(svc: &Service<InMemory>) -> CheckMandates<Service<InMemory>> {
        CheckMandates {
            config: Config {
                interval: Duration::from_secs(60 * 60),
            },
            service: svc.clone(),
        }
    }

    async fn create_pending(
        svc: &Service<InMemory>,
        realty: &Realty,
        seller: &User,
        agent: &User,
    ) -> Mandate {
        svc.execute(CreateMandate {
            realty_id: realty.id,
            initiator_id: seller.id,
            initiated_by: mandate::Party::Seller,
            deal_type: mandate::DealType::Direct,
            broker_id: Some(agent.id),
            is_exclusive: false,
            terms: fixture::terms(),
            signature: Some(fixture::signature(seller)),
        })
        .await
        .unwrap()
    }

    async fn activate(
        svc: &Service<InMemory>,
        mandate: &Mandate,
        agent: &User,
    ) -> Mandate {
        svc.execute(SignMandate {
            mandate_id: mandate.id,
            user_id: agent.id,
            signature: fixture::signature(agent),
        })
        .await
        .unwrap()
    }

    async fn stored(db: &InMemory, id: mandate::Id) -> Mandate {
        db.execute(Select(By::<Option<Mandate>, _>::new(id)))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn pending_past_acceptance_window_expires() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let seller = fixture::seller(&db, "Asha Rao").await;
        let agent = fixture::broker(&db, "Ravi Kumar").await;
        let realty = fixture::realty(&db, "2BHK in Koramangala", &seller).await;
        let pending = create_pending(&svc, &realty, &seller, &agent).await;

        let outcome = sweeper(&svc)
            .execute(Perform(DateTime::now() + 8 * DAY))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome {
                expired_pending: 1,
                expired_active: 0,
                warnings_sent: 0,
            },
        );
        assert_eq!(
            stored(&db, pending.id).await.status,
            mandate::Status::Expired,
        );
    }

    #[tokio::test]
    async fn pending_within_acceptance_window_kept() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let seller = fixture::seller(&db, "Asha Rao").await;
        let agent = fixture::broker(&db, "Ravi Kumar").await;
        let realty = fixture::realty(&db, "2BHK in Koramangala", &seller).await;
        let pending = create_pending(&svc, &realty, &seller, &agent).await;

        let outcome = sweeper(&svc)
            .execute(Perform(DateTime::now() + 6 * DAY))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::default());
        assert_eq!(
            stored(&db, pending.id).await.status,
            mandate::Status::Pending,
        );
    }

    #[tokio::test]
    async fn active_past_end_date_expires() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let seller = fixture::seller(&db, "Asha Rao").await;
        let agent = fixture::broker(&db, "Ravi Kumar").await;
        let realty = fixture::realty(&db, "2BHK in Koramangala", &seller).await;
        let pending = create_pending(&svc, &realty, &seller, &agent).await;
        let active = activate(&svc, &pending, &agent).await;

        let outcome = sweeper(&svc)
            .execute(Perform(DateTime::now() + 91 * DAY))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome {
                expired_pending: 0,
                expired_active: 1,
                warnings_sent: 0,
            },
        );
        assert_eq!(
            stored(&db, active.id).await.status,
            mandate::Status::Expired,
        );
    }

    #[tokio::test]
    async fn active_ending_soon_warned_once() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let seller = fixture::seller(&db, "Asha Rao").await;
        let agent = fixture::broker(&db, "Ravi Kumar").await;
        let realty = fixture::realty(&db, "2BHK in Koramangala", &seller).await;
        let pending = create_pending(&svc, &realty, &seller, &agent).await;
        let active = activate(&svc, &pending, &agent).await;

        let moment = DateTime::now() + 85 * DAY;
        let outcome = sweeper(&svc).execute(Perform(moment)).await.unwrap();

        assert_eq!(
            outcome,
            Outcome {
                expired_pending: 0,
                expired_active: 0,
                warnings_sent: 1,
            },
        );
        let warned = stored(&db, active.id).await;
        assert!(warned.is_near_expiry_notified);
        assert_eq!(warned.status, mandate::Status::Active);

        let seller_inbox = db
            .execute(Select(By::<Vec<Notification>, _>::new(seller.id)))
            .await
            .unwrap();
        assert!(seller_inbox
            .iter()
            .any(|n| n.title.to_string() == "Mandate Expiring Soon"));
        let broker_inbox = db
            .execute(Select(By::<Vec<Notification>, _>::new(agent.id)))
            .await
            .unwrap();
        assert!(broker_inbox
            .iter()
            .any(|n| n.title.to_string() == "Mandate Expiring Soon"));

        // A repeated sweep over the same moment must be a no-op.
        let again = sweeper(&svc).execute(Perform(moment)).await.unwrap();
        assert_eq!(again, Outcome::default());
    }

    #[tokio::test]
    async fn expiry_takes_precedence_over_warning() {
        let db = InMemory::default();
        let svc = fixture::service(db.clone());
        let seller = fixture::seller(&db, "Asha Rao").await;
        let agent = fixture::broker(&db, "Ravi Kumar").await;
        let realty = fixture::realty(&db, "2BHK in Koramangala", &seller).await;
        let pending = create_pending(&svc, &realty, &seller, &agent).await;
        let active = activate(&svc, &pending, &agent).await;

        // The end date has been reached: expire, never warn.
        let outcome = sweeper(&svc)
            .execute(Perform(DateTime::now() + 90 * DAY))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome {
                expired_pending: 0,
                expired_active: 1,
                warnings_sent: 0,
            },
        );
        let expired = stored(&db, active.id).await;
        assert_eq!(expired.status, mandate::Status::Expired);
        assert!(!expired.is_near_expiry_notified);
    }
}
