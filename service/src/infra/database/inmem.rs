//! In-memory [`Database`] implementation.
//!
//! Reference store backing tests and single-node deployments until a durable
//! engine is plugged in. Transactions serialize on a single global gate and
//! buffer their writes until [`Commit`], which makes the check-then-write
//! sequences of the commands serializable: no two of them ever interleave
//! between reading a record and writing its successor state.

use std::{
    collections::HashMap,
    mem,
    sync::{Arc, Mutex as StdMutex, MutexGuard, RwLock, RwLockReadGuard},
};

use common::operations::{By, Commit, Insert, Lock, Select, Transact, Update};
use derive_more::{Display, Error as StdError};
use itertools::Itertools as _;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracerr::Traced;

use crate::{
    domain::{mandate, realty, user, Mandate, Notification, Realty, User},
    infra::database,
    read,
};

use super::Database;

/// In-memory [`Database`].
#[derive(Clone, Debug, Default)]
pub struct InMemory {
    /// Gate serializing [`Transaction`]s of this [`Database`].
    gate: Arc<Mutex<()>>,

    /// [`Tables`] of this [`Database`].
    tables: Arc<RwLock<Tables>>,
}

impl InMemory {
    /// Acquires the read guard over the [`Tables`].
    fn tables(
        &self,
    ) -> Result<RwLockReadGuard<'_, Tables>, Traced<database::Error>> {
        self.tables
            .read()
            .map_err(|_| tracerr::new!(database::Error::from(Error::Poisoned)))
    }

    /// Acquires the write guard over the [`Tables`].
    fn tables_mut(
        &self,
    ) -> Result<
        std::sync::RwLockWriteGuard<'_, Tables>,
        Traced<database::Error>,
    > {
        self.tables
            .write()
            .map_err(|_| tracerr::new!(database::Error::from(Error::Poisoned)))
    }
}

/// Tables of an [`InMemory`] database.
#[derive(Debug, Default)]
struct Tables {
    /// [`Mandate`]s by their IDs.
    mandates: HashMap<mandate::Id, Mandate>,

    /// [`Notification`]s in their creation order.
    notifications: Vec<Notification>,

    /// [`Realty`] records by their IDs.
    realties: HashMap<realty::Id, Realty>,

    /// [`User`]s by their IDs.
    users: HashMap<user::Id, User>,
}

/// [`InMemory`] database [`Error`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, StdError)]
pub enum Error {
    /// Record to insert exists already.
    #[display("record exists already")]
    AlreadyExists,

    /// Record to update doesn't exist.
    #[display("record doesn't exist")]
    Missing,

    /// Tables lock was poisoned by a panicked writer.
    #[display("tables lock is poisoned")]
    Poisoned,
}

impl Database<Transact> for InMemory {
    type Ok = Transaction;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        Ok(Transaction {
            db: self.clone(),
            _guard: Arc::clone(&self.gate).lock_owned().await,
            pending: StdMutex::new(Vec::new()),
        })
    }
}

impl Database<Select<By<Option<User>, user::Id>>> for InMemory {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self.tables()?.users.get(&id).cloned())
    }
}

impl Database<Select<By<Option<Realty>, realty::Id>>> for InMemory {
    type Ok = Option<Realty>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Realty>, realty::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self.tables()?.realties.get(&id).cloned())
    }
}

impl Database<Select<By<Option<Mandate>, mandate::Id>>> for InMemory {
    type Ok = Option<Mandate>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Mandate>, mandate::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self.tables()?.mandates.get(&id).cloned())
    }
}

impl Database<Select<By<Option<read::mandate::Open<Mandate>>, realty::Id>>>
    for InMemory
{
    type Ok = Option<read::mandate::Open<Mandate>>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<read::mandate::Open<Mandate>>, realty::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let realty_id = by.into_inner();
        Ok(self
            .tables()?
            .mandates
            .values()
            .find(|m| m.realty_id == realty_id && !m.status.is_terminal())
            .cloned()
            .map(read::mandate::Open))
    }
}

impl Database<Select<By<Vec<Mandate>, user::Id>>> for InMemory {
    type Ok = Vec<Mandate>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Mandate>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let user_id = by.into_inner();
        Ok(self
            .tables()?
            .mandates
            .values()
            .filter(|m| m.has_participant(user_id))
            .sorted_by(|a, b| b.created_at.cmp(&a.created_at))
            .cloned()
            .collect())
    }
}

impl Database<Select<By<Option<read::user::ActiveBroker>, user::Phone>>>
    for InMemory
{
    type Ok = Option<read::user::ActiveBroker>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<read::user::ActiveBroker>, user::Phone>>,
    ) -> Result<Self::Ok, Self::Err> {
        let phone = by.into_inner();
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| u.is_active_broker && u.phone.as_ref() == Some(&phone))
            .cloned()
            .map(read::user::ActiveBroker))
    }
}

impl Database<Select<By<Vec<read::user::Admin>, ()>>> for InMemory {
    type Ok = Vec<read::user::Admin>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<read::user::Admin>, ()>>,
    ) -> Result<Self::Ok, Self::Err> {
        let () = by.into_inner();
        Ok(self
            .tables()?
            .users
            .values()
            .filter(|u| u.is_staff)
            .sorted_by_key(|u| u.created_at)
            .cloned()
            .map(read::user::Admin)
            .collect())
    }
}

impl Database<Select<By<Vec<Notification>, user::Id>>> for InMemory {
    type Ok = Vec<Notification>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Notification>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let recipient_id = by.into_inner();
        Ok(self
            .tables()?
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .sorted_by(|a, b| b.created_at.cmp(&a.created_at))
            .cloned()
            .collect())
    }
}

impl Database<Select<By<Vec<mandate::Id>, read::mandate::AcceptanceOverdue>>>
    for InMemory
{
    type Ok = Vec<mandate::Id>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<Vec<mandate::Id>, read::mandate::AcceptanceOverdue>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let read::mandate::AcceptanceOverdue(moment) = by.into_inner();
        Ok(self
            .tables()?
            .mandates
            .values()
            .filter(|m| {
                m.status == mandate::Status::Pending
                    && m.acceptance_expires_at <= moment
            })
            .sorted_by_key(|m| m.created_at)
            .map(|m| m.id)
            .collect())
    }
}

impl Database<Select<By<Vec<mandate::Id>, read::mandate::ValidityOverdue>>>
    for InMemory
{
    type Ok = Vec<mandate::Id>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<Vec<mandate::Id>, read::mandate::ValidityOverdue>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let read::mandate::ValidityOverdue(day) = by.into_inner();
        Ok(self
            .tables()?
            .mandates
            .values()
            .filter(|m| {
                m.status == mandate::Status::Active
                    && m.end_date.is_some_and(|end| end <= day)
            })
            .sorted_by_key(|m| m.created_at)
            .map(|m| m.id)
            .collect())
    }
}

impl Database<Select<By<Vec<mandate::Id>, read::mandate::NearExpiry>>>
    for InMemory
{
    type Ok = Vec<mandate::Id>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<mandate::Id>, read::mandate::NearExpiry>>,
    ) -> Result<Self::Ok, Self::Err> {
        let read::mandate::NearExpiry(threshold) = by.into_inner();
        Ok(self
            .tables()?
            .mandates
            .values()
            .filter(|m| {
                m.status == mandate::Status::Active
                    && !m.is_near_expiry_notified
                    && m.end_date.is_some_and(|end| end <= threshold)
            })
            .sorted_by_key(|m| m.created_at)
            .map(|m| m.id)
            .collect())
    }
}

impl Database<Insert<User>> for InMemory {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(user): Insert<User>,
    ) -> Result<Self::Ok, Self::Err> {
        let mut tables = self.tables_mut()?;
        if tables.users.contains_key(&user.id) {
            return Err(tracerr::new!(database::Error::from(
                Error::AlreadyExists,
            )));
        }
        drop(tables.users.insert(user.id, user));
        Ok(())
    }
}

impl Database<Insert<Realty>> for InMemory {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(realty): Insert<Realty>,
    ) -> Result<Self::Ok, Self::Err> {
        let mut tables = self.tables_mut()?;
        if tables.realties.contains_key(&realty.id) {
            return Err(tracerr::new!(database::Error::from(
                Error::AlreadyExists,
            )));
        }
        drop(tables.realties.insert(realty.id, realty));
        Ok(())
    }
}

impl Database<Insert<Mandate>> for InMemory {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(mandate): Insert<Mandate>,
    ) -> Result<Self::Ok, Self::Err> {
        let mut tables = self.tables_mut()?;
        if tables.mandates.contains_key(&mandate.id) {
            return Err(tracerr::new!(database::Error::from(
                Error::AlreadyExists,
            )));
        }
        drop(tables.mandates.insert(mandate.id, mandate));
        Ok(())
    }
}

impl Database<Insert<Notification>> for InMemory {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(notification): Insert<Notification>,
    ) -> Result<Self::Ok, Self::Err> {
        self.tables_mut()?.notifications.push(notification);
        Ok(())
    }
}

/// [`InMemory`] database transaction.
///
/// Holds the global transaction gate for its whole lifetime and buffers its
/// writes, applying them to the [`Tables`] on [`Commit`] only. Dropping a
/// [`Transaction`] without committing discards the buffered writes. Reads
/// made through a [`Transaction`] observe the committed state, not the
/// buffered one.
#[derive(Debug)]
pub struct Transaction {
    /// [`InMemory`] database the buffered writes will be applied to.
    db: InMemory,

    /// Guard serializing this [`Transaction`] against the other ones.
    _guard: OwnedMutexGuard<()>,

    /// Writes buffered until [`Commit`].
    pending: StdMutex<Vec<Write>>,
}

impl Transaction {
    /// Acquires the guard over the buffered writes.
    fn pending(
        &self,
    ) -> Result<MutexGuard<'_, Vec<Write>>, Traced<database::Error>> {
        self.pending
            .lock()
            .map_err(|_| tracerr::new!(database::Error::from(Error::Poisoned)))
    }
}

/// Write buffered by a [`Transaction`].
#[derive(Clone, Debug)]
enum Write {
    /// Insert of a new [`Mandate`].
    Insert(Mandate),

    /// Update of an existing [`Mandate`].
    Update(Mandate),
}

impl Write {
    /// Returns the [`Mandate`] carried by this [`Write`].
    fn mandate(&self) -> &Mandate {
        match self {
            Self::Insert(m) | Self::Update(m) => m,
        }
    }
}

impl Database<Lock<By<Mandate, mandate::Id>>> for Transaction {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Lock<By<Mandate, mandate::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Transactions fully serialize on the global gate, so nothing
        // per-record remains to lock here.
        Ok(())
    }
}

impl Database<Lock<By<Realty, realty::Id>>> for Transaction {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Lock<By<Realty, realty::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(())
    }
}

impl Database<Select<By<Option<Mandate>, mandate::Id>>> for Transaction {
    type Ok = Option<Mandate>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        op: Select<By<Option<Mandate>, mandate::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.db.execute(op).await
    }
}

impl Database<Select<By<Option<Realty>, realty::Id>>> for Transaction {
    type Ok = Option<Realty>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        op: Select<By<Option<Realty>, realty::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.db.execute(op).await
    }
}

impl Database<Select<By<Option<read::mandate::Open<Mandate>>, realty::Id>>>
    for Transaction
{
    type Ok = Option<read::mandate::Open<Mandate>>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        op: Select<By<Option<read::mandate::Open<Mandate>>, realty::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.db.execute(op).await
    }
}

impl Database<Insert<Mandate>> for Transaction {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(mandate): Insert<Mandate>,
    ) -> Result<Self::Ok, Self::Err> {
        let buffered = self
            .pending()?
            .iter()
            .any(|w| w.mandate().id == mandate.id);
        if buffered || self.db.tables()?.mandates.contains_key(&mandate.id) {
            return Err(tracerr::new!(database::Error::from(
                Error::AlreadyExists,
            )));
        }
        self.pending()?.push(Write::Insert(mandate));
        Ok(())
    }
}

impl Database<Update<Mandate>> for Transaction {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(mandate): Update<Mandate>,
    ) -> Result<Self::Ok, Self::Err> {
        let buffered = self
            .pending()?
            .iter()
            .any(|w| w.mandate().id == mandate.id);
        if !buffered && !self.db.tables()?.mandates.contains_key(&mandate.id)
        {
            return Err(tracerr::new!(database::Error::from(Error::Missing)));
        }
        self.pending()?.push(Write::Update(mandate));
        Ok(())
    }
}

impl Database<Commit> for Transaction {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Commit) -> Result<Self::Ok, Self::Err> {
        let writes = mem::take(&mut *self.pending()?);
        let mut tables = self.db.tables_mut()?;
        for write in writes {
            // Both kinds were validated when buffered, so applying is a
            // plain upsert.
            let (Write::Insert(m) | Write::Update(m)) = write;
            drop(tables.mandates.insert(m.id, m));
        }
        Ok(())
    }
}
