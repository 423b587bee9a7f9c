//! Service contains the business logic of the application.
//!
//! List of available Cargo features:
#![doc = document_features::document_features!()]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod command;
pub mod domain;
#[cfg(test)]
mod fixture;
pub mod infra;
pub mod query;
pub mod read;
pub mod task;

use common::{
    operations::{By, Insert, Select, Start},
    DateTime,
};
use derive_more::Error;
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        notification::{Audience, Intent},
        Notification,
    },
    infra::{database, Database},
};

pub use self::{command::Command, query::Query, task::Task};

/// [`Service`] configuration.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// [`Windows`] driving [`Mandate`] lifecycle decisions.
    ///
    /// [`Mandate`]: domain::Mandate
    /// [`Windows`]: domain::mandate::Windows
    pub windows: domain::mandate::Windows,

    /// [`task::CheckMandates`] configuration.
    pub check_mandates: task::check_mandates::Config,
}

/// Domain service.
#[derive(Clone, Debug)]
pub struct Service<Db> {
    /// Configuration of this [`Service`].
    config: Config,

    /// [`Database`] of this [`Service`].
    database: Db,
}

impl<Db> Service<Db> {
    /// Creates a new [`Service`] with the provided parameters.
    pub fn new(config: Config, database: Db) -> (Self, task::Background)
    where
        Self: Task<
                Start<
                    By<task::CheckMandates<Self>, task::check_mandates::Config>,
                >,
                Ok = (),
                Err: Error,
            > + Clone
            + 'static,
    {
        let this = Service { config, database };

        let mut bg = task::Background::default();
        let svc = this.clone();
        bg.spawn(async move {
            svc.execute(Start(By::new(svc.config().check_mandates))).await
        });

        (this, bg)
    }

    /// Returns [`Config`] of this [`Service`].
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns [`Database`] of this [`Service`].
    #[must_use]
    pub fn database(&self) -> &Db {
        &self.database
    }

    /// Delivers the provided notification [`Intent`]s, materializing them as
    /// [`Notification`]s created at the provided moment.
    ///
    /// Delivery is best-effort: a failed [`Intent`] is logged and skipped, as
    /// the state transition owing it has been persisted already.
    pub(crate) async fn deliver(&self, intents: Vec<Intent>, now: DateTime)
    where
        Db: Database<
                Insert<Notification>,
                Ok = (),
                Err = Traced<database::Error>,
            > + Database<
                Select<By<Vec<read::user::Admin>, ()>>,
                Ok = Vec<read::user::Admin>,
                Err = Traced<database::Error>,
            >,
    {
        for intent in intents {
            let recipients = match intent.to {
                Audience::User(id) => vec![id],
                Audience::PlatformAdmins => {
                    match self
                        .database()
                        .execute(Select(By::<Vec<read::user::Admin>, _>::new(
                            (),
                        )))
                        .await
                    {
                        Ok(admins) => {
                            admins.into_iter().map(|a| a.0.id).collect()
                        }
                        Err(e) => {
                            log::warn!("failed to list platform admins: {e}");
                            continue;
                        }
                    }
                }
            };
            for to in recipients {
                let notification = intent.clone().into_notification(to, now);
                _ = self
                    .database()
                    .execute(Insert(notification))
                    .await
                    .map_err(|e| {
                        log::warn!("failed to deliver `Notification`: {e}");
                    });
            }
        }
    }
}
