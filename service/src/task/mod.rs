//! Background [`Task`]s definitions.

pub mod check_mandates;

use std::{
    error::Error,
    future::{Future, IntoFuture},
    iter,
};

use derive_more::Debug;
use futures::{
    future::{self, LocalBoxFuture},
    FutureExt as _, TryFutureExt as _,
};
use tokio::task;

pub use common::Handler as Task;

pub use self::check_mandates::CheckMandates;

/// Background environment for running [`Task`]s.
///
/// Collects [`Task`] futures and drives them on a [`task::LocalSet`] once
/// awaited, resolving when either all of them complete or the first one
/// errors.
#[derive(Debug, Default)]
pub struct Background {
    /// [`Task`] futures to be driven.
    #[debug(skip)]
    tasks: Vec<LocalBoxFuture<'static, Result<(), Box<dyn Error + 'static>>>>,
}

impl Background {
    /// Schedules a new [`Task`] to run inside this [`Background`]
    /// environment.
    pub fn spawn<F, E>(&mut self, future: F)
    where
        F: Future<Output = Result<(), E>> + 'static,
        E: Error + 'static,
    {
        self.tasks.push(
            future
                .map_err(|e| Box::<dyn Error + 'static>::from(Box::new(e)))
                .boxed_local(),
        );
    }
}

impl IntoFuture for Background {
    type Output = Result<(), Box<dyn Error>>;
    type IntoFuture = LocalBoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        let Self { tasks } = self;

        let set = task::LocalSet::new();
        let handles =
            tasks.into_iter().map(|t| set.spawn_local(t)).collect::<Vec<_>>();

        future::try_join_all(iter::once(set.map(Ok).boxed_local()).chain(
            handles.into_iter().map(|h| {
                h.map(|r| match r {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e),
                    Err(e) => {
                        Err(Box::<dyn Error + 'static>::from(Box::new(e)))
                    }
                })
                .boxed_local()
            }),
        ))
        .map_ok(drop)
        .boxed_local()
    }
}
