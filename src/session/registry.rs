use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tower_cookies::Cookies;

use crate::Session;
use crate::backend::Backend;
use crate::store::{Error, LoadError, Store};

/// The sessions handed out during a single request, keyed by name.
///
/// [`SessionLayer`](crate::SessionLayer) puts a fresh registry into every
/// request's extensions, so [`Store::get`] returns the same handle for the
/// same name no matter how many times it is called while that request lives.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    sessions: Arc<Mutex<HashMap<String, Entry>>>,
}

// the load error travels with its handle so repeated lookups report it
#[derive(Clone, Debug)]
struct Entry {
    session: Session,
    error: Option<LoadError>,
}

impl Entry {
    fn to_result(&self) -> Result<Session, LoadError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.session.clone()),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle registered under `name`.
    pub fn get(&self, name: &str) -> Option<Session> {
        self.sessions
            .lock()
            .get(name)
            .map(|entry| entry.session.clone())
    }

    /// Returns the handle registered under `name` together with the error
    /// raised when it was created, if any.
    pub(crate) fn lookup(&self, name: &str) -> Option<Result<Session, LoadError>> {
        self.sessions.lock().get(name).map(Entry::to_result)
    }

    /// Registers `session` under its name.
    ///
    /// If a handle was registered for that name in the meantime, the earlier
    /// one wins and is returned.
    pub fn insert(&self, session: Session) -> Session {
        self.sessions
            .lock()
            .entry(session.name().to_string())
            .or_insert(Entry {
                session,
                error: None,
            })
            .session
            .clone()
    }

    /// Registers the outcome of creating a handle, keeping any error with it.
    ///
    /// As with [`Registry::insert`], an earlier registration wins.
    pub(crate) fn insert_result(
        &self,
        result: Result<Session, LoadError>,
    ) -> Result<Session, LoadError> {
        let entry = match result {
            Ok(session) => Entry {
                session,
                error: None,
            },
            Err(err) => Entry {
                session: err.session().clone(),
                error: Some(err),
            },
        };
        self.sessions
            .lock()
            .entry(entry.session.name().to_string())
            .or_insert(entry)
            .to_result()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Saves every registered session, stopping at the first error.
    #[tracing::instrument(name = "saving all registered sessions", skip_all)]
    pub async fn save_all<B>(&self, store: &Store<B>, cookies: &Cookies) -> Result<(), Error>
    where
        B: Backend,
    {
        let mut sessions: Vec<Session> = self
            .sessions
            .lock()
            .values()
            .map(|entry| entry.session.clone())
            .collect();
        sessions.sort_by(|a, b| a.name().cmp(b.name()));

        for session in &sessions {
            store.save(cookies, session).await?;
        }

        Ok(())
    }
}
