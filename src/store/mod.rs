//! The session store.
//!
//! [`Store`] ties the pieces together: it decodes the session token from the
//! request cookie, loads and deserializes the record, and on save writes the
//! record back with a fresh expiry and re-issues the cookie.

use std::sync::Arc;
use std::time::Duration;

use http::Extensions;
use thiserror::Error;
use tower_cookies::Cookies;

use crate::backend::{self, Backend, RecordError, SessionRecord, TableSpec, read_expires};
use crate::codec::{self, SecureCookie, TokenCodec, decode_multi, encode_multi};
use crate::serializer::{self, SessionSerializer, default_serializer};
use crate::session::{CookieOptions, Id, IdError, Registry, Session};
use crate::sweeper::{DEFAULT_INTERVAL, DEFAULT_WARM_UP, Sweeper};

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

/// Default table name.
pub const DEFAULT_TABLE_NAME: &str = "sessions";

/// Default storage TTL, in seconds, for sessions saved with a zero max age.
pub const DEFAULT_SESSION_COOKIE_TTL: i64 = 86400;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Backend(#[from] backend::Error),

    #[error(transparent)]
    Serializer(#[from] serializer::Error),

    #[error(transparent)]
    Codec(#[from] codec::Error),

    #[error("corrupt session record: {0}")]
    Integrity(#[from] RecordError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error("{0} not found in the request extensions")]
    MissingExtension(&'static str),

    #[error("session expiry is out of range for a max age of {0} seconds")]
    InvalidTtl(i64),
}

/// An error raised while producing a session handle.
///
/// The handle is still usable: it is fresh, empty and marked new, and can be
/// recovered with [`LoadError::into_session`].
///
/// The cause is shared, so every lookup of the same handle within a request
/// reports it.
#[derive(Error, Debug, Clone)]
#[error("failed to load session: {source}")]
pub struct LoadError {
    session: Session,
    source: Arc<Error>,
}

impl LoadError {
    pub(crate) fn new(session: Session, source: impl Into<Arc<Error>>) -> Self {
        Self {
            session,
            source: source.into(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn error(&self) -> &Error {
        &self.source
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn into_parts(self) -> (Session, Arc<Error>) {
        (self.session, self.source)
    }
}

enum CodecSource {
    HashKey(Vec<u8>),
    Codec(Box<dyn TokenCodec>),
}

/// A builder for creating a [`Store`].
///
/// # Example
///
/// ```rust,no_run
/// use kvsession::{CookieOptions, StoreBuilder};
/// use kvsession::backend::memory::MemoryBackend;
///
/// # async fn run() -> Result<(), kvsession::Error> {
/// let store = StoreBuilder::new(MemoryBackend::new())
///     .table_name("user_sessions")
///     .hash_key(b"a secret of at least 32 bytes, ideally".to_vec())
///     .cookie_options(CookieOptions::build().max_age(3600))
///     .session_cookie_ttl(60 * 60 * 12)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct StoreBuilder<B: Backend> {
    backend: B,
    table_name: String,
    create_table: bool,
    read_capacity: i64,
    write_capacity: i64,
    session_cookie_ttl: i64,
    cookie_options: CookieOptions,
    codecs: Vec<CodecSource>,
    serializer: Box<dyn SessionSerializer>,
    clock: Arc<dyn Clock>,
    background_sweep: bool,
    sweep_warm_up: Duration,
    sweep_interval: Duration,
}

impl<B> StoreBuilder<B>
where
    B: Backend,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            create_table: true,
            read_capacity: 5,
            write_capacity: 5,
            session_cookie_ttl: DEFAULT_SESSION_COOKIE_TTL,
            cookie_options: CookieOptions::default(),
            codecs: Vec::new(),
            serializer: default_serializer(),
            clock: Arc::new(SystemClock),
            background_sweep: true,
            sweep_warm_up: DEFAULT_WARM_UP,
            sweep_interval: DEFAULT_INTERVAL,
        }
    }

    /// Sets the table name. Defaults to "sessions".
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Whether to create the table on build if it does not exist. Defaults to `true`.
    pub fn create_table(mut self, create_table: bool) -> Self {
        self.create_table = create_table;
        self
    }

    /// Provisioned read/write capacity used only when the table is created.
    pub fn capacity(mut self, read: i64, write: i64) -> Self {
        self.read_capacity = read;
        self.write_capacity = write;
        self
    }

    /// How long, in seconds, a session saved with a zero max age (a browser
    /// session cookie) is kept in the table.
    pub fn session_cookie_ttl(mut self, seconds: i64) -> Self {
        self.session_cookie_ttl = seconds;
        self
    }

    /// Store-wide cookie defaults, copied into every new handle.
    pub fn cookie_options(mut self, options: CookieOptions) -> Self {
        self.cookie_options = options;
        self
    }

    /// Adds a [`SecureCookie`] codec signing with `key`.
    ///
    /// Call repeatedly to rotate keys: the first key signs, every key verifies.
    pub fn hash_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.codecs.push(CodecSource::HashKey(key.into()));
        self
    }

    /// Adds a custom token codec.
    pub fn codec(mut self, codec: impl TokenCodec) -> Self {
        self.codecs.push(CodecSource::Codec(Box::new(codec)));
        self
    }

    pub fn serializer(mut self, serializer: impl SessionSerializer) -> Self {
        self.serializer = Box::new(serializer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Whether to spawn the expiration sweeper on build. Defaults to `true`.
    pub fn background_sweep(mut self, enabled: bool) -> Self {
        self.background_sweep = enabled;
        self
    }

    /// Delay before the first sweep. Defaults to 10 seconds.
    pub fn sweep_warm_up(mut self, warm_up: Duration) -> Self {
        self.sweep_warm_up = warm_up;
        self
    }

    /// Period between sweeps. Defaults to once a day.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Builds the store, creating the table if needed and starting the sweeper.
    ///
    /// Must be called within a tokio runtime when the background sweep is enabled.
    pub async fn build(self) -> Result<Store<B>, Error> {
        if self.codecs.is_empty() {
            return Err(codec::Error::NoCodecs.into());
        }

        if self.create_table {
            let spec = TableSpec::new(&self.table_name, self.read_capacity, self.write_capacity);
            self.backend
                .create_table_if_absent(&spec)
                .await
                .map_err(|err| {
                    tracing::error!(err = %err, table = %self.table_name, "failed to create session table");
                    err
                })?;
        }

        let clock = self.clock;
        let codecs = self
            .codecs
            .into_iter()
            .map(|source| match source {
                CodecSource::HashKey(key) => {
                    Box::new(SecureCookie::new(key).with_clock(clock.clone())) as Box<dyn TokenCodec>
                }
                CodecSource::Codec(codec) => codec,
            })
            .collect();

        let mut store = Store {
            backend: self.backend,
            table: self.table_name,
            codecs,
            options: CookieOptions::default(),
            session_cookie_ttl: self.session_cookie_ttl,
            serializer: self.serializer,
            clock,
            sweep_warm_up: self.sweep_warm_up,
            sweep_interval: self.sweep_interval,
        };
        let max_age = self.cookie_options.max_age;
        store.options = self.cookie_options;
        store.set_max_age(max_age);

        if self.background_sweep {
            store.sweeper().spawn();
        }

        Ok(store)
    }
}

/// Stores sessions in a remote key-value table.
///
/// Share it across requests behind an `Arc`; every method takes `&self`
/// except the configuration setters.
#[derive(Debug)]
pub struct Store<B: Backend> {
    backend: B,
    table: String,
    codecs: Vec<Box<dyn TokenCodec>>,
    options: CookieOptions,
    session_cookie_ttl: i64,
    serializer: Box<dyn SessionSerializer>,
    clock: Arc<dyn Clock>,
    sweep_warm_up: Duration,
    sweep_interval: Duration,
}

impl<B> Store<B>
where
    B: Backend,
{
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The store-wide cookie defaults.
    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    /// Replaces the store-wide cookie defaults.
    ///
    /// The new `max_age` is applied through [`Store::set_max_age`], so token
    /// validity follows it; returns the same skipped-codec count.
    pub fn set_options(&mut self, options: CookieOptions) -> usize {
        let max_age = options.max_age;
        self.options = options;
        self.set_max_age(max_age)
    }

    pub fn session_cookie_ttl(&self) -> i64 {
        self.session_cookie_ttl
    }

    pub fn set_serializer(&mut self, serializer: impl SessionSerializer) {
        self.serializer = Box::new(serializer);
    }

    /// Sets the session TTL, in seconds, for both the stored record and the
    /// token's validity window.
    ///
    /// To end a single session, set a negative max age on its handle instead.
    ///
    /// Returns how many codecs were left unchanged because they have no
    /// validity window to adjust.
    pub fn set_max_age(&mut self, seconds: i64) -> usize {
        self.options.max_age = seconds;

        let mut skipped = 0;
        for codec in &mut self.codecs {
            match codec.max_age_mut() {
                Some(codec) => codec.set_max_age(seconds),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::debug!(skipped, "token codecs without a max age were left unchanged");
        }
        skipped
    }

    /// A sweeper over this store's table, on the schedule given to the builder.
    pub fn sweeper(&self) -> Sweeper<B> {
        Sweeper::new(self.backend.clone(), self.table.clone(), self.clock.clone())
            .warm_up(self.sweep_warm_up)
            .interval(self.sweep_interval)
    }

    /// Returns the handle for `name` registered for the current request,
    /// creating it with [`Store::new_session`] on first use.
    ///
    /// Expects the [`Registry`] installed by [`SessionLayer`](crate::SessionLayer)
    /// and the [`Cookies`] installed by `tower_cookies::CookieManagerLayer`.
    #[tracing::instrument(name = "getting session for request", skip(self, extensions))]
    pub async fn get(&self, extensions: &Extensions, name: &str) -> Result<Session, LoadError> {
        let registry = extensions.get::<Registry>().cloned();
        let cookies = extensions.get::<Cookies>().cloned();

        let (registry, cookies) = match (registry, cookies) {
            (Some(registry), Some(cookies)) => (registry, cookies),
            (None, _) => return Err(self.missing_extension(name, "session registry")),
            (_, None) => return Err(self.missing_extension(name, "cookies")),
        };

        if let Some(result) = registry.lookup(name) {
            return result;
        }

        let result = self.new_session(&cookies, name).await;
        registry.insert_result(result)
    }

    fn missing_extension(&self, name: &str, extension: &'static str) -> LoadError {
        tracing::error!("{extension} not found in the request extensions");
        LoadError::new(
            Session::new(name, self.options.clone()),
            Error::MissingExtension(extension),
        )
    }

    /// Creates a handle for `name`, loading it from the table if the request
    /// carries a valid token for it.
    ///
    /// A missing, forged or expired token, or a token for a record that no
    /// longer exists, yields a fresh handle without an error. Backend failures
    /// and corrupt records are returned as a [`LoadError`] that still carries a
    /// fresh handle.
    #[tracing::instrument(name = "creating session", skip(self, cookies))]
    pub async fn new_session(&self, cookies: &Cookies, name: &str) -> Result<Session, LoadError> {
        let session = Session::new(name, self.options.clone());

        let Some(cookie) = cookies.get(name) else {
            return Ok(session);
        };

        let id = match decode_multi(name, cookie.value(), &self.codecs) {
            Ok(id) => Id::from(id),
            Err(err) => {
                tracing::warn!(err = %err, "possibly suspicious activity: invalid session token");
                return Ok(session);
            }
        };

        session.set_id(Some(id));
        match self.load(&session).await {
            Ok(true) => {
                session.loaded();
                Ok(session)
            }
            Ok(false) => {
                session.set_id(None);
                Ok(session)
            }
            Err(err) => {
                tracing::error!(err = %err, "failed to load session from store");
                session.set_id(None);
                session.write_values().clear();
                Err(LoadError::new(session, err))
            }
        }
    }

    /// Loads the record for `session`'s id into its values.
    ///
    /// Returns `false` when there is no record or it has expired; an expired
    /// record is deleted in the background. A record that exists and is live
    /// but cannot be decoded is an error.
    pub async fn load(&self, session: &Session) -> Result<bool, Error> {
        let Some(id) = session.id() else {
            return Ok(false);
        };

        let Some(item) = self.backend.get_item(&self.table, id.as_str()).await? else {
            return Ok(false);
        };

        let expires = read_expires(&item)?;
        if expires <= self.clock.now().unix_timestamp() {
            self.spawn_delete(id);
            return Ok(false);
        }

        let record = SessionRecord::from_item(item)?;
        self.serializer
            .deserialize(&record.data, &mut session.write_values())?;
        Ok(true)
    }

    fn spawn_delete(&self, id: Id) {
        let backend = self.backend.clone();
        let table = self.table.clone();
        tokio::spawn(async move {
            if let Err(err) = backend.delete_item(&table, id.as_str()).await {
                tracing::warn!(err = %err, "failed to delete expired session");
            }
        });
    }

    /// Persists `session` and sets its cookie on `cookies`.
    ///
    /// A negative max age on the handle deletes the record and clears the
    /// cookie instead. Otherwise the record is written with an expiry of now
    /// plus the max age (or the session-cookie TTL when the max age is zero),
    /// and a token for its id is issued. Ids are generated on first save.
    #[tracing::instrument(name = "saving session", skip_all, fields(session = %session.name()))]
    pub async fn save(&self, cookies: &Cookies, session: &Session) -> Result<(), Error> {
        let options = session.options();
        let now = self.clock.now();

        if options.max_age < 0 {
            if let Some(id) = session.id() {
                self.delete(&id).await?;
            }
            let cookie = options
                .to_cookie(session.name(), String::new(), now)
                .ok_or(Error::InvalidTtl(options.max_age))?;
            cookies.add(cookie);
            return Ok(());
        }

        let id = match session.id() {
            Some(id) => id,
            None => Id::generate()?,
        };

        let data = self.serializer.serialize(&session.read_values()).map_err(|err| {
            tracing::error!(err = %err, "failed to serialize session");
            err
        })?;
        let token = encode_multi(session.name(), id.as_str(), &self.codecs).map_err(|err| {
            tracing::error!(err = %err, "failed to encode session token");
            err
        })?;

        let ttl = if options.max_age == 0 {
            self.session_cookie_ttl
        } else {
            options.max_age
        };
        let expires = now.unix_timestamp().checked_add(ttl);
        let cookie = options.to_cookie(session.name(), token, now);
        let (Some(expires), Some(cookie)) = (expires, cookie) else {
            tracing::error!(max_age = ttl, "session expiry is out of range");
            return Err(Error::InvalidTtl(ttl));
        };

        let record = SessionRecord {
            id: id.to_string(),
            data,
            expires,
        };

        self.backend
            .put_item(&self.table, record.into_item())
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to save session to store");
                err
            })?;

        session.set_id(Some(id));
        cookies.add(cookie);
        Ok(())
    }

    /// Deletes the record for `id`. Deleting a missing record succeeds.
    #[tracing::instrument(name = "deleting session from store", skip(self))]
    pub async fn delete(&self, id: &Id) -> Result<(), Error> {
        self.backend
            .delete_item(&self.table, id.as_str())
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to delete session from store");
                err
            })?;
        Ok(())
    }
}
