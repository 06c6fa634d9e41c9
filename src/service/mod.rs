//! Per-request session registry middleware for tower applications.
//!
//! [`SessionLayer`] gives every request its own [`Registry`] and a shared
//! handle to the [`Store`], so handlers can call [`Store::get`] with the
//! request's extensions. It must sit inside `tower_cookies::CookieManagerLayer`.

use std::sync::Arc;
use std::task::{Context, Poll};

use http::Request;
use tower::{Layer, Service};

use crate::backend::Backend;
use crate::session::Registry;
use crate::store::Store;

/// A Tower Middleware that installs a fresh [`Registry`] per request.
#[derive(Clone, Debug)]
pub struct SessionService<S, B: Backend> {
    inner: S,
    store: Arc<Store<B>>,
}

impl<ReqBody, S, B> Service<Request<ReqBody>> for SessionService<S, B>
where
    S: Service<Request<ReqBody>>,
    B: Backend,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        req.extensions_mut().insert(Registry::new());
        req.extensions_mut().insert(Arc::clone(&self.store));
        self.inner.call(req)
    }
}

/// Layer to apply [`SessionService`] middleware.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use kvsession::{SessionLayer, StoreBuilder};
/// use kvsession::backend::memory::MemoryBackend;
/// use tower_cookies::CookieManagerLayer;
///
/// # async fn run() -> Result<(), kvsession::Error> {
/// let store = StoreBuilder::new(MemoryBackend::new())
///     .hash_key(b"a secret of at least 32 bytes, ideally".to_vec())
///     .build()
///     .await?;
///
/// let session_layer = SessionLayer::new(Arc::new(store));
/// let cookie_layer = CookieManagerLayer::new();
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SessionLayer<B: Backend> {
    store: Arc<Store<B>>,
}

impl<B> SessionLayer<B>
where
    B: Backend,
{
    pub fn new(store: Arc<Store<B>>) -> Self {
        Self { store }
    }
}

impl<S, B> Layer<S> for SessionLayer<B>
where
    B: Backend,
{
    type Service = SessionService<S, B>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            store: Arc::clone(&self.store),
        }
    }
}
