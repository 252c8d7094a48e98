//! Service registry for dispatching requests by type ID.
//!
//! The registry maps request type identifiers to handlers. It is filled
//! once while the server is being built and never changes afterwards, so
//! any number of concurrent dispatches may read it without locking.
//! Registering the same type ID twice is rejected.
//!
//! # Example
//!
//! ```
//! use ua_dispatch::handler::ServiceRegistry;
//!
//! let mut registry = ServiceRegistry::new();
//!
//! registry
//!     .register(631, "ReadRequest", |node_ids: Vec<String>, _ctx| async move {
//!         Ok(node_ids.len() as u32)
//!     })
//!     .unwrap();
//!
//! assert!(registry.contains(631));
//! assert!(registry.register(631, "ReadRequest", |_: (), _ctx| async { Ok(()) }).is_err());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::debug;

use super::RequestContext;
use crate::channel::{scope, SecureChannelContext};
use crate::error::{DispatchError, Result};
use crate::protocol::{ServiceRequest, ServiceResponse};

/// Result type for handler invocations.
pub type HandlerResult = Result<ServiceResponse>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for service handlers.
pub trait Handler: Send + Sync + 'static {
    /// Service a decoded request.
    fn call(&self, request: ServiceRequest, ctx: RequestContext) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that decodes the service body before calling the handler and
/// encodes its return value as a good response.
pub struct TypedHandler<F, T, R, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> (Fut, R)>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    fn call(&self, request: ServiceRequest, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match request.decode_body() {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let fut = (self.handler)(parsed, ctx);
        Box::pin(async move {
            let body = fut.await?;
            ServiceResponse::with_body(&request, &body)
        })
    }
}

/// Wrapper for handlers that build the whole response themselves.
pub struct RawHandler<F, Fut>
where
    F: Fn(ServiceRequest, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> RawHandler<F, Fut>
where
    F: Fn(ServiceRequest, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Handler for RawHandler<F, Fut>
where
    F: Fn(ServiceRequest, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: ServiceRequest, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(request, ctx))
    }
}

/// A registered service.
#[derive(Clone)]
pub struct ServiceDescriptor {
    type_id: u32,
    name: String,
    handler: Arc<dyn Handler>,
}

impl ServiceDescriptor {
    #[inline]
    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("type_id", &self.type_id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registry mapping request type IDs to services.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<u32, ServiceDescriptor>,
}

impl ServiceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed service handler.
    ///
    /// # Arguments
    ///
    /// * `type_id` - Request type identifier
    /// * `name` - Service name, used in logs and the message context
    /// * `handler` - Function taking (T, RequestContext) and returning `Result<R>`
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DuplicateService`] if `type_id` is taken.
    pub fn register<F, T, R, Fut>(&mut self, type_id: u32, name: &str, handler: F) -> Result<()>
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.register_handler(type_id, name, Arc::new(TypedHandler::new(handler)))
    }

    /// Register a handler that builds its own [`ServiceResponse`].
    pub fn register_raw<F, Fut>(&mut self, type_id: u32, name: &str, handler: F) -> Result<()>
    where
        F: Fn(ServiceRequest, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_handler(type_id, name, Arc::new(RawHandler::new(handler)))
    }

    /// Register any [`Handler`] implementation.
    pub fn register_handler(
        &mut self,
        type_id: u32,
        name: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        if self.services.contains_key(&type_id) {
            return Err(DispatchError::DuplicateService(type_id));
        }
        debug!(type_id, service = name, "service registered");
        self.services.insert(
            type_id,
            ServiceDescriptor {
                type_id,
                name: name.to_string(),
                handler,
            },
        );
        Ok(())
    }

    /// Get a service by type ID.
    pub fn get(&self, type_id: u32) -> Option<&ServiceDescriptor> {
        self.services.get(&type_id)
    }

    /// Resolve the handler for a type ID.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ServiceUnsupported`] if nothing is registered.
    pub fn resolve(&self, type_id: u32) -> Result<Arc<dyn Handler>> {
        self.get(type_id)
            .map(|d| Arc::clone(&d.handler))
            .ok_or(DispatchError::ServiceUnsupported(type_id))
    }

    pub fn contains(&self, type_id: u32) -> bool {
        self.services.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Iterate over registered services (unordered).
    pub fn services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.values()
    }
}

/// Run `handler` on its own task inside the channel scope of `channel`.
///
/// A panicking handler surfaces as [`DispatchError::Unexpected`]; the
/// caller's task never unwinds.
pub(crate) async fn invoke(
    runtime: &Handle,
    handler: Arc<dyn Handler>,
    request: ServiceRequest,
    channel: Arc<SecureChannelContext>,
) -> HandlerResult {
    let ctx = RequestContext::new(request.type_id, request.header.clone(), Arc::clone(&channel));
    let task = runtime.spawn(scope(channel, async move { handler.call(request, ctx).await }));
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(DispatchError::unexpected(format!("handler panicked: {e}"))),
        Err(e) => Err(DispatchError::Internal(format!("handler task cancelled: {e}"))),
    }
}
