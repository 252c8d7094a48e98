//! Request dispatcher.
//!
//! The dispatcher is the wire-facing entry point. Whatever happens while a
//! request is resolved, invoked, scheduled or encoded, the caller receives a
//! response: either the handler's, or a fault built from the failure.
//!
//! # Flow
//!
//! ```text
//! bytes ─► MessageContext::decode_request ─┐ (decode error ─► fault, handle 0)
//!                                          ▼
//!          ServiceRegistry::resolve ───────┤ (miss ─► BadServiceUnsupported)
//!                                          ▼
//!          no scheduler: handler inline in channel scope
//!          scheduler:    PendingOperation ─► Scheduler, wait until deadline
//!                                          ▼
//!          MessageContext::encode_response ─► bytes, tagged with channel id
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::bridge::{PendingOperation, Scheduler, WorkerPoolScheduler};
use crate::channel::{EndpointDescription, SecureChannelContext};
use crate::codec::{MessageContext, MsgPackCodec};
use crate::config::DispatcherConfig;
use crate::error::{DispatchError, Result};
use crate::fault::FaultBuilder;
use crate::handler::{invoke, Handler, HandlerResult, RequestContext, ServiceRegistry};
use crate::protocol::{
    build_frame, flags, Header, ResponseHeader, ResponseMessageRef, ServiceRequest,
    ServiceResponse, RESERVED_TYPE_ID,
};

/// Builder for [`RequestDispatcher`].
///
/// Registration errors do not break the chain; the first one is returned
/// from [`build`](Self::build).
pub struct DispatcherBuilder {
    registry: ServiceRegistry,
    context: MessageContext,
    config: DispatcherConfig,
    scheduler: Option<Arc<dyn Scheduler>>,
    worker_pool: bool,
    error: Option<DispatchError>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            registry: ServiceRegistry::new(),
            context: MessageContext::standard(),
            config: DispatcherConfig::default(),
            scheduler: None,
            worker_pool: false,
            error: None,
        }
    }

    /// Register a typed service. See [`ServiceRegistry::register`].
    pub fn service<F, T, R, Fut>(mut self, type_id: u32, name: &str, handler: F) -> Self
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: serde::de::DeserializeOwned + Send + 'static,
        R: serde::Serialize + Send + 'static,
        Fut: std::future::Future<Output = Result<R>> + Send + 'static,
    {
        let result = self.registry.register(type_id, name, handler);
        self.record(result)
    }

    /// Register a service that builds its own response.
    pub fn raw_service<F, Fut>(mut self, type_id: u32, name: &str, handler: F) -> Self
    where
        F: Fn(ServiceRequest, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        let result = self.registry.register_raw(type_id, name, handler);
        self.record(result)
    }

    /// Register any [`Handler`] implementation.
    pub fn handler(mut self, type_id: u32, name: &str, handler: Arc<dyn Handler>) -> Self {
        let result = self.registry.register_handler(type_id, name, handler);
        self.record(result)
    }

    /// Replace the message context. Registered services are added to it
    /// on build.
    pub fn message_context(mut self, context: MessageContext) -> Self {
        self.context = context;
        self
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the wait used when a request's timeout hint is 0.
    pub fn default_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.default_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the clamp for client timeout hints.
    pub fn max_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.max_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn max_message_size(mut self, size: u32) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Route requests through an external scheduler.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self.worker_pool = false;
        self
    }

    /// Route requests through a [`WorkerPoolScheduler`] sized from the
    /// config. Must be built inside a tokio runtime.
    pub fn worker_pool(mut self) -> Self {
        self.scheduler = None;
        self.worker_pool = true;
        self
    }

    fn record(mut self, result: Result<()>) -> Self {
        if let Err(e) = result {
            warn!(error = %e, "service registration failed");
            self.error.get_or_insert(e);
        }
        self
    }

    /// Build the dispatcher.
    ///
    /// # Errors
    ///
    /// - the first registration error, such as [`DispatchError::DuplicateService`]
    /// - [`DispatchError::Config`] for an invalid config
    /// - worker pool startup errors
    pub fn build(self) -> Result<RequestDispatcher> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.config.validate()?;

        let mut context = self.context.with_max_message_size(self.config.max_message_size);
        for service in self.registry.services() {
            if !context.knows_type(service.type_id()) {
                context.register_type(service.type_id(), service.name(), 0);
            }
        }
        let fallback = MessageContext::fallback().with_max_message_size(self.config.max_message_size);

        let scheduler = match (self.scheduler, self.worker_pool) {
            (Some(scheduler), _) => Some(scheduler),
            (None, true) => Some(Arc::new(WorkerPoolScheduler::spawn(
                self.config.scheduler_workers,
                self.config.scheduler_queue_capacity,
            )?) as Arc<dyn Scheduler>),
            (None, false) => None,
        };

        debug!(
            services = self.registry.len(),
            scheduled = scheduler.is_some(),
            "dispatcher built"
        );

        Ok(RequestDispatcher {
            registry: Arc::new(self.registry),
            context: Arc::new(context),
            fallback: Arc::new(fallback),
            scheduler,
            config: self.config,
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes requests to handlers and turns every outcome into a response.
///
/// Cheap to clone; clones share the registry, contexts and scheduler.
#[derive(Clone)]
pub struct RequestDispatcher {
    registry: Arc<ServiceRegistry>,
    context: Arc<MessageContext>,
    fallback: Arc<MessageContext>,
    scheduler: Option<Arc<dyn Scheduler>>,
    config: DispatcherConfig,
}

impl RequestDispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    #[inline]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    #[inline]
    pub fn message_context(&self) -> &MessageContext {
        &self.context
    }

    #[inline]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// True when requests go through a scheduler.
    #[inline]
    pub fn is_scheduled(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Dispatch a decoded request. Never fails: errors become faults.
    pub async fn dispatch(
        &self,
        request: ServiceRequest,
        channel: impl Into<Arc<SecureChannelContext>>,
    ) -> ServiceResponse {
        let type_id = request.type_id;
        let header = request.header.clone();
        match self.try_dispatch(request, channel.into()).await {
            Ok(response) => response,
            Err(e) => FaultBuilder::build(type_id, Some(&header), &e),
        }
    }

    async fn try_dispatch(
        &self,
        request: ServiceRequest,
        channel: Arc<SecureChannelContext>,
    ) -> HandlerResult {
        let handler = self.registry.resolve(request.type_id)?;
        debug!(
            type_id = request.type_id,
            request_handle = request.header.request_handle,
            channel_id = channel.channel_id(),
            scheduled = self.scheduler.is_some(),
            "dispatching request"
        );

        match &self.scheduler {
            None => {
                let runtime = Handle::try_current().map_err(|e| {
                    DispatchError::Internal(format!("No runtime for handler: {e}"))
                })?;
                invoke(&runtime, handler, request, channel).await
            }
            Some(scheduler) => {
                let deadline = Instant::now() + self.config.timeout_for_hint(request.header.timeout_hint);
                let (op, waiter) = PendingOperation::new(request, channel, handler, deadline)?;
                op.mark_queued();
                scheduler.schedule(op);
                waiter.wait().await
            }
        }
    }

    /// Decode, dispatch and encode one message.
    ///
    /// The reply always carries `channel_id`. Payloads that fail to decode
    /// get a fault with request handle 0, encoded with the fallback
    /// context; responses that fail to encode are replaced by a fault.
    pub async fn dispatch_encoded(
        &self,
        payload: &[u8],
        channel_id: u32,
        endpoint: EndpointDescription,
    ) -> Bytes {
        let request = match self.context.decode_request(payload) {
            Ok(request) => request,
            Err(e) => {
                let type_id = Header::decode(payload).map_or(RESERVED_TYPE_ID, |h| h.type_id);
                let fault = FaultBuilder::build(type_id, None, &e);
                return Self::encode_fault(&self.fallback, &fault, channel_id);
            }
        };

        let header = request.header.clone();
        let channel = SecureChannelContext::new(channel_id, endpoint);
        let response = self.dispatch(request, channel).await;

        match self.context.encode_response(&response, channel_id) {
            Ok(bytes) => bytes,
            Err(e) => {
                let fault = FaultBuilder::build(response.type_id, Some(&header), &e);
                Self::encode_fault(&self.context, &fault, channel_id)
            }
        }
    }

    fn encode_fault(context: &MessageContext, fault: &ServiceResponse, channel_id: u32) -> Bytes {
        match context.encode_response(fault, channel_id) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(type_id = fault.type_id, error = %e, "fault encoding failed, sending bare fault");
                Self::bare_fault(fault, channel_id)
            }
        }
    }

    /// Header-only fault: status and handle, nothing else.
    fn bare_fault(fault: &ServiceResponse, channel_id: u32) -> Bytes {
        let header = Header::new(fault.type_id, flags::RESPONSE, channel_id, 0);
        let bare = ResponseHeader {
            timestamp: fault.header.timestamp,
            request_handle: fault.header.request_handle,
            service_result: fault.header.service_result,
            service_diagnostics: None,
            string_table: Vec::new(),
        };
        let body = MsgPackCodec::encode(&ResponseMessageRef {
            header: &bare,
            body: &[],
        })
        .unwrap_or_default();
        build_frame(&header, &body)
    }
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("services", &self.registry.len())
            .field("scheduled", &self.scheduler.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
