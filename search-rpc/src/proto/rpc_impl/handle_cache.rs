//! Lazily constructed, process-wide method handles.
//!
//! The first caller for a method builds its [`MethodHandle`]; every later or concurrent caller gets
//! the same `Arc`. Slots are keyed by route and the full method definition, so two definitions that
//! share a service name but differ in type tags or tracing flags never share a handle. A failed construction is handed to every caller that waited on that attempt, and
//! the attempt is then evicted so the next call starts over.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};

use crate::proto::rpc_types::descriptor::{
    full_method_name, MethodDefinition, ServiceDefinition, TypeTag,
};
use crate::proto::rpc_types::error::{Error, HandleConstructionError, Result};

static GLOBAL_HANDLE_CACHE: Lazy<HandleCache> = Lazy::new(HandleCache::new);

/// Transport-level metadata for one method, built once per process.
#[derive(Debug, PartialEq, Eq)]
pub struct MethodHandle {
    service_name: String,
    full_method_name: String,
    method: MethodDefinition,
}

impl MethodHandle {
    pub fn new(
        service: &ServiceDefinition,
        method: &MethodDefinition,
    ) -> std::result::Result<Self, HandleConstructionError> {
        let route = full_method_name(service.name(), method.name());
        if !route.chars().all(|c| c.is_ascii_graphic()) {
            return Err(HandleConstructionError {
                reason: "route must be printable ascii".to_string(),
                route,
            });
        }

        Ok(Self {
            service_name: service.name().to_string(),
            full_method_name: route,
            method: method.clone(),
        })
    }

    pub fn full_method_name(&self) -> &str {
        &self.full_method_name
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn method_name(&self) -> &str {
        self.method.name()
    }

    pub fn request_type(&self) -> &TypeTag {
        self.method.request_type()
    }

    pub fn response_type(&self) -> &TypeTag {
        self.method.response_type()
    }

    pub fn is_sampled_to_local_tracing(&self) -> bool {
        self.method.is_sampled_to_local_tracing()
    }
}

pub type HandleFactory = Box<
    dyn Fn(
            &ServiceDefinition,
            &MethodDefinition,
        ) -> std::result::Result<MethodHandle, HandleConstructionError>
        + Send
        + Sync,
>;

type Attempt = Arc<OnceCell<std::result::Result<Arc<MethodHandle>, HandleConstructionError>>>;

type SlotKey = (String, MethodDefinition);

pub struct HandleCache {
    slots: DashMap<SlotKey, Attempt>,
    factory: HandleFactory,
    constructions: AtomicUsize,
}

impl HandleCache {
    pub fn new() -> Self {
        Self::with_factory(Box::new(MethodHandle::new))
    }

    pub fn with_factory(factory: HandleFactory) -> Self {
        Self {
            slots: DashMap::new(),
            factory,
            constructions: AtomicUsize::new(0),
        }
    }

    /// The cache shared by every stub in the process.
    pub fn global() -> &'static HandleCache {
        &GLOBAL_HANDLE_CACHE
    }

    pub fn handle_for(
        &self,
        service: &ServiceDefinition,
        method_name: &str,
    ) -> Result<Arc<MethodHandle>> {
        let method = service
            .lookup(method_name)
            .ok_or_else(|| Error::MethodNotFound(full_method_name(service.name(), method_name)))?;
        let route = full_method_name(service.name(), method.name());
        let key = (route.clone(), method.clone());

        if let Some(attempt) = self.slots.get(&key) {
            if let Some(Ok(handle)) = attempt.get() {
                return Ok(handle.clone());
            }
        }

        let attempt = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        let ret = attempt
            .get_or_init(|| {
                self.constructions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%route, "constructing method handle");
                (self.factory)(service, method).map(Arc::new)
            })
            .clone();

        if let Err(err) = &ret {
            tracing::warn!(?err, "method handle construction failed");
            self.slots
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &attempt));
        }

        Ok(ret?)
    }

    /// Number of constructions attempted so far, failed ones included.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for HandleCache {
    fn default() -> Self {
        Self::new()
    }
}
