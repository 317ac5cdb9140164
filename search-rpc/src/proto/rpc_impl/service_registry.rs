use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

use crate::proto::rpc_types;
use crate::proto::rpc_types::descriptor::{
    full_method_name, split_full_method_name, ServiceDefinition,
};
use crate::proto::rpc_types::handler::{
    unimplemented_handler, Handler, MethodHandler, SinkGuard, UnarySink,
};

use super::RpcController;

/// A service definition with exactly one invocation closure per method.
pub struct BoundService {
    definition: Arc<ServiceDefinition>,
    handlers: HashMap<String, MethodHandler>,
}

impl std::fmt::Debug for BoundService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundService")
            .field("service", &self.definition.name())
            .field("methods", &self.handlers.len())
            .finish()
    }
}

impl BoundService {
    pub fn builder(definition: Arc<ServiceDefinition>) -> BoundServiceBuilder {
        BoundServiceBuilder::new(definition)
    }

    pub fn definition(&self) -> &Arc<ServiceDefinition> {
        &self.definition
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub async fn call(
        &self,
        ctrl: RpcController,
        method: &str,
        input: Bytes,
    ) -> rpc_types::error::Result<Bytes> {
        let handler = self.handlers.get(method).ok_or_else(|| {
            rpc_types::error::Error::MethodNotFound(full_method_name(self.name(), method))
        })?;
        handler(ctrl, input).await
    }

    /// Invoke `method` on the current runtime and deliver its outcome to `sink`.
    ///
    /// Must be called from within a tokio runtime. The sink is never completed on the calling
    /// thread, and gets `Disconnected` if the runtime drops the call.
    pub fn route<S>(&self, method: &str, ctrl: RpcController, request: Bytes, sink: S)
    where
        S: UnarySink<Bytes>,
    {
        let route = full_method_name(self.name(), method);
        let guard = SinkGuard::new(route.clone(), sink);
        let Some(handler) = self.handlers.get(method).cloned() else {
            tracing::warn!(service = self.name(), method, "route to unknown method");
            tokio::spawn(async move {
                guard.deliver(Err(rpc_types::error::Error::MethodNotFound(route)));
            });
            return;
        };

        tokio::spawn(async move {
            guard.deliver(handler(ctrl, request).await);
        });
    }
}

#[async_trait::async_trait]
impl Handler for BoundService {
    fn service_definition(&self) -> Arc<ServiceDefinition> {
        self.definition.clone()
    }

    async fn call(
        &self,
        ctrl: RpcController,
        method: &str,
        input: Bytes,
    ) -> rpc_types::error::Result<Bytes> {
        BoundService::call(self, ctrl, method, input).await
    }
}

pub struct BoundServiceBuilder {
    definition: Arc<ServiceDefinition>,
    handlers: HashMap<String, MethodHandler>,
}

impl BoundServiceBuilder {
    pub fn new(definition: Arc<ServiceDefinition>) -> Self {
        Self {
            definition,
            handlers: HashMap::new(),
        }
    }

    /// Bind `handler` to `method`. A later call for the same method replaces the earlier one.
    pub fn add_unary(
        mut self,
        method: &str,
        handler: MethodHandler,
    ) -> rpc_types::error::Result<Self> {
        let route = self.definition.route(method)?;
        if self.handlers.insert(method.to_string(), handler).is_some() {
            tracing::debug!(%route, "replacing handler");
        }
        Ok(self)
    }

    /// Finish binding. Methods without a handler answer every call with `Unimplemented`.
    pub fn build(mut self) -> BoundService {
        for method in self.definition.all() {
            if !self.handlers.contains_key(method.name()) {
                let route = full_method_name(self.definition.name(), method.name());
                self.handlers
                    .insert(method.name().to_string(), unimplemented_handler(route));
            }
        }

        BoundService {
            definition: self.definition,
            handlers: self.handlers,
        }
    }
}

/// Route table from full service name to the handler serving it.
pub struct ServiceRegistry {
    table: DashMap<String, Arc<dyn Handler>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            table: DashMap::new(),
        }
    }

    pub fn replace_registry(&self, registry: &ServiceRegistry) {
        self.table.clear();
        for item in registry.table.iter() {
            let (k, v) = item.pair();
            self.table.insert(k.clone(), v.clone());
        }
    }

    pub fn register<H: Handler>(&self, service: H) {
        let definition = service.service_definition();
        let name = definition.name().to_string();
        tracing::info!(service = %name, methods = definition.all().len(), "register service");
        if self.table.insert(name.clone(), Arc::new(service)).is_some() {
            tracing::warn!(service = %name, "service was already registered, replaced");
        }
    }

    pub fn unregister(&self, service_name: &str) -> Option<()> {
        tracing::info!(service = %service_name, "unregister service");
        self.table.remove(service_name).map(|_| ())
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn get(&self, service_name: &str) -> Option<Arc<dyn Handler>> {
        self.table.get(service_name).map(|e| e.value().clone())
    }

    pub async fn call_method(
        &self,
        route: &str,
        ctrl: RpcController,
        input: Bytes,
    ) -> rpc_types::error::Result<Bytes> {
        let not_found = || rpc_types::error::Error::MethodNotFound(route.to_string());
        let (service_name, method) = split_full_method_name(route).ok_or_else(not_found)?;
        let entry = self.get(service_name).ok_or_else(not_found)?;
        entry.call(ctrl, method, input).await
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
