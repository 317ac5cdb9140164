//! Service and method definitions.
//!
//! A [`ServiceDefinition`] is the immutable, ordered description of a service that every stub and
//! binder is built from. The [`ServiceDescriptor`] and [`MethodDescriptor`] traits are the typed
//! view of the same information, implemented by code generated with `rpc_service!`.
use std::any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::error::{Error, Result};

/// Streaming semantics of a method. Only unary calls are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// One request, exactly one response.
    Unary,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::Unary => write!(f, "UNARY"),
        }
    }
}

/// Opaque name of a request or response type, e.g. `apis.v1.search.SearchRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(name: impl Into<String>) -> Self {
        TypeTag(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeTag {
    fn from(s: &str) -> Self {
        TypeTag(s.to_string())
    }
}

impl From<String> for TypeTag {
    fn from(s: String) -> Self {
        TypeTag(s)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDefinition {
    name: String,
    request_type: TypeTag,
    response_type: TypeTag,
    kind: MethodKind,
    sampled_to_local_tracing: bool,
}

impl MethodDefinition {
    pub fn unary(
        name: impl Into<String>,
        request_type: impl Into<TypeTag>,
        response_type: impl Into<TypeTag>,
    ) -> Self {
        Self {
            name: name.into(),
            request_type: request_type.into(),
            response_type: response_type.into(),
            kind: MethodKind::Unary,
            sampled_to_local_tracing: false,
        }
    }

    /// Run client calls of this method inside a tracing span named after the route.
    pub fn sampled_to_local_tracing(mut self, sampled: bool) -> Self {
        self.sampled_to_local_tracing = sampled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_type(&self) -> &TypeTag {
        &self.request_type
    }

    pub fn response_type(&self) -> &TypeTag {
        &self.response_type
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn is_sampled_to_local_tracing(&self) -> bool {
        self.sampled_to_local_tracing
    }
}

/// Build the wire route of a method: `{service}/{method}`.
pub fn full_method_name(service_name: &str, method_name: &str) -> String {
    format!("{}/{}", service_name, method_name)
}

/// Split a route into its service and method parts.
pub fn split_full_method_name(route: &str) -> Option<(&str, &str)> {
    let (service, method) = route.rsplit_once('/')?;
    if service.is_empty() || method.is_empty() {
        return None;
    }
    Some((service, method))
}

fn check_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidServiceDefinition(format!(
            "{} name cannot be empty",
            what
        )));
    }
    if name.contains('/') || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidServiceDefinition(format!(
            "{} name {:?} contains '/' or whitespace",
            what, name
        )));
    }
    Ok(())
}

/// Immutable description of a service: its full name and its methods in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    name: String,
    methods: Vec<MethodDefinition>,
    index: HashMap<String, usize>,
}

impl ServiceDefinition {
    /// Define a service. Fails without building anything if two methods share a name.
    pub fn define(
        name: impl Into<String>,
        methods: impl IntoIterator<Item = MethodDefinition>,
    ) -> Result<Arc<Self>> {
        let name = name.into();
        check_name("service", &name)?;

        let methods: Vec<MethodDefinition> = methods.into_iter().collect();
        let mut index = HashMap::with_capacity(methods.len());
        for (i, method) in methods.iter().enumerate() {
            check_name("method", method.name())?;
            if index.insert(method.name().to_string(), i).is_some() {
                return Err(Error::DuplicateMethodName(method.name().to_string()));
            }
        }

        Ok(Arc::new(Self {
            name,
            methods,
            index,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookup(&self, method_name: &str) -> Option<&MethodDefinition> {
        self.index.get(method_name).map(|&i| &self.methods[i])
    }

    pub fn all(&self) -> &[MethodDefinition] {
        &self.methods
    }

    pub fn route(&self, method_name: &str) -> Result<String> {
        let method = self
            .lookup(method_name)
            .ok_or_else(|| Error::MethodNotFound(full_method_name(&self.name, method_name)))?;
        Ok(full_method_name(&self.name, method.name()))
    }
}

/// A descriptor for an available RPC service.
///
/// These traits are built on the assumption that some form of code generation is being used (e.g.
/// using only `&'static str`s) but it's of course possible to implement these traits manually.
pub trait ServiceDescriptor: Clone + fmt::Debug + Send + Sync + 'static {
    /// The associated type of method descriptors.
    type Method: MethodDescriptor;

    /// The name of the service, used in Rust code and perhaps for human readability.
    fn name(&self) -> &'static str;

    /// The fully qualified name of the service, `{package}.{name}`.
    fn proto_name(&self) -> &'static str;

    /// The package name of the service.
    fn package(&self) -> &'static str {
        ""
    }

    /// All of the available methods on the service.
    fn methods(&self) -> &'static [Self::Method];

    /// The memoized runtime definition of the service.
    fn definition(&self) -> Arc<ServiceDefinition>;
}

/// A descriptor for a method available on an RPC service.
pub trait MethodDescriptor: Clone + Copy + fmt::Debug + Send + Sync + 'static {
    /// The name of the method, used in Rust code.
    fn name(&self) -> &'static str;

    /// The raw protobuf name of the method, used in the route.
    fn proto_name(&self) -> &'static str;

    /// The Rust `TypeId` for the input that this method accepts.
    fn input_type(&self) -> any::TypeId;

    /// The raw protobuf name for the input type that this method accepts.
    fn input_proto_type(&self) -> &'static str;

    /// The Rust `TypeId` for the output that this method produces.
    fn output_type(&self) -> any::TypeId;

    /// The raw protobuf name for the output type that this method produces.
    fn output_proto_type(&self) -> &'static str;

    /// The route of the method, `{service}/{method}`.
    fn full_name(&self) -> String;
}
