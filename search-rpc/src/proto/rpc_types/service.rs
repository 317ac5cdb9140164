//! The `rpc_service!` binding generator.
//!
//! Invoke it inside a dedicated module, with the request and response messages in scope:
//!
//! ```ignore
//! pub mod search_service {
//!     use super::{SearchRequest, SearchResponse};
//!
//!     search_rpc::rpc_service! {
//!         package "apis.v1.search";
//!         service Search {
//!             rpc Search(SearchRequest) -> SearchResponse as search, sampled_to_local_tracing = true;
//!             rpc Hello(SearchRequest) -> SearchResponse as hello;
//!         }
//!     }
//! }
//! ```
//!
//! For that module it emits:
//!
//! * `SERVICE_NAME`, the full service name that prefixes every route;
//! * `Service`, the capability trait an implementation provides, where every method defaults to
//!   `Unimplemented`;
//! * `Descriptor` and `Method`, the typed reflection view of the service;
//! * `service_definition()` and `service_descriptor()`, both built once per process;
//! * `bind_service(impl)`, which produces a routable [`BoundService`](crate::proto::rpc_impl::service_registry::BoundService);
//! * `BlockingStub`, `AsyncStub` and `FutureStub`, with `new_blocking_stub`, `new_stub` and
//!   `new_future_stub` constructors.

#[macro_export]
macro_rules! rpc_service {
    (
        package $package:literal;
        $(#[$sattr:meta])*
        service $service:ident {
            $(
                $(#[$mattr:meta])*
                rpc $method:ident($req:ident) -> $resp:ident as $fn_name:ident
                    $(, sampled_to_local_tracing = $sampled:literal)?;
            )*
        }
    ) => {
        pub const PACKAGE: &str = $package;
        pub const SERVICE_NAME: &str = concat!($package, ".", stringify!($service));

        $(#[$sattr])*
        #[$crate::proto::rpc_types::__rt::async_trait]
        pub trait Service: Send + Sync + 'static {
            $(
                $(#[$mattr])*
                async fn $fn_name(
                    &self,
                    _ctrl: $crate::proto::rpc_impl::RpcController,
                    _input: $req,
                ) -> $crate::proto::rpc_types::error::Result<$resp> {
                    Err($crate::proto::rpc_types::error::Error::Unimplemented(
                        <Method as $crate::proto::rpc_types::descriptor::MethodDescriptor>::full_name(
                            &Method::$method,
                        ),
                    ))
                }
            )*
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Method {
            $($method,)*
        }

        impl $crate::proto::rpc_types::descriptor::MethodDescriptor for Method {
            fn name(&self) -> &'static str {
                match self {
                    $(Method::$method => stringify!($fn_name),)*
                }
            }

            fn proto_name(&self) -> &'static str {
                match self {
                    $(Method::$method => stringify!($method),)*
                }
            }

            fn input_type(&self) -> ::std::any::TypeId {
                match self {
                    $(Method::$method => ::std::any::TypeId::of::<$req>(),)*
                }
            }

            fn input_proto_type(&self) -> &'static str {
                match self {
                    $(Method::$method => concat!($package, ".", stringify!($req)),)*
                }
            }

            fn output_type(&self) -> ::std::any::TypeId {
                match self {
                    $(Method::$method => ::std::any::TypeId::of::<$resp>(),)*
                }
            }

            fn output_proto_type(&self) -> &'static str {
                match self {
                    $(Method::$method => concat!($package, ".", stringify!($resp)),)*
                }
            }

            fn full_name(&self) -> String {
                $crate::proto::rpc_types::descriptor::full_method_name(
                    SERVICE_NAME,
                    $crate::proto::rpc_types::descriptor::MethodDescriptor::proto_name(self),
                )
            }
        }

        impl Method {
            /// The process-wide transport handle of this method, built on first use.
            pub fn handle(
                &self,
            ) -> $crate::proto::rpc_types::error::Result<
                ::std::sync::Arc<$crate::proto::rpc_impl::handle_cache::MethodHandle>,
            > {
                $crate::proto::rpc_impl::handle_cache::HandleCache::global().handle_for(
                    &service_definition(),
                    $crate::proto::rpc_types::descriptor::MethodDescriptor::proto_name(self),
                )
            }
        }

        #[derive(Clone, Copy, Debug, Default)]
        pub struct Descriptor;

        impl $crate::proto::rpc_types::descriptor::ServiceDescriptor for Descriptor {
            type Method = Method;

            fn name(&self) -> &'static str {
                stringify!($service)
            }

            fn proto_name(&self) -> &'static str {
                SERVICE_NAME
            }

            fn package(&self) -> &'static str {
                PACKAGE
            }

            fn methods(&self) -> &'static [Method] {
                &[$(Method::$method,)*]
            }

            fn definition(
                &self,
            ) -> ::std::sync::Arc<$crate::proto::rpc_types::descriptor::ServiceDefinition> {
                service_definition()
            }
        }

        /// The service's method registry.
        ///
        /// # Panics
        ///
        /// If the generated method list is not a valid definition, e.g. a method name contains a
        /// `/`.
        pub fn service_definition(
        ) -> ::std::sync::Arc<$crate::proto::rpc_types::descriptor::ServiceDefinition> {
            static DEFINITION: $crate::proto::rpc_types::__rt::Lazy<
                ::std::sync::Arc<$crate::proto::rpc_types::descriptor::ServiceDefinition>,
            > = $crate::proto::rpc_types::__rt::Lazy::new(|| {
                $crate::proto::rpc_types::descriptor::ServiceDefinition::define(
                    SERVICE_NAME,
                    vec![$(
                        $crate::proto::rpc_types::descriptor::MethodDefinition::unary(
                            stringify!($method),
                            concat!($package, ".", stringify!($req)),
                            concat!($package, ".", stringify!($resp)),
                        )
                        .sampled_to_local_tracing(false $(|| $sampled)?),
                    )*],
                )
                .unwrap_or_else(|e| panic!("invalid service {}: {}", SERVICE_NAME, e))
            });
            DEFINITION.clone()
        }

        /// Reflection metadata of the service, built on first access.
        pub fn service_descriptor(
        ) -> ::std::sync::Arc<$crate::proto::rpc_impl::reflection::ServiceSchema> {
            static CACHE: $crate::proto::rpc_impl::reflection::DescriptorCache =
                $crate::proto::rpc_impl::reflection::DescriptorCache::new();
            CACHE.get_or_build(|| {
                $crate::proto::rpc_impl::reflection::ServiceSchema::from_definition(
                    &service_definition(),
                )
            })
        }

        /// Bind every method of `service` into a routable service.
        pub fn bind_service<S: Service>(
            service: S,
        ) -> $crate::proto::rpc_types::error::Result<
            $crate::proto::rpc_impl::service_registry::BoundService,
        > {
            let service = ::std::sync::Arc::new(service);
            let builder =
                $crate::proto::rpc_impl::service_registry::BoundService::builder(service_definition());
            $(
                let builder = {
                    let service = service.clone();
                    builder.add_unary(
                        stringify!($method),
                        $crate::proto::rpc_types::handler::unary_handler(
                            move |ctrl, input: $req| {
                                let service = service.clone();
                                async move { service.$fn_name(ctrl, input).await }
                            },
                        ),
                    )?
                };
            )*
            Ok(builder.build())
        }

        /// Stub whose calls block the calling thread until the response arrives.
        #[derive(Clone, Debug)]
        pub struct BlockingStub {
            inner: $crate::proto::rpc_impl::client::BlockingStub,
        }

        impl BlockingStub {
            pub fn new(channel: $crate::proto::rpc_impl::channel::ChannelHandle) -> Self {
                Self {
                    inner: $crate::proto::rpc_impl::client::BlockingStub::new(
                        channel,
                        service_definition(),
                    ),
                }
            }

            pub fn with_options(&self, options: $crate::proto::rpc_impl::RpcController) -> Self {
                Self {
                    inner: self.inner.with_options(options),
                }
            }

            $(
                $(#[$mattr])*
                pub fn $fn_name(
                    &self,
                    request: $req,
                ) -> $crate::proto::rpc_types::error::Result<$resp> {
                    self.inner.call(stringify!($method), request)
                }
            )*
        }

        /// Stub whose calls return at once and report their outcome to a sink.
        #[derive(Clone, Debug)]
        pub struct AsyncStub {
            inner: $crate::proto::rpc_impl::client::AsyncStub,
        }

        impl AsyncStub {
            pub fn new(channel: $crate::proto::rpc_impl::channel::ChannelHandle) -> Self {
                Self {
                    inner: $crate::proto::rpc_impl::client::AsyncStub::new(
                        channel,
                        service_definition(),
                    ),
                }
            }

            pub fn with_options(&self, options: $crate::proto::rpc_impl::RpcController) -> Self {
                Self {
                    inner: self.inner.with_options(options),
                }
            }

            $(
                $(#[$mattr])*
                pub fn $fn_name(
                    &self,
                    request: $req,
                    sink: impl $crate::proto::rpc_types::handler::UnarySink<$resp>,
                ) {
                    self.inner.call::<$req, $resp, _>(stringify!($method), request, sink)
                }
            )*
        }

        /// Stub whose calls return a cancellable future.
        #[derive(Clone, Debug)]
        pub struct FutureStub {
            inner: $crate::proto::rpc_impl::client::FutureStub,
        }

        impl FutureStub {
            pub fn new(channel: $crate::proto::rpc_impl::channel::ChannelHandle) -> Self {
                Self {
                    inner: $crate::proto::rpc_impl::client::FutureStub::new(
                        channel,
                        service_definition(),
                    ),
                }
            }

            pub fn with_options(&self, options: $crate::proto::rpc_impl::RpcController) -> Self {
                Self {
                    inner: self.inner.with_options(options),
                }
            }

            $(
                $(#[$mattr])*
                pub fn $fn_name(
                    &self,
                    request: $req,
                ) -> $crate::proto::rpc_impl::future::UnaryFuture<$resp> {
                    self.inner.call(stringify!($method), request)
                }
            )*
        }

        pub fn new_blocking_stub(channel: $crate::proto::rpc_impl::channel::ChannelHandle) -> BlockingStub {
            BlockingStub::new(channel)
        }

        pub fn new_stub(channel: $crate::proto::rpc_impl::channel::ChannelHandle) -> AsyncStub {
            AsyncStub::new(channel)
        }

        pub fn new_future_stub(channel: $crate::proto::rpc_impl::channel::ChannelHandle) -> FutureStub {
            FutureStub::new(channel)
        }
    };
}
