//! Reflection metadata for bound services.
//!
//! Nothing in the call path reads these descriptors; they exist for introspection and tracing
//! tools.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::proto::rpc_types::descriptor::{
    full_method_name, MethodKind, ServiceDefinition, TypeTag,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSchema {
    pub name: String,
    pub full_method_name: String,
    pub request_type: TypeTag,
    pub response_type: TypeTag,
    pub kind: MethodKind,
    pub sampled_to_local_tracing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSchema {
    pub full_name: String,
    pub package: String,
    pub name: String,
    pub methods: Vec<MethodSchema>,
}

impl ServiceSchema {
    pub fn from_definition(def: &ServiceDefinition) -> Self {
        let (package, name) = match def.name().rsplit_once('.') {
            Some((package, name)) => (package.to_string(), name.to_string()),
            None => (String::new(), def.name().to_string()),
        };

        let methods = def
            .all()
            .iter()
            .map(|m| MethodSchema {
                name: m.name().to_string(),
                full_method_name: full_method_name(def.name(), m.name()),
                request_type: m.request_type().clone(),
                response_type: m.response_type().clone(),
                kind: m.kind(),
                sampled_to_local_tracing: m.is_sampled_to_local_tracing(),
            })
            .collect();

        Self {
            full_name: def.name().to_string(),
            package,
            name,
            methods,
        }
    }

    pub fn find_method_by_name(&self, name: &str) -> Option<&MethodSchema> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Holds one [`ServiceSchema`], built on first access.
pub struct DescriptorCache {
    cell: OnceCell<Arc<ServiceSchema>>,
    builds: AtomicUsize,
}

impl DescriptorCache {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn get_or_build<F>(&self, build: F) -> Arc<ServiceSchema>
    where
        F: FnOnce() -> ServiceSchema,
    {
        self.cell
            .get_or_init(|| {
                self.builds.fetch_add(1, Ordering::Relaxed);
                let schema = build();
                tracing::trace!(service = %schema.full_name, "service descriptor built");
                Arc::new(schema)
            })
            .clone()
    }

    pub fn get(&self) -> Option<Arc<ServiceSchema>> {
        self.cell.get().cloned()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

impl Default for DescriptorCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use super::*;
    use crate::proto::rpc_types::descriptor::MethodDefinition;

    fn definition() -> Arc<ServiceDefinition> {
        ServiceDefinition::define(
            "apis.v1.search.Search",
            vec![
                MethodDefinition::unary("Search", "SearchRequest", "SearchResponse")
                    .sampled_to_local_tracing(true),
                MethodDefinition::unary("Hello", "SearchRequest", "SearchResponse"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn schema_mirrors_definition() {
        let schema = ServiceSchema::from_definition(&definition());
        assert_eq!(schema.package, "apis.v1.search");
        assert_eq!(schema.name, "Search");
        assert_eq!(schema.methods.len(), 2);

        let hello = schema.find_method_by_name("Hello").unwrap();
        assert_eq!(hello.full_method_name, "apis.v1.search.Search/Hello");
        assert!(!hello.sampled_to_local_tracing);
        assert!(schema.find_method_by_name("Search").unwrap().sampled_to_local_tracing);
        assert!(schema.find_method_by_name("Goodbye").is_none());
    }

    #[test]
    fn built_once_under_concurrent_access() {
        const N: usize = 12;
        static CACHE: DescriptorCache = DescriptorCache::new();
        assert!(CACHE.get().is_none());

        let def = definition();
        let barrier = Barrier::new(N);
        let schemas: Vec<Arc<ServiceSchema>> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..N)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        CACHE.get_or_build(|| {
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            ServiceSchema::from_definition(&def)
                        })
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(CACHE.builds(), 1);
        assert!(schemas.iter().all(|s| Arc::ptr_eq(s, &schemas[0])));
    }
}
