//! Binding of the `apis.v1.search.Search` service.

#[derive(Clone, PartialEq, prost::Message)]
pub struct SearchRequest {
    #[prost(string, tag = "1")]
    pub query: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SearchResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

pub mod search_service {
    use super::{SearchRequest, SearchResponse};

    crate::rpc_service! {
        package "apis.v1.search";
        service Search {
            /// Run a search for `query`.
            rpc Search(SearchRequest) -> SearchResponse as search, sampled_to_local_tracing = true;
            /// Check that the service is reachable.
            rpc Hello(SearchRequest) -> SearchResponse as hello, sampled_to_local_tracing = true;
        }
    }
}
