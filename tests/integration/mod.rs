//! Integration tests for the namespace mirror

mod indexer_aggregation;
mod local_namespace;
mod processor_events;
mod scenario;
mod support;
