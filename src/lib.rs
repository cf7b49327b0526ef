//! nsmirror: Namespace Metadata Mirror
//!
//! Mirrors the metadata of a hierarchical namespace into a flat document
//! collection. An initial bulk walk records every entry together with the
//! aggregated disk usage of each directory; a polling processor then applies the
//! namespace's change events to keep the mirror and its disk usage current.

pub mod config;
pub mod error;
pub mod event;
pub mod indexer;
pub mod inode;
pub mod logging;
pub mod manager;
pub mod namespace;
pub mod path;
pub mod processor;
pub mod store;
pub mod tooling;

pub use error::{MirrorError, NamespaceError, Result};
pub use inode::{Inode, InodeKind};
pub use path::InodePath;
pub use store::MetadataStore;
