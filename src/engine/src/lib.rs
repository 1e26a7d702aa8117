//! # Warden Engine
//!
//! A permission and metadata policy engine. Given a subject (a user or
//! group) and a set of evaluation contexts, it computes whether a named
//! permission is allowed, denied or undecided, and resolves contextual
//! metadata (prefix, suffix, arbitrary meta, weight) by walking a
//! group-inheritance graph with deterministic tie-break rules. Results are
//! memoized per subject per context-combination and stay consistent under
//! concurrent mutation and background recomputation.
//!
//! Persistence, messaging and platform integration live outside this crate;
//! they feed node collections in through [`model::PermissionHolder`] and
//! deliver "something changed" signals to [`cacheddata::CachedDataManager`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use uuid::Uuid;
//! use warden_engine::cacheddata::{CachedDataManager, EngineContext};
//! use warden_engine::model::{DataType, InMemoryGroupRegistry, InMemoryTrackRegistry, User};
//! use warden_engine::node::Node;
//! use warden_engine::query::QueryOptions;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let groups = Arc::new(InMemoryGroupRegistry::new());
//! let tracks = Arc::new(InMemoryTrackRegistry::new());
//! let ctx = Arc::new(EngineContext::new(groups.clone(), tracks));
//!
//! let admin = groups.get_or_create("admin");
//! admin.holder().nodes(DataType::Enduring).add(Node::permission("admin.tools").build());
//!
//! let user = Arc::new(User::new(Uuid::new_v4(), Some("alice")));
//! user.holder().nodes(DataType::Enduring).add(Node::inheritance("admin").build());
//!
//! let manager = CachedDataManager::for_user(user, ctx);
//! let data = manager.get_permission_data(&QueryOptions::non_contextual()).await?;
//! assert!(data.query_permission("admin.tools").result().as_bool_or_false());
//! # Ok(())
//! # }
//! ```

pub mod cacheddata;
pub mod calculator;
pub mod context;
pub mod error;
pub mod inheritance;
pub mod metastack;
pub mod model;
pub mod node;
pub mod query;
pub mod tristate;

// Re-export commonly used types
pub use cacheddata::{CachedDataManager, EngineConfig, EngineContext, MetaCache, PermissionCache};
pub use calculator::TristateResult;
pub use context::{ContextSatisfyMode, ImmutableContextSet, MutableContextSet};
pub use error::{EngineError, Result};
pub use inheritance::{InheritanceGraph, TraversalOrder};
pub use metastack::{DuplicateRemoval, MetaStackDefinition, MetaStackElement};
pub use model::{Group, GroupResolver, PermissionHolder, TrackResolver, User};
pub use node::{Node, NodeKind};
pub use query::{QueryFlags, QueryOptions};
pub use tristate::Tristate;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
