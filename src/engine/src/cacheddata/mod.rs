//! Cached data management
//!
//! Ties the inheritance graph, calculator and meta accumulator together
//! behind per-holder caches. Each holder gets a [`CachedDataManager`] with
//! two [`Container`]s, one for permission data and one for meta data, both
//! keyed by [`QueryOptions`].

mod container;
mod meta_cache;
mod permission_cache;

pub use container::{Container, Loader};
pub use meta_cache::{MetaCache, MetaValue};
pub use permission_cache::PermissionCache;

use crate::calculator::DEFAULT_LOOKUP_CACHE_CAPACITY;
use crate::inheritance::{InheritanceGraph, TraversalOrder};
use crate::metastack::{MetaAccumulator, MetaStackDefinition};
use crate::model::{Group, GroupResolver, PermissionHolder, TrackResolver, User};
use crate::query::QueryOptions;
use crate::error::Result;
use std::sync::Arc;

/// Engine-wide configuration, passed explicitly rather than held in any
/// process-wide state.
#[derive(Clone)]
pub struct EngineConfig {
    /// Inheritance traversal order
    pub traversal: TraversalOrder,

    /// Stack definition used to fold prefixes
    pub prefix_definition: Arc<MetaStackDefinition>,

    /// Stack definition used to fold suffixes
    pub suffix_definition: Arc<MetaStackDefinition>,

    /// Capacity of each calculator's lookup cache
    pub lookup_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            traversal: TraversalOrder::default(),
            prefix_definition: MetaStackDefinition::standard(),
            suffix_definition: MetaStackDefinition::standard(),
            lookup_cache_capacity: DEFAULT_LOOKUP_CACHE_CAPACITY,
        }
    }
}

/// The collaborators every evaluation needs: configuration plus the group
/// and track lookups consumed from the storage layer.
pub struct EngineContext {
    config: EngineConfig,
    groups: Arc<dyn GroupResolver>,
    tracks: Arc<dyn TrackResolver>,
}

impl EngineContext {
    pub fn new(groups: Arc<dyn GroupResolver>, tracks: Arc<dyn TrackResolver>) -> Self {
        Self {
            config: EngineConfig::default(),
            groups,
            tracks,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn groups(&self) -> &Arc<dyn GroupResolver> {
        &self.groups
    }

    pub fn tracks(&self) -> &Arc<dyn TrackResolver> {
        &self.tracks
    }

    fn resolve_nodes(
        &self,
        holder: Arc<PermissionHolder>,
        query: &QueryOptions,
    ) -> Vec<crate::node::Node> {
        InheritanceGraph::new(&*self.groups, self.config.traversal).resolve_nodes(holder, query)
    }
}

/// The subject a manager computes data for.
enum Subject {
    User(Arc<User>),
    Group(Arc<Group>),
}

impl Subject {
    fn holder(&self) -> &Arc<PermissionHolder> {
        match self {
            Subject::User(user) => user.holder(),
            Subject::Group(group) => group.holder(),
        }
    }

    fn primary_group(&self) -> Option<String> {
        match self {
            Subject::User(user) => Some(user.primary_group()),
            Subject::Group(_) => None,
        }
    }
}

struct PermissionLoader {
    subject: Arc<Subject>,
    ctx: Arc<EngineContext>,
}

impl Loader<PermissionCache> for PermissionLoader {
    fn load(&self, query: &QueryOptions) -> Result<PermissionCache> {
        let nodes = self
            .ctx
            .resolve_nodes(self.subject.holder().clone(), query);
        Ok(PermissionCache::new(
            query.clone(),
            &nodes,
            self.ctx.config.lookup_cache_capacity,
        ))
    }
}

struct MetaLoader {
    subject: Arc<Subject>,
    ctx: Arc<EngineContext>,
}

impl Loader<MetaCache> for MetaLoader {
    fn load(&self, query: &QueryOptions) -> Result<MetaCache> {
        let holder = self.subject.holder().clone();
        let identifier = holder.identifier().clone();
        let nodes = self.ctx.resolve_nodes(holder, query);

        let mut accumulator = MetaAccumulator::new(
            &identifier,
            &*self.ctx.tracks,
            self.ctx.config.prefix_definition.clone(),
            self.ctx.config.suffix_definition.clone(),
        );
        accumulator.accumulate_all(&nodes);

        Ok(MetaCache::from_accumulator(
            query.clone(),
            accumulator,
            self.subject.primary_group(),
        ))
    }
}

/// Per-holder cache of computed permission and meta data.
pub struct CachedDataManager {
    permission: Container<PermissionCache>,
    meta: Container<MetaCache>,
}

impl CachedDataManager {
    pub fn for_user(user: Arc<User>, ctx: Arc<EngineContext>) -> Self {
        Self::new(Arc::new(Subject::User(user)), ctx)
    }

    pub fn for_group(group: Arc<Group>, ctx: Arc<EngineContext>) -> Self {
        Self::new(Arc::new(Subject::Group(group)), ctx)
    }

    fn new(subject: Arc<Subject>, ctx: Arc<EngineContext>) -> Self {
        Self {
            permission: Container::new(Arc::new(PermissionLoader {
                subject: subject.clone(),
                ctx: ctx.clone(),
            })),
            meta: Container::new(Arc::new(MetaLoader { subject, ctx })),
        }
    }

    /// The permission data container
    pub fn permission_data(&self) -> &Container<PermissionCache> {
        &self.permission
    }

    /// The meta data container
    pub fn meta_data(&self) -> &Container<MetaCache> {
        &self.meta
    }

    /// Convenience for `permission_data().get(query)`
    pub async fn get_permission_data(&self, query: &QueryOptions) -> Result<Arc<PermissionCache>> {
        self.permission.get(query).await
    }

    /// Convenience for `meta_data().get(query)`
    pub async fn get_meta_data(&self, query: &QueryOptions) -> Result<Arc<MetaCache>> {
        self.meta.get(query).await
    }

    /// Drops every cached entry; the next `get` computes on demand
    pub fn invalidate(&self) {
        self.permission.invalidate_all();
        self.meta.invalidate_all();
    }

    /// Recomputes every cached entry in the background
    pub fn recalculate(&self) {
        self.permission.recalculate_all();
        self.meta.recalculate_all();
    }

    /// Reloads every cached entry; resolves when all replacements are ready
    pub fn reload(&self) -> futures::future::BoxFuture<'static, ()> {
        use futures::FutureExt;
        let permission = self.permission.reload_all();
        let meta = self.meta.reload_all();
        async move {
            permission.await;
            meta.await;
        }
        .boxed()
    }

    /// Clears cached calculator lookups without dropping any cache entry.
    /// Used when platform default permissions change without a node
    /// mutation.
    pub fn invalidate_permission_calculators(&self) {
        for cache in self.permission.cached_values() {
            cache.invalidate_lookup_cache();
        }
    }
}
