//! Concurrency semantics of the cached data containers: coalescing,
//! stale reads during background recomputation, and reload visibility.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;
use uuid::Uuid;
use warden_engine::cacheddata::{CachedDataManager, Container, EngineContext, Loader};
use warden_engine::model::{
    DataType, Group, GroupResolver, InMemoryGroupRegistry, InMemoryTrackRegistry, User,
};
use warden_engine::node::Node;
use warden_engine::query::QueryOptions;
use warden_engine::{Result, Tristate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A loader whose value and latency the test controls.
struct ControlledLoader {
    value: Mutex<u64>,
    delay: Mutex<Duration>,
    computations: AtomicUsize,
}

impl ControlledLoader {
    fn new(value: u64) -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(value),
            delay: Mutex::new(Duration::ZERO),
            computations: AtomicUsize::new(0),
        })
    }

    fn set_value(&self, value: u64) {
        *self.value.lock() = value;
    }

    fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }
}

impl Loader<u64> for ControlledLoader {
    fn load(&self, _query: &QueryOptions) -> Result<u64> {
        self.computations.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(*self.value.lock())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_gets_trigger_one_computation() {
    init_tracing();
    let loader = ControlledLoader::new(1);
    loader.set_delay(Duration::from_millis(80));
    let container = Arc::new(Container::new(loader.clone() as Arc<dyn Loader<u64>>));
    let query = QueryOptions::non_contextual();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let container = container.clone();
            let query = query.clone();
            tokio::spawn(async move { *container.get(&query).await.unwrap() })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), 1);
    }
    assert_eq!(loader.computations(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn recalculate_serves_stale_until_complete() {
    let loader = ControlledLoader::new(1);
    let container = Container::new(loader.clone() as Arc<dyn Loader<u64>>);
    let query = QueryOptions::non_contextual();

    assert_eq!(*container.get(&query).await.unwrap(), 1);

    loader.set_value(2);
    loader.set_delay(Duration::from_millis(100));
    container.recalculate(&query);

    // the stale value stays visible while the recomputation runs
    assert_eq!(*container.get(&query).await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(*container.get(&query).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reload_never_serves_the_old_value() {
    let loader = ControlledLoader::new(1);
    let container = Arc::new(Container::new(loader.clone() as Arc<dyn Loader<u64>>));
    let query = QueryOptions::non_contextual();

    assert_eq!(*container.get(&query).await.unwrap(), 1);

    loader.set_value(2);
    loader.set_delay(Duration::from_millis(100));
    let pending = container.reload(&query);

    // a get issued mid-reload awaits the replacement instead of seeing 1
    let racing_get = {
        let container = container.clone();
        let query = query.clone();
        tokio::spawn(async move { *container.get(&query).await.unwrap() })
    };

    assert_eq!(*pending.await.unwrap(), 2);
    assert_eq!(racing_get.await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reload_future_resolves_to_new_value() {
    let loader = ControlledLoader::new(7);
    let container = Container::new(loader.clone() as Arc<dyn Loader<u64>>);
    let query = QueryOptions::non_contextual();

    assert_ok!(container.get(&query).await);
    loader.set_value(8);

    let value = assert_ok!(container.reload(&query).await);
    assert_eq!(*value, 8);
    assert_eq!(*container.get(&query).await.unwrap(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bulk_reload_covers_every_key() {
    let loader = ControlledLoader::new(1);
    let container = Container::new(loader.clone() as Arc<dyn Loader<u64>>);

    let queries: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|world| {
            QueryOptions::contextual(
                warden_engine::ImmutableContextSet::singleton("world", world),
            )
        })
        .collect();
    for query in &queries {
        container.get(query).await.unwrap();
    }

    loader.set_value(2);
    container.reload_all().await;

    for query in &queries {
        assert_eq!(*container.get(query).await.unwrap(), 2);
    }
}

/// Counts how often the engine resolves groups, as a proxy for how many
/// times permission data was computed through the manager.
struct CountingResolver {
    inner: Arc<InMemoryGroupRegistry>,
    lookups: AtomicUsize,
}

impl GroupResolver for CountingResolver {
    fn resolve_group(&self, name: &str) -> Option<Arc<Group>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve_group(name)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn manager_coalesces_concurrent_gets() {
    let registry = Arc::new(InMemoryGroupRegistry::new());
    registry
        .get_or_create("admin")
        .holder()
        .nodes(DataType::Enduring)
        .add(Node::permission("admin.tools").build());

    let resolver = Arc::new(CountingResolver {
        inner: registry,
        lookups: AtomicUsize::new(0),
    });
    let ctx = Arc::new(EngineContext::new(
        resolver.clone(),
        Arc::new(InMemoryTrackRegistry::new()),
    ));

    let user = Arc::new(User::new(Uuid::new_v4(), None));
    user.holder()
        .nodes(DataType::Enduring)
        .add(Node::inheritance("admin").build());

    let manager = Arc::new(CachedDataManager::for_user(user, ctx));
    let query = QueryOptions::non_contextual();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let manager = manager.clone();
            let query = query.clone();
            tokio::spawn(async move {
                manager
                    .get_permission_data(&query)
                    .await
                    .unwrap()
                    .query_permission("admin.tools")
                    .result()
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), Tristate::True);
    }

    // one computation resolves the single inherited group exactly once
    assert_eq!(resolver.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn manager_recalculate_picks_up_node_changes() {
    let registry = Arc::new(InMemoryGroupRegistry::new());
    let group = registry.get_or_create("subject");
    let ctx = Arc::new(EngineContext::new(
        registry.clone(),
        Arc::new(InMemoryTrackRegistry::new()),
    ));

    let manager = CachedDataManager::for_group(group.clone(), ctx);
    let query = QueryOptions::non_contextual();

    let before = manager.get_permission_data(&query).await.unwrap();
    assert_eq!(before.query_permission("perm").result(), Tristate::Undefined);

    group
        .holder()
        .nodes(DataType::Enduring)
        .add(Node::permission("perm").build());
    manager.recalculate();

    // poll until the background swap lands
    let mut result = Tristate::Undefined;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        result = manager
            .get_permission_data(&query)
            .await
            .unwrap()
            .query_permission("perm")
            .result();
        if result == Tristate::True {
            break;
        }
    }
    assert_eq!(result, Tristate::True);
}
