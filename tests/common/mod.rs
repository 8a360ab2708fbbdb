#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use realm_cache::{
    prelude::*,
    test::{init_tracing, MemoryStore, TestLocks, TestObserver},
};

pub type Provider = Arc<CacheRealmProvider<MemoryStore>>;

/// One shared cache as a node would have it, with the instrumented collaborators kept at hand.
pub struct Node {
    pub cache:    Arc<RealmCache>,
    pub store:    Arc<MemoryStore>,
    pub locks:    Arc<TestLocks>,
    pub observer: Arc<TestObserver>,
}

impl Node {
    pub fn new() -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(TestLocks::new());
        let observer = Arc::new(TestObserver::new());
        let cache = RealmCache::builder()
            .name("test-realms")
            .lock_provider(Arc::clone(&locks) as Arc<dyn LockProvider>)
            .observer(Arc::clone(&observer) as Arc<dyn CacheObserver>)
            .lock_timeout(Duration::from_millis(500))
            .build()
            .expect("cache");
        Self {
            cache,
            store,
            locks,
            observer,
        }
    }

    /// A fresh unit of work with its provider, not yet begun.
    pub async fn session(&self) -> (Arc<TransactionManager>, Provider) {
        let tm = Arc::new(TransactionManager::new());
        let provider = self
            .cache
            .session(Arc::clone(&self.store), &tm)
            .await
            .expect("session");
        (tm, provider)
    }

    /// A begun unit of work.
    pub async fn begin(&self) -> (Arc<TransactionManager>, Provider) {
        let (tm, provider) = self.session().await;
        tm.begin().await.expect("begin");
        (tm, provider)
    }

    /// Commits a realm `name` with one client `app` carrying the `viewer` and `editor` roles, and a realm role `user`.
    pub async fn seed(&self, name: &str) -> Seeded {
        let (tm, provider) = self.begin().await;
        let realm = provider.create_realm(name).await.expect("realm");
        let user = provider.add_realm_role(&realm.id, "user").await.expect("realm role");
        let client = provider.add_client(&realm.id, "app").await.expect("client");
        let viewer = provider
            .add_client_role(&realm.id, &client.id, "viewer")
            .await
            .expect("viewer");
        let editor = provider
            .add_client_role(&realm.id, &client.id, "editor")
            .await
            .expect("editor");
        tm.commit().await.expect("seed commit");
        self.reset_counters();

        Seeded {
            realm: realm.id,
            client: client.id,
            user: user.id,
            viewer: viewer.id,
            editor: editor.id,
        }
    }

    pub fn reset_counters(&self) {
        self.store.reset_calls();
        self.locks.forget();
        self.observer.forget();
    }
}

#[derive(Debug, Clone)]
pub struct Seeded {
    pub realm:  String,
    pub client: String,
    pub user:   String,
    pub viewer: String,
    pub editor: String,
}
