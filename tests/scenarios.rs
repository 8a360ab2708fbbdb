mod common;

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use common::Node;
use realm_cache::prelude::*;

#[tokio::test]
async fn realm_rename_moves_the_name_alias() {
    let node = Node::new();
    let seeded = node.seed("acme").await;

    let (tm, provider) = node.begin().await;
    provider.get_realm_by_name("acme").await.unwrap().unwrap();
    tm.commit().await.unwrap();
    let (cached_at, _) = node.cache.get_realm_by_name("acme").await.unwrap();

    let (tm, provider) = node.begin().await;
    provider
        .update_realm(&seeded.realm, |r| r.name = "acme-corp".into())
        .await
        .unwrap();
    tm.commit().await.unwrap();

    let invalidated = node.observer.invalidated();
    assert_eq!(invalidated.len(), 1);
    let (id, invalidated_at) = &invalidated[0];
    assert_eq!(id, &seeded.realm);
    assert!(*invalidated_at > cached_at);
    assert!(node.cache.get_realm_by_name("acme").await.is_none());

    let (tm, provider) = node.begin().await;
    assert!(provider.get_realm_by_name("acme").await.unwrap().is_none());
    let renamed = provider.get_realm_by_name("acme-corp").await.unwrap().unwrap();
    assert_eq!(renamed.id(), seeded.realm);
    tm.commit().await.unwrap();

    let (recached_at, cached) = node.cache.get_realm_by_name("acme-corp").await.unwrap();
    assert!(recached_at >= *invalidated_at);
    assert_eq!(cached.name(), "acme-corp");
    assert!(node.cache.get_realm_by_name("acme").await.is_none());
}

#[tokio::test]
async fn removing_a_client_evicts_its_roles() {
    let node = Node::new();
    let seeded = node.seed("acme").await;

    let (tm, provider) = node.begin().await;
    let client = provider
        .get_client_by_id(&seeded.client, &seeded.realm)
        .await
        .unwrap()
        .unwrap();
    let roles = client.roles().await.unwrap();
    assert_eq!(roles.len(), 2);
    assert!(roles.iter().all(|r| r.is_client_role()));
    tm.commit().await.unwrap();
    assert!(node.cache.get_role(&seeded.viewer).await.is_some());
    assert!(node.cache.get_role(&seeded.editor).await.is_some());

    let (tm, provider) = node.begin().await;
    assert!(provider.remove_client(&seeded.client, &seeded.realm).await.unwrap());
    tm.commit().await.unwrap();

    for id in [&seeded.client, &seeded.viewer, &seeded.editor] {
        assert!(node.cache.get(id).await.is_none(), "{id} still cached");
    }
    let invalidated = node.observer.invalidated_ids().into_iter().collect::<BTreeSet<_>>();
    let expected = [&seeded.realm, &seeded.client, &seeded.viewer, &seeded.editor]
        .into_iter()
        .cloned()
        .collect::<BTreeSet<_>>();
    assert_eq!(invalidated, expected);

    let (tm, provider) = node.begin().await;
    let realm = provider.get_realm(&seeded.realm).await.unwrap().unwrap();
    assert!(realm.clients().await.unwrap().is_empty());
    assert!(provider
        .get_role_by_id(&seeded.viewer, &seeded.realm)
        .await
        .unwrap()
        .is_none());
    tm.commit().await.unwrap();
}

#[tokio::test]
async fn removing_a_client_evicts_snapshots_referring_to_its_roles() {
    let node = Node::new();
    let seeded = node.seed("acme").await;

    let (tm, provider) = node.begin().await;
    provider
        .update_role(&seeded.user, &seeded.realm, |r| {
            r.composites.insert(seeded.viewer.clone());
        })
        .await
        .unwrap();
    let staff = provider.create_group(&seeded.realm, "staff", None).await.unwrap();
    provider
        .update_group(&staff.id, &seeded.realm, |g| {
            g.role_mappings.insert(seeded.viewer.clone());
        })
        .await
        .unwrap();
    let web = provider.add_client_template(&seeded.realm, "web").await.unwrap();
    provider
        .update_client_template(&web.id, &seeded.realm, |t| {
            t.scope_mappings.insert(seeded.editor.clone());
        })
        .await
        .unwrap();
    tm.commit().await.unwrap();

    let (tm, provider) = node.begin().await;
    let user = provider
        .get_role_by_id(&seeded.user, &seeded.realm)
        .await
        .unwrap()
        .unwrap();
    assert!(user.is_composite());
    let group = provider
        .get_group_by_id(&staff.id, &seeded.realm)
        .await
        .unwrap()
        .unwrap();
    assert!(group.model().role_mappings.contains(&seeded.viewer));
    let template = provider
        .get_client_template_by_id(&web.id, &seeded.realm)
        .await
        .unwrap()
        .unwrap();
    assert!(template.model().scope_mappings.contains(&seeded.editor));
    tm.commit().await.unwrap();
    for id in [&seeded.user, &staff.id, &web.id] {
        assert!(node.cache.get(id).await.is_some(), "{id} not cached");
    }

    let (tm, provider) = node.begin().await;
    assert!(provider.remove_client(&seeded.client, &seeded.realm).await.unwrap());
    tm.commit().await.unwrap();

    let invalidated = node.observer.invalidated_ids();
    for id in [&seeded.user, &staff.id, &web.id] {
        assert!(invalidated.contains(id), "{id} not invalidated");
        assert!(node.cache.get(id).await.is_none(), "{id} still cached");
    }

    let (tm, provider) = node.begin().await;
    let user = provider
        .get_role_by_id(&seeded.user, &seeded.realm)
        .await
        .unwrap()
        .unwrap();
    assert!(!user.is_composite());
    assert!(user.composites().await.unwrap().is_empty());
    let group = provider
        .get_group_by_id(&staff.id, &seeded.realm)
        .await
        .unwrap()
        .unwrap();
    assert!(group.model().role_mappings.is_empty());
    let template = provider
        .get_client_template_by_id(&web.id, &seeded.realm)
        .await
        .unwrap()
        .unwrap();
    assert!(template.model().scope_mappings.is_empty());
    tm.commit().await.unwrap();
}

#[tokio::test]
async fn prepare_lock_failure_rolls_back_and_releases() {
    let node = Node::new();
    node.locks.fail_on("y");

    let (tm_a, a) = node.begin().await;
    a.store().unwrap();
    a.register_invalidation(Category::Group, "y");
    a.register_invalidation(Category::Group, "x");

    let err = tm_a.commit().await.unwrap_err();
    assert!(matches!(err, TransactionError::Prepare(_)), "{err}");
    assert_eq!(node.locks.requested(), vec!["x", "y"]);
    assert!(!node.locks.is_locked("x"));
    assert!(!tm_a.is_active());

    // Rolled back units of work still publish what they registered.
    assert!(node.cache.current_revision("x").is_some());
    assert!(node.cache.current_revision("y").is_some());

    let mut batch = node.cache.start_batch().unwrap();
    tokio::time::timeout(Duration::from_millis(50), batch.lock("x"))
        .await
        .expect("x is free right away")
        .unwrap();
    assert!(node.locks.is_locked("x"));
    batch.end().await.unwrap();
    assert!(!node.locks.is_locked("x"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reader_sees_old_or_reloaded_snapshot() {
    let node = Arc::new(Node::new());
    let seeded = node.seed("acme").await;

    let (tm, provider) = node.begin().await;
    provider
        .update_realm(&seeded.realm, |r| r.display_name = Some("old".into()))
        .await
        .unwrap();
    tm.commit().await.unwrap();

    let reader = {
        let node = Arc::clone(&node);
        let id = seeded.realm.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..50 {
                let (tm, provider) = node.begin().await;
                let realm = provider.get_realm(&id).await.unwrap().unwrap();
                seen.push(realm.model().display_name.clone());
                tm.commit().await.unwrap();
                tokio::task::yield_now().await;
            }
            seen
        })
    };

    let (tm, provider) = node.begin().await;
    provider
        .update_realm(&seeded.realm, |r| r.display_name = Some("new".into()))
        .await
        .unwrap();
    tm.commit().await.unwrap();

    let seen = reader.await.unwrap();
    assert_eq!(seen.len(), 50);
    assert!(seen
        .iter()
        .all(|name| matches!(name.as_deref(), Some("old") | Some("new"))));

    let (tm, provider) = node.begin().await;
    let realm = provider.get_realm(&seeded.realm).await.unwrap().unwrap();
    assert_eq!(realm.model().display_name.as_deref(), Some("new"));
    tm.commit().await.unwrap();
}

#[tokio::test]
async fn clear_cache_drops_everything_on_commit() {
    let node = Node::new();
    let seeded = node.seed("acme").await;

    let (tm, provider) = node.begin().await;
    let realm = provider.get_realm(&seeded.realm).await.unwrap().unwrap();
    realm.clients().await.unwrap();
    tm.commit().await.unwrap();
    assert!(node.cache.get_client(&seeded.client).await.is_some());

    let (tm, provider) = node.begin().await;
    provider.clear_cache().unwrap();
    tm.commit().await.unwrap();

    assert_eq!(node.observer.clear_count(), 1);
    assert!(node.observer.invalidated().is_empty());
    assert!(node.cache.get_realm(&seeded.realm).await.is_none());
    assert!(node.cache.get_client(&seeded.client).await.is_none());
    assert!(node.cache.get_realm_by_name("acme").await.is_none());
}

#[tokio::test]
async fn group_tree_navigation_and_subtree_removal() {
    let node = Node::new();
    let seeded = node.seed("acme").await;

    let (tm, provider) = node.begin().await;
    let staff = provider.create_group(&seeded.realm, "staff", None).await.unwrap();
    let ops = provider
        .create_group(&seeded.realm, "ops", Some(&staff.id))
        .await
        .unwrap();
    let oncall = provider
        .create_group(&seeded.realm, "oncall", Some(&ops.id))
        .await
        .unwrap();
    tm.commit().await.unwrap();

    let (tm, provider) = node.begin().await;
    let realm = provider.get_realm(&seeded.realm).await.unwrap().unwrap();
    assert_eq!(realm.groups().await.unwrap().len(), 3);
    let top = realm.top_level_groups().await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].name(), "staff");

    let children = top[0].sub_groups().await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id(), ops.id);
    let parent = children[0].parent_group().await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&parent, &top[0]));
    tm.commit().await.unwrap();

    let (tm, provider) = node.begin().await;
    assert!(provider.remove_group(&staff.id, &seeded.realm).await.unwrap());
    tm.commit().await.unwrap();

    let invalidated = node.observer.invalidated_ids();
    for id in [&staff.id, &ops.id, &oncall.id, &seeded.realm] {
        assert!(invalidated.contains(id), "{id} not invalidated");
        assert!(node.cache.get(id).await.is_none());
    }

    let (tm, provider) = node.begin().await;
    let realm = provider.get_realm(&seeded.realm).await.unwrap().unwrap();
    assert!(realm.groups().await.unwrap().is_empty());
    tm.commit().await.unwrap();
}

#[tokio::test]
async fn composite_roles_resolve_transitively() {
    let node = Node::new();
    let seeded = node.seed("acme").await;

    let (tm, provider) = node.begin().await;
    let admin = provider.add_realm_role(&seeded.realm, "admin").await.unwrap();
    provider
        .update_role(&admin.id, &seeded.realm, |r| {
            r.composites.insert(seeded.user.clone());
        })
        .await
        .unwrap();
    provider
        .update_role(&seeded.user, &seeded.realm, |r| {
            r.composites.insert(seeded.viewer.clone());
        })
        .await
        .unwrap();
    tm.commit().await.unwrap();

    let (tm, provider) = node.begin().await;
    let realm = provider.get_realm(&seeded.realm).await.unwrap().unwrap();
    let admin = realm.role("admin").await.unwrap().unwrap();
    assert!(admin.is_composite());
    assert!(admin.has_role(&seeded.viewer).await.unwrap());
    assert!(!admin.has_role(&seeded.editor).await.unwrap());

    let viewer = provider
        .get_role_by_id(&seeded.viewer, &seeded.realm)
        .await
        .unwrap()
        .unwrap();
    let owner = viewer.client().await.unwrap().unwrap();
    assert_eq!(owner.id(), seeded.client);
    tm.commit().await.unwrap();
}

#[tokio::test]
async fn removing_a_realm_evicts_what_it_owns() {
    let node = Node::new();
    let seeded = node.seed("acme").await;
    let other = node.seed("other").await;

    let (tm, provider) = node.begin().await;
    for realm_id in [&seeded.realm, &other.realm] {
        let realm = provider.get_realm(realm_id).await.unwrap().unwrap();
        for client in realm.clients().await.unwrap() {
            client.roles().await.unwrap();
        }
        realm.roles().await.unwrap();
    }
    tm.commit().await.unwrap();

    let (tm, provider) = node.begin().await;
    assert!(provider.remove_realm(&seeded.realm).await.unwrap());
    tm.commit().await.unwrap();

    for id in [
        &seeded.realm,
        &seeded.client,
        &seeded.user,
        &seeded.viewer,
        &seeded.editor,
    ] {
        assert!(node.cache.get(id).await.is_none(), "{id} still cached");
    }
    assert!(node.cache.get_realm_by_name("acme").await.is_none());

    // The other realm is untouched.
    assert!(node.cache.get_realm(&other.realm).await.is_some());
    assert!(node.cache.get_role(&other.viewer).await.is_some());
}
