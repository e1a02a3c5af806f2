//! Zxid ordering of cache updates.

use proptest::prelude::*;
use zkpool::{CacheEvent, ErrorCode, Request, Response, TreeCache, ViewKind, Zxid};

use super::{
    create, get_children, get_data, path, recorded, reply, set_data, snapshot, stat, Offline,
};

/// Distinct zxids in an arbitrary arrival order.
fn shuffled_zxids() -> impl Strategy<Value = Vec<Zxid>> {
    proptest::collection::btree_set(1i64..10_000, 1..24)
        .prop_flat_map(|set| Just(set.into_iter().collect::<Vec<_>>()).prop_shuffle())
}

fn observe_write_or_read(cache: &TreeCache<Offline>, zxid: Zxid) {
    let data = zxid.to_be_bytes();
    if zxid % 2 == 0 {
        cache.observe(
            &set_data("/n", &data),
            &reply(zxid, Response::SetData { stat: stat(zxid as i32) }),
        );
    } else {
        cache.observe(
            &get_data("/n"),
            &reply(
                zxid,
                Response::GetData {
                    data: data.to_vec(),
                    stat: stat(zxid as i32),
                },
            ),
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn test_stamp_never_moves_backwards(zxids in shuffled_zxids()) {
        let cache = TreeCache::new(Offline);
        let mut highest = 0;
        for zxid in &zxids {
            observe_write_or_read(&cache, *zxid);
            highest = highest.max(*zxid);
            let node = cache.get(&path("/n")).expect("cached");
            prop_assert_eq!(node.stamp(), Some(highest));
            prop_assert_eq!(node.data().map(|d| d.stamp()), Some(highest));
        }
        let node = cache.get(&path("/n")).expect("cached");
        prop_assert_eq!(node.data().map(|d| d.into_inner()), Some(highest.to_be_bytes().to_vec()));
        prop_assert_eq!(node.stat().map(|s| s.value().version), Some(highest as i32));
        prop_assert_eq!(cache.last_zxid(), highest);
    }

    #[test]
    fn test_delete_applies_only_when_not_stale(stamp in 1i64..1_000, delete_at in 1i64..1_000) {
        let cache = TreeCache::new(Offline);
        cache.observe(&create("/d", b""), &reply(stamp, Response::Create { path: path("/d") }));
        cache.observe(&create("/d/child", b""), &reply(stamp, Response::Create { path: path("/d/child") }));
        cache.observe(&Request::Delete { path: path("/d"), version: -1 }, &reply(delete_at, Response::Delete));
        prop_assert_eq!(cache.contains(&path("/d")), delete_at < stamp);
        prop_assert_eq!(cache.contains(&path("/d/child")), delete_at < stamp);
    }

    #[test]
    fn test_final_state_independent_of_arrival_order(zxids in shuffled_zxids()) {
        let ordered = TreeCache::new(Offline);
        let mut sorted = zxids.clone();
        sorted.sort_unstable();
        for zxid in &sorted {
            observe_write_or_read(&ordered, *zxid);
        }
        let shuffled = TreeCache::new(Offline);
        for zxid in &zxids {
            observe_write_or_read(&shuffled, *zxid);
        }
        prop_assert_eq!(snapshot(&ordered), snapshot(&shuffled));
    }
}

#[test]
fn test_out_of_order_reply_keeps_newer_value() {
    let cache = TreeCache::new(Offline);
    cache.observe(
        &get_data("/n"),
        &reply(5, Response::GetData { data: b"five".to_vec(), stat: stat(5) }),
    );
    cache.observe(
        &get_data("/n"),
        &reply(3, Response::GetData { data: b"three".to_vec(), stat: stat(3) }),
    );
    let node = cache.get(&path("/n")).expect("cached");
    assert_eq!(node.stamp(), Some(5));
    assert_eq!(node.data().map(|d| d.into_inner()), Some(b"five".to_vec()));
    assert_eq!(node.stat().map(|s| s.stamp()), Some(5));
}

#[test]
fn test_delete_removes_subtree_and_reports_each_node() {
    let cache = TreeCache::new(Offline);
    cache.observe(&get_children("/app"), &reply(2, Response::GetChildren {
        children: vec!["a".into(), "b".into()],
    }));
    cache.observe(&get_data("/app/a/deep"), &reply(3, Response::GetData {
        data: Vec::new(),
        stat: stat(0),
    }));
    let events = recorded(&cache);

    cache.observe(&Request::Delete { path: path("/app"), version: -1 }, &reply(4, Response::Delete));

    assert!(!cache.contains(&path("/app")));
    assert!(cache.root().children().is_empty());
    let removed: Vec<_> = events
        .lock()
        .iter()
        .map(|e| match e {
            CacheEvent::NodeRemoved { path, zxid } => (path.to_string(), *zxid),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(
        removed,
        vec![
            ("/app".to_string(), 4),
            ("/app/a".to_string(), 4),
            ("/app/a/deep".to_string(), 4),
            ("/app/b".to_string(), 4),
        ]
    );
}

#[test]
fn test_stale_delete_is_ignored() {
    let cache = TreeCache::new(Offline);
    cache.observe(&get_data("/keep"), &reply(8, Response::GetData { data: vec![1], stat: stat(1) }));
    let events = recorded(&cache);
    cache.observe(&Request::Delete { path: path("/keep"), version: -1 }, &reply(6, Response::Delete));
    assert!(cache.contains(&path("/keep")));
    assert!(events.lock().is_empty());
}

#[test]
fn test_multi_matches_individual_operations() {
    fn seeded() -> TreeCache<Offline> {
        let cache = TreeCache::new(Offline);
        cache.observe(&create("/m", b""), &reply(1, Response::Create { path: path("/m") }));
        cache.observe(&create("/m/b", b"old"), &reply(1, Response::Create { path: path("/m/b") }));
        cache.observe(&create("/m/c", b""), &reply(1, Response::Create { path: path("/m/c") }));
        cache
    }
    let operations = vec![
        create("/m/a", b"new"),
        set_data("/m/b", b"changed"),
        Request::Delete { path: path("/m/c"), version: -1 },
    ];
    let results = vec![
        Response::Create { path: path("/m/a") },
        Response::SetData { stat: stat(1) },
        Response::Delete,
    ];

    let batched = seeded();
    batched.observe(
        &Request::Multi(operations.clone()),
        &reply(5, Response::Multi(results.clone())),
    );

    let individual = seeded();
    for (operation, result) in operations.iter().zip(results) {
        individual.observe(operation, &reply(5, result));
    }

    assert_eq!(snapshot(&batched), snapshot(&individual));
    assert!(batched.contains(&path("/m/a")));
    assert!(!batched.contains(&path("/m/c")));
    let b = batched.get(&path("/m/b")).expect("cached");
    assert_eq!(b.data().map(|d| d.into_inner()), Some(b"changed".to_vec()));
}

#[test]
fn test_failed_multi_leaves_cache_unchanged() {
    let cache = TreeCache::new(Offline);
    let before = snapshot(&cache);
    cache.observe(
        &Request::Multi(vec![create("/x", b"")]),
        &reply(2, Response::Error(ErrorCode::RuntimeInconsistency)),
    );
    assert_eq!(snapshot(&cache), before);
}

#[test]
fn test_identical_data_refreshes_without_event() {
    let cache = TreeCache::new(Offline);
    cache.observe(&get_data("/d"), &reply(1, Response::GetData { data: b"same".to_vec(), stat: stat(1) }));
    let events = recorded(&cache);

    cache.observe(&get_data("/d"), &reply(4, Response::GetData { data: b"same".to_vec(), stat: stat(1) }));
    let node = cache.get(&path("/d")).expect("cached");
    assert_eq!(node.data().map(|d| d.stamp()), Some(4));
    assert!(events.lock().is_empty());

    cache.observe(&get_data("/d"), &reply(6, Response::GetData { data: b"other".to_vec(), stat: stat(1) }));
    assert_eq!(
        *events.lock(),
        vec![CacheEvent::NodeUpdated {
            path: path("/d"),
            views: [ViewKind::Data].into(),
            zxid: 6,
        }]
    );
}

#[test]
fn test_children_listing_prunes_missing_children() {
    let cache = TreeCache::new(Offline);
    cache.observe(&get_children("/p"), &reply(2, Response::GetChildren {
        children: vec!["x".into(), "y".into()],
    }));
    let events = recorded(&cache);

    cache.observe(&get_children("/p"), &reply(5, Response::GetChildren {
        children: vec!["y".into(), "z".into()],
    }));

    let p = cache.get(&path("/p")).expect("cached");
    assert_eq!(p.children(), vec!["y".to_string(), "z".to_string()]);
    let events = events.lock();
    assert!(events.contains(&CacheEvent::NodeRemoved { path: path("/p/x"), zxid: 5 }));
    assert!(events.contains(&CacheEvent::NodeAdded { path: path("/p/z"), zxid: 5 }));
    assert_eq!(events.len(), 2);
}

#[test]
fn test_stale_listing_keeps_newer_child() {
    let cache = TreeCache::new(Offline);
    cache.observe(&get_children("/p"), &reply(2, Response::GetChildren { children: Vec::new() }));
    cache.observe(&create("/p/fresh", b""), &reply(7, Response::Create { path: path("/p/fresh") }));
    cache.observe(&get_children("/p"), &reply(4, Response::GetChildren { children: Vec::new() }));
    assert!(cache.contains(&path("/p/fresh")));
}
