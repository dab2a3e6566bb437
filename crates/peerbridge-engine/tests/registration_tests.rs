//! Peer Registration Tests
//!
//! Tests validate the single-owner invariant of the handle table:
//! - At most one registered peer per native identity
//! - Deregistration happens before the native slot is released
//! - `resolve_or_wrap` always hands back the existing peer
//! - Rejected registrations leave the table untouched
//!
//! # Running Tests
//! ```bash
//! cargo test --test registration_tests
//! ```

use parking_lot::Mutex;
use peerbridge_engine::{
    BridgeError, ManagedType, NativeIdentity, Ownership, PeerBridge, PeerObject, PeerStatus,
    RefKind, TypeMap,
};
use peerbridge_test::FakeRuntime;
use std::sync::{Arc, Barrier};

static WIDGET: ManagedType = ManagedType::root("App.Widget");

fn setup() -> (Arc<FakeRuntime>, PeerBridge) {
    let fake = Arc::new(FakeRuntime::new());
    fake.define_class("app/Widget").constructor("()V").define();
    let types = TypeMap::new().with(&WIDGET, "app/Widget");
    let bridge = PeerBridge::new(fake.clone(), Arc::new(types));
    (fake, bridge)
}

fn registered_widget(bridge: &PeerBridge) -> Arc<PeerObject> {
    let peer = PeerObject::create(bridge, &WIDGET, "()V", &[]).unwrap();
    peer.register_with_runtime().unwrap();
    peer
}

// ===== Single Owner =====

#[test]
fn test_concurrent_registration_single_winner() {
    const THREADS: usize = 8;
    let (_fake, bridge) = setup();
    let original = PeerObject::create(&bridge, &WIDGET, "()V", &[]).unwrap();
    let identity = original.identity().unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| original.new_local_ref().unwrap())
        .collect();
    let barrier = Barrier::new(THREADS);

    let outcomes: Vec<(Arc<PeerObject>, Result<(), BridgeError>)> = std::thread::scope(|s| {
        let workers: Vec<_> = handles
            .into_iter()
            .map(|mut handle| {
                let bridge = &bridge;
                let barrier = &barrier;
                s.spawn(move || {
                    let peer =
                        PeerObject::wrap(bridge, &WIDGET, &mut handle, Ownership::DoNotTransfer)
                            .unwrap();
                    barrier.wait();
                    let result = peer.register_with_runtime();
                    (peer, result)
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    let winners: Vec<_> = outcomes.iter().filter(|(_, r)| r.is_ok()).collect();
    assert_eq!(winners.len(), 1);
    for (_, result) in outcomes.iter().filter(|(_, r)| r.is_err()) {
        assert!(result.as_ref().unwrap_err().is_not_supported());
    }

    let registered = bridge.peek_identity(identity).unwrap();
    assert!(Arc::ptr_eq(&registered, &winners[0].0));
    assert_eq!(bridge.surfaced_count(), 1);
}

#[test]
fn test_duplicate_registration_leaves_table_unchanged() {
    let (_fake, bridge) = setup();
    let a = registered_widget(&bridge);
    let identity = a.identity().unwrap();

    let mut alias = a.new_local_ref().unwrap();
    let b = PeerObject::wrap(&bridge, &WIDGET, &mut alias, Ownership::DoNotTransfer).unwrap();
    let err = b.register_with_runtime().unwrap_err();

    assert!(err.is_not_supported());
    assert!(err.to_string().contains("Duplicate native object registration"));
    assert!(Arc::ptr_eq(&bridge.peek_identity(identity).unwrap(), &a));
    assert_eq!(bridge.handle_table().len(), 1);

    // Rejected peer keeps its promoted reference
    assert_eq!(b.status(), PeerStatus::Unregistered);
    assert_eq!(b.ref_kind().unwrap(), RefKind::Shared);
}

#[test]
fn test_alias_scenario() {
    let (fake, bridge) = setup();
    let a = registered_widget(&bridge);
    let identity = a.identity().unwrap();

    let mut shared = a.new_local_ref().unwrap().into_shared().unwrap();
    let b = PeerObject::wrap(&bridge, &WIDGET, &mut shared, Ownership::DoNotTransfer).unwrap();
    assert!(b.register_with_runtime().unwrap_err().is_not_supported());

    a.dispose().unwrap();
    assert!(bridge.peek_identity(identity).is_none());

    b.dispose().unwrap();
    drop(shared);
    // Only the pinned class reference survives
    assert_eq!(fake.live_refs(RefKind::Shared), 1);
    assert_eq!(fake.live_refs(RefKind::Local), 0);
}

#[test]
fn test_identity_free_after_dispose() {
    let (_fake, bridge) = setup();
    let a = registered_widget(&bridge);
    let mut handle = a.new_local_ref().unwrap();
    a.dispose().unwrap();

    let b = PeerObject::wrap(&bridge, &WIDGET, &mut handle, Ownership::Transfer).unwrap();
    b.register_with_runtime().unwrap();
    assert_eq!(b.status(), PeerStatus::Registered);
}

// ===== Release Ordering =====

#[test]
fn test_deregistered_before_release() {
    let (fake, bridge) = setup();
    let peer = registered_widget(&bridge);
    let identity = peer.identity().unwrap();
    let shared_raw = peer.reference().unwrap().raw();

    let observed: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
    {
        let observed = observed.clone();
        let bridge = bridge.clone();
        fake.set_release_hook(move |released| {
            if released.raw() == shared_raw {
                *observed.lock() = Some(bridge.peek_identity(identity).is_none());
            }
        });
    }

    peer.dispose().unwrap();
    fake.clear_release_hook();

    assert_eq!(*observed.lock(), Some(true));
}

#[test]
fn test_deregistered_before_release_on_drop() {
    let (fake, bridge) = setup();
    let peer = registered_widget(&bridge);
    let identity = peer.identity().unwrap();
    let shared_raw = peer.reference().unwrap().raw();

    let observed: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
    {
        let observed = observed.clone();
        let bridge = bridge.clone();
        fake.set_release_hook(move |released| {
            if released.raw() == shared_raw {
                *observed.lock() = Some(bridge.handle_table().is_empty());
            }
        });
    }

    drop(peer);
    fake.clear_release_hook();

    assert_eq!(*observed.lock(), Some(true));
    assert!(!bridge.handle_table().contains(identity));
}

// ===== Resolve Or Wrap =====

#[test]
fn test_resolve_or_wrap_returns_existing_peer() {
    let (fake, bridge) = setup();
    let native = fake.instantiate("app/Widget");

    let mut first = bridge.adopt(native).unwrap();
    let mut second = first.new_local_ref().unwrap();
    let mut third = first.new_local_ref().unwrap();

    let peer = bridge
        .resolve_or_wrap(&WIDGET, &mut first, Ownership::Transfer)
        .unwrap();
    assert!(first.is_disposed());
    assert!(peer.is_registered());

    let again = bridge
        .resolve_or_wrap(&WIDGET, &mut second, Ownership::DoNotTransfer)
        .unwrap();
    assert!(Arc::ptr_eq(&peer, &again));
    assert!(!second.is_disposed());

    let once_more = bridge
        .resolve_or_wrap(&WIDGET, &mut third, Ownership::Transfer)
        .unwrap();
    assert!(Arc::ptr_eq(&peer, &once_more));
    assert!(third.is_disposed());

    assert_eq!(bridge.surfaced_count(), 1);
}

#[test]
fn test_resolve_or_wrap_rejects_disposed_handle() {
    let (fake, bridge) = setup();
    let mut handle = bridge.adopt(fake.instantiate("app/Widget")).unwrap();
    handle.dispose();

    let err = bridge
        .resolve_or_wrap(&WIDGET, &mut handle, Ownership::Transfer)
        .unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentInvalid(_)));
}

#[test]
fn test_concurrent_resolve_or_wrap() {
    const THREADS: usize = 8;
    let (fake, bridge) = setup();
    let native = bridge.adopt(fake.instantiate("app/Widget")).unwrap();
    let handles: Vec<_> = (0..THREADS).map(|_| native.new_local_ref().unwrap()).collect();
    let barrier = Barrier::new(THREADS);

    let peers: Vec<Arc<PeerObject>> = std::thread::scope(|s| {
        let workers: Vec<_> = handles
            .into_iter()
            .map(|mut handle| {
                let bridge = &bridge;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    bridge
                        .resolve_or_wrap(&WIDGET, &mut handle, Ownership::Transfer)
                        .unwrap()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    for peer in &peers[1..] {
        assert!(Arc::ptr_eq(&peers[0], peer));
    }
    assert_eq!(bridge.surfaced_count(), 1);
}

#[test]
fn test_peek_registered_never_registers() {
    let (fake, bridge) = setup();
    let handle = bridge.adopt(fake.instantiate("app/Widget")).unwrap();

    assert!(bridge.peek_registered(&handle).unwrap().is_none());
    assert!(bridge.peek_identity(NativeIdentity::from_u64(999)).is_none());
    assert_eq!(bridge.surfaced_count(), 0);
    assert_eq!(fake.stats().new_global_ref, 0);
}
