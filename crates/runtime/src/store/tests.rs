use std::sync::Arc;
use std::time::Duration;

use drover_protocol::{Browser, Device, DeviceType, DriverEvent, DriverProperties, DriverScope, MobilePlatform};

use super::*;
use crate::manager::DriverManager;
use crate::pool::DriverPool;
use crate::resolver::DriverResolver;
use crate::testing::{FakeDriver, FakeResolver};

fn holder(device: &Device, scope: DriverScope, native: Arc<FakeDriver>) -> Arc<DriverHolder> {
	Arc::new(
		DriverHolder::new(device.clone(), native)
			.with_device_type(device.device_type())
			.with_scope(scope),
	)
}

#[tokio::test]
async fn get_and_required_lookups() {
	let store = DriversStore::new();
	let device = Device::web("main", Browser::Chrome);

	assert!(store.get_driver(&device).is_none());
	assert!(matches!(
		store.get_required_driver(&device),
		Err(Error::DriverNotFound { .. })
	));

	store
		.add_driver(device.clone(), holder(&device, DriverScope::Suite, FakeDriver::new("a")))
		.await;
	assert_eq!(store.get_required_driver(&device).unwrap().session_id(), "a");
	assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn replacing_a_driver_quits_the_old_one() {
	let store = DriversStore::new();
	let device = Device::web("main", Browser::Chrome);
	let old = FakeDriver::new("old");
	let new = FakeDriver::new("new");

	store.add_driver(device.clone(), holder(&device, DriverScope::Suite, old.clone())).await;
	store.add_driver(device.clone(), holder(&device, DriverScope::Suite, new.clone())).await;

	assert_eq!(store.len(), 1);
	assert_eq!(old.quit_count(), 1);
	assert_eq!(new.quit_count(), 0);
	assert_eq!(store.get_driver(&device).unwrap().session_id(), "new");
}

#[tokio::test]
async fn re_adding_the_same_holder_is_a_no_op() {
	let store = DriversStore::new();
	let device = Device::web("main", Browser::Chrome);
	let native = FakeDriver::new("same");
	let h = holder(&device, DriverScope::Suite, native.clone());

	let mut events = store.subscribe();

	store.add_driver(device.clone(), h.clone()).await;
	store.add_driver(device.clone(), h).await;

	assert_eq!(native.quit_count(), 0);
	assert_eq!(store.len(), 1);
	assert!(matches!(events.try_recv(), Ok(DriverEvent::Started { .. })));
	assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn started_event_follows_registration() {
	let store = DriversStore::new();
	let mut events = store.subscribe();
	let device = Device::web("main", Browser::Chrome);

	store.add_driver(device.clone(), holder(&device, DriverScope::Suite, FakeDriver::new("a"))).await;
	match events.recv().await.unwrap() {
		DriverEvent::Started { device: d, session_id, .. } => {
			assert_eq!(session_id, "a");
			assert_eq!(store.get_driver(&d).unwrap().session_id(), "a");
		}
		other => panic!("unexpected event {other:?}"),
	}
}

#[tokio::test]
async fn replacement_waits_for_quitting_driver() {
	let store = Arc::new(DriversStore::new());
	let device = Device::web("main", Browser::Chrome);
	let old = FakeDriver::slow_quit("old", Duration::from_millis(300));
	store.add_driver(device.clone(), holder(&device, DriverScope::Method, old.clone())).await;

	let resolver = Arc::new(FakeResolver::new(DeviceType::Web));
	let manager = DriverManager::new(DriverProperties::default()).with_resolvers([resolver.clone() as Arc<dyn DriverResolver>]);
	let pool = DriverPool::new(manager, store.clone());
	let mut events = store.subscribe();

	let removal = tokio::spawn({
		let store = store.clone();
		let device = device.clone();
		async move { store.remove_driver(&device).await }
	});
	tokio::time::sleep(Duration::from_millis(50)).await;

	// Still registered while quitting, but no longer handed out.
	let quitting = store.get_driver(&device).unwrap();
	assert_eq!(quitting.session_id(), "old");
	assert!(quitting.is_quit());

	let fresh = pool.driver(&device).await.unwrap();
	assert_ne!(fresh.session_id(), "old");
	assert_eq!(resolver.init_count(), 1);
	assert_eq!(old.quit_count(), 1);
	assert!(removal.await.unwrap());

	match events.recv().await.unwrap() {
		DriverEvent::Stopped { session_id, .. } => assert_eq!(session_id, "old"),
		other => panic!("expected the old session to stop first, got {other:?}"),
	}
	assert!(matches!(events.recv().await.unwrap(), DriverEvent::Started { .. }));
	assert_eq!(store.get_driver(&device).unwrap().session_id(), fresh.session_id());
}

#[tokio::test]
async fn remove_quits_and_emits_stop_event() {
	let store = DriversStore::new();
	let mut events = store.subscribe();
	let device = Device::web("main", Browser::Chrome);
	let native = FakeDriver::new("s");

	store.add_driver(device.clone(), holder(&device, DriverScope::Class, native.clone())).await;
	assert!(store.remove_driver(&device).await);
	assert!(!store.remove_driver(&device).await);

	assert_eq!(native.quit_count(), 1);
	assert!(matches!(events.recv().await.unwrap(), DriverEvent::Started { .. }));
	match events.recv().await.unwrap() {
		DriverEvent::Stopped { device: d, scope, clean, .. } => {
			assert_eq!(d, device);
			assert_eq!(scope, DriverScope::Class);
			assert!(clean);
		}
		other => panic!("unexpected event {other:?}"),
	}
}

#[tokio::test]
async fn failed_quit_still_evicts() {
	let store = DriversStore::new();
	let mut events = store.subscribe();
	let device = Device::web("main", Browser::Chrome);

	store
		.add_driver(device.clone(), holder(&device, DriverScope::Method, FakeDriver::failing_quit("f")))
		.await;
	assert!(store.remove_driver(&device).await);
	assert!(store.is_empty());

	let _started = events.recv().await.unwrap();
	assert!(matches!(events.recv().await.unwrap(), DriverEvent::Stopped { clean: false, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_removal_quits_exactly_once() {
	let store = Arc::new(DriversStore::new());
	let device = Device::web("main", Browser::Chrome);
	let native = FakeDriver::slow_quit("slow", Duration::from_millis(20));
	store.add_driver(device.clone(), holder(&device, DriverScope::Suite, native.clone())).await;

	let tasks: Vec<_> = (0..16)
		.map(|_| {
			let store = store.clone();
			let device = device.clone();
			tokio::spawn(async move { store.remove_driver(&device).await })
		})
		.collect();

	let mut evicted = 0;
	for task in tasks {
		if task.await.unwrap() {
			evicted += 1;
		}
	}

	assert_eq!(evicted, 1);
	assert_eq!(native.quit_count(), 1);
	assert!(store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_clear_all_quits_each_driver_once() {
	let store = Arc::new(DriversStore::new());
	let mut natives = Vec::new();
	for i in 0..8 {
		let device = Device::web(format!("d{i}"), Browser::Chrome);
		let native = FakeDriver::slow_quit(format!("s{i}"), Duration::from_millis(5));
		natives.push(native.clone());
		store.add_driver(device.clone(), holder(&device, DriverScope::Suite, native)).await;
	}

	let a = tokio::spawn({
		let store = store.clone();
		async move { store.clear_all().await }
	});
	let b = tokio::spawn({
		let store = store.clone();
		async move { store.clear_all_scope(DriverScope::Suite).await }
	});
	let total = a.await.unwrap() + b.await.unwrap();

	assert_eq!(total, 8);
	assert!(natives.iter().all(|n| n.quit_count() == 1));
	assert!(store.is_empty());
}

#[tokio::test]
async fn clear_scope_and_besides_partition_the_store() {
	let store = DriversStore::new();
	let mut by_scope = Vec::new();
	for (i, scope) in DriverScope::ALL.into_iter().enumerate() {
		let device = Device::web(format!("d{i}"), Browser::Chrome);
		let native = FakeDriver::new(format!("s{i}"));
		by_scope.push((scope, native.clone()));
		store.add_driver(device.clone(), holder(&device, scope, native)).await;
	}

	assert_eq!(store.clear_all_scope(DriverScope::Class).await, 1);
	for (scope, native) in &by_scope {
		let expected = usize::from(*scope == DriverScope::Class);
		assert_eq!(native.quit_count(), expected, "scope {scope}");
	}

	assert_eq!(store.clear_all_besides(DriverScope::Execution).await, 2);
	assert_eq!(store.len(), 1);
	let remaining = store.devices();
	assert_eq!(remaining[0].name(), "d0");
	assert_eq!(store.get_driver(&remaining[0]).unwrap().scope(), DriverScope::Execution);

	assert_eq!(store.clear_all().await, 1);
	assert!(by_scope.iter().all(|(_, n)| n.quit_count() == 1));
}

#[tokio::test]
async fn find_by_type_matches_holder_type() {
	let store = DriversStore::new();
	assert!(store.find_inited_driver_by_type(DeviceType::Web).is_none());

	let phone = Device::mobile("pixel", MobilePlatform::Android);
	store
		.add_driver(phone.clone(), holder(&phone, DriverScope::Suite, FakeDriver::new("m")))
		.await;
	let browser = Device::web("main", Browser::Firefox);
	store
		.add_driver(browser.clone(), holder(&browser, DriverScope::Suite, FakeDriver::new("w")))
		.await;

	let found = store.find_inited_driver_by_type(DeviceType::Web).unwrap();
	assert_eq!(found.device_type(), Some(DeviceType::Web));
	assert_eq!(found.session_id(), "w");
	assert!(store.find_inited_driver_by_type(DeviceType::Desktop).is_none());
}
