//! Lifecycle events and the listener bus.
//!
//! Listeners are stored in an [`IndexMap`] keyed by [`HandlerId`], so
//! removal is O(1) and registration order is stable. [`LifecycleBus::publish`]
//! awaits listeners one after another, sorted by [`LifecycleListener::order`]
//! (ties keep registration order). A failing listener is logged and skipped;
//! it never stops the remaining listeners or the run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use drover_protocol::Environment;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::config::ExecutionConfig;
use crate::context::TestExecutionContext;
use crate::error::Result;
use crate::report::{RunSummary, TestResult};

const EVENT_CAPACITY: usize = 256;

/// Unique identifier for a registered listener.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Published once per run, before the first suite starts.
#[derive(Debug)]
pub struct ExecutionStart {
	pub run_id: String,
	/// Unix epoch milliseconds.
	pub started_at_ms: u64,
	pub environment: Arc<Environment>,
	pub config: Arc<ExecutionConfig>,
}

/// A point in the run lifecycle.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
	ExecutionStart(Arc<ExecutionStart>),
	SuiteStart { suite: String },
	ClassStart { class: String },
	TestStart(Arc<TestExecutionContext>),
	TestFinish {
		result: Arc<TestResult>,
		context: Arc<TestExecutionContext>,
	},
	ClassFinish { class: String },
	SuiteFinish { suite: String },
	ExecutionFinish(Arc<RunSummary>),
}

impl LifecycleEvent {
	pub fn name(&self) -> &'static str {
		match self {
			LifecycleEvent::ExecutionStart(_) => "execution_start",
			LifecycleEvent::SuiteStart { .. } => "suite_start",
			LifecycleEvent::ClassStart { .. } => "class_start",
			LifecycleEvent::TestStart(_) => "test_start",
			LifecycleEvent::TestFinish { .. } => "test_finish",
			LifecycleEvent::ClassFinish { .. } => "class_finish",
			LifecycleEvent::SuiteFinish { .. } => "suite_finish",
			LifecycleEvent::ExecutionFinish(_) => "execution_finish",
		}
	}
}

/// Reacts to lifecycle events.
#[async_trait]
pub trait LifecycleListener: Send + Sync {
	fn name(&self) -> &str;

	/// Lower runs earlier. Defaults to `0`.
	fn order(&self) -> i32 {
		0
	}

	async fn on_event(&self, event: &LifecycleEvent) -> Result<()>;
}

type ListenerMap = Arc<Mutex<IndexMap<HandlerId, Arc<dyn LifecycleListener>>>>;

/// RAII handle that unregisters a listener on drop.
///
/// Holds a weak reference to the listener map, so dropping it after the
/// bus is gone is a no-op.
pub struct Subscription {
	id: HandlerId,
	listeners: Weak<Mutex<IndexMap<HandlerId, Arc<dyn LifecycleListener>>>>,
	active: bool,
}

impl Subscription {
	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Explicitly unsubscribes. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		self.remove();
	}

	fn remove(&mut self) {
		if std::mem::take(&mut self.active) {
			if let Some(map) = self.listeners.upgrade() {
				map.lock().shift_remove(&self.id);
			}
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.remove();
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.active)
			.finish()
	}
}

/// Ordered, fault-isolating dispatch of [`LifecycleEvent`]s.
pub struct LifecycleBus {
	listeners: ListenerMap,
	events: broadcast::Sender<LifecycleEvent>,
}

impl Default for LifecycleBus {
	fn default() -> Self {
		Self::new()
	}
}

impl LifecycleBus {
	pub fn new() -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			listeners: Arc::new(Mutex::new(IndexMap::new())),
			events,
		}
	}

	/// Registers a listener for the lifetime of the bus.
	pub fn register(&self, listener: Arc<dyn LifecycleListener>) -> HandlerId {
		let id = next_handler_id();
		self.listeners.lock().insert(id, listener);
		id
	}

	/// Registers a listener until the returned [`Subscription`] is dropped.
	pub fn subscribe_listener(&self, listener: Arc<dyn LifecycleListener>) -> Subscription {
		let id = self.register(listener);
		Subscription {
			id,
			listeners: Arc::downgrade(&self.listeners),
			active: true,
		}
	}

	/// Observes events after all listeners have run.
	pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
		self.events.subscribe()
	}

	pub fn len(&self) -> usize {
		self.listeners.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.listeners.lock().is_empty()
	}

	/// Delivers `event` to every listener in order.
	pub async fn publish(&self, event: LifecycleEvent) {
		let mut listeners: Vec<Arc<dyn LifecycleListener>> = self.listeners.lock().values().cloned().collect();
		listeners.sort_by_key(|l| l.order());

		trace!(target = "drover.events", event = event.name(), listeners = listeners.len(), "publishing");
		for listener in listeners {
			if let Err(err) = listener.on_event(&event).await {
				warn!(
					target = "drover.events",
					event = event.name(),
					listener = listener.name(),
					error = %err,
					"listener failed; continuing"
				);
			}
		}
		let _ = self.events.send(event);
	}
}
