//! Tag-keyed component factories and fixture injection.
//!
//! A fixture declares the [`Tag`]s it needs; before the test body runs the
//! registry builds each component against the test's context and hands it
//! to [`Fixture::accept`]. Built-in tags:
//!
//! | Tag | Component |
//! |---|---|
//! | `driver:web`, `driver:mobile`, `driver:desktop` | `Arc<DriverHolder>` |
//! | `environment` | `Arc<Environment>` |
//! | `user:<name>` | `Arc<User>` from the configured users |

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use drover_protocol::DeviceType;
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::auth::User;
use crate::context::TestExecutionContext;
use crate::error::{Error, Result};

/// An injected value. Downcast with [`ComponentRegistry::resolve`].
pub type Component = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(Arc<TestExecutionContext>) -> BoxFuture<'static, Result<Component>> + Send + Sync>;

/// Identifies an injectable component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(String);

impl Tag {
	pub const WEB_DRIVER: &'static str = "driver:web";
	pub const MOBILE_DRIVER: &'static str = "driver:mobile";
	pub const DESKTOP_DRIVER: &'static str = "driver:desktop";
	pub const ENVIRONMENT: &'static str = "environment";
	const USER_PREFIX: &'static str = "user:";

	pub fn new(tag: impl Into<String>) -> Self {
		Self(tag.into())
	}

	pub fn driver(device_type: DeviceType) -> Self {
		Self::new(match device_type {
			DeviceType::Web => Self::WEB_DRIVER,
			DeviceType::Mobile => Self::MOBILE_DRIVER,
			DeviceType::Desktop => Self::DESKTOP_DRIVER,
		})
	}

	pub fn user(name: &str) -> Self {
		Self(format!("{}{name}", Self::USER_PREFIX))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// The user name of a `user:<name>` tag.
	pub fn user_name(&self) -> Option<&str> {
		self.0.strip_prefix(Self::USER_PREFIX)
	}
}

impl std::fmt::Display for Tag {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Tag {
	fn from(tag: &str) -> Self {
		Self::new(tag)
	}
}

/// Something that receives components before a test runs.
pub trait Fixture: Send {
	fn requires(&self) -> Vec<Tag>;

	/// Receives the component for `tag`. Returning an error aborts the
	/// injection.
	fn accept(&mut self, tag: &Tag, component: Component) -> Result<()>;
}

/// Builds components by [`Tag`].
#[derive(Default)]
pub struct ComponentRegistry {
	factories: HashMap<Tag, Factory>,
	users: BTreeMap<String, User>,
}

impl ComponentRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry with the built-in driver, environment and user tags.
	pub fn with_builtins(users: BTreeMap<String, User>) -> Self {
		let mut registry = Self {
			factories: HashMap::new(),
			users,
		};
		for device_type in [DeviceType::Web, DeviceType::Mobile, DeviceType::Desktop] {
			registry.register(Tag::driver(device_type), move |ctx| async move {
				let holder = ctx.driver_by_type(device_type).await?;
				Ok(holder as Component)
			});
		}
		registry.register(Tag::new(Tag::ENVIRONMENT), |ctx| async move {
			Ok(ctx.environment().clone() as Component)
		});
		registry
	}

	/// Registers (or replaces) the factory for `tag`.
	pub fn register<F, Fut>(&mut self, tag: Tag, factory: F) -> &mut Self
	where
		F: Fn(Arc<TestExecutionContext>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Component>> + Send + 'static,
	{
		self.factories.insert(tag, Arc::new(move |ctx| Box::pin(factory(ctx))));
		self
	}

	pub fn contains(&self, tag: &Tag) -> bool {
		self.factories.contains_key(tag) || tag.user_name().is_some_and(|name| self.users.contains_key(name))
	}

	/// Builds the component for `tag`.
	pub async fn component(&self, tag: &Tag, ctx: &Arc<TestExecutionContext>) -> Result<Component> {
		if let Some(factory) = self.factories.get(tag) {
			return factory(ctx.clone()).await;
		}
		if let Some(name) = tag.user_name() {
			return self
				.users
				.get(name)
				.map(|user| Arc::new(user.clone()) as Component)
				.ok_or_else(|| Error::injection(tag, format!("user '{name}' is not configured")));
		}
		Err(Error::injection(tag, "no component registered"))
	}

	/// Builds the component for `tag` and downcasts it to `T`.
	pub async fn resolve<T: Any + Send + Sync>(&self, tag: &Tag, ctx: &Arc<TestExecutionContext>) -> Result<Arc<T>> {
		self.component(tag, ctx)
			.await?
			.downcast::<T>()
			.map_err(|_| Error::injection(tag, format!("component is not a {}", std::any::type_name::<T>())))
	}

	/// Satisfies every tag the fixture requires, in declaration order.
	pub async fn inject(&self, fixture: &mut dyn Fixture, ctx: &Arc<TestExecutionContext>) -> Result<()> {
		for tag in fixture.requires() {
			debug!(target = "drover.registry", %tag, test = %ctx.info().id(), "injecting");
			let component = self.component(&tag, ctx).await?;
			fixture.accept(&tag, component)?;
		}
		Ok(())
	}
}
