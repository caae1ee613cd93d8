//! First-match driver construction over registered resolvers.

use std::sync::Arc;

use drover_protocol::{Device, DriverProperties, DriverScope};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::holder::DriverHolder;
use crate::resolver::DriverResolver;

/// Builds drivers by delegating to the first resolver that accepts a
/// device, then assigns the holder's scope.
///
/// Scope precedence: the device's own scope, then
/// [`DriverProperties::scope`], then [`DriverScope::Execution`].
pub struct DriverManager {
	resolvers: Vec<Arc<dyn DriverResolver>>,
	properties: DriverProperties,
}

impl DriverManager {
	pub fn new(properties: DriverProperties) -> Self {
		Self {
			resolvers: Vec::new(),
			properties,
		}
	}

	/// Appends a resolver. Earlier registrations win.
	pub fn register(&mut self, resolver: Arc<dyn DriverResolver>) -> &mut Self {
		self.resolvers.push(resolver);
		self
	}

	pub fn with_resolvers(mut self, resolvers: impl IntoIterator<Item = Arc<dyn DriverResolver>>) -> Self {
		self.resolvers.extend(resolvers);
		self
	}

	pub fn properties(&self) -> &DriverProperties {
		&self.properties
	}

	/// Effective scope for a device under this manager's properties.
	pub fn scope_for(&self, device: &Device) -> DriverScope {
		device.scope().or(self.properties.scope).unwrap_or_default()
	}

	/// Starts a new driver for `device`.
	///
	/// # Errors
	///
	/// - [`Error::NoResolver`] if no resolver accepts the device
	/// - [`Error::DriverInit`] wrapping the resolver's failure
	/// - [`Error::DeviceTypeUnset`] if the resolver forgot to tag the holder
	pub async fn get_driver(&self, device: &Device) -> Result<DriverHolder> {
		let resolver = self
			.resolvers
			.iter()
			.find(|r| r.can_resolve(device))
			.ok_or_else(|| Error::NoResolver {
				device: Box::new(device.clone()),
			})?;

		debug!(target = "drover.manager", %device, resolver_type = %resolver.device_type(), "resolving driver");
		let holder = resolver
			.init_driver(device)
			.await
			.map_err(|err| Error::driver_init(device, err))?;

		if holder.device_type().is_none() {
			if let Err(err) = holder.quit().await {
				warn!(target = "drover.manager", %device, error = %err, "failed to quit untyped driver");
			}
			return Err(Error::DeviceTypeUnset {
				device: Box::new(device.clone()),
			});
		}

		let scope = self.scope_for(device);
		info!(
			target = "drover.manager",
			%device,
			%scope,
			session_id = holder.session_id(),
			"driver started"
		);
		Ok(holder.with_scope(scope))
	}
}
