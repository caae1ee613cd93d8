//! drover runtime: driver resolution, holders and the scoped store.
//!
//! - **Resolvers**: [`DriverResolver`] strategies turn a [`Device`] into a
//!   live [`NativeDriver`] (built-ins speak W3C WebDriver)
//! - **Manager**: [`DriverManager`] picks the first matching resolver and
//!   assigns the driver's [`DriverScope`]
//! - **Store**: [`DriversStore`] keeps one live [`DriverHolder`] per device
//!   and evicts by scope
//! - **Pool**: [`DriverPool`] combines the two for get-or-start access
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   get_or_start   ┌──────────────┐
//! │  DriverPool  │ ───────────────► │ DriversStore │  DashMap<Device, Arc<DriverHolder>>
//! └──────┬───────┘                  └──────┬───────┘
//!        │ get_driver                      │ DriverEvent (broadcast)
//! ┌──────▼───────┐                         ▼
//! │DriverManager │ ── first match ──► [DriverResolver, ...] ──► RemoteSession
//! └──────────────┘
//! ```
//!
//! [`Device`]: drover_protocol::Device
//! [`DriverScope`]: drover_protocol::DriverScope

pub mod error;
pub mod holder;
pub mod manager;
pub mod native;
pub mod pool;
pub mod resolver;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod webdriver;

pub use error::{Error, Result};
pub use holder::DriverHolder;
pub use manager::DriverManager;
pub use native::{LogEntry, NativeDriver};
pub use pool::DriverPool;
pub use resolver::{AppiumResolver, DesktopResolver, DriverResolver, RemoteWebResolver, default_resolvers, web_capabilities};
pub use store::DriversStore;
pub use webdriver::{LogEndpoint, RemoteSession};
