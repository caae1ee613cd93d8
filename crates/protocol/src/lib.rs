//! Data model shared across the drover crates.
//!
//! Types in this crate describe *what* a test run needs, never *how* it is
//! obtained:
//! - [`Device`] and its [`DeviceKind`] variants declare browsers, mobile
//!   devices and desktop apps
//! - [`DriverScope`] names the lifecycle boundary that releases a driver
//! - [`Environment`] groups devices with run parameters
//! - [`DriverEvent`] is what observers see when drivers start and stop
//! - [`DriverProperties`] carries driver-wide defaults
//!
//! Everything here is plain serde data. Driver construction lives in
//! `drover-runtime`, orchestration in `drover`.

pub mod device;
pub mod environment;
pub mod events;
pub mod properties;
pub mod scope;

pub use device::*;
pub use environment::*;
pub use events::*;
pub use properties::*;
pub use scope::*;
