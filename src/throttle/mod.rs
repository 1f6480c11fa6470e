//! Request throttling logic and state management.

mod backend;
mod decision;
mod entry;
mod key;
mod limiter;
mod maintenance;
pub mod policy;

pub use backend::ThrottleBackend;
pub use decision::{Decision, Usage};
pub use entry::ThrottleEntry;
pub use key::{BucketKey, UNKNOWN_IDENTITY};
pub use limiter::Throttle;
pub use maintenance::MaintenanceHandle;
pub use policy::{Policy, PolicyRegistry, PolicyRule, PolicyTable};
