pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{entry, fixed_time};
#[allow(unused_imports)]
pub use mocks::{FailingBackend, InstrumentedBackend, ScriptedBackend, ScriptedPage};
