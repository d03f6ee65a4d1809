pub mod fixtures;
pub mod mock;
pub mod rng;

pub use mock::{MockVmService, MockVmServiceBuilder};
