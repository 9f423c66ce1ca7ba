pub mod aggregator;
pub mod identity;
pub mod watch;

pub use aggregator::{ItemState, ItemStateAggregator};
pub use identity::ItemIdentity;
pub use watch::WatchRegistrar;
