pub mod behavior;
pub mod detector;
pub mod ledger;
pub mod message;
pub mod peers;
pub mod processor;
pub mod store;

pub use behavior::*;
pub use detector::*;
pub use ledger::*;
pub use message::*;
pub use peers::*;
pub use processor::*;
pub use store::*;
