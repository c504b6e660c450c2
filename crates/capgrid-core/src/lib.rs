pub mod clock;
pub mod config;
pub mod types;

pub use clock::epoch_secs;
pub use config::CapgridConfig;
pub use types::*;
