pub mod types;
pub mod cache;
pub mod intent;
pub mod filter;

pub use types::*;
pub use cache::*;
pub use intent::*;
pub use filter::*;
