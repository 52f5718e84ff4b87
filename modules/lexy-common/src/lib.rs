pub mod error;
pub mod links;
pub mod types;
pub mod wire;

pub use error::LexyError;
pub use links::{canonical_link, same_link};
pub use types::*;
pub use wire::*;
