pub mod catalog;
pub mod client;
pub mod portfolio;
pub mod session;
pub mod target;

pub use catalog::*;
pub use client::*;
pub use portfolio::*;
pub use session::*;
pub use target::*;
