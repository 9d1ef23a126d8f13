pub mod config;
pub mod error;
pub mod export;
pub mod io;
pub mod paths;
pub mod project;
pub mod store;
pub mod story;
pub mod sync;
pub mod types;
pub mod view;

pub use error::{ForgeError, Result};
