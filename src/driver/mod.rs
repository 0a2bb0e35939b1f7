pub mod common;
pub mod scripts;
pub mod traits;
pub mod web;

#[cfg(test)]
pub(crate) mod fake;

pub use traits::{BrowserLauncher, BrowserProcess, PageDriver, PageSetup};
