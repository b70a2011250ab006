pub mod app;
pub mod storage;
pub mod store;

pub use nooltools_updater_lib as updater;
