//! JSON document storage

mod store;

pub use store::{JsonStore, GLOBAL_DIR_NAME, PROJECT_DIR_NAME};
