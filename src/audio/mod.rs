pub mod source;

pub use source::{AudioSource, SyncSource};
