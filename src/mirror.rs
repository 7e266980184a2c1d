pub mod store;

pub use store::{MirrorScan, MirrorStore};
