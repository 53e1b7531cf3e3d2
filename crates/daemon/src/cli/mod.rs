pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Atom, Daemon, Health, Init, Manifest, Node, Version};
