pub mod atom;
pub mod daemon;
pub mod health;
pub mod init;
pub mod manifest;
pub mod node;
pub mod version;

pub use atom::Atom;
pub use daemon::Daemon;
pub use health::Health;
pub use init::Init;
pub use manifest::Manifest;
pub use node::Node;
pub use version::Version;
