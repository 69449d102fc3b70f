//! Node assembly: settings, the accept loop, message routing and periodic maintenance.

mod janitor;
pub mod node;
mod router;
mod server;
pub mod settings;

pub use janitor::*;
pub use node::Node;
pub use router::*;
pub use server::*;
pub use settings::*;
