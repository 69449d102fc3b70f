pub use super::{Error, Result};

pub use crate::network::{NetworkId, PubKey, TransportKind};
pub use crate::protocol::{Envelope, Message};
pub use crate::transport::{ConnectionStream, Transport};

pub use tokio::time::{timeout, Duration};

pub use std::sync::Arc;

pub use futures::{Future, FutureExt};

pub use crate::colored::Colorize;

pub use tracing::{debug, error, info, warn};
