use super::prelude::*;

/// Retries an operation with linearly increasing pauses: `delta`, `2 * delta`, ...
///
/// Used for connection attempts, where a peer that is still publishing its address often
/// becomes reachable after a short wait.
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    delta: Duration,
    attempts: u32,
}

impl LinearBackoff {
    pub fn new(delta: Duration, attempts: u32) -> Self {
        LinearBackoff { delta, attempts: attempts.max(1) }
    }

    /// Runs `operation` until it succeeds or the attempts are used up; returns the last error.
    pub async fn retry<F, Fut, T, E>(&self, mut operation: F) -> std::result::Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut epoch = 0;
        loop {
            match operation(epoch).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    epoch += 1;
                    if epoch >= self.attempts {
                        return Err(err);
                    }
                    let delta = self.delta * epoch;
                    debug!("attempt {} failed ({}), retrying in {:?}", epoch, err, delta);
                    tokio::time::sleep(delta).await;
                }
            }
        }
    }
}
