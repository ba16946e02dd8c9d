//! 🎡 Round-robin connection pool.
//!
//! An explicit cursor over a fixed set of connections. The pool is plain
//! owned state for a single driver task: `current` hands out the active
//! connection, `advance` rotates after a failure, and `connect_any`
//! rotates until some host answers. Nothing here is shared or locked;
//! callers wanting parallelism run one pool per task.

use tracing::warn;

use crate::connection::{ClientError, Connection};

pub struct ConnectionPool {
    conns: Vec<Connection>,
    cursor: usize,
}

impl ConnectionPool {
    /// At least one connection is required; the hosts list comes from
    /// config and an empty one is a config error.
    pub fn new(conns: Vec<Connection>) -> Result<Self, ClientError> {
        if conns.is_empty() {
            return Err(ClientError::InvalidConfig(
                "connection pool needs at least one host".to_string(),
            ));
        }
        Ok(ConnectionPool { conns, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// The connection under the cursor.
    pub fn current(&mut self) -> &mut Connection {
        &mut self.conns[self.cursor]
    }

    /// Rotate to the next connection, wrapping at the end.
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.conns.len();
    }

    /// Try each host starting at the cursor until one answers `connect`.
    ///
    /// Leaves the cursor on the host that answered. Returns the last
    /// error when the full rotation fails.
    pub async fn connect_any(&mut self) -> Result<&mut Connection, ClientError> {
        let mut last_err = None;
        for _ in 0..self.conns.len() {
            match self.conns[self.cursor].connect().await {
                Ok(_) => return Ok(&mut self.conns[self.cursor]),
                Err(err) => {
                    warn!(
                        url = %self.conns[self.cursor].url(),
                        error = %err,
                        "host unreachable, rotating"
                    );
                    last_err = Some(err);
                    self.advance();
                }
            }
        }
        Err(last_err.unwrap_or(ClientError::MissingVersion))
    }
}
