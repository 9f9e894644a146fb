//! Minimal idle stash for prepared backend channels.
//!
//! Eviction, per-destination registries and health checks live outside the
//! preparation core; all it needs is checkin-or-refuse and checkout.

use std::collections::VecDeque;

use log::debug;
use parking_lot::Mutex;

use crate::server::ServerChannel;

/// A bounded stash of idle backend channels.
#[derive(Debug)]
pub struct ConnectionPool {
    capacity: usize,
    idle: Mutex<VecDeque<ServerChannel>>,
}

impl ConnectionPool {
    pub fn new(capacity: usize) -> ConnectionPool {
        ConnectionPool {
            capacity,
            idle: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to stash a channel. A full pool refuses and hands the channel
    /// back so the caller can close it gracefully.
    pub fn try_checkin(&self, server: ServerChannel) -> Result<(), ServerChannel> {
        let mut idle = self.idle.lock();
        if idle.len() >= self.capacity {
            debug!(
                "Pool is full ({} idle), refusing backend connection",
                idle.len()
            );
            return Err(server);
        }
        idle.push_back(server);
        Ok(())
    }

    /// Hand back the oldest idle channel, if any.
    pub fn checkout(&self) -> Option<ServerChannel> {
        self.idle.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.idle.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_channel(username: &str) -> ServerChannel {
        let mut server = ServerChannel::new();
        server.open = true;
        server.username = username.to_string();
        server
    }

    #[test]
    fn checkin_refuses_when_full() {
        let pool = ConnectionPool::new(1);
        assert!(pool.try_checkin(idle_channel("a")).is_ok());

        let refused = pool.try_checkin(idle_channel("b")).unwrap_err();
        assert_eq!(refused.username, "b");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn zero_capacity_refuses_everything() {
        let pool = ConnectionPool::new(0);
        assert!(pool.try_checkin(idle_channel("a")).is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn checkout_is_fifo() {
        let pool = ConnectionPool::new(4);
        pool.try_checkin(idle_channel("first")).unwrap();
        pool.try_checkin(idle_channel("second")).unwrap();

        assert_eq!(pool.checkout().unwrap().username, "first");
        assert_eq!(pool.checkout().unwrap().username, "second");
        assert!(pool.checkout().is_none());
    }
}
