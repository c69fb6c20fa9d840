use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::{Result, SessionError};

/// Counting gate bounding how many audio chunks may be in flight without an
/// `AudioAdded` acknowledgement from the server.
///
/// Invariant: `available() + in_flight() == capacity()`.
#[derive(Debug)]
pub struct FlowController {
    slots: Semaphore,
    capacity: usize,
    in_flight: AtomicUsize,
}

impl FlowController {
    /// A capacity of zero is raised to one so the session can make progress.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Semaphore::new(capacity),
            capacity,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Take a slot, waiting at most `timeout` for one to be released.
    ///
    /// Cancel safe: a cancelled wait takes no slot.
    pub async fn acquire(&self, timeout: Duration) -> Result<()> {
        let permit = tokio::time::timeout(timeout, self.slots.acquire())
            .await
            .map_err(|_| SessionError::FlowControlTimeout { timeout })?
            .map_err(|_| SessionError::Task {
                message: "flow controller was shut down".to_string(),
            })?;

        // the slot is returned by `release`, not by dropping the permit
        permit.forget();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Return a slot. Releasing with nothing in flight means the server
    /// acknowledged more chunks than were sent.
    pub fn release(&self) -> Result<()> {
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| SessionError::FlowControlOverflow {
                capacity: self.capacity,
            })?;
        self.slots.add_permits(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SHORT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_acquire_up_to_capacity_then_time_out() {
        let flow = FlowController::new(2);
        flow.acquire(SHORT).await.unwrap();
        flow.acquire(SHORT).await.unwrap();
        assert_eq!(flow.available(), 0);
        assert_eq!(flow.in_flight(), 2);

        let err = flow.acquire(SHORT).await.unwrap_err();
        assert!(matches!(err, SessionError::FlowControlTimeout { timeout } if timeout == SHORT));
        assert_eq!(flow.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_zero_timeout_succeeds_only_with_free_slot() {
        let flow = FlowController::new(1);
        flow.acquire(Duration::ZERO).await.unwrap();
        assert!(matches!(
            flow.acquire(Duration::ZERO).await,
            Err(SessionError::FlowControlTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_release_wakes_waiter() {
        let flow = Arc::new(FlowController::new(1));
        flow.acquire(SHORT).await.unwrap();

        let waiter = {
            let flow = Arc::clone(&flow);
            tokio::spawn(async move { flow.acquire(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        flow.release().unwrap();

        waiter.await.unwrap().unwrap();
        assert_eq!(flow.in_flight(), 1);
        assert_eq!(flow.available(), 0);
    }

    #[tokio::test]
    async fn test_release_beyond_capacity_is_rejected() {
        let flow = FlowController::new(3);
        let err = flow.release().unwrap_err();
        assert!(matches!(err, SessionError::FlowControlOverflow { capacity: 3 }));
        assert_eq!(flow.available(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_acquire_takes_no_slot() {
        let flow = FlowController::new(1);
        flow.acquire(SHORT).await.unwrap();
        let _ = tokio::time::timeout(SHORT, flow.acquire(Duration::from_secs(5))).await;

        flow.release().unwrap();
        assert_eq!(flow.available(), 1);
        assert_eq!(flow.in_flight(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        assert_eq!(FlowController::new(0).capacity(), 1);
    }
}
