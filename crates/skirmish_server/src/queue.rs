//! Bounded, thread-safe command intake.
//!
//! Producers on any thread or task hold a cloneable [`CommandSender`]. The
//! scheduler owns the single [`CommandReceiver`] and drains it at tick
//! boundaries, so commands reach the simulation in arrival order.

use tokio::sync::mpsc::{self, error::TrySendError};

use skirmish_core::commands::CommandEnvelope;

use crate::ServerError;

/// Create a command queue holding at most `capacity` pending commands.
#[must_use]
pub fn command_queue(capacity: usize) -> (CommandSender, CommandReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (CommandSender { tx }, CommandReceiver { rx, capacity })
}

/// Producer half of the command queue.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<CommandEnvelope>,
}

impl CommandSender {
    /// Enqueue without waiting.
    ///
    /// # Errors
    ///
    /// [`ServerError::QueueFull`] if the queue is at capacity,
    /// [`ServerError::QueueClosed`] if the scheduler is gone.
    pub fn try_submit(&self, envelope: CommandEnvelope) -> Result<(), ServerError> {
        self.tx.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => ServerError::QueueFull,
            TrySendError::Closed(_) => ServerError::QueueClosed,
        })
    }

    /// Enqueue, waiting for space.
    ///
    /// # Errors
    ///
    /// [`ServerError::QueueClosed`] if the scheduler is gone.
    pub async fn submit(&self, envelope: CommandEnvelope) -> Result<(), ServerError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| ServerError::QueueClosed)
    }

    /// Enqueue from a plain thread, blocking until there is space.
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// [`ServerError::QueueClosed`] if the scheduler is gone.
    pub fn blocking_submit(&self, envelope: CommandEnvelope) -> Result<(), ServerError> {
        self.tx
            .blocking_send(envelope)
            .map_err(|_| ServerError::QueueClosed)
    }

    /// Whether the scheduler has dropped its receiver.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the command queue, owned by the scheduler.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::Receiver<CommandEnvelope>,
    capacity: usize,
}

impl CommandReceiver {
    /// Take every queued command in arrival order without waiting.
    ///
    /// At most one queue's worth is taken per call, so producers that keep
    /// sending cannot hold up a tick.
    pub fn drain(&mut self) -> Vec<CommandEnvelope> {
        let mut out = Vec::new();
        while out.len() < self.capacity {
            match self.rx.try_recv() {
                Ok(envelope) => out.push(envelope),
                Err(_) => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::commands::Command;

    fn attack(target: u64) -> CommandEnvelope {
        CommandEnvelope::from_team(
            1,
            Command::Attack {
                units: vec![1],
                target,
            },
        )
    }

    #[test]
    fn test_drain_preserves_order() {
        let (tx, mut rx) = command_queue(8);
        for target in 1..=3 {
            tx.try_submit(attack(target)).unwrap();
        }
        let drained = rx.drain();
        assert_eq!(drained, vec![attack(1), attack(2), attack(3)]);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_full_queue_pushes_back() {
        let (tx, mut rx) = command_queue(2);
        tx.try_submit(attack(1)).unwrap();
        tx.try_submit(attack(2)).unwrap();
        assert!(matches!(tx.try_submit(attack(3)), Err(ServerError::QueueFull)));
        assert_eq!(rx.drain().len(), 2);
        tx.try_submit(attack(3)).unwrap();
    }

    #[test]
    fn test_closed_queue() {
        let (tx, rx) = command_queue(2);
        drop(rx);
        assert!(tx.is_closed());
        assert!(matches!(tx.try_submit(attack(1)), Err(ServerError::QueueClosed)));
    }

    #[test]
    fn test_concurrent_producers() {
        let (tx, mut rx) = command_queue(64);
        let handles: Vec<_> = (0..4)
            .map(|team| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for target in 0..8 {
                        tx.blocking_submit(CommandEnvelope::from_team(
                            team,
                            Command::Attack {
                                units: vec![1],
                                target,
                            },
                        ))
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let drained = rx.drain();
        assert_eq!(drained.len(), 32);
        // Each producer's commands keep their relative order.
        for team in 0..4 {
            let targets: Vec<u64> = drained
                .iter()
                .filter(|e| e.issuer == skirmish_core::commands::Issuer::Team(team))
                .filter_map(|e| match e.command {
                    Command::Attack { target, .. } => Some(target),
                    _ => None,
                })
                .collect();
            assert_eq!(targets, (0..8).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_async_submit() {
        let (tx, mut rx) = command_queue(1);
        tx.submit(attack(7)).await.unwrap();
        assert_eq!(rx.drain(), vec![attack(7)]);
    }
}
