//! Collection point for the addresses announced by the backends.
//!
//! The barrier is a bounded channel with room for exactly `n` addresses.
//! Each supervisor owns one [`AddressPublisher`] and gives it up when it
//! publishes, so an instance cannot announce twice. The proxy launcher owns
//! the single [`AddressCollector`], which resolves once all `n` are in.

use tokio::sync::mpsc;

use crate::error::{OrchestratorError, Result};
use crate::models::AddressSet;

/// Create a barrier that releases after `n` published addresses.
pub fn discovery_barrier(n: usize) -> Result<(AddressPublisher, AddressCollector)> {
    if n == 0 {
        return Err(OrchestratorError::InvalidConfig(
            "discovery barrier needs at least one instance".into(),
        ));
    }
    let (tx, rx) = mpsc::channel(n);
    Ok((
        AddressPublisher { tx },
        AddressCollector {
            expected: n,
            rx,
        },
    ))
}

/// Write side of the barrier. Clone one per supervisor.
#[derive(Debug, Clone)]
pub struct AddressPublisher {
    tx: mpsc::Sender<String>,
}

impl AddressPublisher {
    /// Publish a discovered address, waiting for room if the barrier is full.
    pub async fn publish(self, address: String) -> Result<()> {
        self.tx
            .send(address)
            .await
            .map_err(|_| OrchestratorError::BarrierClosed)
    }
}

/// Read side of the barrier.
#[derive(Debug)]
pub struct AddressCollector {
    expected: usize,
    rx: mpsc::Receiver<String>,
}

impl AddressCollector {
    /// Wait until every expected address has been published and return them
    /// in publish order.
    pub async fn await_full(mut self) -> Result<AddressSet> {
        tracing::info!(expected = self.expected, "waiting for backend instances to start");
        let mut addresses = Vec::with_capacity(self.expected);
        while addresses.len() < self.expected {
            match self.rx.recv().await {
                Some(address) => {
                    tracing::info!(
                        %address,
                        received = addresses.len() + 1,
                        expected = self.expected,
                        "discovered backend instance"
                    );
                    addresses.push(address);
                }
                None => {
                    return Err(OrchestratorError::DiscoveryIncomplete {
                        expected: self.expected,
                        received: addresses.len(),
                    });
                }
            }
        }
        Ok(AddressSet::from(addresses))
    }
}
