//! Two-stage mean reduction across replicas.
//!
//! Replicas are laid out on a grid of `devices.len() x batch` slots. A reduction
//! first averages the contributions of the batch replicas of each device on that
//! device, then averages the per-device means on the first device, and finally
//! sends a copy of the result to every replica on its own device. Contributions
//! are always visited in slot order, so the result does not depend on the order
//! in which replicas arrive at the barrier.
use crate::util::NamedTensors;
use anakin_core::error::AnakinError;
use anyhow::{anyhow, Result};
use candle_core::Device;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace};

/// Averages a tree of tensors over all replicas.
///
/// Every replica must call [`GradientReducer::all_reduce_mean`] the same number
/// of times with trees of the same structure. The call returns only after every
/// replica has contributed.
pub trait GradientReducer {
    /// Contributes `tree` and returns the mean over all replicas.
    fn all_reduce_mean(&self, tree: NamedTensors) -> Result<NamedTensors>;
}

/// Reducer of a single replica; the mean is the contribution itself.
pub struct LocalReducer;

impl GradientReducer for LocalReducer {
    fn all_reduce_mean(&self, tree: NamedTensors) -> Result<NamedTensors> {
        Ok(tree)
    }
}

/// Mean of contributions in device-major slot order.
///
/// Stage one averages the `batch` contributions of each device on that device,
/// stage two averages the per-device means on `devices[0]`.
pub fn two_stage_mean(
    contribs: &[NamedTensors],
    devices: &[Device],
    batch: usize,
) -> Result<NamedTensors> {
    if contribs.len() != devices.len() * batch || contribs.is_empty() {
        return Err(anyhow!(
            "{} contributions for {} devices x {} replicas",
            contribs.len(),
            devices.len(),
            batch
        ));
    }
    for (replica, tree) in contribs.iter().enumerate().skip(1) {
        contribs[0]
            .check_structure(tree)
            .map_err(|detail| AnakinError::ReductionShapeMismatch { replica, detail })?;
    }

    let per_device = contribs
        .chunks(batch)
        .zip(devices.iter())
        .map(|(trees, device)| {
            let trees: Vec<&NamedTensors> = trees.iter().collect();
            NamedTensors::mean(&trees, device)
        })
        .collect::<Result<Vec<_>>>()?;
    let per_device: Vec<&NamedTensors> = per_device.iter().collect();
    NamedTensors::mean(&per_device, &devices[0])
}

enum Message {
    Contribute(usize, NamedTensors),
    Leave(usize),
}

/// The replica side of a reduction barrier.
///
/// Dropping the handle tells the hub that the replica has finished.
pub struct ReplicaHandle {
    id: usize,
    to_hub: Sender<Message>,
    from_hub: Receiver<NamedTensors>,
}

impl ReplicaHandle {
    /// Slot of the replica.
    pub fn id(&self) -> usize {
        self.id
    }
}

impl GradientReducer for ReplicaHandle {
    fn all_reduce_mean(&self, tree: NamedTensors) -> Result<NamedTensors> {
        self.to_hub
            .send(Message::Contribute(self.id, tree))
            .map_err(|_| AnakinError::ReplicaDisconnected)?;
        Ok(self
            .from_hub
            .recv()
            .map_err(|_| AnakinError::ReplicaDisconnected)?)
    }
}

impl Drop for ReplicaHandle {
    fn drop(&mut self) {
        // The hub may already be gone after a failure.
        let _ = self.to_hub.send(Message::Leave(self.id));
    }
}

/// The reducing side of a barrier, run on the coordinating thread.
pub struct Hub {
    from_replicas: Receiver<Message>,
    to_replicas: Vec<Sender<NamedTensors>>,
    devices: Vec<Device>,
    batch: usize,
}

impl Hub {
    fn reduce_round(&self, slots: &mut [Option<NamedTensors>]) -> Result<()> {
        let contribs: Vec<NamedTensors> = slots.iter_mut().filter_map(Option::take).collect();
        let mean = two_stage_mean(&contribs, &self.devices, self.batch)?;
        for (slot, tx) in self.to_replicas.iter().enumerate() {
            let device = &self.devices[slot / self.batch];
            tx.send(mean.to_device(device)?)
                .map_err(|_| AnakinError::ReplicaDisconnected)?;
        }
        Ok(())
    }

    /// Serves reductions until every replica has left; returns the number of rounds.
    ///
    /// A replica leaving while others wait for a reduction, or contributing after
    /// another replica has left, is an error. Returning drops the channels to the
    /// replicas, which releases any replica blocked at the barrier.
    pub fn run(self) -> Result<usize> {
        let n = self.to_replicas.len();
        let mut slots: Vec<Option<NamedTensors>> = vec![None; n];
        let mut left = vec![false; n];
        let mut rounds = 0;

        while left.iter().any(|l| !l) {
            let message = match self.from_replicas.recv() {
                Ok(message) => message,
                Err(_) => break,
            };
            match message {
                Message::Contribute(id, tree) => {
                    if left.iter().any(|&l| l) || slots[id].is_some() {
                        return Err(AnakinError::ReplicaDisconnected.into());
                    }
                    slots[id] = Some(tree);
                    if slots.iter().all(Option::is_some) {
                        self.reduce_round(&mut slots)?;
                        rounds += 1;
                        trace!("Reduction round {} completed", rounds);
                    }
                }
                Message::Leave(id) => {
                    left[id] = true;
                    if slots.iter().any(Option::is_some) {
                        return Err(AnakinError::ReplicaDisconnected.into());
                    }
                }
            }
        }
        debug!("Barrier closed after {} reduction rounds", rounds);
        Ok(rounds)
    }
}

/// Creates a barrier for `batch` replicas on each of `devices`.
///
/// Handles are returned in device-major slot order.
pub fn barrier(devices: Vec<Device>, batch: usize) -> (Hub, Vec<ReplicaHandle>) {
    let n = devices.len() * batch;
    let (to_hub, from_replicas) = unbounded();
    let mut to_replicas = Vec::with_capacity(n);
    let mut handles = Vec::with_capacity(n);
    for id in 0..n {
        let (tx, rx) = unbounded();
        to_replicas.push(tx);
        handles.push(ReplicaHandle {
            id,
            to_hub: to_hub.clone(),
            from_hub: rx,
        });
    }
    let hub = Hub {
        from_replicas,
        to_replicas,
        devices,
        batch,
    };
    (hub, handles)
}
