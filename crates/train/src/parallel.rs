//! Data-parallel replicas: one model copy per device, batch sharding, and
//! gradient merging.
//!
//! Replica 0 is the primary. Parameters live independently on every device
//! and are re-aligned by name with [`ReplicaSet::synchronize`]; gradients
//! from all replicas are summed onto the primary device before any clipping
//! or optimiser step, so the update is identical to a single big batch.

use candle_core::backprop::GradStore;
use candle_core::{Device, Result, Tensor};
use candle_nn::{VarBuilder, VarMap};

use bilm_common::BiLmConfig;
use bilm_core::BiLm;

/// Parse a comma-separated GPU ordinal list. An empty or blank spec selects
/// the CPU.
pub fn parse_devices(spec: &str) -> Result<Vec<Device>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(vec![Device::Cpu]);
    }
    let mut devices = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let ordinal: usize = match part.parse() {
            Ok(ordinal) => ordinal,
            Err(_) => candle_core::bail!("invalid gpu ordinal {part:?}"),
        };
        devices.push(Device::new_cuda(ordinal)?);
    }
    if devices.is_empty() {
        devices.push(Device::Cpu);
    }
    Ok(devices)
}

/// One model copy bound to one device.
pub struct Replica {
    pub device: Device,
    pub varmap: VarMap,
    pub model: BiLm,
}

pub struct ReplicaSet {
    replicas: Vec<Replica>,
}

impl ReplicaSet {
    /// Build one replica per device and align their parameters with the
    /// primary's initialisation.
    pub fn new(config: &BiLmConfig, devices: &[Device]) -> Result<Self> {
        if devices.is_empty() {
            candle_core::bail!("at least one device is required");
        }
        let mut replicas = Vec::with_capacity(devices.len());
        for device in devices {
            let varmap = VarMap::new();
            let vb = VarBuilder::from_varmap(&varmap, candle_core::DType::F32, device);
            let model = BiLm::new(config, vb)?;
            replicas.push(Replica {
                device: device.clone(),
                varmap,
                model,
            });
        }
        let set = Self { replicas };
        set.synchronize()?;
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn primary(&self) -> &Replica {
        &self.replicas[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Replica> {
        self.replicas.iter()
    }

    /// Parameter names on the primary, sorted for a stable walk order.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.replicas[0]
            .varmap
            .data()
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn var(&self, replica: usize, name: &str) -> Result<candle_core::Var> {
        match self.replicas[replica].varmap.data().lock().unwrap().get(name) {
            Some(var) => Ok(var.clone()),
            None => candle_core::bail!("replica {replica} is missing parameter {name:?}"),
        }
    }

    /// Copy every primary parameter onto the other replicas.
    pub fn synchronize(&self) -> Result<()> {
        if self.replicas.len() == 1 {
            return Ok(());
        }
        for name in self.parameter_names() {
            let source = self.var(0, &name)?;
            for (index, replica) in self.replicas.iter().enumerate().skip(1) {
                let moved = source.as_tensor().to_device(&replica.device)?;
                self.var(index, &name)?.set(&moved)?;
            }
        }
        Ok(())
    }

    /// Split a `(seq, batch)` tensor into equal per-replica shards along the
    /// batch dimension and move each shard to its device.
    pub fn shard(&self, tensor: &Tensor) -> Result<Vec<Tensor>> {
        let batch = tensor.dim(1)?;
        if batch % self.replicas.len() != 0 {
            candle_core::bail!(
                "batch size {batch} does not divide across {} devices",
                self.replicas.len()
            );
        }
        let chunks = tensor.chunk(self.replicas.len(), 1)?;
        chunks
            .into_iter()
            .zip(&self.replicas)
            .map(|(chunk, replica)| chunk.to_device(&replica.device))
            .collect()
    }

    /// Re-key a gradient store produced by one backward pass over the summed
    /// per-replica losses: for every parameter, the per-replica gradients are
    /// summed onto the primary device under the primary's variable.
    /// Parameters without a gradient anywhere are skipped.
    pub fn merge_grads(&self, mut grads: GradStore) -> Result<GradStore> {
        let primary_device = &self.replicas[0].device;
        for name in self.parameter_names() {
            let primary_var = self.var(0, &name)?;
            let mut total: Option<Tensor> = None;
            for index in 0..self.replicas.len() {
                let var = self.var(index, &name)?;
                if let Some(grad) = grads.remove(&var) {
                    let grad = grad.to_device(primary_device)?;
                    total = Some(match total {
                        Some(total) => (total + grad)?,
                        None => grad,
                    });
                }
            }
            if let Some(total) = total {
                grads.insert(&primary_var, total);
            }
        }
        Ok(grads)
    }

    /// Load primary parameters from a checkpoint and fan them out.
    pub fn load(&mut self, path: &std::path::Path) -> Result<()> {
        self.replicas[0].varmap.load(path)?;
        self.synchronize()
    }

    /// Save the primary's parameters.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        self.replicas[0].varmap.save(path)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bilm_common::RnnMode;

    fn tiny_config() -> BiLmConfig {
        BiLmConfig {
            mode: RnnMode::Lstm,
            vocab_size: 11,
            embed_size: 3,
            hidden_size: 3,
            num_layers: 1,
            dropout: 0.0,
            ..Default::default()
        }
    }

    fn values(t: &Tensor) -> Vec<f32> {
        t.flatten_all().unwrap().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn parse_device_specs() {
        assert_eq!(parse_devices("").unwrap().len(), 1);
        assert!(matches!(parse_devices("  ").unwrap()[0], Device::Cpu));
        assert!(parse_devices("x").is_err());
    }

    #[test]
    fn replicas_start_identical() {
        let set = ReplicaSet::new(&tiny_config(), &[Device::Cpu, Device::Cpu]).unwrap();
        for name in set.parameter_names() {
            let a = set.var(0, &name).unwrap();
            let b = set.var(1, &name).unwrap();
            assert_eq!(values(a.as_tensor()), values(b.as_tensor()), "{name}");
        }
    }

    #[test]
    fn shard_splits_the_batch_dimension() {
        let set = ReplicaSet::new(&tiny_config(), &[Device::Cpu, Device::Cpu]).unwrap();
        let data: Vec<u32> = (0..12).collect();
        let tensor = Tensor::from_vec(data, (3, 4), &Device::Cpu).unwrap();
        let shards = set.shard(&tensor).unwrap();
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].dims(), &[3, 2]);
        assert_eq!(
            shards[0].to_vec2::<u32>().unwrap(),
            vec![vec![0, 1], vec![4, 5], vec![8, 9]]
        );
        assert_eq!(
            shards[1].to_vec2::<u32>().unwrap(),
            vec![vec![2, 3], vec![6, 7], vec![10, 11]]
        );
    }

    #[test]
    fn uneven_batches_are_rejected() {
        let set = ReplicaSet::new(&tiny_config(), &[Device::Cpu, Device::Cpu]).unwrap();
        let tensor = Tensor::zeros((3, 5), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(set.shard(&tensor).is_err());
    }

    #[test]
    fn merged_gradients_sum_across_replicas() {
        let set = ReplicaSet::new(&tiny_config(), &[Device::Cpu, Device::Cpu]).unwrap();
        let name = "embedding.weight";
        let primary = set.var(0, name).unwrap();
        let secondary = set.var(1, name).unwrap();

        // d/dv sum(v) = 1 on the primary, d/dv sum(2v) = 2 on the secondary,
        // so the merged gradient on the primary var is all threes.
        let loss = (primary.as_tensor().sum_all().unwrap()
            + (secondary.as_tensor() * 2.0).unwrap().sum_all().unwrap())
        .unwrap();
        let merged = set.merge_grads(loss.backward().unwrap()).unwrap();
        let total = merged.get(&primary).unwrap();
        assert_eq!(total.dims(), primary.dims());
        for v in values(total) {
            assert!((v - 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn missing_gradients_do_not_block_merging() {
        let set = ReplicaSet::new(&tiny_config(), &[Device::Cpu, Device::Cpu]).unwrap();
        let primary = set.var(0, "decoder.bias").unwrap();

        // Only the primary's bias participates in the loss; everything else
        // has no gradient and must simply be skipped.
        let loss = (primary.as_tensor() * 0.5).unwrap().sum_all().unwrap();
        let merged = set.merge_grads(loss.backward().unwrap()).unwrap();
        for v in values(merged.get(&primary).unwrap()) {
            assert!((v - 0.5).abs() < 1e-6);
        }
        assert!(merged.get(&set.var(0, "embedding.weight").unwrap()).is_none());
    }

    #[test]
    fn synchronize_propagates_updates() {
        let set = ReplicaSet::new(&tiny_config(), &[Device::Cpu, Device::Cpu]).unwrap();
        let name = "decoder.bias";
        let primary = set.var(0, name).unwrap();
        let bumped = Tensor::full(7.0f32, primary.dims().to_vec(), &Device::Cpu).unwrap();
        primary.set(&bumped).unwrap();

        set.synchronize().unwrap();
        let secondary = set.var(1, name).unwrap();
        for v in values(secondary.as_tensor()) {
            assert!((v - 7.0).abs() < 1e-6);
        }
    }
}
