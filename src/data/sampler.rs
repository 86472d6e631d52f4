// ============================================================
// Layer 4 — Sharded Batch Loader
// ============================================================
// The default BatchSource. Each pass:
//
//   1. orders the dataset indices, shuffled from (seed + epoch)
//      when shuffling is on, so every epoch sees a new order and
//      every worker agrees on it
//   2. keeps every `world_size`-th index starting at `rank`, so
//      the workers' shards are disjoint
//   3. groups the shard into batches of `batch_size` (last batch
//      may be smaller) and stacks each with the batcher
//
// Batches are built lazily while the solver iterates.

use burn::data::{dataloader::batcher::Batcher, dataset::Dataset};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::sync::Arc;

use crate::data::{batcher::WaveformBatcher, dataset::PairedSample};
use crate::domain::{
    traits::{BatchSource, WorkerGroup},
    waveform::WaveBatch,
};

pub struct ShardedLoader {
    dataset:    Arc<dyn Dataset<PairedSample>>,
    batcher:    WaveformBatcher,
    batch_size: usize,
    shuffle:    bool,
    seed:       u64,
    epoch:      usize,
    rank:       usize,
    world_size: usize,
}

impl ShardedLoader {
    pub fn new(
        dataset:    Arc<dyn Dataset<PairedSample>>,
        batch_size: usize,
        shuffle:    bool,
        seed:       u64,
    ) -> Self {
        Self {
            dataset,
            batcher: WaveformBatcher::new(),
            batch_size: batch_size.max(1),
            shuffle,
            seed,
            epoch: 0,
            rank: 0,
            world_size: 1,
        }
    }

    /// Restrict this loader to one worker's shard.
    pub fn with_shard(mut self, rank: usize, world_size: usize) -> Self {
        self.world_size = world_size.max(1);
        self.rank = rank.min(self.world_size - 1);
        self
    }

    /// Restrict this loader to the shard of `workers`' own rank.
    pub fn for_worker(self, workers: &dyn WorkerGroup) -> Self {
        self.with_shard(workers.rank(), workers.world_size())
    }

    /// Dataset indices this worker visits in the current epoch.
    fn shard_indices(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch as u64));
            order.shuffle(&mut rng);
        }
        order
            .into_iter()
            .skip(self.rank)
            .step_by(self.world_size)
            .collect()
    }
}

impl BatchSource for ShardedLoader {
    fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }

    fn len(&self) -> usize {
        let total = self.dataset.len();
        let shard = if self.rank < total {
            (total - self.rank).div_ceil(self.world_size)
        } else {
            0
        };
        shard.div_ceil(self.batch_size)
    }

    fn batches(&self) -> Box<dyn Iterator<Item = WaveBatch> + '_> {
        let indices = self.shard_indices();
        let batch_size = self.batch_size;
        let chunks: Vec<Vec<usize>> = indices
            .chunks(batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        Box::new(chunks.into_iter().map(move |chunk| {
            let items: Vec<PairedSample> = chunk
                .into_iter()
                .filter_map(|i| self.dataset.get(i))
                .collect();
            self.batcher.batch(items)
        }))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::InMemDataset;

    /// Sample i carries the value i so batches reveal their indices.
    fn numbered(n: usize) -> Arc<dyn Dataset<PairedSample>> {
        let items = (0..n)
            .map(|i| PairedSample { noisy: vec![i as f32], clean: vec![0.0] })
            .collect();
        Arc::new(InMemDataset::new(items))
    }

    fn visited(loader: &ShardedLoader) -> Vec<usize> {
        loader
            .batches()
            .flat_map(|b| b.noisy.column(0).to_vec())
            .map(|v| v as usize)
            .collect()
    }

    #[test]
    fn test_unshuffled_batches_keep_order() {
        let loader = ShardedLoader::new(numbered(5), 2, false, 0);
        assert_eq!(loader.len(), 3);
        let sizes: Vec<usize> = loader.batches().map(|b| b.batch_size()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(visited(&loader), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shards_are_disjoint_and_cover_everything() {
        let data = numbered(11);
        let mut all = Vec::new();
        for rank in 0..3 {
            let mut loader = ShardedLoader::new(data.clone(), 2, true, 7).with_shard(rank, 3);
            loader.set_epoch(4);
            let seen = visited(&loader);
            assert_eq!(loader.len(), seen.len().div_ceil(2));
            all.extend(seen);
        }
        all.sort_unstable();
        assert_eq!(all, (0..11).collect::<Vec<_>>());
    }

    struct Worker {
        rank: usize,
        size: usize,
    }

    impl WorkerGroup for Worker {
        fn rank(&self) -> usize {
            self.rank
        }

        fn world_size(&self) -> usize {
            self.size
        }

        fn average(&self, values: &[f64], _count: usize) -> anyhow::Result<Vec<f64>> {
            Ok(values.to_vec())
        }
    }

    #[test]
    fn test_worker_rank_selects_the_shard() {
        let data = numbered(6);
        let first = ShardedLoader::new(data.clone(), 1, false, 0).for_worker(&Worker { rank: 0, size: 2 });
        let second = ShardedLoader::new(data, 1, false, 0).for_worker(&Worker { rank: 1, size: 2 });
        assert_eq!(visited(&first), vec![0, 2, 4]);
        assert_eq!(visited(&second), vec![1, 3, 5]);
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn test_order_depends_on_epoch_only() {
        let mut loader = ShardedLoader::new(numbered(32), 4, true, 1);
        loader.set_epoch(0);
        let first = visited(&loader);
        assert_eq!(first, visited(&loader));
        loader.set_epoch(1);
        assert_ne!(first, visited(&loader));
    }
}
