// ============================================================
// Layer 4 — Data Layer
// ============================================================
// Everything between WAV files on disk and a WaveBatch handed
// to the solver:
//
//   loader.rs   → read noisy/clean WAV pairs with hound
//   splitter.rs → seeded train/validation split of the clips
//   dataset.rs  → cut clips into fixed-length examples
//   batcher.rs  → stack examples into a WaveBatch
//   sampler.rs  → per-epoch shuffled, per-worker sharded batches
//   augment.rs  → stochastic training-time transforms

pub mod loader;
pub mod splitter;
pub mod dataset;
pub mod batcher;
pub mod sampler;
pub mod augment;
