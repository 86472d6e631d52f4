// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Used when no separate validation directory is given: the
// loaded clips are shuffled and the tail becomes the validation
// set. Splitting happens per clip, before segmenting, so no
// recording contributes to both sets.
//
// The shuffle is seeded so a resumed run validates on the same
// clips it validated on before.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, validation).
///
/// `train_fraction` is clamped to [0, 1]; the split point is rounded.
pub fn split_train_val<T>(
    mut samples:    Vec<T>,
    train_fraction: f64,
    seed:           u64,
) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let fraction = train_fraction.clamp(0.0, 1.0);
    let split_at = ((total as f64) * fraction).round() as usize;
    let split_at = split_at.min(total);

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );

    (samples, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val)      = split_train_val(items, 0.8, 0);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(),   20);
    }

    #[test]
    fn test_same_seed_same_split() {
        let (a, _) = split_train_val((0..40).collect::<Vec<usize>>(), 0.5, 9);
        let (b, _) = split_train_val((0..40).collect::<Vec<usize>>(), 0.5, 9);
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let (mut train, val)  = split_train_val(items, 0.7, 3);
        train.extend(val);
        train.sort_unstable();
        assert_eq!(train, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_dataset() {
        let items: Vec<usize> = Vec::new();
        let (train, val)      = split_train_val(items, 0.8, 0);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }
}
