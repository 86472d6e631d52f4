// ============================================================
// Layer 4 — Paired Segment Dataset
// ============================================================
// Cuts every loaded recording pair into fixed-length training
// examples and exposes them through Burn's Dataset trait.
//
// With a segment length S and stride D, a clip of L samples
// yields:
//   - L <= S              → 1 example (zero padded up to S)
//   - L >  S, pad = true  → ceil((L - S) / D) + 1 examples
//   - L >  S, pad = false → floor((L - S) / D) + 1 examples
//
// Example i of a clip starts at i * D. The last example of a
// padded clip is zero-filled past the end of the recording.
//
// Without a segment length every clip is one example of its
// full length (used for validation).

use burn::data::dataset::Dataset;

use crate::data::loader::ClipPair;

/// One training example: aligned noisy and clean excerpts.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedSample {
    pub noisy: Vec<f32>,
    pub clean: Vec<f32>,
}

/// How clips are cut into examples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segmenting {
    pub length: usize,
    pub stride: usize,
    pub pad:    bool,
}

pub struct PairedDataset {
    clips:      Vec<ClipPair>,
    segmenting: Option<Segmenting>,
    /// Cumulative example count per clip, for index lookup
    offsets:    Vec<usize>,
}

impl PairedDataset {
    pub fn new(clips: Vec<ClipPair>, segmenting: Option<Segmenting>) -> Self {
        let mut offsets = Vec::with_capacity(clips.len());
        let mut total = 0usize;
        for clip in &clips {
            offsets.push(total);
            total += examples_in(clip.noisy.len(), segmenting);
        }
        offsets.push(total);
        Self { clips, segmenting, offsets }
    }

    /// Number of source clips (not examples)
    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// Length and name of the shortest example, `None` when empty.
    /// Segmented examples all have the segment length.
    pub fn shortest_example(&self) -> Option<(usize, &str)> {
        match self.segmenting {
            Some(seg) => self.clips.first().map(|c| (seg.length, c.name.as_str())),
            None => self
                .clips
                .iter()
                .map(|c| (c.noisy.len(), c.name.as_str()))
                .min_by_key(|&(len, _)| len),
        }
    }
}

/// Examples produced by one clip of `len` samples.
fn examples_in(len: usize, segmenting: Option<Segmenting>) -> usize {
    match segmenting {
        None => 1,
        Some(seg) if len <= seg.length => 1,
        Some(seg) => {
            let rest = len - seg.length;
            let steps = if seg.pad {
                rest.div_ceil(seg.stride)
            } else {
                rest / seg.stride
            };
            steps + 1
        }
    }
}

fn excerpt(samples: &[f32], start: usize, length: usize) -> Vec<f32> {
    let mut out = vec![0.0; length];
    let end = (start + length).min(samples.len());
    if start < end {
        out[..end - start].copy_from_slice(&samples[start..end]);
    }
    out
}

impl Dataset<PairedSample> for PairedDataset {
    fn get(&self, index: usize) -> Option<PairedSample> {
        if index >= self.len() {
            return None;
        }
        // Last clip whose first example is at or before `index`
        let clip_idx = self.offsets.partition_point(|&o| o <= index) - 1;
        let clip = &self.clips[clip_idx];
        let local = index - self.offsets[clip_idx];

        Some(match self.segmenting {
            None => PairedSample {
                noisy: clip.noisy.clone(),
                clean: clip.clean.clone(),
            },
            Some(seg) => {
                let start = local * seg.stride;
                PairedSample {
                    noisy: excerpt(&clip.noisy, start, seg.length),
                    clean: excerpt(&clip.clean, start, seg.length),
                }
            }
        })
    }

    fn len(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn clip(name: &str, len: usize) -> ClipPair {
        let noisy: Vec<f32> = (0..len).map(|i| i as f32).collect();
        let clean = noisy.iter().map(|x| x * 0.5).collect();
        ClipPair { name: name.to_string(), noisy, clean }
    }

    #[test]
    fn test_example_counts_follow_padding_rule() {
        let seg = |pad| Some(Segmenting { length: 4, stride: 3, pad });
        assert_eq!(examples_in(3, seg(true)), 1);
        assert_eq!(examples_in(10, seg(true)), 3);
        assert_eq!(examples_in(10, seg(false)), 3);
        assert_eq!(examples_in(11, seg(true)), 4);
        assert_eq!(examples_in(11, seg(false)), 3);
        assert_eq!(examples_in(11, None), 1);
    }

    #[test]
    fn test_index_maps_across_clips() {
        let ds = PairedDataset::new(
            vec![clip("a", 10), clip("b", 4)],
            Some(Segmenting { length: 4, stride: 3, pad: true }),
        );
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.get(1).unwrap().noisy, vec![3.0, 4.0, 5.0, 6.0]);
        // Final window of clip a overhangs by nothing: 6..10
        assert_eq!(ds.get(2).unwrap().noisy, vec![6.0, 7.0, 8.0, 9.0]);
        // Clip b starts at example 3
        assert_eq!(ds.get(3).unwrap().clean, vec![0.0, 0.5, 1.0, 1.5]);
        assert!(ds.get(4).is_none());
    }

    #[test]
    fn test_short_clip_is_zero_padded() {
        let ds = PairedDataset::new(
            vec![clip("short", 2)],
            Some(Segmenting { length: 4, stride: 4, pad: true }),
        );
        assert_eq!(ds.get(0).unwrap().noisy, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unsegmented_keeps_full_clips() {
        let ds = PairedDataset::new(vec![clip("a", 7), clip("b", 3)], None);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap().noisy.len(), 3);
        assert_eq!(ds.clip_count(), 2);
        assert_eq!(ds.shortest_example(), Some((3, "b")));

        let segmented = PairedDataset::new(
            vec![clip("a", 7), clip("b", 3)],
            Some(Segmenting { length: 4, stride: 2, pad: true }),
        );
        assert_eq!(segmented.shortest_example().map(|(len, _)| len), Some(4));
        assert_eq!(PairedDataset::new(Vec::new(), None).shortest_example(), None);
    }
}
