//! Depth-image background model.
//!
//! The background is the per-pixel maximum depth ever observed, which makes
//! it a long-horizon model of the static scene: moving robots always sit in
//! front of whatever the LiDAR has seen through that pixel before.

use std::collections::VecDeque;

use ndarray::parallel::prelude::*;
use ndarray::{Array2, Axis};

#[derive(Debug)]
pub(crate) struct DepthBackground {
    background: Array2<f32>,
    frames: VecDeque<Array2<f32>>,
    queue_size: usize,
}

impl DepthBackground {
    pub fn new(height: usize, width: usize, queue_size: usize) -> Self {
        Self {
            background: Array2::zeros((height, width)),
            frames: VecDeque::with_capacity(queue_size + 1),
            queue_size,
        }
    }

    /// Per-pixel running maximum; never decays.
    pub fn background(&self) -> &Array2<f32> {
        &self.background
    }

    /// Raise the background at one pixel if the new depth is deeper.
    #[inline]
    pub fn observe_max(&mut self, v: usize, u: usize, depth: f32) {
        let cell = &mut self.background[[v, u]];
        if depth > *cell {
            *cell = depth;
        }
    }

    /// Enqueue a finished depth frame, evicting the oldest past capacity.
    pub fn push_frame(&mut self, frame: Array2<f32>) {
        self.frames.push_back(frame);
        if self.frames.len() > self.queue_size {
            self.frames.pop_front();
        }
    }

    /// Rebuild `diff` from every queued frame: a pixel survives when its
    /// depth sits in the `[min_diff, max_diff]` band below the background.
    /// The band rejects sensor noise on one side and unrelated far-field
    /// motion on the other.
    pub fn rebuild_diff(&self, diff: &mut Array2<f32>, min_diff: f32, max_diff: f32) {
        let frames: Vec<&Array2<f32>> = self.frames.iter().collect();

        diff.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(v, mut diff_row)| {
                for frame in &frames {
                    let frame_row = frame.row(v);
                    let background_row = self.background.row(v);
                    for u in 0..diff_row.len() {
                        let depth = frame_row[u];
                        if depth == 0.0 {
                            continue;
                        }
                        let delta = background_row[u] - depth;
                        if delta >= min_diff && delta <= max_diff {
                            diff_row[u] = depth;
                        }
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_monotonic() {
        let mut model = DepthBackground::new(2, 2, 4);
        model.observe_max(0, 0, 10.0);
        model.observe_max(0, 0, 4.0);
        assert_eq!(model.background()[[0, 0]], 10.0);

        model.observe_max(0, 0, 12.0);
        assert_eq!(model.background()[[0, 0]], 12.0);
    }

    #[test]
    fn test_queue_evicts_oldest() {
        let mut model = DepthBackground::new(1, 1, 2);
        for depth in [1.0, 2.0, 3.0] {
            let mut frame = Array2::zeros((1, 1));
            frame[[0, 0]] = depth;
            model.push_frame(frame);
        }
        assert_eq!(model.frames.len(), 2);
        assert_eq!(model.frames.front().unwrap()[[0, 0]], 2.0);
    }

    #[test]
    fn test_diff_band_filter() {
        let mut model = DepthBackground::new(1, 3, 4);
        // Background at 10 m everywhere.
        for u in 0..3 {
            model.observe_max(0, u, 10.0);
        }

        let mut frame = Array2::zeros((1, 3));
        frame[[0, 0]] = 9.8; // delta 0.2: below the band, noise
        frame[[0, 1]] = 8.0; // delta 2.0: inside the band, foreground
        frame[[0, 2]] = 2.0; // delta 8.0: beyond the band, unrelated
        model.push_frame(frame);

        let mut diff = Array2::zeros((1, 3));
        model.rebuild_diff(&mut diff, 0.5, 4.0);
        assert_eq!(diff[[0, 0]], 0.0);
        assert_eq!(diff[[0, 1]], 8.0);
        assert_eq!(diff[[0, 2]], 0.0);
    }
}
