use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::config::SortConfig;
use crate::math::{Bounds, Vec3};

use super::ledger::{BufferLedger, BufferSlot};
use super::types::{BufferState, CameraPose, CenterBuffer, IndexMode, OrderingBuffer};

/// Below this splat count the key pass runs on the calling thread.
const PARALLEL_KEY_THRESHOLD: usize = 16_384;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortStats {
    pub splat_count: usize,
    pub min_depth: f32,
    pub max_depth: f32,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct SortOutput {
    pub slot: BufferSlot,
    pub ordering: OrderingBuffer,
    pub stats: SortStats,
}

/// Quantized-depth counting sort over a private copy of the splat centers.
///
/// Owns at most one writable ordering buffer at a time. After a pass the
/// buffer is handed out and no further pass runs until one is returned.
#[derive(Debug)]
pub struct DepthBucketSorter {
    config: SortConfig,
    index_mode: IndexMode,
    centers: Option<CenterBuffer>,
    bounds: Bounds,
    target: Option<(BufferSlot, OrderingBuffer)>,
    keys: Vec<u32>,
    histogram: Vec<u32>,
    last_pose: Option<CameraPose>,
    pending_pose: Option<CameraPose>,
    announce_empty: bool,
    ledger: Option<BufferLedger>,
}

impl DepthBucketSorter {
    pub fn new(config: SortConfig) -> Self {
        Self {
            config,
            index_mode: IndexMode::Float,
            centers: None,
            bounds: Bounds::EMPTY,
            target: None,
            keys: Vec::new(),
            histogram: vec![0; config.bucket_count()],
            last_pose: None,
            pending_pose: None,
            announce_empty: false,
            ledger: None,
        }
    }

    pub(super) fn with_ledger(mut self, ledger: BufferLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.centers.is_some()
    }

    pub fn splat_count(&self) -> usize {
        self.centers.as_ref().map_or(0, CenterBuffer::splat_count)
    }

    /// Takes the centers and the first writable buffer. Scratch arrays are
    /// only reallocated when the splat count changes.
    pub fn install(
        &mut self,
        centers: CenterBuffer,
        slot: BufferSlot,
        ordering: OrderingBuffer,
        index_mode: IndexMode,
    ) {
        let splat_count = centers.splat_count();
        self.bounds = Bounds::from_centers(centers.as_slice());
        if self.keys.len() != splat_count {
            self.keys = vec![0; splat_count];
        }
        self.mark(BufferSlot::Centers, BufferState::WithSorter);
        self.mark(slot, BufferState::WithSorter);

        self.centers = Some(centers);
        self.target = Some((slot, ordering));
        self.index_mode = index_mode;
        self.last_pose = None;
        self.announce_empty = splat_count == 0;
        debug!(splat_count, bounds = ?self.bounds, "sorter installed centers");
    }

    pub fn set_pose(&mut self, pose: CameraPose) {
        self.pending_pose = Some(pose);
    }

    pub fn return_buffer(&mut self, slot: BufferSlot, ordering: OrderingBuffer) {
        let expected = self.splat_count();
        if ordering.splat_count() != expected || ordering.mode() != self.index_mode {
            warn!(
                expected,
                returned = ordering.splat_count(),
                "returned ordering buffer does not match the installed centers; reallocating"
            );
            self.mark(slot, BufferState::WithSorter);
            self.target = Some((slot, OrderingBuffer::zeroed(self.index_mode, expected)));
            return;
        }
        self.mark(slot, BufferState::WithSorter);
        self.target = Some((slot, ordering));
    }

    /// Runs a pass if the sorter has centers, a writable buffer and a pose that
    /// differs from the last sorted one.
    pub fn update(&mut self) -> Option<SortOutput> {
        let splat_count = self.centers.as_ref()?.splat_count();

        if self.announce_empty {
            let (slot, ordering) = self.target.take()?;
            self.announce_empty = false;
            self.mark(slot, BufferState::InFlightToCoordinator);
            return Some(SortOutput {
                slot,
                ordering,
                stats: SortStats {
                    splat_count: 0,
                    min_depth: 0.0,
                    max_depth: 0.0,
                    elapsed: Duration::ZERO,
                },
            });
        }

        let pose = self.pending_pose?;
        if let Some(last) = self.last_pose {
            if pose.approx_eq(&last, self.config.camera_epsilon) {
                trace!("camera unchanged, skipping sort pass");
                self.pending_pose = None;
                return None;
            }
        }

        let (slot, mut ordering) = self.target.take()?;
        self.pending_pose = None;
        self.last_pose = Some(pose);

        let started = Instant::now();
        let (min_depth, max_depth) = self.sort_into(pose, &mut ordering);
        let stats = SortStats {
            splat_count,
            min_depth,
            max_depth,
            elapsed: started.elapsed(),
        };
        debug!(
            splat_count,
            elapsed_us = stats.elapsed.as_micros() as u64,
            "sort pass complete"
        );

        self.mark(slot, BufferState::InFlightToCoordinator);
        Some(SortOutput {
            slot,
            ordering,
            stats,
        })
    }

    /// Writes a far-to-near ordering for `pose` into `ordering` and returns the
    /// depth range used for quantization.
    fn sort_into(&mut self, pose: CameraPose, ordering: &mut OrderingBuffer) -> (f32, f32) {
        let Some(centers) = self.centers.as_ref() else {
            return (0.0, 0.0);
        };
        let splat_count = centers.splat_count();
        if splat_count == 0 {
            return (0.0, 0.0);
        }

        let (min_depth, max_depth) = depth_range(&self.bounds, &pose);
        let mut range = max_depth - min_depth;
        if range <= f32::EPSILON {
            range = 1.0;
        }
        let max_bucket = (1u32 << self.config.bucket_bits) as f32;
        let scale = max_bucket / range;

        let bucket_of = |c: &[f32]| -> u32 {
            let depth = pose.depth_of(Vec3::new(c[0], c[1], c[2]));
            // Farthest splat lands in bucket 0 so it is drawn first.
            ((max_depth - depth) * scale).clamp(0.0, max_bucket) as u32
        };

        let flat = centers.as_slice();
        if splat_count >= PARALLEL_KEY_THRESHOLD {
            self.keys
                .par_iter_mut()
                .zip(flat.par_chunks_exact(3))
                .for_each(|(key, c)| *key = bucket_of(c));
        } else {
            for (key, c) in self.keys.iter_mut().zip(flat.chunks_exact(3)) {
                *key = bucket_of(c);
            }
        }

        self.histogram.fill(0);
        for &key in &self.keys {
            self.histogram[key as usize] += 1;
        }
        for i in 1..self.histogram.len() {
            self.histogram[i] += self.histogram[i - 1];
        }

        let parity = match self.index_mode {
            IndexMode::Float => self.config.parity_offset,
            IndexMode::Integer => 0.0,
        };
        for i in (0..splat_count).rev() {
            let bucket = self.keys[i] as usize;
            self.histogram[bucket] -= 1;
            ordering.write_quad(self.histogram[bucket] as usize, i as u32, parity);
        }

        (min_depth, max_depth)
    }

    fn mark(&self, slot: BufferSlot, state: BufferState) {
        if let Some(ledger) = &self.ledger {
            ledger.set(slot, state);
        }
    }
}

pub fn depth_range(bounds: &Bounds, pose: &CameraPose) -> (f32, f32) {
    bounds
        .corners()
        .iter()
        .map(|&corner| pose.depth_of(corner))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn pose_along_z() -> CameraPose {
        CameraPose::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0))
    }

    fn installed_sorter(centers: Vec<f32>, mode: IndexMode) -> DepthBucketSorter {
        let centers = CenterBuffer::new(centers).expect("valid centers");
        let ordering = OrderingBuffer::zeroed(mode, centers.splat_count());
        let mut sorter = DepthBucketSorter::new(SortConfig::default());
        sorter.install(centers, BufferSlot::OrderingA, ordering, mode);
        sorter
    }

    fn assert_every_lane_is_permutation(ordering: &OrderingBuffer, n: usize) {
        for lane in 0..4 {
            let mut values = ordering.lane(lane);
            values.sort_unstable();
            let expected: Vec<u32> = (0..n as u32).collect();
            assert_eq!(values, expected, "lane {lane} is not a permutation");
        }
    }

    #[test]
    fn three_splats_sort_far_to_near() {
        let mut sorter = installed_sorter(
            vec![0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 3.0],
            IndexMode::Integer,
        );
        sorter.set_pose(pose_along_z());
        let output = sorter.update().expect("first pass must run");
        assert_eq!(
            output.ordering,
            OrderingBuffer::Integer(vec![2, 2, 2, 2, 1, 1, 1, 1, 0, 0, 0, 0])
        );
        assert_eq!(output.stats.min_depth, 1.0);
        assert_eq!(output.stats.max_depth, 3.0);
    }

    #[test]
    fn float_mode_adds_parity_offset() {
        let mut sorter = installed_sorter(vec![0.0, 0.0, 1.0, 0.0, 0.0, 2.0], IndexMode::Float);
        sorter.set_pose(pose_along_z());
        let output = sorter.update().expect("first pass must run");
        match output.ordering {
            OrderingBuffer::Float(values) => {
                assert!((values[0] - 1.2).abs() < 1e-6);
                assert!((values[7] - 0.2).abs() < 1e-6);
            }
            OrderingBuffer::Integer(_) => panic!("expected float storage"),
        }
    }

    #[test]
    fn random_scene_yields_permutation_ordered_by_depth() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED_u64);
        let n = 20_000;
        let centers: Vec<f32> = (0..n * 3)
            .map(|_| rng.random_range(-10.0_f32..10.0_f32))
            .collect();
        let mut sorter = installed_sorter(centers.clone(), IndexMode::Integer);
        let pose = CameraPose::new(
            Vec3::new(3.0, -2.0, -30.0),
            Vec3::new(0.1, 0.05, 1.0).normalize(),
        );
        sorter.set_pose(pose);
        let output = sorter.update().expect("first pass must run");
        assert_every_lane_is_permutation(&output.ordering, n);

        let depths: Vec<f32> = output
            .ordering
            .lane(0)
            .iter()
            .map(|&i| {
                let b = i as usize * 3;
                pose.depth_of(Vec3::new(centers[b], centers[b + 1], centers[b + 2]))
            })
            .collect();
        let (lo, hi) = (output.stats.min_depth, output.stats.max_depth);
        let bucket_width = (hi - lo) / 65_536.0;
        for pair in depths.windows(2) {
            assert!(
                pair[0] + bucket_width * 1.5 >= pair[1],
                "order is not far-to-near: {} then {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn unchanged_pose_is_skipped() {
        let mut sorter = installed_sorter(vec![0.0, 0.0, 1.0, 0.0, 0.0, 2.0], IndexMode::Integer);
        sorter.set_pose(pose_along_z());
        let output = sorter.update().expect("first pass must run");
        sorter.return_buffer(output.slot, output.ordering);

        let mut nudged = pose_along_z();
        nudged.position.z += 5e-4;
        sorter.set_pose(nudged);
        assert!(sorter.update().is_none());

        nudged.position.z += 1.0;
        sorter.set_pose(nudged);
        assert!(sorter.update().is_some());
    }

    #[test]
    fn no_pass_without_writable_buffer() {
        let mut sorter = installed_sorter(vec![0.0, 0.0, 1.0], IndexMode::Integer);
        sorter.set_pose(pose_along_z());
        let output = sorter.update().expect("first pass must run");

        let moved = CameraPose::new(Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 1.0));
        sorter.set_pose(moved);
        assert!(sorter.update().is_none(), "buffer is still with the caller");

        sorter.return_buffer(output.slot, output.ordering);
        assert!(sorter.update().is_some(), "pending pose runs once the buffer is back");
    }

    #[test]
    fn equal_depths_keep_both_indices() {
        let mut sorter = installed_sorter(vec![1.0, 0.0, 2.0, -1.0, 0.0, 2.0], IndexMode::Integer);
        sorter.set_pose(pose_along_z());
        let output = sorter.update().expect("first pass must run");
        assert_every_lane_is_permutation(&output.ordering, 2);

        let mut again = installed_sorter(vec![1.0, 0.0, 2.0, -1.0, 0.0, 2.0], IndexMode::Integer);
        again.set_pose(pose_along_z());
        assert_eq!(again.update().map(|o| o.ordering), Some(output.ordering));
    }

    #[test]
    fn empty_scene_announces_once_without_camera() {
        let mut sorter = installed_sorter(Vec::new(), IndexMode::Float);
        let output = sorter.update().expect("empty scene announces immediately");
        assert!(output.ordering.is_empty());
        sorter.return_buffer(output.slot, output.ordering);
        assert!(sorter.update().is_none());
    }

    #[test]
    fn update_before_install_is_ignored() {
        let mut sorter = DepthBucketSorter::new(SortConfig::default());
        sorter.set_pose(pose_along_z());
        assert!(sorter.update().is_none());
        assert!(!sorter.is_initialized());
    }

    #[test]
    fn flat_scene_uses_unit_range() {
        // All splats on a plane facing the camera: zero depth extent.
        let mut sorter = installed_sorter(
            vec![0.0, 0.0, 5.0, 1.0, 0.0, 5.0, 0.0, 1.0, 5.0],
            IndexMode::Integer,
        );
        sorter.set_pose(pose_along_z());
        let output = sorter.update().expect("first pass must run");
        assert_every_lane_is_permutation(&output.ordering, 3);
    }

    #[test]
    fn mismatched_return_is_replaced() {
        let mut sorter = installed_sorter(vec![0.0, 0.0, 1.0, 0.0, 0.0, 2.0], IndexMode::Integer);
        sorter.set_pose(pose_along_z());
        let output = sorter.update().expect("first pass must run");
        sorter.return_buffer(output.slot, OrderingBuffer::zeroed(IndexMode::Integer, 5));

        sorter.set_pose(CameraPose::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0)));
        let output = sorter.update().expect("pass runs with reallocated buffer");
        assert_eq!(output.ordering.len(), 8);
        assert_eq!(output.ordering.lane(0), vec![0, 1]);
    }
}
