//! Aggregate statistics over completed episodes.
//!
//! The rollup is a pure fold: it reads the episode list and produces a fresh
//! value every time. Incomplete episodes are excluded — they are missing the
//! very fields being aggregated.

use serde_derive::Serialize;

use crate::episode::GcEpisode;

/// Per-generation (or grand-total) aggregate counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeapGenerationStats {
    pub count: u32,
    pub induced_count: u32,
    pub total_pause_msec: f64,
    pub max_pause_msec: f64,
    pub max_suspend_msec: f64,
    pub total_size_after_mb: f64,
    pub max_size_after_mb: f64,
    pub total_allocated_mb: f64,
    pub total_promoted_mb: f64,
    pub total_pinned_objects: u64,
    pub total_pinned_bytes: u64,
}

impl HeapGenerationStats {
    pub fn mean_pause_msec(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_pause_msec / self.count as f64
        }
    }

    pub fn mean_size_after_mb(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_size_after_mb / self.count as f64
        }
    }

    fn add(&mut self, episode: &GcEpisode) {
        self.count += 1;
        if episode.is_induced() {
            self.induced_count += 1;
        }
        self.total_pause_msec += episode.pause_duration_msec;
        self.max_pause_msec = self.max_pause_msec.max(episode.pause_duration_msec);
        self.max_suspend_msec = self.max_suspend_msec.max(episode.suspend_duration_msec);
        if let Some(size) = episode.size_after_mb() {
            self.total_size_after_mb += size;
            self.max_size_after_mb = self.max_size_after_mb.max(size);
        }
        self.total_allocated_mb += episode.allocated_since_last_mb();
        self.total_promoted_mb += episode.promoted_mb().unwrap_or(0.0);
        self.total_pinned_objects += episode.pinned_objects.len() as u64;
        self.total_pinned_bytes += episode.pinned_object_bytes();
    }
}

/// Aggregates over all completed episodes of one process.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GcRollup {
    /// Indexed by condemned generation; generations above 2 fold into
    /// index 2.
    pub generations: [HeapGenerationStats; 3],
    pub total: HeapGenerationStats,
}

impl GcRollup {
    /// Computes the rollup in one pass. Order-independent and idempotent:
    /// re-running over the same list yields an identical value.
    pub fn compute(episodes: &[GcEpisode]) -> Self {
        let mut rollup = GcRollup::default();
        for episode in episodes.iter().filter(|e| e.is_complete()) {
            let generation = (episode.generation as usize).min(2);
            rollup.generations[generation].add(episode);
            rollup.total.add(episode);
        }
        rollup
    }

    pub fn gc_count(&self) -> u32 {
        self.total.count
    }
}
