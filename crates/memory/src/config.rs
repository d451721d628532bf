//! Configuration for regions and allocators
//!
//! Plain structs with presets. Nothing here reads files or the environment.

use std::time::Duration;

use crate::error::{MemoryError, MemoryResult};

/// Tuning for [`ReservedRegion`](crate::region::ReservedRegion)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionConfig {
    /// Pages returned to the OS by one decommit
    pub decommit_pages: usize,

    /// Committed-but-unused pages above the cursor that make a rollback
    /// eligible for decommit (strictly greater than)
    pub decommit_threshold_pages: usize,

    /// Minimum time between two decommits of the same region
    pub decommit_cooldown: Duration,

    /// Initial capacity of the checkpoint stack
    pub checkpoint_capacity: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            decommit_pages: 32,
            decommit_threshold_pages: 64,
            decommit_cooldown: Duration::from_millis(200),
            checkpoint_capacity: 4,
        }
    }
}

impl RegionConfig {
    /// Give memory back as soon as a full decommit batch is idle
    pub fn low_memory() -> Self {
        Self {
            decommit_threshold_pages: 32,
            decommit_cooldown: Duration::from_millis(50),
            ..Self::default()
        }
    }

    /// Keep high-water marks committed longer
    pub fn throughput() -> Self {
        Self { decommit_cooldown: Duration::from_secs(1), ..Self::default() }
    }

    /// Set the decommit cooldown
    #[must_use = "builder methods must be chained or built"]
    pub fn with_decommit_cooldown(mut self, cooldown: Duration) -> Self {
        self.decommit_cooldown = cooldown;
        self
    }

    /// Set the decommit batch size and eligibility threshold, in pages
    #[must_use = "builder methods must be chained or built"]
    pub fn with_decommit_pages(mut self, pages: usize, threshold_pages: usize) -> Self {
        self.decommit_pages = pages;
        self.decommit_threshold_pages = threshold_pages;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> MemoryResult<()> {
        if self.decommit_pages == 0 {
            return Err(MemoryError::invalid_config("decommit_pages must be greater than 0"));
        }
        if self.decommit_threshold_pages < self.decommit_pages {
            return Err(MemoryError::invalid_config(
                "decommit_threshold_pages must be at least decommit_pages",
            ));
        }
        if self.checkpoint_capacity == 0 {
            return Err(MemoryError::invalid_config("checkpoint_capacity must be greater than 0"));
        }
        Ok(())
    }
}

/// Tuning for [`HeapAllocator`](crate::allocator::HeapAllocator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// Initial capacity of the pointer log; it doubles when full
    pub log_capacity: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self { log_capacity: 4 }
    }
}

impl HeapConfig {
    /// Validate configuration
    pub fn validate(&self) -> MemoryResult<()> {
        if self.log_capacity == 0 {
            return Err(MemoryError::invalid_config("log_capacity must be greater than 0"));
        }
        Ok(())
    }
}

/// Aggregate configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Region tuning
    pub region: RegionConfig,
    /// Heap allocator tuning
    pub heap: HeapConfig,
}

impl MemoryConfig {
    /// Validate every part
    pub fn validate(&self) -> MemoryResult<()> {
        self.region.validate()?;
        self.heap.validate()
    }
}
