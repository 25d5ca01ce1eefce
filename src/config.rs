//! Balancer tunables and observer configuration.

use std::fs::Metadata;
use std::path::Path;
use std::time::Duration;

use crate::error::{IndexError, Result};

/// Predicate deciding whether a directory is entered during scanning.
pub type DirectoryFilter = dyn Fn(&Path, &Metadata) -> bool + Send + Sync;

/// Predicate deciding whether a file is tracked by the index.
pub type FileFilter = dyn Fn(&Path, &Metadata) -> bool + Send + Sync;

/// Tunables for the generational scan balancer.
///
/// All values have working defaults; the set is validated once when the
/// observer is constructed and never re-checked mid-run.
#[derive(Clone, Debug)]
pub struct BalancerConfig {
    /// Directories whose last change is at most this old belong to
    /// generation 0 (scanned most frequently).
    pub first_generation_age: Duration,
    /// Directories older than `first_generation_age` but at most this old
    /// belong to generation 1; anything older belongs to generation 2.
    pub second_generation_age: Duration,
    /// Upper bound on directories scanned per iteration.
    pub iteration_size: usize,
    /// Lower bound the adaptive controller never shrinks below.
    pub min_iteration_size: usize,
    /// Fractions of the iteration budget apportioned to generations 0..=2.
    /// Must be non-negative and sum to approximately 1.
    pub generation_weight: [f64; 3],
    /// Target wall-clock duration of one iteration. The adaptive controller
    /// resizes iterations to keep measured duration near this value.
    pub prefer_iteration_duration: Duration,
    /// Advisory upper bound on iteration duration. Reserved: the scheduler
    /// does not currently enforce it.
    pub iteration_duration_limit: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            first_generation_age: Duration::from_secs(10),
            second_generation_age: Duration::from_secs(100),
            iteration_size: 100,
            min_iteration_size: 10,
            generation_weight: [0.5, 0.3, 0.2],
            prefer_iteration_duration: Duration::from_secs(5),
            iteration_duration_limit: Duration::from_secs(60),
        }
    }
}

impl BalancerConfig {
    /// Checks the tunables for internal consistency.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.min_iteration_size == 0 {
            return Err(IndexError::InvalidConfig(
                "min_iteration_size must be positive".into(),
            ));
        }
        if self.min_iteration_size > self.iteration_size {
            return Err(IndexError::InvalidConfig(format!(
                "min_iteration_size {} exceeds iteration_size {}",
                self.min_iteration_size, self.iteration_size
            )));
        }
        if self.first_generation_age >= self.second_generation_age {
            return Err(IndexError::InvalidConfig(
                "first_generation_age must be below second_generation_age".into(),
            ));
        }
        if self.prefer_iteration_duration.is_zero() {
            return Err(IndexError::InvalidConfig(
                "prefer_iteration_duration must be positive".into(),
            ));
        }
        if self
            .generation_weight
            .iter()
            .any(|weight| !weight.is_finite() || *weight < 0.0)
        {
            return Err(IndexError::InvalidConfig(
                "generation weights must be non-negative".into(),
            ));
        }
        let sum: f64 = self.generation_weight.iter().sum();
        if !(0.99..=1.01).contains(&sum) {
            return Err(IndexError::InvalidConfig(format!(
                "generation weights must sum to 1, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Configuration for a [`FileSystemObserver`](crate::FileSystemObserver):
/// balancer tunables plus optional directory/file filter predicates.
///
/// An absent filter accepts everything.
pub struct ObserverConfig {
    pub(crate) directory_filter: Option<Box<DirectoryFilter>>,
    pub(crate) file_filter: Option<Box<FileFilter>>,
    pub(crate) balancer: BalancerConfig,
}

impl ObserverConfig {
    /// Creates a configuration with the given balancer tunables and no
    /// filter predicates.
    pub fn new(balancer: BalancerConfig) -> Self {
        Self {
            directory_filter: None,
            file_filter: None,
            balancer,
        }
    }

    /// Sets the directory filter. Directories rejected by the filter are
    /// never entered, so their whole subtrees stay outside the index.
    pub fn with_directory_filter(
        mut self,
        filter: impl Fn(&Path, &Metadata) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.directory_filter = Some(Box::new(filter));
        self
    }

    /// Sets the file filter. Files rejected by the filter are never tracked
    /// and never produce records.
    pub fn with_file_filter(
        mut self,
        filter: impl Fn(&Path, &Metadata) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.file_filter = Some(Box::new(filter));
        self
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self::new(BalancerConfig::default())
    }
}
