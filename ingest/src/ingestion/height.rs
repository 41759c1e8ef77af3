use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

/// The highest archive height observed so far, `-1` if the archive has no data.
///
/// Shared between the fetch loop and the stream handed to the consumer. The
/// value never decreases.
#[derive(Debug, Clone)]
pub struct ArchiveHeight(Arc<AtomicI64>);

impl ArchiveHeight {
    pub fn new() -> Self {
        Self(Arc::new(AtomicI64::new(-1)))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Record a newly observed height and return the updated value.
    pub fn observe(&self, height: i64) -> i64 {
        let previous = self.0.fetch_max(height, Ordering::SeqCst);
        previous.max(height)
    }
}

pub(crate) fn height_reaches(height: i64, block: u64) -> bool {
    u64::try_from(height).map_or(false, |height| height >= block)
}

impl Default for ArchiveHeight {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{height_reaches, ArchiveHeight};

    #[test]
    pub fn test_height_is_monotonic() {
        let height = ArchiveHeight::new();
        assert_eq!(height.get(), -1);
        assert!(!height_reaches(height.get(), 0));

        assert_eq!(height.observe(120), 120);
        assert_eq!(height.observe(100), 120);
        assert_eq!(height.get(), 120);
        assert_eq!(height.observe(150), 150);

        assert!(height_reaches(height.get(), 150));
        assert!(!height_reaches(height.get(), 151));
    }

    #[test]
    pub fn test_shared_between_clones() {
        let height = ArchiveHeight::new();
        let other = height.clone();
        other.observe(42);
        assert_eq!(height.get(), 42);
    }
}
