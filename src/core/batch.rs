//! Batch partitioning.
//!
//! Pure and shared by every submission strategy: `M` jobs split into
//! `ceil(M / B)` ordered, contiguous batches; only the last one may be short.

use std::ops::Range;

/// One batch of a frame, as a range into the frame's job list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRange {
    /// Position of the batch within the frame.
    pub index: usize,
    /// Jobs covered by the batch.
    pub jobs: Range<usize>,
    /// Number of batches in the frame.
    pub count: usize,
}

impl BatchRange {
    /// Number of jobs in this batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the range holds no jobs. False for every range [`partition`]
    /// yields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// First batch of the frame (records frame-start commands).
    #[inline]
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    /// Last batch of the frame (records frame-end commands, carries the frame's safety marker).
    #[inline]
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.count
    }
}

/// Number of batches needed for `job_count` jobs.
///
/// # Panics
///
/// Panics if `batch_size` is zero.
#[inline]
pub fn batch_count(job_count: usize, batch_size: usize) -> usize {
    assert!(batch_size > 0, "batch size must be at least 1");
    (job_count + batch_size - 1) / batch_size
}

/// Split `job_count` jobs into batches of at most `batch_size`.
///
/// # Panics
///
/// Panics if `batch_size` is zero.
pub fn partition(job_count: usize, batch_size: usize) -> Batches {
    Batches {
        job_count,
        batch_size,
        count: batch_count(job_count, batch_size),
        next: 0,
    }
}

/// Iterator returned by [`partition`].
#[derive(Debug, Clone)]
pub struct Batches {
    job_count: usize,
    batch_size: usize,
    count: usize,
    next: usize,
}

impl Iterator for Batches {
    type Item = BatchRange;

    fn next(&mut self) -> Option<BatchRange> {
        if self.next == self.count {
            return None;
        }
        let index = self.next;
        self.next += 1;
        let start = index * self.batch_size;
        let end = (start + self.batch_size).min(self.job_count);
        Some(BatchRange {
            index,
            jobs: start..end,
            count: self.count,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_count_rounds_up() {
        assert_eq!(batch_count(0, 6), 0);
        assert_eq!(batch_count(1, 6), 1);
        assert_eq!(batch_count(6, 6), 1);
        assert_eq!(batch_count(7, 6), 2);
        assert_eq!(batch_count(64, 6), 11);
    }

    #[test]
    fn test_partition_covers_jobs_in_order() {
        for jobs in 0..40 {
            for size in 1..9 {
                let batches: Vec<_> = partition(jobs, size).collect();
                assert_eq!(batches.len(), batch_count(jobs, size));

                let flattened: Vec<usize> = batches.iter().flat_map(|b| b.jobs.clone()).collect();
                assert_eq!(flattened, (0..jobs).collect::<Vec<_>>());

                for b in &batches {
                    assert!(!b.is_empty());
                    assert!(b.len() <= size);
                    if !b.is_last() {
                        assert_eq!(b.len(), size);
                    }
                }
            }
        }
    }

    #[test]
    fn test_first_and_last_flags() {
        let batches: Vec<_> = partition(64, 6).collect();
        assert!(batches[0].is_first());
        assert!(!batches[0].is_last());
        assert!(batches[10].is_last());
        assert_eq!(batches[10].jobs, 60..64);
        assert_eq!(batches.iter().filter(|b| b.is_first() || b.is_last()).count(), 2);
    }

    #[test]
    fn test_single_batch_is_first_and_last() {
        let only: Vec<_> = partition(3, 6).collect();
        assert_eq!(only.len(), 1);
        assert!(only[0].is_first() && only[0].is_last());
    }

    #[test]
    fn test_hand_built_range_can_be_empty() {
        let range = BatchRange {
            index: 0,
            jobs: 4..4,
            count: 1,
        };
        assert!(range.is_empty());
        assert_eq!(range.len(), 0);
    }

    #[test]
    #[should_panic(expected = "batch size must be at least 1")]
    fn test_zero_batch_size_panics() {
        let _ = partition(4, 0);
    }
}
