//! Size-adaptive upload planning
//!
//! Payloads up to [`SINGLE_UPLOAD_THRESHOLD`] are written with one request.
//! Larger payloads are split by repeated bisection so that every part but
//! the last is within `[MIN_PART_SIZE, MAX_PART_SIZE]` and the last part is
//! never undersized relative to what the remainder allows.

use std::fmt;
use std::ops::Range;

use crate::error::{Result, StorageError};

/// Minimum size of every part except the last (5 MiB)
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum size of any part (100 MiB)
pub const MAX_PART_SIZE: usize = 100 * 1024 * 1024;

/// Largest payload written with a single-shot upload (5 MiB)
pub const SINGLE_UPLOAD_THRESHOLD: usize = 5 * 1024 * 1024;

/// Maximum number of parts accepted by S3
pub const MAX_PART_COUNT: usize = 10_000;

/// One contiguous byte range of the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    pub offset: usize,
    pub length: usize,
}

impl PartSpec {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }
}

/// How the payload goes to storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadType {
    Single,
    Multipart,
}

impl UploadType {
    /// Value stored in the `uploadType` metadata field
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadType::Single => "single",
            UploadType::Multipart => "multipart",
        }
    }
}

impl fmt::Display for UploadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload strategy for a payload of known length
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPlan {
    /// One unpartitioned put
    Single { length: usize },
    /// Ordered parts, part number `i + 1` for `parts[i]`
    Multipart { parts: Vec<PartSpec> },
}

impl UploadPlan {
    /// Plan the upload of `total` bytes
    ///
    /// # Returns
    /// * `Result<Self>` - Plan, or an error when it would exceed [`MAX_PART_COUNT`]
    pub fn for_payload(total: usize) -> Result<Self> {
        if total <= SINGLE_UPLOAD_THRESHOLD {
            return Ok(UploadPlan::Single { length: total });
        }

        let parts = partition(total);
        if parts.len() > MAX_PART_COUNT {
            return Err(StorageError::InvalidPlan(format!(
                "{total} bytes need {} parts, limit is {MAX_PART_COUNT}",
                parts.len()
            ))
            .into());
        }
        Ok(UploadPlan::Multipart { parts })
    }

    pub fn upload_type(&self) -> UploadType {
        match self {
            UploadPlan::Single { .. } => UploadType::Single,
            UploadPlan::Multipart { .. } => UploadType::Multipart,
        }
    }

    /// Number of requests carrying payload bytes
    pub fn part_count(&self) -> usize {
        match self {
            UploadPlan::Single { .. } => 1,
            UploadPlan::Multipart { parts } => parts.len(),
        }
    }
}

/// Split `total` bytes into upload parts by bisection
fn partition(total: usize) -> Vec<PartSpec> {
    let mut parts = Vec::new();
    let mut offset = 0;

    while offset < total {
        let remaining = total - offset;

        let length = if remaining <= MAX_PART_SIZE {
            remaining
        } else {
            let tentative = (remaining / 2).clamp(MIN_PART_SIZE, MAX_PART_SIZE);
            if remaining - tentative < MIN_PART_SIZE {
                remaining
            } else {
                tentative
            }
        };

        parts.push(PartSpec { offset, length });
        offset += length;
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    fn assert_valid_partition(total: usize, parts: &[PartSpec]) {
        assert!(!parts.is_empty(), "no parts for {total}");
        let mut expected_offset = 0;
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(part.offset, expected_offset, "gap or overlap at part {i} for {total}");
            assert!(part.length <= MAX_PART_SIZE, "part {i} too large for {total}");
            if i + 1 < parts.len() {
                assert!(part.length >= MIN_PART_SIZE, "part {i} too small for {total}");
            } else {
                assert!(part.length >= 1);
            }
            expected_offset += part.length;
        }
        assert_eq!(expected_offset, total);
    }

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(
            UploadPlan::for_payload(SINGLE_UPLOAD_THRESHOLD).unwrap(),
            UploadPlan::Single {
                length: SINGLE_UPLOAD_THRESHOLD
            }
        );

        let plan = UploadPlan::for_payload(SINGLE_UPLOAD_THRESHOLD + 1).unwrap();
        assert_eq!(plan.upload_type(), UploadType::Multipart);
        assert!(plan.part_count() >= 1);
    }

    #[test]
    fn test_empty_payload_is_single() {
        let plan = UploadPlan::for_payload(0).unwrap();
        assert_eq!(plan, UploadPlan::Single { length: 0 });
        assert_eq!(plan.upload_type(), UploadType::Single);
    }

    #[test]
    fn test_up_to_max_part_is_one_part() {
        for total in [SINGLE_UPLOAD_THRESHOLD + 1, 50 * MIB, MAX_PART_SIZE] {
            match UploadPlan::for_payload(total).unwrap() {
                UploadPlan::Multipart { parts } => {
                    assert_eq!(parts, vec![PartSpec { offset: 0, length: total }]);
                }
                other => panic!("unexpected plan {other:?}"),
            }
        }
    }

    #[test]
    fn test_bisection_above_max() {
        let total = MAX_PART_SIZE + 1;
        let parts = partition(total);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].length, total / 2);
        assert_valid_partition(total, &parts);

        let total = 250 * MIB;
        let parts = partition(total);
        assert_eq!(parts[0].length, MAX_PART_SIZE);
        assert_valid_partition(total, &parts);
    }

    #[test]
    fn test_partition_validity_sweep() {
        let mut totals = vec![
            SINGLE_UPLOAD_THRESHOLD + 1,
            2 * MIN_PART_SIZE - 1,
            2 * MIN_PART_SIZE,
            MAX_PART_SIZE - 1,
            MAX_PART_SIZE,
            MAX_PART_SIZE + 1,
            MAX_PART_SIZE + MIN_PART_SIZE - 1,
            2 * MAX_PART_SIZE,
            2 * MAX_PART_SIZE + 1,
            3 * MAX_PART_SIZE + 7,
            1024 * MIB + 12_345,
        ];
        // Deterministic pseudo-random lengths up to ~2 GiB
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            totals.push(SINGLE_UPLOAD_THRESHOLD + 1 + (seed % (2048 * MIB as u64)) as usize);
        }

        for total in totals {
            let plan = UploadPlan::for_payload(total).unwrap();
            match plan {
                UploadPlan::Multipart { parts } => assert_valid_partition(total, &parts),
                other => panic!("expected multipart for {total}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_part_spec_range() {
        let part = PartSpec {
            offset: 10,
            length: 5,
        };
        assert_eq!(part.range(), 10..15);
    }

    #[test]
    fn test_upload_type_labels() {
        assert_eq!(UploadType::Single.to_string(), "single");
        assert_eq!(UploadType::Multipart.as_str(), "multipart");
    }
}
