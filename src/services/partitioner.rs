//! Bias partitioner
//!
//! Splits a point set into `low`, `mid` and `high` buckets by `score_x`.

use crate::domain::models::{BucketLabel, Buckets, Point};

/// Upper bound (exclusive) of the `low` bucket
pub const T_LOW: f64 = 3.0 / 7.0;

/// Lower bound (exclusive) of the `high` bucket
pub const T_HIGH: f64 = 4.0 / 7.0;

/// Bucket a single point falls into
///
/// Values exactly on a threshold belong to `mid`.
pub fn classify(point: &Point) -> BucketLabel {
    let x = point.x();
    if x < T_LOW {
        BucketLabel::Low
    } else if x > T_HIGH {
        BucketLabel::High
    } else {
        BucketLabel::Mid
    }
}

/// Partition `points` into three disjoint buckets, preserving order
pub fn partition(points: &[Point]) -> Buckets {
    let mut buckets = Buckets::default();
    for point in points {
        let bucket = match classify(point) {
            BucketLabel::Low => &mut buckets.low,
            BucketLabel::Mid => &mut buckets.mid,
            BucketLabel::High => &mut buckets.high,
        };
        bucket.push(point.clone());
    }
    buckets
}
