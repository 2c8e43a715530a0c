use serde::{Deserialize, Serialize};

/// Score used for a point whose `score_x` is absent.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// One scored, labeled item produced by generation.
///
/// Points are immutable once produced; every consumer reads them through
/// the accessors so that a missing `score_x` is interpreted the same way
/// by the reducer and the partitioner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Category tag (the band a perspective was generated in)
    pub label: String,

    /// Position on the bias axis, in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_x: Option<f64>,

    /// Significance / weight, in `[0, 1]`
    pub score_y: f64,

    /// Generated text
    pub text: String,
}

impl Point {
    /// Create a point with both scores present
    pub fn new(label: impl Into<String>, score_x: f64, score_y: f64, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            score_x: Some(score_x),
            score_y,
            text: text.into(),
        }
    }

    /// Bias score, falling back to [`NEUTRAL_SCORE`] when absent
    pub fn x(&self) -> f64 {
        self.score_x.unwrap_or(NEUTRAL_SCORE)
    }

    /// Significance score
    pub fn y(&self) -> f64 {
        self.score_y
    }

    /// The 2-D coordinate used for clustering
    pub fn coordinate(&self) -> [f64; 2] {
        [self.x(), self.y()]
    }
}

/// Ordered sequence of points from one generation call.
///
/// Order is arrival order from the backend. Duplicates are kept.
pub type PointSet = Vec<Point>;

/// Name of one of the three partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketLabel {
    Low,
    Mid,
    High,
}

impl BucketLabel {
    /// All labels in persistence order
    pub const ALL: [Self; 3] = [Self::Low, Self::Mid, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for BucketLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three disjoint partitions of a reduced point set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Buckets {
    pub low: PointSet,
    pub mid: PointSet,
    pub high: PointSet,
}

impl Buckets {
    /// Borrow one bucket by label
    pub fn get(&self, label: BucketLabel) -> &PointSet {
        match label {
            BucketLabel::Low => &self.low,
            BucketLabel::Mid => &self.mid,
            BucketLabel::High => &self.high,
        }
    }

    /// Total number of points across all buckets
    pub fn len(&self) -> usize {
        self.low.len() + self.mid.len() + self.high.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the result sink stores for one completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedResults {
    /// Topic the perspectives were generated for
    pub topic: String,

    #[serde(flatten)]
    pub buckets: Buckets,

    /// When the sink wrote the results
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_score_x_is_neutral() {
        let point = Point {
            label: "yellow".to_string(),
            score_x: None,
            score_y: 0.3,
            text: "centrist".to_string(),
        };
        assert!((point.x() - NEUTRAL_SCORE).abs() < f64::EPSILON);
        assert_eq!(point.coordinate(), [0.5, 0.3]);
    }

    #[test]
    fn test_point_serialization_omits_missing_score_x() {
        let point = Point {
            label: "red".to_string(),
            score_x: None,
            score_y: 0.9,
            text: "view".to_string(),
        };
        let json = serde_json::to_value(&point).unwrap();
        assert!(json.get("score_x").is_none());

        let back: Point = serde_json::from_value(json).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn test_buckets_len() {
        let buckets = Buckets {
            low: vec![Point::new("red", 0.1, 0.5, "a")],
            mid: vec![],
            high: vec![
                Point::new("blue", 0.8, 0.5, "b"),
                Point::new("violet", 0.9, 0.5, "c"),
            ],
        };
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets.get(BucketLabel::High).len(), 2);
        assert!(!buckets.is_empty());
    }
}
