//! Model output parsing and normalization
//!
//! Replies come back as free text that should contain one JSON document.
//! Two shapes are accepted for the entries of its `perspectives` (or
//! `points`) array:
//!
//! - banded: `{"color": "...", "view": "...", "significance"?: 0.7}`
//! - scored: `{"label": "...", "score_x"|"bias_x": 0.3, "score_y"|"significance_y": 0.7, "text": "..."}`
//!
//! Banded entries are placed on the bias axis by their band and position
//! within the band.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::prompt::REJECTION_PHRASE;
use crate::domain::errors::ParseError;
use crate::domain::models::{Point, PointSet, NEUTRAL_SCORE};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Scored {
        label: String,
        #[serde(default, alias = "bias_x")]
        score_x: Option<f64>,
        #[serde(alias = "significance_y")]
        score_y: f64,
        text: String,
    },
    Banded {
        color: String,
        view: String,
        #[serde(default)]
        significance: Option<f64>,
    },
}

/// Parser for one generation reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParser {
    count: usize,
    bands: Vec<String>,
}

impl OutputParser {
    pub fn new(count: usize, bands: Vec<String>) -> Self {
        Self { count, bands }
    }

    /// Parse `raw` into exactly `count` normalized points
    pub fn parse(&self, raw: &str) -> Result<PointSet, ParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }

        let entries = match find_document(trimmed) {
            Ok(entries) => entries,
            Err(_) if trimmed.to_lowercase().contains(REJECTION_PHRASE) => {
                return Err(ParseError::Rejected(preview(trimmed)));
            }
            Err(err) => return Err(err),
        };
        let entries: Vec<Entry> =
            serde_json::from_value(entries).map_err(|e| ParseError::Malformed(e.to_string()))?;

        if entries.len() != self.count {
            return Err(ParseError::CountMismatch {
                expected: self.count,
                actual: entries.len(),
            });
        }

        let scored = entries
            .iter()
            .filter(|entry| matches!(entry, Entry::Scored { .. }))
            .count();

        let points = if scored == entries.len() {
            Self::collect_scored(entries)?
        } else if scored == 0 {
            self.normalize_banded(entries)?
        } else {
            return Err(ParseError::Malformed(
                "entries mix banded and scored shapes".to_string(),
            ));
        };

        debug!(points = points.len(), "Parsed model output");
        Ok(points)
    }

    fn collect_scored(entries: Vec<Entry>) -> Result<PointSet, ParseError> {
        let mut points = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let Entry::Scored {
                label,
                score_x,
                score_y,
                text,
            } = entry
            else {
                continue;
            };
            if let Some(x) = score_x {
                check_unit(index, "score_x", x)?;
            }
            check_unit(index, "score_y", score_y)?;
            points.push(Point {
                label,
                score_x,
                score_y,
                text,
            });
        }
        Ok(points)
    }

    fn normalize_banded(&self, entries: Vec<Entry>) -> Result<PointSet, ParseError> {
        let mut placed = Vec::with_capacity(entries.len());
        let mut previous_band = 0;

        for (index, entry) in entries.into_iter().enumerate() {
            let Entry::Banded {
                color,
                view,
                significance,
            } = entry
            else {
                continue;
            };

            let band = self
                .band_index(&color)
                .ok_or_else(|| ParseError::UnknownLabel {
                    index,
                    label: color.clone(),
                })?;
            if band < previous_band {
                return Err(ParseError::BandOrder { index, label: color });
            }
            previous_band = band;

            let score_y = match significance {
                Some(value) => {
                    check_unit(index, "significance", value)?;
                    value
                }
                None => NEUTRAL_SCORE,
            };

            placed.push((band, self.bands[band].clone(), view, score_y));
        }

        let mut band_sizes = vec![0usize; self.bands.len()];
        for (band, ..) in &placed {
            band_sizes[*band] += 1;
        }

        #[allow(clippy::cast_precision_loss)]
        let band_count = self.bands.len() as f64;
        let mut positions = vec![0usize; self.bands.len()];

        Ok(placed
            .into_iter()
            .map(|(band, label, text, score_y)| {
                let position = positions[band];
                positions[band] += 1;

                #[allow(clippy::cast_precision_loss)]
                let within = (position as f64 + 0.5) / band_sizes[band] as f64;
                #[allow(clippy::cast_precision_loss)]
                let score_x = (band as f64 + within) / band_count;

                Point::new(label, score_x, score_y, text)
            })
            .collect())
    }

    fn band_index(&self, label: &str) -> Option<usize> {
        let label = label.trim();
        self.bands
            .iter()
            .position(|band| band.eq_ignore_ascii_case(label))
    }
}

fn check_unit(index: usize, field: &'static str, value: f64) -> Result<(), ParseError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ParseError::ScoreOutOfRange {
            index,
            field,
            value,
        })
    }
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

/// Find the entry array of the first JSON document in `content`
///
/// Every `{` is tried as a document start, so prose, markdown fences and
/// stray braces before the document are skipped. A candidate counts once it
/// parses as an object with a `perspectives` or `points` key.
fn find_document(content: &str) -> Result<Value, ParseError> {
    let mut first_error = None;

    for (start, _) in content.match_indices('{') {
        let mut values =
            serde_json::Deserializer::from_str(&content[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(mut value)) => {
                let entries = value.as_object_mut().and_then(|object| {
                    object
                        .remove("perspectives")
                        .or_else(|| object.remove("points"))
                });
                if let Some(entries) = entries {
                    return Ok(entries);
                }
                first_error.get_or_insert_with(|| {
                    ParseError::Malformed("expected a \"perspectives\" array".to_string())
                });
            }
            Some(Err(err)) => {
                first_error.get_or_insert_with(|| ParseError::Malformed(err.to_string()));
            }
            None => {}
        }
    }

    Err(first_error.unwrap_or(ParseError::NoJson))
}
