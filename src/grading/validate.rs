use super::band::{GradeBand, GradingScale};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

pub const MIN_PERCENT: i64 = 0;
pub const MAX_PERCENT: i64 = 100;
pub const MIN_POINTS: f64 = 0.0;
pub const MAX_POINTS: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeField {
    Min,
    Max,
}

impl fmt::Display for RangeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeField::Min => f.write_str("minPercent"),
            RangeField::Max => f.write_str("maxPercent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("grading scale has no bands")]
    EmptyScale,
    #[error("band #{index} has a blank grade label")]
    BlankGrade { index: usize },
    #[error("grade {grade:?} appears more than once")]
    DuplicateGrade { grade: String },
    #[error("grade {grade:?}: {field} {value} is outside 0..=100")]
    OutOfRange {
        grade: String,
        field: RangeField,
        value: i64,
    },
    #[error("grade {grade:?}: minPercent {min} is greater than maxPercent {max}")]
    InvertedRange { grade: String, min: i64, max: i64 },
    #[error("grade {grade:?}: points {points} must be within 0..=4")]
    BadPoints { grade: String, points: f64 },
    #[error("grades {upper:?} and {lower:?} overlap on {from}..={to}")]
    Overlap {
        upper: String,
        lower: String,
        from: i64,
        to: i64,
    },
}

impl Violation {
    pub fn code(&self) -> &'static str {
        match self {
            Violation::EmptyScale => "empty_scale",
            Violation::BlankGrade { .. } => "blank_grade",
            Violation::DuplicateGrade { .. } => "duplicate_grade",
            Violation::OutOfRange { .. } | Violation::InvertedRange { .. } => "out_of_range",
            Violation::BadPoints { .. } => "bad_points",
            Violation::Overlap { .. } => "overlap",
        }
    }

    pub fn grades(&self) -> Vec<&str> {
        match self {
            Violation::EmptyScale | Violation::BlankGrade { .. } => Vec::new(),
            Violation::DuplicateGrade { grade }
            | Violation::OutOfRange { grade, .. }
            | Violation::InvertedRange { grade, .. }
            | Violation::BadPoints { grade, .. } => vec![grade.as_str()],
            Violation::Overlap { upper, lower, .. } => vec![upper.as_str(), lower.as_str()],
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut v = json!({
            "code": self.code(),
            "message": self.to_string(),
            "grades": self.grades(),
        });
        match self {
            Violation::BlankGrade { index } => v["index"] = json!(index),
            Violation::OutOfRange { field, value, .. } => {
                v["field"] = json!(field.to_string());
                v["value"] = json!(value);
            }
            Violation::InvertedRange { min, max, .. } => {
                v["min"] = json!(min);
                v["max"] = json!(max);
            }
            Violation::BadPoints { points, .. } => {
                // NaN/inf are not representable in JSON.
                v["points"] = if points.is_finite() { json!(points) } else { json!(null) };
            }
            Violation::Overlap { from, to, .. } => v["overlap"] = json!({ "from": from, "to": to }),
            _ => {}
        }
        v
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("grading scale failed validation with {} violation(s)", .0.len())]
pub struct ValidationErrors(Vec<Violation>);

impl ValidationErrors {
    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    pub fn overlaps(&self, a: &str, b: &str) -> bool {
        self.0.iter().any(|v| match v {
            Violation::Overlap { upper, lower, .. } => {
                (upper == a && lower == b) || (upper == b && lower == a)
            }
            _ => false,
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.0.iter().map(Violation::to_json).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedScale {
    bands: Vec<GradeBand>,
}

impl ValidatedScale {
    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    pub fn to_scale(&self) -> GradingScale {
        GradingScale::new(self.bands.clone())
    }

    pub fn into_scale(self) -> GradingScale {
        GradingScale::new(self.bands)
    }
}

fn canonical_order(a: &GradeBand, b: &GradeBand) -> Ordering {
    a.min_percent
        .cmp(&b.min_percent)
        .then(a.max_percent.cmp(&b.max_percent))
        .then_with(|| a.grade.cmp(&b.grade))
}

/// The band reaching further up the axis is reported first.
fn overlap(a: &GradeBand, b: &GradeBand) -> Violation {
    let (upper, lower) = match (a.max_percent, a.min_percent).cmp(&(b.max_percent, b.min_percent)) {
        Ordering::Greater => (a, b),
        Ordering::Less => (b, a),
        Ordering::Equal if a.grade <= b.grade => (a, b),
        Ordering::Equal => (b, a),
    };
    Violation::Overlap {
        upper: upper.grade.clone(),
        lower: lower.grade.clone(),
        from: a.min_percent.max(b.min_percent),
        to: a.max_percent.min(b.max_percent),
    }
}

fn check_band(band: &GradeBand, grade: &str, out: &mut Vec<Violation>) -> bool {
    let before = out.len();
    for (field, value) in [
        (RangeField::Min, band.min_percent),
        (RangeField::Max, band.max_percent),
    ] {
        if !(MIN_PERCENT..=MAX_PERCENT).contains(&value) {
            out.push(Violation::OutOfRange {
                grade: grade.to_string(),
                field,
                value,
            });
        }
    }
    let range_ok = out.len() == before;
    if range_ok && band.min_percent > band.max_percent {
        out.push(Violation::InvertedRange {
            grade: grade.to_string(),
            min: band.min_percent,
            max: band.max_percent,
        });
    }
    if !band.points.is_finite() || band.points < MIN_POINTS || band.points > MAX_POINTS {
        out.push(Violation::BadPoints {
            grade: grade.to_string(),
            points: band.points,
        });
    }
    range_ok && band.min_percent <= band.max_percent
}

impl GradingScale {
    pub fn validate(&self) -> Result<ValidatedScale, ValidationErrors> {
        if self.bands().is_empty() {
            return Err(ValidationErrors(vec![Violation::EmptyScale]));
        }

        let mut violations = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut reported_dupes: HashSet<&str> = HashSet::new();
        let mut placed: Vec<GradeBand> = Vec::with_capacity(self.bands().len());

        for (index, band) in self.bands().iter().enumerate() {
            let grade = band.grade.trim();
            let mut label_ok = true;
            if grade.is_empty() {
                violations.push(Violation::BlankGrade { index });
                label_ok = false;
            } else if !seen.insert(grade) {
                if reported_dupes.insert(grade) {
                    violations.push(Violation::DuplicateGrade {
                        grade: grade.to_string(),
                    });
                }
                label_ok = false;
            }

            let range_ok = check_band(band, grade, &mut violations);
            // Overlaps are only meaningful between bands with a usable label and interval.
            if label_ok && range_ok {
                placed.push(GradeBand {
                    grade: grade.to_string(),
                    ..band.clone()
                });
            }
        }

        placed.sort_by(canonical_order);
        for i in 0..placed.len() {
            for j in (i + 1)..placed.len() {
                if placed[j].min_percent > placed[i].max_percent {
                    break;
                }
                violations.push(overlap(&placed[i], &placed[j]));
            }
        }

        if violations.is_empty() {
            Ok(ValidatedScale { bands: placed })
        } else {
            Err(ValidationErrors(violations))
        }
    }
}
