//! Grading scale engine.

mod band;
mod lookup;
mod validate;


pub use band::{BandPatch, EditError, GradeBand, GradingScale, StoredBand};
pub use lookup::{GradeLookup, GradeSummary, PercentRange, Rounding};
pub use validate::{RangeField, ValidatedScale, ValidationErrors, Violation};

pub fn default_scale() -> GradingScale {
    GradingScale::new(vec![
        GradeBand::new("A", 80, 100, 4.0, "Excellent"),
        GradeBand::new("B", 70, 79, 3.0, "Good"),
        GradeBand::new("C", 60, 69, 2.0, "Satisfactory"),
        GradeBand::new("D", 50, 59, 1.0, "Pass"),
        GradeBand::new("F", 0, 49, 0.0, "Fail"),
    ])
}
