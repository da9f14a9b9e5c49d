use super::band::GradeBand;
use super::validate::{ValidatedScale, MAX_PERCENT, MIN_PERCENT};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rounding {
    #[default]
    None,
    Nearest,
}

impl Rounding {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "nearest" => Some(Self::Nearest),
            _ => None,
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Rounding::None => x,
            Rounding::Nearest => (x + 0.5).floor(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PercentRange {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeLookup<'a> {
    pub percentage: f64,
    pub looked_up: f64,
    pub band: Option<&'a GradeBand>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary<'a> {
    pub results: Vec<GradeLookup<'a>>,
    pub matched: usize,
    pub unmatched: usize,
    pub gpa: Option<f64>,
}

impl ValidatedScale {
    pub fn grade_for(&self, percentage: f64) -> Option<&GradeBand> {
        if !percentage.is_finite() {
            return None;
        }
        let bands = self.bands();
        let idx = bands.partition_point(|b| (b.min_percent as f64) <= percentage);
        let band = bands.get(idx.checked_sub(1)?)?;
        band.contains(percentage).then_some(band)
    }

    pub fn grade_many(&self, percentages: &[f64], rounding: Rounding) -> GradeSummary<'_> {
        let mut matched = 0usize;
        let mut points_sum = 0.0;
        let results: Vec<GradeLookup<'_>> = percentages
            .iter()
            .map(|&percentage| {
                let looked_up = rounding.apply(percentage);
                let band = self.grade_for(looked_up);
                if let Some(b) = band {
                    matched += 1;
                    points_sum += b.points;
                }
                GradeLookup {
                    percentage,
                    looked_up,
                    band,
                }
            })
            .collect();
        let gpa = (matched > 0).then(|| points_sum / matched as f64);
        GradeSummary {
            unmatched: results.len() - matched,
            results,
            matched,
            gpa,
        }
    }

    /// Whole-percentage stretches of 0..=100 that no band covers. Advisory
    /// only; gaps never fail validation.
    pub fn uncovered_ranges(&self) -> Vec<PercentRange> {
        let mut out = Vec::new();
        let mut next = MIN_PERCENT;
        for b in self.bands() {
            if b.min_percent > next {
                out.push(PercentRange {
                    from: next,
                    to: b.min_percent - 1,
                });
            }
            next = next.max(b.max_percent + 1);
        }
        if next <= MAX_PERCENT {
            out.push(PercentRange {
                from: next,
                to: MAX_PERCENT,
            });
        }
        out
    }
}
