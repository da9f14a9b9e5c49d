use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub grade: String,
    #[serde(alias = "min")]
    pub min_percent: i64,
    #[serde(alias = "max")]
    pub max_percent: i64,
    pub points: f64,
    #[serde(default)]
    pub description: String,
}

impl GradeBand {
    pub fn new(
        grade: impl Into<String>,
        min_percent: i64,
        max_percent: i64,
        points: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            grade: grade.into(),
            min_percent,
            max_percent,
            points,
            description: description.into(),
        }
    }

    pub fn contains(&self, percentage: f64) -> bool {
        (self.min_percent as f64) <= percentage && percentage <= (self.max_percent as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBand {
    pub min: i64,
    pub max: i64,
    pub points: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BandPatch {
    #[serde(default, alias = "min")]
    pub min_percent: Option<i64>,
    #[serde(default, alias = "max")]
    pub max_percent: Option<i64>,
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("grade {0:?} is not in the scale")]
    UnknownGrade(String),
    #[error("grade {0:?} already exists")]
    DuplicateGrade(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradingScale {
    bands: Vec<GradeBand>,
}

impl GradingScale {
    pub fn new(bands: Vec<GradeBand>) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    pub fn get(&self, grade: &str) -> Option<&GradeBand> {
        self.position(grade).map(|i| &self.bands[i])
    }

    fn position(&self, grade: &str) -> Option<usize> {
        let grade = grade.trim();
        self.bands.iter().position(|b| b.grade.trim() == grade)
    }

    pub fn add_band(&self, band: GradeBand) -> Result<GradingScale, EditError> {
        let grade = band.grade.trim().to_string();
        if self.position(&grade).is_some() {
            return Err(EditError::DuplicateGrade(grade));
        }
        let mut bands = self.bands.clone();
        bands.push(GradeBand { grade, ..band });
        Ok(Self { bands })
    }

    pub fn remove_band(&self, grade: &str) -> Result<GradingScale, EditError> {
        let idx = self
            .position(grade)
            .ok_or_else(|| EditError::UnknownGrade(grade.trim().to_string()))?;
        let mut bands = self.bands.clone();
        bands.remove(idx);
        Ok(Self { bands })
    }

    pub fn update_band(&self, grade: &str, patch: &BandPatch) -> Result<GradingScale, EditError> {
        let idx = self
            .position(grade)
            .ok_or_else(|| EditError::UnknownGrade(grade.trim().to_string()))?;
        let mut bands = self.bands.clone();
        let band = &mut bands[idx];
        if let Some(v) = patch.min_percent {
            band.min_percent = v;
        }
        if let Some(v) = patch.max_percent {
            band.max_percent = v;
        }
        if let Some(v) = patch.points {
            band.points = v;
        }
        if let Some(v) = &patch.description {
            band.description = v.clone();
        }
        Ok(Self { bands })
    }

    pub fn rename_band(&self, from: &str, to: &str) -> Result<GradingScale, EditError> {
        let band = self
            .get(from)
            .cloned()
            .ok_or_else(|| EditError::UnknownGrade(from.trim().to_string()))?;
        if from.trim() == to.trim() {
            return Ok(self.clone());
        }
        self.remove_band(from)?.add_band(GradeBand {
            grade: to.to_string(),
            ..band
        })
    }

    pub fn from_stored(stored: BTreeMap<String, StoredBand>) -> Self {
        let bands = stored
            .into_iter()
            .map(|(grade, b)| GradeBand::new(grade, b.min, b.max, b.points, b.description))
            .collect();
        Self { bands }
    }

    /// Keyed form used for persistence. Later duplicates of a label would be
    /// lost here, so only validated scales should be stored.
    pub fn to_stored(&self) -> BTreeMap<String, StoredBand> {
        self.bands
            .iter()
            .map(|b| {
                (
                    b.grade.clone(),
                    StoredBand {
                        min: b.min_percent,
                        max: b.max_percent,
                        points: b.points,
                        description: b.description.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn from_json(raw: &serde_json::Value) -> Result<Self, serde_json::Error> {
        match raw {
            serde_json::Value::Array(_) => {
                let bands: Vec<GradeBand> = serde_json::from_value(raw.clone())?;
                Ok(Self { bands })
            }
            serde_json::Value::Object(_) => {
                let stored: BTreeMap<String, StoredBand> = serde_json::from_value(raw.clone())?;
                Ok(Self::from_stored(stored))
            }
            _ => Err(serde_json::Error::custom(
                "expected an array of bands or an object keyed by grade",
            )),
        }
    }
}
