//! Dataset filtering and design-array construction.

use log::debug;

use crate::domain::{DataFilter, FactorLevels, FactorSpec, LevelIndex, Observation};
use crate::error::{GrowthError, Result};

/// Ordered observations. Filtering returns a new dataset; the source is never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    observations: Vec<Observation>,
}

/// Arrays handed to the model builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub levels: FactorLevels,
}

impl Dataset {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Rows with both age and size present that pass every active criterion.
    ///
    /// An empty location list and a missing year range disable those criteria.
    /// Rows with no recorded year are dropped whenever a year range is active.
    pub fn apply_filter(&self, filter: &DataFilter) -> Result<Dataset> {
        let kept: Vec<Observation> = self
            .observations
            .iter()
            .filter(|o| o.age.is_some() && o.size.is_some())
            .filter(|o| filter.sex.is_none_or(|sex| o.sex == Some(sex)))
            .filter(|o| {
                filter.locations.is_empty()
                    || o.location
                        .as_ref()
                        .is_some_and(|loc| filter.locations.iter().any(|l| l == loc))
            })
            .filter(|o| match filter.years {
                None => true,
                Some((first, last)) => o.year.is_some_and(|y| y >= first && y <= last),
            })
            .cloned()
            .collect();

        debug!("filter kept {} of {} rows", kept.len(), self.len());
        if kept.is_empty() {
            return Err(GrowthError::data(
                "no observations remain after filtering (check sex, locations and years)",
            ));
        }
        Ok(Dataset::new(kept))
    }

    /// Explanatory/response arrays plus level indices for every factor in `factors`.
    ///
    /// Supported factors: `year`, `location` (alias `source`) and `sex`.
    pub fn design(&self, factors: &FactorSpec) -> Result<Design> {
        let mut x = Vec::with_capacity(self.len());
        let mut y = Vec::with_capacity(self.len());
        for (row, o) in self.observations.iter().enumerate() {
            match (o.age, o.size) {
                (Some(age), Some(size)) => {
                    x.push(age);
                    y.push(size);
                }
                _ => {
                    return Err(GrowthError::data(format!(
                        "row {row} is missing age or size; filter the dataset first"
                    )));
                }
            }
        }

        let mut levels = FactorLevels::new();
        for factor in factors.all_factors() {
            let values = self.factor_values(&factor)?;
            levels.insert(factor, LevelIndex::from_values(&values));
        }
        Ok(Design { x, y, levels })
    }

    fn factor_values(&self, factor: &str) -> Result<Vec<String>> {
        self.observations
            .iter()
            .enumerate()
            .map(|(row, o)| {
                let value = match factor {
                    "year" => o.year.map(|y| y.to_string()),
                    "location" | "source" => o.location.clone(),
                    "sex" => o.sex.map(|s| s.code().to_string()),
                    other => {
                        return Err(GrowthError::config(format!(
                            "unsupported factor `{other}` (expected year, location or sex)"
                        )));
                    }
                };
                value.ok_or_else(|| {
                    GrowthError::data(format!("row {row} has no value for factor `{factor}`"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Sex;

    fn obs(
        age: Option<f64>,
        size: Option<f64>,
        sex: Sex,
        loc: &str,
        year: Option<i32>,
    ) -> Observation {
        Observation {
            age,
            size,
            sex: Some(sex),
            location: Some(loc.to_string()),
            year,
        }
    }

    fn dataset() -> Dataset {
        Dataset::new(vec![
            obs(Some(1.0), Some(60.0), Sex::Female, "nsw1", Some(2001)),
            obs(Some(2.0), Some(80.0), Sex::Male, "nsw2", Some(2003)),
            obs(None, Some(70.0), Sex::Female, "nsw1", Some(2002)),
            obs(Some(4.0), None, Sex::Female, "qld", Some(2002)),
            obs(Some(5.0), Some(120.0), Sex::Female, "qld", None),
            obs(Some(6.0), Some(130.0), Sex::Male, "qld", Some(2010)),
        ])
    }

    #[test]
    fn missing_age_or_size_is_dropped() {
        let out = dataset().apply_filter(&DataFilter::default()).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn criteria_combine() {
        let filter = DataFilter {
            sex: Some(Sex::Female),
            locations: vec!["nsw1".into(), "qld".into()],
            years: None,
        };
        let out = dataset().apply_filter(&filter).unwrap();
        let ages: Vec<_> = out.observations().iter().filter_map(|o| o.age).collect();
        assert_eq!(ages, vec![1.0, 5.0]);
    }

    #[test]
    fn year_range_is_inclusive_and_drops_missing_years() {
        let filter = DataFilter {
            years: Some((2001, 2003)),
            ..DataFilter::default()
        };
        let out = dataset().apply_filter(&filter).unwrap();
        let years: Vec<_> = out.observations().iter().filter_map(|o| o.year).collect();
        assert_eq!(years, vec![2001, 2003]);
    }

    #[test]
    fn empty_result_is_a_data_error() {
        let filter = DataFilter {
            locations: vec!["wa".into()],
            ..DataFilter::default()
        };
        assert_eq!(dataset().apply_filter(&filter).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn design_indexes_levels_in_label_order() {
        let data = dataset().apply_filter(&DataFilter::default()).unwrap();
        let factors = FactorSpec::new().with("l_inf", "location").with("k", "sex");
        let design = data.design(&factors).unwrap();
        assert_eq!(design.x, vec![1.0, 2.0, 5.0, 6.0]);
        let loc = design.levels.get("location").unwrap();
        assert_eq!(loc.labels, vec!["nsw1", "nsw2", "qld"]);
        assert_eq!(loc.indices, vec![0, 1, 2, 2]);
        assert_eq!(design.levels.get("sex").unwrap().indices, vec![0, 1, 0, 1]);

        let bad = FactorSpec::new().with("k", "depth");
        assert_eq!(data.design(&bad).unwrap_err().exit_code(), 2);
    }
}
