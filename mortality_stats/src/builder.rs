pub use crate::config::*;
use crate::keys::*;

use serde_json::Value as JSValue;

/// The cells of one mortality row, as read from the source.
#[derive(PartialEq, Debug, Clone)]
pub struct RawMortalityRow {
    pub death_code: RawValue,
    pub department_code: RawValue,
    pub municipality_link_code: RawValue,
    pub month: RawValue,
    pub age_group: RawValue,
    pub sex: RawValue,
}

impl Default for RawMortalityRow {
    fn default() -> Self {
        RawMortalityRow {
            death_code: RawValue::Missing,
            department_code: RawValue::Missing,
            municipality_link_code: RawValue::Missing,
            month: RawValue::Missing,
            age_group: RawValue::Missing,
            sex: RawValue::Missing,
        }
    }
}

/// A builder for assembling the input tables.
///
/// All the keys are normalized on the way in, so that the tables returned by
/// [Builder::build] can be joined directly.
///
/// ```
/// use mortality_stats::builder::Builder;
/// use mortality_stats::{run_pipeline, PipelineRules};
///
/// let mut builder = Builder::new();
/// builder.add_record_simple("5", 1);
/// builder.add_record_simple("05", 1);
///
/// let res = run_pipeline(&builder.build(), &PipelineRules::DEFAULT_RULES);
/// assert_eq!(res.deaths_by_department.rows[0].count, 2);
/// ```
#[derive(Default)]
pub struct Builder {
    pub(crate) _tables: Tables,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            _tables: Tables::default(),
        }
    }

    pub fn add_record(&mut self, row: &RawMortalityRow) {
        self._tables.mortality.push(MortalityRecord {
            death_code: normalize_text(&row.death_code),
            department_code: normalize_department_code(&row.department_code),
            municipality_link_code: normalize_link_code(&row.municipality_link_code),
            month: normalize_month(&row.month),
            age_group: normalize_age_group(&row.age_group),
            sex: normalize_sex(&row.sex),
            municipality_name: None,
            department_name: None,
        });
    }

    /// Adds a record that only carries a department and a month.
    pub fn add_record_simple(&mut self, department_code: &str, month: u8) {
        self.add_record(&RawMortalityRow {
            department_code: department_code.into(),
            month: RawValue::Int(month as i64),
            ..RawMortalityRow::default()
        })
    }

    /// Adds a row of the geographic reference. Rows without a usable link code are ignored.
    pub fn add_geo_reference(
        &mut self,
        link_code: &RawValue,
        municipality_name: &RawValue,
        department_name: &RawValue,
    ) -> bool {
        match normalize_link_code(link_code) {
            Some(link_code) => {
                self._tables.geo_reference.push(GeoReference {
                    link_code,
                    municipality_name: normalize_text(municipality_name),
                    department_name: normalize_text(department_name),
                });
                true
            }
            None => false,
        }
    }

    pub fn add_cause_code(&mut self, code: &RawValue, description: &RawValue) -> bool {
        match normalize_text(code) {
            Some(code) => {
                self._tables.cause_codes.push(CauseCode {
                    code,
                    description: normalize_text(description),
                });
                true
            }
            None => false,
        }
    }

    /// Adds a boundary feature. Features without a department code are ignored.
    pub fn add_boundary(
        &mut self,
        department_code: &RawValue,
        department_name: &RawValue,
        geometry: JSValue,
    ) -> bool {
        match normalize_department_code(department_code) {
            Some(department_code) => {
                self._tables.boundaries.push(DepartmentBoundary {
                    department_code,
                    department_name: normalize_text(department_name),
                    geometry,
                });
                true
            }
            None => false,
        }
    }

    pub fn num_records(&self) -> usize {
        self._tables.mortality.len()
    }

    pub fn build(self) -> Tables {
        self._tables
    }
}
