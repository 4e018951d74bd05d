// ********* Input data structures ***********

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::Display;

use serde::{Serialize, Serializer};
use serde_json::Value as JSValue;

/// A cell value as it comes out of a spreadsheet or a CSV file, before any normalization.
///
/// Readers should not try to interpret the content: the normalization functions in
/// [crate::keys] decide how each variant maps to a canonical code.
#[derive(PartialEq, Debug, Clone)]
pub enum RawValue {
    Missing,
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<i64> for RawValue {
    fn from(x: i64) -> Self {
        RawValue::Int(x)
    }
}

/// A department code in its canonical, zero-padded form (`"05"`, `"76"`).
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize)]
pub struct DepartmentCode(pub(crate) String);

impl DepartmentCode {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for DepartmentCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The municipality code used to link a record to the DIVIPOLA table.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize)]
pub struct LinkCode(pub(crate) String);

impl LinkCode {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// A quinquennial age bucket, passed through from the source.
///
/// Buckets are ordered numerically when they are numbers (the source uses integer
/// bucket ids), and after all the numeric ones otherwise.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize)]
pub struct AgeGroup(pub(crate) String);

impl AgeGroup {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn sort_key(&self) -> (Option<i64>, &str) {
        (self.0.parse::<i64>().ok(), self.0.as_str())
    }
}

impl Ord for AgeGroup {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.sort_key(), other.sort_key()) {
            ((Some(a), _), (Some(b), _)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            ((Some(_), _), (None, _)) => Ordering::Less,
            ((None, _), (Some(_), _)) => Ordering::Greater,
            ((None, a), (None, b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for AgeGroup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Sex {
    Male,
    Female,
    /// Any code other than 1 or 2, including a missing cell.
    Unspecified,
}

impl Sex {
    pub fn label(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
            Sex::Unspecified => "unspecified",
        }
    }
}

impl Serialize for Sex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A row of the mortality table, once the keys have been normalized.
#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MortalityRecord {
    pub death_code: Option<String>,
    pub department_code: Option<DepartmentCode>,
    pub municipality_link_code: Option<LinkCode>,
    pub month: Option<u8>,
    pub age_group: Option<AgeGroup>,
    pub sex: Sex,
    /// Filled by the enrichment against the geographic reference.
    pub municipality_name: Option<String>,
    /// Filled by the enrichment against the geographic reference.
    pub department_name: Option<String>,
}

/// One row of the DIVIPOLA table.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoReference {
    pub link_code: LinkCode,
    pub municipality_name: Option<String>,
    pub department_name: Option<String>,
}

/// One row of the death cause table. Not used by the aggregates.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct CauseCode {
    pub code: String,
    pub description: Option<String>,
}

/// A feature of the department boundary collection.
#[derive(PartialEq, Debug, Clone)]
pub struct DepartmentBoundary {
    pub department_code: DepartmentCode,
    pub department_name: Option<String>,
    /// The geometry is only carried for the presentation layer.
    pub geometry: JSValue,
}

/// All the tables needed by the pipeline.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Tables {
    pub mortality: Vec<MortalityRecord>,
    pub geo_reference: Vec<GeoReference>,
    pub cause_codes: Vec<CauseCode>,
    pub boundaries: Vec<DepartmentBoundary>,
}

// ******** Output data structures *********

/// Identifies each of the derived result sets.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultKind {
    DeathsByDepartment,
    DeathsByMonth,
    TopViolentMunicipalities,
    LeastMortalMunicipalities,
    TopDeathCauses,
    DeathCausePreview,
    DeathsByAgeGroup,
    DeathsBySexAndDepartment,
}

/// How the groups of a result are ordered and truncated.
///
/// All sorts are stable: groups with the same count keep the order in which they were
/// first seen in the input.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase", tag = "order")]
pub enum RankPolicy {
    DiscoveryOrder,
    AscendingCategory,
    DescendingCount { limit: usize },
    AscendingCount { limit: usize },
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct CategoryCount<K> {
    pub category: K,
    pub count: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct AggregateResult<K> {
    pub kind: ResultKind,
    pub policy: RankPolicy,
    pub rows: Vec<CategoryCount<K>>,
}

impl<K> AggregateResult<K> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.rows.iter().map(|r| r.count).sum()
    }
}

/// The composite key of the sex by department result.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize)]
pub struct DepartmentSex {
    pub department: String,
    pub sex: Sex,
}

/// A boundary feature with the number of deaths recorded in its department.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct DepartmentDeaths {
    pub code: DepartmentCode,
    pub name: Option<String>,
    pub deaths: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJoin {
    /// Exactly one row per boundary feature, in feature order.
    pub rows: Vec<DepartmentDeaths>,
    /// Department codes seen in the records but absent from the boundaries.
    pub unmatched_codes: Vec<DepartmentCode>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub deaths_by_department: AggregateResult<DepartmentCode>,
    pub deaths_by_month: AggregateResult<u8>,
    pub top_violent_municipalities: AggregateResult<String>,
    pub least_mortal_municipalities: AggregateResult<String>,
    pub top_death_causes: AggregateResult<String>,
    pub death_cause_preview: AggregateResult<String>,
    pub deaths_by_age_group: AggregateResult<AgeGroup>,
    pub deaths_by_sex_and_department: AggregateResult<DepartmentSex>,
    pub department_map: GeoJoin,
}

// ********* Configuration **********

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PipelineRules {
    /// Records whose cause code starts with this prefix are counted as homicides.
    pub violent_code_prefix: Cow<'static, str>,
    pub top_violent_limit: usize,
    pub least_mortal_limit: usize,
    pub top_causes_limit: usize,
    pub cause_preview_limit: usize,
}

impl PipelineRules {
    pub const DEFAULT_RULES: PipelineRules = PipelineRules {
        violent_code_prefix: Cow::Borrowed("X95"),
        top_violent_limit: 5,
        least_mortal_limit: 10,
        top_causes_limit: 10,
        cause_preview_limit: 3,
    };
}

impl Default for PipelineRules {
    fn default() -> Self {
        PipelineRules::DEFAULT_RULES
    }
}
