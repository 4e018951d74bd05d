pub mod builder;
mod config;
pub mod keys;
use log::{debug, info, warn};

use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
};

pub use crate::config::*;

/// Label used in the sex by department result for records that could not be
/// attached to a department name.
pub const UNMATCHED_DEPARTMENT: &str = "(unmatched)";

// **** Grouping primitives ****

/// Counts the keys, keeping the groups in the order they are first seen.
fn count_by<K, I>(keys: I) -> Vec<CategoryCount<K>>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = K>,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<CategoryCount<K>> = Vec::new();
    for k in keys {
        match positions.get(&k).copied() {
            Some(idx) => groups[idx].count += 1,
            None => {
                positions.insert(k.clone(), groups.len());
                groups.push(CategoryCount {
                    category: k,
                    count: 1,
                });
            }
        }
    }
    groups
}

/// Orders and truncates the groups. Every sort is stable.
fn rank<K: Ord>(
    kind: ResultKind,
    policy: RankPolicy,
    mut groups: Vec<CategoryCount<K>>,
) -> AggregateResult<K> {
    match policy {
        RankPolicy::DiscoveryOrder => {}
        RankPolicy::AscendingCategory => groups.sort_by(|a, b| a.category.cmp(&b.category)),
        RankPolicy::DescendingCount { limit } => {
            groups.sort_by(|a, b| b.count.cmp(&a.count));
            groups.truncate(limit);
        }
        RankPolicy::AscendingCount { limit } => {
            groups.sort_by(|a, b| a.count.cmp(&b.count));
            groups.truncate(limit);
        }
    }
    debug!("rank: {:?} {:?}: {} groups", kind, policy, groups.len());
    AggregateResult {
        kind,
        policy,
        rows: groups,
    }
}

// **** Enrichment ****

/// Attaches the municipality and department names of the geographic reference to the records.
///
/// This is a left join: records without a match keep empty names and stay in the table.
/// If the reference has several rows for the same code, the first one wins.
pub fn enrich(records: &[MortalityRecord], geo: &[GeoReference]) -> Vec<MortalityRecord> {
    let mut by_code: HashMap<&LinkCode, &GeoReference> = HashMap::new();
    let mut duplicates = 0;
    for g in geo.iter() {
        if by_code.contains_key(&g.link_code) {
            duplicates += 1;
        } else {
            by_code.insert(&g.link_code, g);
        }
    }
    if duplicates > 0 {
        warn!(
            "enrich: {} duplicate link codes in the geographic reference, keeping the first row",
            duplicates
        );
    }

    let mut unmatched = 0;
    let res: Vec<MortalityRecord> = records
        .iter()
        .map(|r| {
            let mut res = r.clone();
            match r.municipality_link_code.as_ref().and_then(|c| by_code.get(c)) {
                Some(g) => {
                    res.municipality_name = g.municipality_name.clone();
                    res.department_name = g.department_name.clone();
                }
                None => {
                    unmatched += 1;
                    res.municipality_name = None;
                    res.department_name = None;
                }
            }
            res
        })
        .collect();
    if unmatched > 0 {
        warn!(
            "enrich: {} of {} records have no match in the geographic reference",
            unmatched,
            records.len()
        );
    }
    res
}

// **** Aggregations ****

pub fn deaths_by_department(records: &[MortalityRecord]) -> AggregateResult<DepartmentCode> {
    let missing = records
        .iter()
        .filter(|r| r.department_code.is_none())
        .count();
    if missing > 0 {
        warn!(
            "deaths_by_department: {} records without a department code",
            missing
        );
    }
    let groups = count_by(records.iter().filter_map(|r| r.department_code.clone()));
    rank(
        ResultKind::DeathsByDepartment,
        RankPolicy::DiscoveryOrder,
        groups,
    )
}

pub fn deaths_by_month(records: &[MortalityRecord]) -> AggregateResult<u8> {
    let missing = records.iter().filter(|r| r.month.is_none()).count();
    if missing > 0 {
        warn!("deaths_by_month: {} records without a valid month", missing);
    }
    let groups = count_by(records.iter().filter_map(|r| r.month));
    rank(
        ResultKind::DeathsByMonth,
        RankPolicy::AscendingCategory,
        groups,
    )
}

/// The municipalities with the most deaths whose cause code starts with the violent prefix.
pub fn top_violent_municipalities(
    records: &[MortalityRecord],
    rules: &PipelineRules,
) -> AggregateResult<String> {
    let prefix = rules.violent_code_prefix.as_ref();
    let groups = count_by(
        records
            .iter()
            .filter(|r| {
                r.death_code
                    .as_deref()
                    .map(|c| c.starts_with(prefix))
                    .unwrap_or(false)
            })
            .filter_map(|r| r.municipality_name.clone()),
    );
    rank(
        ResultKind::TopViolentMunicipalities,
        RankPolicy::DescendingCount {
            limit: rules.top_violent_limit,
        },
        groups,
    )
}

pub fn least_mortal_municipalities(
    records: &[MortalityRecord],
    rules: &PipelineRules,
) -> AggregateResult<String> {
    let groups = count_by(records.iter().filter_map(|r| r.municipality_name.clone()));
    rank(
        ResultKind::LeastMortalMunicipalities,
        RankPolicy::AscendingCount {
            limit: rules.least_mortal_limit,
        },
        groups,
    )
}

fn death_causes(
    records: &[MortalityRecord],
    kind: ResultKind,
    limit: usize,
) -> AggregateResult<String> {
    let groups = count_by(records.iter().filter_map(|r| r.death_code.clone()));
    rank(kind, RankPolicy::DescendingCount { limit }, groups)
}

pub fn top_death_causes(
    records: &[MortalityRecord],
    rules: &PipelineRules,
) -> AggregateResult<String> {
    death_causes(records, ResultKind::TopDeathCauses, rules.top_causes_limit)
}

/// The short version of the top causes, for compact views.
pub fn death_cause_preview(
    records: &[MortalityRecord],
    rules: &PipelineRules,
) -> AggregateResult<String> {
    death_causes(
        records,
        ResultKind::DeathCausePreview,
        rules.cause_preview_limit,
    )
}

/// One bucket per age group found in the source. No re-binning is done.
pub fn deaths_by_age_group(records: &[MortalityRecord]) -> AggregateResult<AgeGroup> {
    let groups = count_by(records.iter().filter_map(|r| r.age_group.clone()));
    rank(
        ResultKind::DeathsByAgeGroup,
        RankPolicy::AscendingCategory,
        groups,
    )
}

pub fn deaths_by_sex_and_department(
    records: &[MortalityRecord],
) -> AggregateResult<DepartmentSex> {
    let groups = count_by(records.iter().map(|r| DepartmentSex {
        department: r
            .department_name
            .clone()
            .unwrap_or_else(|| UNMATCHED_DEPARTMENT.to_string()),
        sex: r.sex,
    }));
    rank(
        ResultKind::DeathsBySexAndDepartment,
        RankPolicy::DiscoveryOrder,
        groups,
    )
}

// **** Geographic join ****

/// Left join of the department counts on the boundary features.
///
/// Every feature appears exactly once in the output, in feature order, with a count of
/// zero if no record belongs to its department.
pub fn join_departments(
    counts: &AggregateResult<DepartmentCode>,
    boundaries: &[DepartmentBoundary],
) -> GeoJoin {
    let by_code: HashMap<&DepartmentCode, u64> = counts
        .rows
        .iter()
        .map(|cc| (&cc.category, cc.count))
        .collect();

    let rows: Vec<DepartmentDeaths> = boundaries
        .iter()
        .map(|b| DepartmentDeaths {
            code: b.department_code.clone(),
            name: b.department_name.clone(),
            deaths: by_code.get(&b.department_code).cloned().unwrap_or(0),
        })
        .collect();

    let known: HashSet<&DepartmentCode> = boundaries.iter().map(|b| &b.department_code).collect();
    let unmatched_codes: Vec<DepartmentCode> = counts
        .rows
        .iter()
        .filter(|cc| !known.contains(&cc.category))
        .map(|cc| cc.category.clone())
        .collect();
    if !unmatched_codes.is_empty() {
        warn!(
            "join_departments: department codes without a boundary: {:?}",
            unmatched_codes
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<&str>>()
        );
    }
    GeoJoin {
        rows,
        unmatched_codes,
    }
}

/// Runs all the aggregations over the tables.
///
/// The records do not need to be enriched beforehand: the join with the geographic
/// reference is done here. This function does not fail; an empty mortality table gives
/// empty results and a department map with only zero counts.
pub fn run_pipeline(tables: &Tables, rules: &PipelineRules) -> PipelineResult {
    info!(
        "run_pipeline: Processing {} records, {} geographic references, {} boundaries, rules: {:?}",
        tables.mortality.len(),
        tables.geo_reference.len(),
        tables.boundaries.len(),
        rules
    );

    // The department counts only need the codes.
    let by_department = deaths_by_department(&tables.mortality);
    let department_map = join_departments(&by_department, &tables.boundaries);

    let records = enrich(&tables.mortality, &tables.geo_reference);

    let res = PipelineResult {
        deaths_by_department: by_department,
        deaths_by_month: deaths_by_month(&records),
        top_violent_municipalities: top_violent_municipalities(&records, rules),
        least_mortal_municipalities: least_mortal_municipalities(&records, rules),
        top_death_causes: top_death_causes(&records, rules),
        death_cause_preview: death_cause_preview(&records, rules),
        deaths_by_age_group: deaths_by_age_group(&records),
        deaths_by_sex_and_department: deaths_by_sex_and_department(&records),
        department_map,
    };
    info!(
        "run_pipeline: {} departments on the map, {} months, {} causes",
        res.department_map.rows.len(),
        res.deaths_by_month.len(),
        res.top_death_causes.len()
    );
    res
}
