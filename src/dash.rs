use log::{debug, info, warn};

use mortality_stats::builder::{Builder, RawMortalityRow};
use mortality_stats::*;
use snafu::{prelude::*, Snafu};

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::dash::config_reader::*;
use crate::dash::io_common::{cell, simplify_file_name, RawSheet};

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_excel;
mod io_geojson;

/// Errors while reading one of the data sources. They never stop the program: the
/// table is replaced by an empty one (see [OrEmpty]).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoadError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No worksheet {name} in {path}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display("No worksheet in {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Column {column} not found in {path} [{sheet}]"))]
    MissingColumn {
        path: String,
        sheet: String,
        column: String,
    },
    #[snafu(display("Error opening file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Error reading file {path}"))]
    ReadingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing {path}"))]
    ParsingGeoJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("{path} is not a GeoJSON feature collection"))]
    NotAFeatureCollection { path: String },
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Errors that stop the program: configuration and output.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DashError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("No parent directory for {path}"))]
    MissingParentDir { path: String },
    #[snafu(display("Unknown provider {provider:?} for {path}"))]
    UnknownProvider { provider: String, path: String },
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error serializing the summary"))]
    SerializingSummary { source: serde_json::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type DashResult<T> = Result<T, DashError>;

/// Replaces a failed load by an empty value.
pub trait OrEmpty<T> {
    fn or_empty(self, what: &str) -> T;
}

impl<T: Default> OrEmpty<T> for LoadResult<T> {
    fn or_empty(self, what: &str) -> T {
        match self {
            Ok(x) => x,
            Err(e) => {
                warn!("Could not load the {}, using an empty table: {}", what, e);
                T::default()
            }
        }
    }
}

// ******** Loading the tables ********

fn read_sheets(source: &FileSource, all_worksheets: bool) -> LoadResult<Vec<RawSheet>> {
    // The provider was checked with the configuration.
    match source.provider() {
        Ok(Provider::Csv) => Ok(vec![io_csv::read_csv_sheet(&source.file_path)?]),
        Ok(Provider::Excel) if all_worksheets && source.worksheet_name.is_none() => {
            io_excel::read_all_worksheets(&source.file_path)
        }
        _ => Ok(vec![io_excel::read_worksheet(
            &source.file_path,
            source.worksheet_name.as_deref(),
        )?]),
    }
}

fn load_mortality(source: &FileSource) -> LoadResult<Vec<RawMortalityRow>> {
    let cols = &source.columns;
    let mut res: Vec<RawMortalityRow> = Vec::new();
    for sheet in read_sheets(source, false)? {
        let located = sheet.locate(&cols.department_code())?;
        let dept_idx = located.column(&cols.department_code())?;
        let link_idx = located.column(&cols.link_code())?;
        let death_idx = located.column(&cols.death_code())?;
        let month_idx = located.column(&cols.month())?;
        let age_idx = located.column(&cols.age_group())?;
        let sex_idx = located.column(&cols.sex())?;
        for row in located.data_rows() {
            res.push(RawMortalityRow {
                death_code: cell(row, death_idx).clone(),
                department_code: cell(row, dept_idx).clone(),
                municipality_link_code: cell(row, link_idx).clone(),
                month: cell(row, month_idx).clone(),
                age_group: cell(row, age_idx).clone(),
                sex: cell(row, sex_idx).clone(),
            });
        }
    }
    Ok(res)
}

fn load_geo_reference(source: &FileSource, builder: &mut Builder) -> LoadResult<usize> {
    let cols = &source.columns;
    let mut added = 0;
    for sheet in read_sheets(source, false)? {
        let located = sheet.locate(&cols.link_code())?;
        let link_idx = located.column(&cols.link_code())?;
        let muni_idx = located.column(&cols.municipality_name())?;
        let dept_idx = located.column(&cols.department_name())?;
        for row in located.data_rows() {
            if builder.add_geo_reference(
                cell(row, link_idx),
                cell(row, muni_idx),
                cell(row, dept_idx),
            ) {
                added += 1;
            }
        }
    }
    Ok(added)
}

/// The cause code workbook spreads the codes over several worksheets. Worksheets without
/// the code column are notes and are skipped.
fn load_cause_codes(source: &FileSource, builder: &mut Builder) -> LoadResult<usize> {
    let cols = &source.columns;
    let mut added = 0;
    for sheet in read_sheets(source, true)? {
        let located = match sheet.locate(&cols.cause_code()) {
            Ok(l) => l,
            Err(e) => {
                debug!("load_cause_codes: skipping worksheet {}: {}", sheet.name, e);
                continue;
            }
        };
        let code_idx = located.column(&cols.cause_code())?;
        let desc_idx = located.optional_column(&cols.cause_description());
        for row in located.data_rows() {
            let desc = desc_idx
                .map(|i| cell(row, i).clone())
                .unwrap_or(RawValue::Missing);
            if builder.add_cause_code(cell(row, code_idx), &desc) {
                added += 1;
            }
        }
    }
    Ok(added)
}

/// The number of rows loaded from each source, reported in the summary.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct SourceStats {
    pub mortality: usize,
    pub cause_codes: usize,
    pub geo_reference: usize,
    pub boundaries: usize,
}

/// Everything the presentation layer needs, computed once at startup.
#[derive(Debug)]
pub struct DashContext {
    pub config: DashConfig,
    pub rules: PipelineRules,
    pub tables: Tables,
    pub boundary_description: JSValue,
    pub stats: SourceStats,
    pub results: PipelineResult,
}

impl DashContext {
    /// Loads all the sources and runs the pipeline.
    ///
    /// Missing or broken sources are replaced by empty tables, so this never fails.
    pub fn init(config: &DashConfig, rules: &PipelineRules) -> DashContext {
        let sources = &config.sources;
        let mut builder = Builder::new();

        let raw_rows = load_mortality(&sources.mortality).or_empty("mortality records");
        {
            let first: Vec<String> = raw_rows
                .iter()
                .take(5)
                .map(|r| format!("{:?}", r.department_code))
                .collect();
            info!("First department codes of the mortality records: {:?}", first);
        }
        for r in raw_rows.iter() {
            builder.add_record(r);
        }

        let cause_codes =
            load_cause_codes(&sources.cause_codes, &mut builder).or_empty("death cause codes");
        let geo_reference = load_geo_reference(&sources.geo_reference, &mut builder)
            .or_empty("geographic reference");

        let boundary_description = io_geojson::read_feature_collection(
            &sources.boundaries.file_path,
        )
        .unwrap_or_else(|e| {
            warn!(
                "Could not load the department boundaries, using an empty collection: {}",
                e
            );
            io_geojson::empty_feature_collection()
        });
        let boundaries =
            io_geojson::add_boundaries(&boundary_description, &sources.boundaries, &mut builder);

        let stats = SourceStats {
            mortality: builder.num_records(),
            cause_codes,
            geo_reference,
            boundaries,
        };
        info!("Loaded sources: {:?}", stats);

        let tables = builder.build();
        {
            let codes: BTreeSet<&str> = tables
                .boundaries
                .iter()
                .map(|b| b.department_code.as_str())
                .collect();
            info!("Department codes of the boundaries: {:?}", codes);
        }

        let results = run_pipeline(&tables, rules);
        DashContext {
            config: config.clone(),
            rules: rules.clone(),
            tables,
            boundary_description,
            stats,
            results,
        }
    }
}

// ******** Result handoff ********

fn rows_js<K: serde::Serialize>(r: &AggregateResult<K>) -> JSValue {
    json!({
        "policy": r.policy,
        "rows": r.rows,
    })
}

/// The top causes, with the description from the cause code table when there is one.
fn causes_js(r: &AggregateResult<String>, cause_codes: &[CauseCode]) -> JSValue {
    let mut descriptions: HashMap<&str, &str> = HashMap::new();
    for c in cause_codes.iter() {
        if let Some(d) = c.description.as_deref() {
            descriptions.entry(c.code.as_str()).or_insert(d);
        }
    }
    let rows: Vec<JSValue> = r
        .rows
        .iter()
        .map(|cc| {
            json!({
                "category": cc.category,
                "count": cc.count,
                "description": descriptions.get(cc.category.as_str()),
            })
        })
        .collect();
    json!({
        "policy": r.policy,
        "rows": rows,
    })
}

pub fn build_summary_js(ctx: &DashContext, include_geometry: bool) -> JSValue {
    let res = &ctx.results;
    let sources = &ctx.config.sources;
    let mut js = json!({
        "config": {
            "title": ctx.config.title(),
            "sources": {
                "mortality": {
                    "file": simplify_file_name(&sources.mortality.file_path),
                    "rows": ctx.stats.mortality,
                },
                "causeCodes": {
                    "file": simplify_file_name(&sources.cause_codes.file_path),
                    "rows": ctx.stats.cause_codes,
                },
                "geoReference": {
                    "file": simplify_file_name(&sources.geo_reference.file_path),
                    "rows": ctx.stats.geo_reference,
                },
                "boundaries": {
                    "file": simplify_file_name(&sources.boundaries.file_path),
                    "rows": ctx.stats.boundaries,
                },
            },
            "rules": {
                "violentCodePrefix": ctx.rules.violent_code_prefix,
                "topViolentLimit": ctx.rules.top_violent_limit,
                "leastMortalLimit": ctx.rules.least_mortal_limit,
                "topCausesLimit": ctx.rules.top_causes_limit,
                "causePreviewLimit": ctx.rules.cause_preview_limit,
            },
        },
        "results": {
            "departmentMap": res.department_map.rows,
            "unmatchedDepartmentCodes": res.department_map.unmatched_codes,
            "deathsByDepartment": rows_js(&res.deaths_by_department),
            "deathsByMonth": rows_js(&res.deaths_by_month),
            "topViolentMunicipalities": rows_js(&res.top_violent_municipalities),
            "leastMortalMunicipalities": rows_js(&res.least_mortal_municipalities),
            "topDeathCauses": causes_js(&res.top_death_causes, &ctx.tables.cause_codes),
            "deathCausePreview": causes_js(&res.death_cause_preview, &ctx.tables.cause_codes),
            "deathsByAgeGroup": rows_js(&res.deaths_by_age_group),
            "deathsBySexAndDepartment": rows_js(&res.deaths_by_sex_and_department),
        },
    });
    if include_geometry {
        js["boundaries"] = ctx.boundary_description.clone();
    }
    js
}

fn write_output(out: &str, contents: &str) -> DashResult<()> {
    if out == "stdout" {
        println!("{}", contents);
        Ok(())
    } else {
        info!("Writing summary to {}", out);
        fs::write(out, contents).context(WritingOutputSnafu { path: out })
    }
}

fn read_reference(path: &str) -> DashResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}

/// Compares the summary with a reference summary, printing the differences.
pub fn check_reference(summary: &JSValue, reference_path: &str) -> DashResult<()> {
    let reference = read_reference(reference_path)?;
    let pretty_ref = serde_json::to_string_pretty(&reference).context(SerializingSummarySnafu)?;
    let pretty = serde_json::to_string_pretty(summary).context(SerializingSummarySnafu)?;
    if pretty_ref != pretty {
        warn!("Found differences with the reference {}", reference_path);
        print_diff(pretty_ref.as_str(), pretty.as_str(), "\n");
        whatever!("Difference detected between the computed summary and the reference summary")
    }
    Ok(())
}

/// Runs the whole program for the given command line.
pub fn run(args: &Args) -> DashResult<()> {
    let config = match &args.config {
        Some(p) => read_config(p)?,
        None => {
            let data_dir = args.data_dir.clone().unwrap_or_else(|| "data".to_string());
            DashConfig::from_data_dir(Path::new(&data_dir))
        }
    };
    info!("config: {:?}", config);
    let rules = validate_config(&config)?;

    let ctx = DashContext::init(&config, &rules);

    let include_geometry =
        args.include_geometry || config.output_settings.include_geometry.unwrap_or(false);
    let summary = build_summary_js(&ctx, include_geometry);
    let pretty = serde_json::to_string_pretty(&summary).context(SerializingSummarySnafu)?;

    let out = args
        .out
        .clone()
        .or_else(|| config.output_settings.output_path.clone())
        .unwrap_or_else(|| "stdout".to_string());
    write_output(&out, &pretty)?;

    if let Some(reference) = &args.reference {
        check_reference(&summary, reference)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> String {
        let p = dir.join(name);
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        p.display().to_string()
    }

    /// A CSV version of the published files.
    fn csv_config(dir: &Path) -> DashConfig {
        let mortality = write_file(
            dir,
            "mortality.csv",
            "COD_DEPARTAMENTO,COD_DANE,COD_MUERTE,MES,GRUPO_EDAD1,SEXO\n\
             5,5001,X954,1,10,1\n\
             05,5001,X954,1,12,1\n\
             5,05001,I219,2,25,2\n\
             76,76001,X950,2,9,1\n\
             76,76001,,3,10,3\n",
        );
        let codes = write_file(
            dir,
            "codes.csv",
            "Lista de códigos,\n\
             Código de la CIE-10 cuatro caracteres,Descripcion  de códigos mortalidad a cuatro caracteres\n\
             X954,Agresión con disparo de otras armas de fuego\n\
             I219,Infarto agudo del miocardio\n",
        );
        let geo = write_file(
            dir,
            "divipola.csv",
            "COD_DANE,MUNICIPIO,DEPARTAMENTO\n\
             5001,MEDELLIN,ANTIOQUIA\n\
             76001,CALI,VALLE DEL CAUCA\n",
        );
        let boundaries = write_file(
            dir,
            "departamentos.geojson",
            &json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {"DPTO_CCDGO": "05", "DPTO_CNMBR": "ANTIOQUIA"}, "geometry": null},
                    {"type": "Feature", "properties": {"DPTO_CCDGO": "76", "DPTO_CNMBR": "VALLE DEL CAUCA"}, "geometry": null},
                    {"type": "Feature", "properties": {"DPTO_CCDGO": "91", "DPTO_CNMBR": "AMAZONAS"}, "geometry": null}
                ]
            })
            .to_string(),
        );
        DashConfig {
            output_settings: OutputSettings::default(),
            sources: Sources {
                mortality: FileSource::new(&mortality),
                cause_codes: FileSource::new(&codes),
                geo_reference: FileSource::new(&geo),
                boundaries: BoundarySource::new(&boundaries),
            },
            rules: RulesConfig::default(),
        }
    }

    #[test]
    fn context_from_csv_sources() {
        let dir = tempfile::tempdir().unwrap();
        let config = csv_config(dir.path());
        let rules = validate_config(&config).unwrap();
        let ctx = DashContext::init(&config, &rules);

        assert_eq!(
            ctx.stats,
            SourceStats {
                mortality: 5,
                cause_codes: 2,
                geo_reference: 2,
                boundaries: 3,
            }
        );
        let map: Vec<(&str, u64)> = ctx
            .results
            .department_map
            .rows
            .iter()
            .map(|r| (r.code.as_str(), r.deaths))
            .collect();
        assert_eq!(map, vec![("05", 3), ("76", 2), ("91", 0)]);
        assert_eq!(ctx.results.top_violent_municipalities.rows[0].category, "MEDELLIN");
        assert_eq!(ctx.results.top_violent_municipalities.rows[0].count, 2);

        let js = build_summary_js(&ctx, false);
        let causes = &js["results"]["topDeathCauses"]["rows"];
        assert_eq!(causes[0]["category"], "X954");
        assert_eq!(
            causes[0]["description"],
            "Agresión con disparo de otras armas de fuego"
        );
        assert_eq!(js["config"]["sources"]["mortality"]["file"], "mortality.csv");
        assert!(js.get("boundaries").is_none());
        assert_eq!(
            build_summary_js(&ctx, true)["boundaries"]["features"]
                .as_array()
                .map(|a| a.len()),
            Some(3)
        );
    }

    #[test]
    fn csv_codes_with_decimals_join_the_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = csv_config(dir.path());
        config.sources.mortality.file_path = write_file(
            dir.path(),
            "exported.csv",
            "COD_DEPARTAMENTO,COD_DANE,COD_MUERTE,MES,GRUPO_EDAD1,SEXO\n\
             5.0,5001.0,X954,1.0,10.0,1.0\n\
             05,05001,X954,1,10,1\n\
             76.0,76001,I219,2,10,2.0\n",
        );
        config.sources.boundaries.file_path = write_file(
            dir.path(),
            "with_gaps.geojson",
            &json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {"DPTO_CCDGO": "05"}, "geometry": null},
                    {"type": "Feature", "properties": {"DPTO_CNMBR": "SIN CÓDIGO"}, "geometry": null},
                    {"type": "Feature", "properties": {"DPTO_CCDGO": 76}, "geometry": null}
                ]
            })
            .to_string(),
        );
        let rules = validate_config(&config).unwrap();
        let ctx = DashContext::init(&config, &rules);

        assert_eq!(ctx.stats.boundaries, 2);
        let map: Vec<(&str, u64)> = ctx
            .results
            .department_map
            .rows
            .iter()
            .map(|r| (r.code.as_str(), r.deaths))
            .collect();
        assert_eq!(map, vec![("05", 2), ("76", 1)]);
        assert!(ctx.results.department_map.unmatched_codes.is_empty());
        assert_eq!(ctx.results.deaths_by_age_group.rows.len(), 1);
        assert_eq!(ctx.results.deaths_by_month.total(), 3);

        let js = build_summary_js(&ctx, false);
        let by_sex = js["results"]["deathsBySexAndDepartment"]["rows"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        assert_eq!(by_sex.len(), 2);
        assert!(by_sex.iter().all(|r| r["category"]["sex"] != "unspecified"));
    }

    #[test]
    fn missing_sources_give_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = csv_config(dir.path());
        config.sources.mortality.file_path = dir.path().join("gone.csv").display().to_string();
        config.sources.geo_reference.file_path =
            dir.path().join("gone.xlsx").display().to_string();
        let rules = validate_config(&config).unwrap();
        let ctx = DashContext::init(&config, &rules);

        assert_eq!(ctx.stats.mortality, 0);
        assert_eq!(ctx.stats.geo_reference, 0);
        assert!(ctx.results.deaths_by_month.is_empty());
        assert!(ctx.results.deaths_by_sex_and_department.is_empty());
        assert_eq!(ctx.results.department_map.rows.len(), 3);
        assert!(ctx.results.department_map.rows.iter().all(|r| r.deaths == 0));

        config.sources.boundaries.file_path = dir.path().join("gone.geojson").display().to_string();
        let ctx = DashContext::init(&config, &rules);
        assert!(ctx.results.department_map.rows.is_empty());
        assert_eq!(
            ctx.boundary_description,
            io_geojson::empty_feature_collection()
        );
    }

    #[test]
    fn wrong_columns_give_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = csv_config(dir.path());
        config.sources.mortality.columns.month = Some("MONTH".to_string());
        let rules = validate_config(&config).unwrap();
        let ctx = DashContext::init(&config, &rules);
        assert_eq!(ctx.stats.mortality, 0);
        assert_eq!(ctx.stats.geo_reference, 2);
    }

    #[test]
    fn summary_matches_itself_as_reference() {
        let dir = tempfile::tempdir().unwrap();
        let config = csv_config(dir.path());
        let rules = validate_config(&config).unwrap();
        let summary = build_summary_js(&DashContext::init(&config, &rules), false);
        let again = build_summary_js(&DashContext::init(&config, &rules), false);
        assert_eq!(summary.to_string(), again.to_string());

        let reference = write_file(
            dir.path(),
            "reference.json",
            &serde_json::to_string_pretty(&summary).unwrap(),
        );
        assert!(check_reference(&summary, &reference).is_ok());

        let mut other = summary.clone();
        other["config"]["title"] = json!("another title");
        assert!(check_reference(&other, &reference).is_err());
    }

    #[test]
    fn or_empty_keeps_good_values() {
        let ok: LoadResult<Vec<u32>> = Ok(vec![1, 2]);
        assert_eq!(ok.or_empty("numbers"), vec![1, 2]);
        let err: LoadResult<Vec<u32>> = EmptyExcelSnafu { path: "x.xlsx" }.fail();
        assert!(err.or_empty("numbers").is_empty());
    }
}
