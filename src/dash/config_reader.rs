use crate::dash::*;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// Default names of the files published with the 2019 statistics.
pub const DEFAULT_MORTALITY_FILE: &str = "Anexo1.NoFetal2019_CE_15-03-23.xlsx";
pub const DEFAULT_MORTALITY_SHEET: &str = "No_Fetales_2019";
pub const DEFAULT_CAUSE_CODES_FILE: &str = "Anexo2.CodigosDeMuerte_CE_15-03-23.xlsx";
pub const DEFAULT_GEO_REFERENCE_FILE: &str = "Anexo3.Divipola_CE_15-03-23.xlsx";
pub const DEFAULT_BOUNDARIES_FILE: &str = "departamentos.geojson";

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    pub title: Option<String>,
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
    #[serde(rename = "includeGeometry")]
    pub include_geometry: Option<bool>,
}

/// A tabular source: an Excel workbook or a CSV file.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    /// `xlsx` or `csv`. Guessed from the file extension if missing.
    pub provider: Option<String>,
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// Only for Excel. The first worksheet is used if missing.
    #[serde(rename = "worksheetName")]
    pub worksheet_name: Option<String>,
    #[serde(default)]
    pub columns: ColumnNames,
}

impl FileSource {
    pub fn new(file_path: &str) -> FileSource {
        FileSource {
            provider: None,
            file_path: file_path.to_string(),
            worksheet_name: None,
            columns: ColumnNames::default(),
        }
    }

    pub fn provider(&self) -> DashResult<Provider> {
        let p = match &self.provider {
            Some(p) => p.to_lowercase(),
            None => Path::new(&self.file_path)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase(),
        };
        match p.as_str() {
            "xlsx" | "excel" => Ok(Provider::Excel),
            "csv" => Ok(Provider::Csv),
            _ => UnknownProviderSnafu {
                provider: p,
                path: self.file_path.clone(),
            }
            .fail(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Provider {
    Excel,
    Csv,
}

/// Header names of the columns, for all the tables. Each table only looks at the
/// columns it needs.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnNames {
    #[serde(rename = "departmentCode")]
    pub department_code: Option<String>,
    #[serde(rename = "linkCode")]
    pub link_code: Option<String>,
    #[serde(rename = "deathCode")]
    pub death_code: Option<String>,
    pub month: Option<String>,
    #[serde(rename = "ageGroup")]
    pub age_group: Option<String>,
    pub sex: Option<String>,
    #[serde(rename = "municipalityName")]
    pub municipality_name: Option<String>,
    #[serde(rename = "departmentName")]
    pub department_name: Option<String>,
    #[serde(rename = "causeCode")]
    pub cause_code: Option<String>,
    #[serde(rename = "causeDescription")]
    pub cause_description: Option<String>,
}

fn or_default(name: &Option<String>, default: &str) -> String {
    name.clone().unwrap_or_else(|| default.to_string())
}

impl ColumnNames {
    pub fn department_code(&self) -> String {
        or_default(&self.department_code, "COD_DEPARTAMENTO")
    }
    pub fn link_code(&self) -> String {
        or_default(&self.link_code, "COD_DANE")
    }
    pub fn death_code(&self) -> String {
        or_default(&self.death_code, "COD_MUERTE")
    }
    pub fn month(&self) -> String {
        or_default(&self.month, "MES")
    }
    pub fn age_group(&self) -> String {
        or_default(&self.age_group, "GRUPO_EDAD1")
    }
    pub fn sex(&self) -> String {
        or_default(&self.sex, "SEXO")
    }
    pub fn municipality_name(&self) -> String {
        or_default(&self.municipality_name, "MUNICIPIO")
    }
    pub fn department_name(&self) -> String {
        or_default(&self.department_name, "DEPARTAMENTO")
    }
    pub fn cause_code(&self) -> String {
        or_default(
            &self.cause_code,
            "Código de la CIE-10 cuatro caracteres",
        )
    }
    pub fn cause_description(&self) -> String {
        or_default(
            &self.cause_description,
            "Descripcion de códigos mortalidad a cuatro caracteres",
        )
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BoundarySource {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "codeProperty")]
    pub code_property: Option<String>,
    #[serde(rename = "nameProperty")]
    pub name_property: Option<String>,
}

impl BoundarySource {
    pub fn new(file_path: &str) -> BoundarySource {
        BoundarySource {
            file_path: file_path.to_string(),
            code_property: None,
            name_property: None,
        }
    }

    pub fn code_property(&self) -> String {
        or_default(&self.code_property, "DPTO_CCDGO")
    }

    pub fn name_property(&self) -> String {
        or_default(&self.name_property, "DPTO_CNMBR")
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Sources {
    pub mortality: FileSource,
    #[serde(rename = "causeCodes")]
    pub cause_codes: FileSource,
    #[serde(rename = "geoReference")]
    pub geo_reference: FileSource,
    pub boundaries: BoundarySource,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(rename = "violentCodePrefix")]
    pub violent_code_prefix: Option<String>,
    #[serde(rename = "topViolentLimit")]
    pub top_violent_limit: Option<usize>,
    #[serde(rename = "leastMortalLimit")]
    pub least_mortal_limit: Option<usize>,
    #[serde(rename = "topCausesLimit")]
    pub top_causes_limit: Option<usize>,
    #[serde(rename = "causePreviewLimit")]
    pub cause_preview_limit: Option<usize>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DashConfig {
    #[serde(rename = "outputSettings", default)]
    pub output_settings: OutputSettings,
    pub sources: Sources,
    #[serde(default)]
    pub rules: RulesConfig,
}

impl DashConfig {
    /// The configuration of the original dashboard: all the files in one directory.
    pub fn from_data_dir(data_dir: &Path) -> DashConfig {
        let p = |name: &str| data_dir.join(name).display().to_string();
        let mut mortality = FileSource::new(&p(DEFAULT_MORTALITY_FILE));
        mortality.worksheet_name = Some(DEFAULT_MORTALITY_SHEET.to_string());
        DashConfig {
            output_settings: OutputSettings::default(),
            sources: Sources {
                mortality,
                cause_codes: FileSource::new(&p(DEFAULT_CAUSE_CODES_FILE)),
                geo_reference: FileSource::new(&p(DEFAULT_GEO_REFERENCE_FILE)),
                boundaries: BoundarySource::new(&p(DEFAULT_BOUNDARIES_FILE)),
            },
            rules: RulesConfig::default(),
        }
    }

    pub fn title(&self) -> String {
        self.output_settings
            .title
            .clone()
            .unwrap_or_else(|| "Análisis de Mortalidad en Colombia - 2019".to_string())
    }
}

/// Reads a configuration file. Relative paths are resolved against the directory of the
/// configuration file.
pub fn read_config(path: &str) -> DashResult<DashConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let mut config: DashConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    let root_p = Path::new(path).parent().context(MissingParentDirSnafu { path })?;
    let resolve = |p: &str| -> String {
        let pb: PathBuf = root_p.join(p);
        pb.display().to_string()
    };
    let s = &mut config.sources;
    s.mortality.file_path = resolve(&s.mortality.file_path);
    s.cause_codes.file_path = resolve(&s.cause_codes.file_path);
    s.geo_reference.file_path = resolve(&s.geo_reference.file_path);
    s.boundaries.file_path = resolve(&s.boundaries.file_path);
    if let Some(out) = config.output_settings.output_path.clone() {
        if out != "stdout" {
            config.output_settings.output_path = Some(resolve(&out));
        }
    }
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn validate_rules(rules: &RulesConfig) -> DashResult<PipelineRules> {
    let d = PipelineRules::DEFAULT_RULES;
    let prefix = match rules.violent_code_prefix.as_deref() {
        None => d.violent_code_prefix.clone(),
        Some(p) if p.trim().is_empty() => {
            whatever!("violentCodePrefix may not be empty")
        }
        Some(p) => p.trim().to_string().into(),
    };
    Ok(PipelineRules {
        violent_code_prefix: prefix,
        top_violent_limit: rules.top_violent_limit.unwrap_or(d.top_violent_limit),
        least_mortal_limit: rules.least_mortal_limit.unwrap_or(d.least_mortal_limit),
        top_causes_limit: rules.top_causes_limit.unwrap_or(d.top_causes_limit),
        cause_preview_limit: rules.cause_preview_limit.unwrap_or(d.cause_preview_limit),
    })
}

/// Checks everything that can be checked before touching the data files.
pub fn validate_config(config: &DashConfig) -> DashResult<PipelineRules> {
    config.sources.mortality.provider()?;
    config.sources.cause_codes.provider()?;
    config.sources.geo_reference.provider()?;
    validate_rules(&config.rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn data_dir_uses_the_published_file_names() {
        let config = DashConfig::from_data_dir(Path::new("data"));
        assert!(config.sources.mortality.file_path.ends_with(DEFAULT_MORTALITY_FILE));
        assert_eq!(
            config.sources.mortality.worksheet_name.as_deref(),
            Some(DEFAULT_MORTALITY_SHEET)
        );
        assert_eq!(config.sources.mortality.provider().unwrap(), Provider::Excel);
        assert_eq!(config.sources.boundaries.code_property(), "DPTO_CCDGO");
        assert_eq!(validate_config(&config).unwrap(), PipelineRules::DEFAULT_RULES);
    }

    #[test]
    fn config_paths_are_relative_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_p = dir.path().join("dash.json");
        let mut f = fs::File::create(&config_p).unwrap();
        write!(
            f,
            r#"{{
            "outputSettings": {{"title": "test", "outputPath": "out.json"}},
            "sources": {{
                "mortality": {{"filePath": "m.csv", "columns": {{"month": "MONTH"}}}},
                "causeCodes": {{"provider": "csv", "filePath": "codes.txt"}},
                "geoReference": {{"filePath": "geo.xlsx"}},
                "boundaries": {{"filePath": "b.geojson", "codeProperty": "CODE"}}
            }},
            "rules": {{"topViolentLimit": 3}}
        }}"#
        )
        .unwrap();

        let config = read_config(config_p.to_str().unwrap()).unwrap();
        assert_eq!(
            config.sources.mortality.file_path,
            dir.path().join("m.csv").display().to_string()
        );
        assert_eq!(
            config.output_settings.output_path,
            Some(dir.path().join("out.json").display().to_string())
        );
        assert_eq!(config.sources.mortality.provider().unwrap(), Provider::Csv);
        assert_eq!(config.sources.cause_codes.provider().unwrap(), Provider::Csv);
        assert_eq!(config.sources.mortality.columns.month(), "MONTH");
        assert_eq!(config.sources.mortality.columns.sex(), "SEXO");
        assert_eq!(config.sources.boundaries.code_property(), "CODE");
        assert_eq!(config.title(), "test");

        let rules = validate_config(&config).unwrap();
        assert_eq!(rules.top_violent_limit, 3);
        assert_eq!(rules.least_mortal_limit, 10);
    }

    #[test]
    fn bad_settings_are_rejected() {
        let mut config = DashConfig::from_data_dir(Path::new("data"));
        config.sources.geo_reference.file_path = "geo.ods".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(DashError::UnknownProvider { .. })
        ));

        let rules = RulesConfig {
            violent_code_prefix: Some(" ".to_string()),
            ..RulesConfig::default()
        };
        assert!(validate_rules(&rules).is_err());
    }
}
