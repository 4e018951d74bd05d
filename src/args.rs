use clap::Parser;

/// Aggregates the 2019 mortality records of Colombia for the mortality dashboard.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON file describing the data sources, the column names and the
    /// ranking rules. If not provided, the published files are looked up in --data-dir.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (directory, default data) The directory with the published files, used when no
    /// configuration file is given.
    #[clap(short, long, value_parser)]
    pub data_dir: Option<String>,

    /// (file path, 'stdout' or empty) Where to write the summary in JSON format. Setting this option
    /// overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, mortdash will check that the
    /// computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// If passed as an argument, the department boundaries are included in the summary.
    #[clap(long, takes_value = false)]
    pub include_geometry: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
