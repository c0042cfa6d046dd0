use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{CatalogConfig, DEFAULT_ROOT};

#[derive(Parser, Debug)]
#[command(name = "catzip")]
#[command(version)]
#[command(about = "Browse a drawings catalog and download files or zip archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  catzip structure                              list year-makes and models\n  \
  catzip files 2020-Ford F150                   list every file under a model\n  \
  catzip zip-all 2020-Ford F150 -o - > f150.zip  stream a model archive to stdout\n  \
  catzip zip-selected 2020-Ford F150 __manual.pdf wiring__diagram.pdf")]
pub struct Cli {
    /// Catalog root directory
    #[arg(long, env = "CATZIP_ROOT", default_value = DEFAULT_ROOT, global = true)]
    pub root: PathBuf,

    /// Directory for temporary archives (default: system temp dir)
    #[arg(long, env = "CATZIP_TEMP_DIR", value_name = "DIR", global = true)]
    pub temp_dir: Option<PathBuf>,

    /// Cap on concurrent size-aggregation walks
    #[arg(long = "max-walks", env = "CATZIP_MAX_WALKS", value_name = "N", global = true)]
    pub max_walks: Option<usize>,

    /// Quiet mode (only warnings and errors are logged)
    #[arg(short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Every year-make with its models
    Structure,

    /// Year-make directories under the root
    YearMakes,

    /// Models under a year-make
    Models {
        year_make: String,
    },

    /// Files and directories under a model
    Files {
        year_make: String,
        model: String,
    },

    /// Print where a file would live, without checking it exists
    Path {
        year_make: String,
        model: String,
        file: String,
        subdirectory: Option<String>,
    },

    /// Copy a single file out of the catalog
    Fetch {
        year_make: String,
        model: String,
        file: String,
        subdirectory: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Zip one directory inside a model
    ZipDir {
        year_make: String,
        model: String,
        directory: String,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Zip a whole model
    ZipAll {
        year_make: String,
        model: String,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Zip selected files, given as <subdirectory>__<filename> keys
    ZipSelected {
        year_make: String,
        model: String,
        #[arg(value_name = "KEY", required = true)]
        keys: Vec<String>,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// List the entries of a zip archive
    Inspect {
        #[arg(value_name = "ZIP")]
        file: PathBuf,

        /// Detailed table with sizes, ratios and timestamps
        #[arg(short = 'v')]
        verbose: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output file, `-` for stdout (default: the download name)
    #[arg(short = 'o', value_name = "OUT")]
    pub output: Option<PathBuf>,
}

/// Where a download should be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Stdout,
    File(PathBuf),
}

impl OutputArgs {
    /// Resolve `-o`, falling back to `default_name` in the current directory.
    pub fn resolve(&self, default_name: &str) -> Output {
        match &self.output {
            Some(path) if path.as_os_str() == "-" => Output::Stdout,
            Some(path) => Output::File(path.clone()),
            None => Output::File(PathBuf::from(default_name)),
        }
    }
}

impl Cli {
    pub fn config(&self) -> CatalogConfig {
        let mut config = CatalogConfig::new(&self.root).with_max_concurrent_walks(self.max_walks);
        if let Some(dir) = &self.temp_dir {
            config = config.with_temp_dir(dir);
        }
        config
    }

    /// Whether the command streams its download to stdout.
    pub fn writes_stdout(&self) -> bool {
        let output = match &self.command {
            Command::Fetch { output, .. }
            | Command::ZipDir { output, .. }
            | Command::ZipAll { output, .. }
            | Command::ZipSelected { output, .. } => output,
            _ => return false,
        };
        output.resolve("") == Output::Stdout
    }
}
