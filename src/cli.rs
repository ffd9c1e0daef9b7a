use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use dm_schema::names::NameError;
use dm_schema::{SchemaIdentifier, SchemaName, UntypedAttribute};

#[derive(Parser)]
#[clap(version, about)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,

    #[clap(
        long,
        value_parser,
        global = true,
        conflicts_with = "base_url",
        help = "Directory of schema files named NAME-MAJOR.MINOR.xml [default: .]"
    )]
    pub dir: Option<PathBuf>,

    #[clap(long, global = true, value_parser, help = "Base URL schema files are fetched from")]
    pub base_url: Option<String>,

    #[clap(
        long,
        global = true,
        value_parser,
        default_value_t = 100_000,
        help = "Maximum number of XML nodes per schema"
    )]
    pub nodes_limit: u32,

    #[clap(
        long,
        global = true,
        value_parser,
        default_value_t = 128,
        help = "Maximum depth of nested imports"
    )]
    pub max_import_depth: usize,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a schema file and print the compiled schema
    Compile {
        #[clap(value_parser, help = "The schema file")]
        input: PathBuf,
    },
    /// Print the schemas needed by a set of imports
    Resolve {
        #[clap(
            long = "import",
            value_parser,
            value_name = "LOCAL=NAME:MAJOR.MINOR",
            required = true
        )]
        imports: Vec<ImportArg>,
    },
    /// Validate document attributes and print them typed
    Validate {
        #[clap(long = "import", value_parser, value_name = "LOCAL=NAME:MAJOR.MINOR")]
        imports: Vec<ImportArg>,

        #[clap(long = "attribute", value_parser, value_name = "LOCAL.NAME=VALUE")]
        attributes: Vec<UntypedAttribute>,
    },
}

/// One entry of a document's import table.
#[derive(Clone, Debug)]
pub struct ImportArg {
    pub local: SchemaName,
    pub id: SchemaIdentifier,
}

impl FromStr for ImportArg {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (local, id) = s
            .split_once('=')
            .ok_or_else(|| NameError::Identifier { value: s.into() })?;
        Ok(Self {
            local: local.parse()?,
            id: id.parse()?,
        })
    }
}
