use std::path::PathBuf;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    /// Configuration file. Defaults to `toolpin.toml` in the current directory
    #[clap(short, long, global = true)]
    pub(crate) config: Option<PathBuf>,
    /// Log debug output to stderr. `TOOLPIN_LOG` takes precedence
    #[clap(short, long, global = true)]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: ToolpinCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum ToolpinCommand {
    /// Creates a `toolpin.toml` in the current directory
    Init,
    /// Installs the packages declared in `toolpin.toml`. Defaults to all
    Install {
        /// Install one specific package
        #[clap(long)]
        only: Option<String>,
    },
    /// Resolves packages from the registries and outputs `[[packages]]` entries
    Generate {
        /// Insert the packages into the configuration file instead of printing them
        #[clap(short, long)]
        insert: bool,
        /// Keep the version in its own field instead of `name@version`
        #[clap(long)]
        pin: bool,
        /// Include the description and link of each package
        #[clap(long)]
        detail: bool,
        /// `name`, `name@version`, `registry,name` or `registry,name@version`
        #[clap(required = true)]
        identifiers: Vec<String>,
    },
    /// Lists every package of every configured registry as `registry,name`
    List,
    /// Outputs the installed executable and link of a file, if they exist
    Which {
        name: String,
    },
}
