// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use structopt::StructOpt;

/// CLI arguments of the node. `--version`/`-v` and `--help`/`-h` print and
/// exit with status 0.
#[derive(StructOpt)]
#[structopt(name = "vespa", about = "A lightweight modular tangle node.", version_short = "v")]
pub struct CliArgs {
    /// Path of the configuration file.
    #[structopt(short = "c", long = "config", default_value = "config.toml")]
    pub config: String,

    // Hidden from the help text on purpose: bootstrapping is a one-shot
    // operator action.
    #[structopt(long = "cooBootstrap", hidden = true)]
    pub coo_bootstrap: bool,

    #[structopt(long = "cooStartIndex", hidden = true, default_value = "0")]
    pub coo_start_index: u32,
}

impl CliArgs {
    /// Parses the command line.
    pub fn parse() -> Self {
        Self::from_args()
    }
}
