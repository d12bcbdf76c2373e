// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_node::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    if let Err(e) = vespa_node::run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
