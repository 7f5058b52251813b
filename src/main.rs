// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Parser, Subcommand};
use mglock::commands::matrix::MatrixCommand;
use mglock::commands::replay::ReplayCommand;
use mglock::config::MglockConfig;
use mglock::error::{Result, format_error_chain, get_exit_code};
use mglock::logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mglock")]
#[command(author, version, about = "Multigranularity lock manager workbench", long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (defaults to ./mglock.toml when present)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a TOML lock scenario step by step
    #[command(long_about = "Replay a TOML lock scenario step by step

Every transaction runs on its own thread. Steps execute in file order and each one is
reported as ok, blocked or error, followed by the final lock table and the event log.

Example scenario:
  transactions = [1, 2]

  [[steps]]
  transaction = 1
  op = \"ensure\"
  resource = \"database/t1/p1\"
  lock = \"X\"")]
    Replay {
        /// Scenario file
        scenario: PathBuf,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the lock compatibility, substitutability and parent tables
    Matrix,
}

fn main() {
    let cli = Cli::parse();

    logging::setup_logger(cli.verbose);

    let config = match MglockConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", format_error_chain(&e));
            std::process::exit(get_exit_code(&e));
        }
    };

    let result: Result<()> = (|| match cli.command {
        Commands::Replay { scenario, json } => {
            let command = ReplayCommand::new(&config)?;
            command.execute(&scenario, json)
        }
        Commands::Matrix => {
            let command = MatrixCommand::new()?;
            command.execute()
        }
    })();

    if let Err(e) = result {
        eprintln!("{}", format_error_chain(&e));
        std::process::exit(get_exit_code(&e));
    }
}
