//! topoperf CLI entry point.

use topoperf_lib::cli::{self, Cli};
use topoperf_lib::core::Result;

fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse_args();

    // Execute the command
    cli::execute(cli)
}
