//! SDK Release - version synchronization and release publishing.
//!
//! This binary wires the pipeline commands to the terminal.

use sdk_release::cli;
use sdk_release::cli::OutputManager;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            // Create output manager for error display (never quiet for fatal errors)
            let output = OutputManager::new(false, false);
            output.error(&format!("Fatal error: {e}"));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                let _ = output.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    let _ = output.println(&format!("  • {suggestion}"));
                }
            }

            process::exit(1);
        }
    }
}
