mod cli;

use backfetch::descriptor;
use clap::Parser;
use cli::{Cli, Commands};
use std::fs;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect(args) => {
            let text = fs::read_to_string(&args.file)?;
            let slots = descriptor::deserialize_list(&text)?;
            for (index, slot) in slots.iter().enumerate() {
                match slot {
                    Some(d) => println!(
                        "[{index}] {} urls={} dest={} priority={} retries={}/{} completed={}",
                        d.request_id,
                        d.urls.len(),
                        d.dest_location,
                        d.priority,
                        d.individual_url_retry_count,
                        d.max_retry_count,
                        d.has_completed,
                    ),
                    None => println!("[{index}] <malformed entry>"),
                }
            }
        }
        Commands::Validate(args) => {
            let text = fs::read_to_string(&args.file)?;
            let slots = descriptor::deserialize_list(&text)?;
            let malformed = slots.iter().filter(|s| s.is_none()).count();
            println!("{} descriptions, {} malformed", slots.len() - malformed, malformed);
        }
    }

    Ok(())
}
