use anyhow::Result;

use crate::config::TestimonyConfig;
use crate::log::MessageStore;

/// Display chatlog statistics in the terminal.
pub fn stats(config: &TestimonyConfig) -> Result<()> {
    let store = MessageStore::load(config.resolved_log_path())?;
    let stats = store.stats();

    println!("Chatlog Statistics");
    println!("{}", "=".repeat(40));
    println!("  Path:               {}", stats.path);
    println!("  Messages:           {}", stats.total_messages);
    println!("  Parse failures:     {}", stats.parse_failures);
    println!("  Last line:          {}", stats.last_line);
    println!("  Topics:             {}", store.unique_topics().len());
    println!();

    println!("By Sender:");
    for (sender, count) in &stats.sender_counts {
        println!("  {:<20} {:>5}", sender, count);
    }

    let paths = config.semantic_paths();
    println!();
    println!(
        "Semantic index:       {}",
        if paths.is_available() {
            "available"
        } else {
            "not built (run `testimony embed`)"
        }
    );

    Ok(())
}
