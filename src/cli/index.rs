use anyhow::Result;

use crate::config::TestimonyConfig;
use crate::index::MetadataIndex;
use crate::log::MessageStore;

/// Build the metadata index from the configured log and save it to disk.
pub fn index(config: &TestimonyConfig) -> Result<()> {
    let log_path = config.resolved_log_path();
    let store = MessageStore::load(&log_path)?;

    let index = MetadataIndex::build(&store);
    let out_path = config.resolved_metadata_index_path();
    index.save(&out_path)?;

    println!("Metadata index written to {}", out_path.display());
    println!("  Messages indexed:   {}", store.len());
    println!("  Parse failures:     {}", store.parse_failures());
    println!("  Topics:             {}", index.available_topics().len());
    println!("  Last line:          {}", index.line_count());

    Ok(())
}
