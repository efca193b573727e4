use anyhow::Result;

use crate::config::TestimonyConfig;
use crate::index::MetadataIndex;
use crate::log::MessageStore;

/// Print topic labels with message counts, most frequent first.
pub fn topics(config: &TestimonyConfig, pattern: Option<&str>, limit: usize) -> Result<()> {
    let metadata_path = config.resolved_metadata_index_path();
    let index = if metadata_path.exists() {
        MetadataIndex::load(&metadata_path)?
    } else {
        let store = MessageStore::load(config.resolved_log_path())?;
        MetadataIndex::build(&store)
    };

    let mut shown = 0usize;
    for (topic, count) in index.top_topics(usize::MAX) {
        if let Some(p) = pattern {
            if !topic.to_lowercase().contains(&p.to_lowercase()) {
                continue;
            }
        }
        println!("  {:<30} {:>5}", topic, count);
        shown += 1;
        if shown >= limit {
            break;
        }
    }

    if shown == 0 {
        println!("No topics matched.");
    } else {
        println!("\n{} of {} topics", shown, index.available_topics().len());
    }

    Ok(())
}
