//! `query` command: similarity search and result printing.

use crate::error::Result;
use crate::models::RetrievalResult;
use crate::pipeline::RagPipeline;

/// Retrieve the `top_k` chunks most similar to `query` and print them.
pub async fn run_query(pipeline: &RagPipeline, query: &str, top_k: usize) -> Result<()> {
    let results = pipeline.retrieve(query, top_k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("Found {} result(s):\n", results.len());
    for (rank, result) in results.iter().enumerate() {
        print_result(rank + 1, result);
    }
    Ok(())
}

fn print_result(rank: usize, result: &RetrievalResult) {
    println!("{}. (score: {:.3})", rank, result.score);
    if let Some(filepath) = result.metadata.get("filepath").and_then(|v| v.as_str()) {
        println!("   source: {}", filepath);
    }
    if let (Some(start), Some(end)) = (
        result.metadata.get("start_char").and_then(|v| v.as_i64()),
        result.metadata.get("end_char").and_then(|v| v.as_i64()),
    ) {
        println!("   chars: {}..{}", start, end);
    }
    println!("   {}", result.text.replace('\n', "\n   "));
    println!();
}
