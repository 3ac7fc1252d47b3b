//! Walk the line guide breadth-first for up to thirty minutes.

use guidewalk::budget::DEFAULT_BUDGET;
use guidewalk::{Domain, Strategy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    guidewalk_runner::explore(Domain::Line, Strategy::BreadthFirst, DEFAULT_BUDGET).await?;
    Ok(())
}
