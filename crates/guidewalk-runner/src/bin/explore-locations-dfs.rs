//! Walk the location guide depth-first for up to thirty minutes.

use guidewalk::budget::DEFAULT_BUDGET;
use guidewalk::{Domain, Strategy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    guidewalk_runner::explore(Domain::Location, Strategy::DepthFirst, DEFAULT_BUDGET).await?;
    Ok(())
}
