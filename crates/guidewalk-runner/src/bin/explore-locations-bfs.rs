//! Walk the location guide breadth-first for up to an hour.

use guidewalk::budget::LOCATION_BFS_BUDGET;
use guidewalk::{Domain, Strategy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    guidewalk_runner::explore(Domain::Location, Strategy::BreadthFirst, LOCATION_BFS_BUDGET).await?;
    Ok(())
}
