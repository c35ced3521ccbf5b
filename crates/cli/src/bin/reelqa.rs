use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    reelqa_cli::main_entry().await
}
