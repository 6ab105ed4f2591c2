use std::sync::Arc;

use portal_core::{ChatManager, Config, GeminiProvider};
use portal_plugin::{Permission, PluginRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_or_default().with_env();
    let provider = Arc::new(GeminiProvider::new(&config.llm));
    let manager = ChatManager::new(config, provider, PluginRegistry::new(Permission::NONE));

    let message = "What does a price-to-earnings ratio tell an analyst?";
    println!("Message: {}", message);

    let response = manager.query(message).await?;
    println!("Response: {}", response);
    Ok(())
}
