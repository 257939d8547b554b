use anyhow::{Context, Result};
use log::{error, info};
use std::sync::Arc;

use clippybot::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    let config = BotConfig::from_env().context("Invalid bot configuration")?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    info!("Starting ClippyBot v{}", clippybot::VERSION);
    config.log_summary();

    let dictionary = match &config.dictionary_path {
        Some(path) => Dictionary::load(path)?,
        None => Dictionary::builtin()?,
    };
    info!("Loaded dictionary with {} words", dictionary.len());
    let spellchecker = Arc::new(SpellChecker::with_distance(dictionary, config.max_edit_distance));

    let twitch_config = TwitchConfig::from_env()?;

    let state = Arc::new(BotState::new(config.start_enabled));
    let ignore_list = IgnoreListGuard::load(Arc::clone(&state), &config.ignore_users_path)?;
    info!(
        "Loaded {} ignored users from {}",
        state.list_ignored().len(),
        ignore_list.path().display()
    );

    let users: Arc<dyn UserDirectory> = match &twitch_config.client_id {
        Some(client_id) => {
            info!("Resolving user names through the Helix API");
            Arc::new(HelixUserDirectory::new(client_id.as_str(), &twitch_config.oauth_token))
        }
        None => Arc::new(SeenUsers::new()),
    };

    let bot = ChatBot::new(&config, Arc::clone(&state), spellchecker, users);

    let shutdown = ShutdownSignal::new();
    shutdown.start_signal_handlers();

    let connection = Box::new(TwitchConnection::new(twitch_config));
    let result = bot.run(connection, shutdown).await;

    if let Err(e) = &result {
        error!("Bot stopped with an error: {}", e);
    }

    ignore_list.commit()?;
    info!("Ignore list saved, goodbye");

    result.map(|reason| info!("Shut down cleanly: {}", reason))
}
