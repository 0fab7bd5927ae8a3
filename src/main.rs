mod bookmarks;
mod config;
mod context;
mod event;
mod handler;
mod helper;
mod llm;
mod logging;
mod plugin;
mod rag;
mod vectordb;

use clap::Parser;
use serenity::{all::GatewayIntents, Client};
use std::{path::PathBuf, sync::Arc};

/// Discord bot answering direct messages from your Raindrop.io bookmarks
#[derive(Parser)]
#[command(name = "living-bookmarks", version)]
struct Cli {
    /// raindrop.io API key
    #[arg(long, env = "LIVING_BOOKMARKS_RAINDROP_KEY", hide_env_values = true)]
    raindrop_key: String,
    /// Discord app token
    #[arg(long, env = "LIVING_BOOKMARKS_DISCORD_TOKEN", hide_env_values = true)]
    discord_token: String,
    /// TOML config file.  Defaults to ~/.config/living-bookmarks/config.toml
    #[arg(short, long, env = "LIVING_BOOKMARKS_CONFIG")]
    config: Option<PathBuf>,
    #[command(flatten)]
    db: vectordb::DbConnect,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = crate::config::Config::load(cli.config.as_deref()).await?;

    // Loading may download the model, so keep it off the async workers.
    let model_name = cfg.vectordb.embedding_model.clone();
    let embedder =
        tokio::task::spawn_blocking(move || vectordb::FastEmbedder::load(&model_name)).await??;

    let store = vectordb::PgVectorStore::connect(
        &cli.db,
        &cfg.vectordb.bookmarks_table_name,
        Arc::new(embedder),
    )
    .await?;
    store.create_table().await?;

    let raindrop = bookmarks::RaindropClient::new(cli.raindrop_key);
    let summary = bookmarks::import(&raindrop, &store).await?;
    log_internal!(
        "Imported {} bookmark(s) from {} collection(s) plus Unsorted",
        summary.bookmarks,
        summary.collections,
    );

    log_internal!("Initializing LLM {}", cfg.llm_endpoint.label);
    let llm = llm::LlmClient::new(&cfg.llm_endpoint, cfg.model_params.clone());
    let prompt = rag::PromptSettings {
        sysmsg: cfg.llm_endpoint.sysmsg.clone(),
        sys_postscript: cfg.llm_endpoint.sys_postscript.clone(),
    };
    let rag = rag::Rag::new(Arc::new(store), Arc::new(llm), prompt);
    let handler = handler::Handler::new(cfg, rag);

    // Things we want discord to tell us about.  Message content must also be enabled on the
    // bot's dashboard.
    let intents = GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    Client::builder(&cli.discord_token, intents)
        .event_handler(handler)
        .await?
        .start()
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_reads_flags_and_database_defaults() {
        let cli = Cli::try_parse_from([
            "living-bookmarks",
            "--raindrop-key",
            "rk",
            "--discord-token",
            "dt",
            "-c",
            "bot.toml",
        ])
        .unwrap();

        assert_eq!(cli.raindrop_key, "rk");
        assert_eq!(cli.discord_token, "dt");
        assert_eq!(cli.config, Some(PathBuf::from("bot.toml")));
        // Skip the defaults when the test environment happens to set them.
        if std::env::var_os("DB_PORT").is_none() {
            assert_eq!(cli.db.port, 5432);
        }
        if std::env::var_os("DB_NAME").is_none() {
            assert_eq!(cli.db.name, "PGv");
        }
    }

    #[test]
    fn cli_overrides_database_settings() {
        let cli = Cli::try_parse_from([
            "living-bookmarks",
            "--raindrop-key",
            "rk",
            "--discord-token",
            "dt",
            "--db-host",
            "db.internal",
            "--db-port",
            "6543",
        ])
        .unwrap();

        assert_eq!(cli.db.host, "db.internal");
        assert_eq!(cli.db.port, 6543);
        assert_eq!(cli.config, None);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
