use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;

mod prompt;
mod session;

use prompt::cliclack::CliclackPrompt;
use researcher::agent::{Agent, AgentConfig, DEFAULT_MAX_TURNS};
use researcher::providers::configs::{OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig};
use researcher::providers::factory;
use researcher::providers::{ollama, openai};
use researcher::systems::search::{SearchConfig, SearchSystem};
use session::Session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Model backend to use
    #[arg(short, long, value_enum, default_value = "openai", global = true)]
    provider: CliProviderVariant,

    /// Model backend host, defaults to the provider's public endpoint
    #[arg(long, global = true)]
    host: Option<String>,

    /// OpenAI API Key (can also be set via OPENAI_API_KEY environment variable)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Tavily API Key (can also be set via TAVILY_API_KEY environment variable)
    #[arg(long, global = true)]
    search_api_key: Option<String>,

    /// Model to use
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Most model calls spent on one question
    #[arg(long, default_value_t = DEFAULT_MAX_TURNS, global = true)]
    max_turns: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
enum CliProviderVariant {
    #[value(name = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question and print the answer
    Query {
        /// The question to research
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Chat with the assistant; it remembers the conversation until /new
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let agent = build_agent(&cli)?;
    let mut session = Session::new(agent, Box::new(CliclackPrompt::new()));

    match &cli.command {
        Command::Query { text } => session.headless_start(&text.join(" ")).await,
        Command::Chat => session.start().await,
    }
}

fn build_agent(cli: &Cli) -> Result<Agent> {
    let provider = factory::get_provider(create_provider_config(cli)?)?;
    let config = AgentConfig {
        max_turns: cli.max_turns,
        ..AgentConfig::default()
    };
    let mut agent = Agent::new(provider).with_config(config);
    agent.add_system(Box::new(SearchSystem::new(create_search_config(cli)?)?));
    Ok(agent)
}

fn create_provider_config(cli: &Cli) -> Result<ProviderConfig> {
    Ok(match cli.provider {
        CliProviderVariant::OpenAi => {
            let api_key = cli
                .api_key
                .clone()
                .or_else(|| env::var("OPENAI_API_KEY").ok())
                .context(
                    "API key must be provided via --api-key or OPENAI_API_KEY environment variable",
                )?;
            ProviderConfig::OpenAi(OpenAiProviderConfig {
                host: cli
                    .host
                    .clone()
                    .unwrap_or_else(|| openai::OPENAI_HOST.to_string()),
                api_key,
                model: cli
                    .model
                    .clone()
                    .unwrap_or_else(|| openai::OPENAI_MODEL.to_string()),
                temperature: None,
                max_tokens: None,
            })
        }
        CliProviderVariant::Ollama => ProviderConfig::Ollama(OllamaProviderConfig {
            host: cli
                .host
                .clone()
                .unwrap_or_else(|| ollama::OLLAMA_HOST.to_string()),
            model: cli
                .model
                .clone()
                .unwrap_or_else(|| ollama::OLLAMA_MODEL.to_string()),
            temperature: None,
            max_tokens: None,
        }),
    })
}

fn create_search_config(cli: &Cli) -> Result<SearchConfig> {
    let api_key = cli
        .search_api_key
        .clone()
        .or_else(|| env::var("TAVILY_API_KEY").ok())
        .context(
            "Search API key must be provided via --search-api-key or TAVILY_API_KEY environment variable",
        )?;
    Ok(SearchConfig::new(api_key))
}
