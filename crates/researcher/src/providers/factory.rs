use super::{
    base::Provider, configs::ProviderConfig, ollama::OllamaProvider, openai::OpenAiProvider,
};
use anyhow::Result;
use strum_macros::{EnumIter, EnumString};

#[derive(EnumIter, EnumString, Debug, Clone, Copy, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    OpenAi,
    Ollama,
}

impl From<&ProviderConfig> for ProviderType {
    fn from(config: &ProviderConfig) -> Self {
        match config {
            ProviderConfig::OpenAi(_) => ProviderType::OpenAi,
            ProviderConfig::Ollama(_) => ProviderType::Ollama,
        }
    }
}

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider + Send + Sync>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Ollama(ollama_config) => Ok(Box::new(OllamaProvider::new(ollama_config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::configs::OllamaProviderConfig;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_provider_type_parses_lowercase_names() {
        assert_eq!(ProviderType::from_str("openai").unwrap(), ProviderType::OpenAi);
        assert_eq!(ProviderType::from_str("ollama").unwrap(), ProviderType::Ollama);
        assert!(ProviderType::from_str("anthropic").is_err());
        assert_eq!(ProviderType::iter().count(), 2);
    }

    #[test]
    fn test_get_provider_builds_ollama() {
        let config = ProviderConfig::Ollama(OllamaProviderConfig {
            host: "http://localhost:11434".to_string(),
            model: "qwen2.5".to_string(),
            temperature: None,
            max_tokens: None,
        });
        assert_eq!(ProviderType::from(&config), ProviderType::Ollama);
        assert!(get_provider(config).is_ok());
    }
}
