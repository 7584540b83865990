//! Configuration loader for YAML files and environment resolution
//!
//! This module handles loading configuration from YAML files and resolving
//! credentials that are referenced through environment variables.

use crate::config::types::*;
use crate::errors::AgentError;
use std::env;
use std::path::Path;
use tokio::fs;

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<ParleyConfig, AgentError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            AgentError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content).await
    }

    /// Load configuration from a YAML string
    pub async fn from_str(content: &str) -> Result<ParleyConfig, AgentError> {
        let mut config: ParleyConfig = serde_yaml::from_str(content)
            .map_err(|e| AgentError::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

        Self::resolve_environment(&mut config)?;

        config.validate()?;

        Ok(config)
    }

    /// Resolve environment variables in the configuration
    fn resolve_environment(config: &mut ParleyConfig) -> Result<(), AgentError> {
        for env_file in &config.environment.env_files {
            if env_file.exists() {
                Self::load_env_file(env_file)?;
            } else {
                log::warn!("Env file {} not found, skipping", env_file.display());
            }
        }

        for (key, value) in &config.environment.variables {
            env::set_var(key, value);
        }

        Self::resolve_llm_auth(&config.llm.provider, &mut config.llm.auth);

        Self::resolve_key(
            &mut config.rag.embeddings.google.api_key,
            config.rag.embeddings.google.api_key_env.as_deref(),
        );
        Self::resolve_key(
            &mut config.rag.embeddings.bge.api_key,
            config.rag.embeddings.bge.api_key_env.as_deref(),
        );
        Self::resolve_key(&mut config.mail.api_key, config.mail.api_key_env.as_deref());

        Ok(())
    }

    /// Load environment variables from a .env file
    fn load_env_file<P: AsRef<Path>>(path: P) -> Result<(), AgentError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AgentError::ConfigError(format!(
                "Failed to read env file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                env::set_var(key, value);
            }
        }

        Ok(())
    }

    /// Resolve LLM authentication from environment
    fn resolve_llm_auth(provider: &LlmProvider, auth: &mut LlmAuth) {
        if let Some(env_var) = &auth.api_key_env {
            if let Ok(api_key) = env::var(env_var) {
                auth.api_key = Some(api_key);
            }
        }

        // Fall back to the conventional variable of the selected provider
        if auth.api_key.is_none() && auth.api_key_env.is_none() {
            let candidates: &[&str] = match provider {
                LlmProvider::Gemini => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
                LlmProvider::OpenAI => &["OPENAI_API_KEY"],
                LlmProvider::Custom { .. } => &["CUSTOM_API_KEY", "OPENAI_API_KEY"],
            };
            auth.api_key = candidates.iter().find_map(|name| env::var(name).ok());
        }
    }

    fn resolve_key(api_key: &mut Option<String>, api_key_env: Option<&str>) {
        if api_key.is_some() {
            return;
        }
        if let Some(env_var) = api_key_env {
            *api_key = env::var(env_var).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::EmbeddingModel;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_basic_config() {
        let yaml_content = r#"
agent:
  name: "interview_desk"
  max_cycles: 5

llm:
  provider: "gemini"
  model: "gemini-2.5-flash"
  auth:
    api_key: "inline-key"
  parameters:
    temperature: 0.2
"#;

        let config = ConfigLoader::from_str(yaml_content).await.unwrap();
        assert_eq!(config.agent.name, "interview_desk");
        assert_eq!(config.agent.max_cycles, 5);
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.llm.parameters.temperature, 0.2);
        assert_eq!(config.llm.auth.api_key.as_deref(), Some("inline-key"));
    }

    #[tokio::test]
    async fn test_defaults_follow_retrieval_pipeline() {
        let yaml_content = r#"
llm:
  provider: "openai"
  model: "gpt-4.1-mini"
"#;

        let config = ConfigLoader::from_str(yaml_content).await.unwrap();
        assert_eq!(config.agent.max_cycles, 10);
        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.rag.text_processing.chunk_size, 1000);
        assert_eq!(config.rag.text_processing.chunk_overlap, 200);
        assert_eq!(config.rag.retrieval_model, EmbeddingModel::Google);
        assert_eq!(config.rag.embeddings.bge.model, "BAAI/bge-small-en-v1.5");
        assert_eq!(config.mail.transport, MailTransport::Log);
    }

    #[tokio::test]
    async fn test_custom_provider_and_mail_relay() {
        let yaml_content = r#"
llm:
  provider:
    type: custom
    base_url: "http://localhost:11434/v1"
  model: "llama3"
  auth:
    api_key: "none"
mail:
  transport:
    type: http
    endpoint: "https://relay.example.com/send"
  sender: "hr@example.com"
"#;

        let config = ConfigLoader::from_str(yaml_content).await.unwrap();
        assert_eq!(
            config.llm.provider,
            LlmProvider::Custom {
                base_url: "http://localhost:11434/v1".to_string()
            }
        );
        assert_eq!(
            config.mail.transport,
            MailTransport::Http {
                endpoint: "https://relay.example.com/send".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_custom_provider_requires_base_url() {
        let yaml_content = r#"
llm:
  provider: "custom"
  model: "llama3"
"#;

        let err = ConfigLoader::from_str(yaml_content).await.unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(msg) if msg.contains("base_url")));
    }

    #[test]
    fn test_tagged_sections_serialize_back_to_yaml() {
        let transport = MailTransport::Http {
            endpoint: "https://relay.example.com/send".to_string(),
        };
        let yaml = serde_yaml::to_string(&transport).unwrap();
        assert!(yaml.contains("type: http"));
        assert_eq!(serde_yaml::from_str::<MailTransport>(&yaml).unwrap(), transport);

        let provider: LlmProvider = serde_yaml::from_str("type: gemini").unwrap();
        assert_eq!(provider, LlmProvider::Gemini);
    }

    #[tokio::test]
    async fn test_rejects_zero_cycle_guard() {
        let yaml_content = r#"
agent:
  max_cycles: 0
llm:
  provider: "openai"
  model: "gpt-4.1-mini"
"#;

        let err = ConfigLoader::from_str(yaml_content).await.unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(msg) if msg.contains("max_cycles")));
    }

    #[tokio::test]
    async fn test_rejects_overlap_not_smaller_than_chunk() {
        let yaml_content = r#"
llm:
  provider: "openai"
  model: "gpt-4.1-mini"
rag:
  text_processing:
    chunk_size: 100
    chunk_overlap: 100
"#;

        assert!(ConfigLoader::from_str(yaml_content).await.is_err());
    }

    #[tokio::test]
    #[serial]
    async fn test_env_resolution() {
        env::set_var("PARLEY_TEST_LLM_KEY", "secret123");
        env::set_var("PARLEY_TEST_MAIL_KEY", "mail-secret");

        let yaml_content = r#"
llm:
  provider: "openai"
  model: "gpt-4.1-mini"
  auth:
    api_key_env: "PARLEY_TEST_LLM_KEY"
mail:
  api_key_env: "PARLEY_TEST_MAIL_KEY"
"#;

        let config = ConfigLoader::from_str(yaml_content).await.unwrap();
        assert_eq!(config.llm.auth.api_key, Some("secret123".to_string()));
        assert_eq!(config.mail.api_key, Some("mail-secret".to_string()));

        env::remove_var("PARLEY_TEST_LLM_KEY");
        env::remove_var("PARLEY_TEST_MAIL_KEY");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_file_is_loaded() {
        let mut env_file = NamedTempFile::new().unwrap();
        writeln!(env_file, "# credentials").unwrap();
        writeln!(env_file, "PARLEY_TEST_ENV_FILE_KEY=\"from-file\"").unwrap();

        let yaml_content = format!(
            r#"
llm:
  provider: "openai"
  model: "gpt-4.1-mini"
  auth:
    api_key_env: "PARLEY_TEST_ENV_FILE_KEY"
environment:
  env_files:
    - "{}"
"#,
            env_file.path().display()
        );

        let config = ConfigLoader::from_str(&yaml_content).await.unwrap();
        assert_eq!(config.llm.auth.api_key, Some("from-file".to_string()));

        env::remove_var("PARLEY_TEST_ENV_FILE_KEY");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let yaml_content = r#"
agent:
  name: "file_test"
llm:
  provider: "openai"
  model: "gpt-4.1-mini"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = ConfigLoader::from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.agent.name, "file_test");
    }
}
