use anyhow::{anyhow, bail, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

const CONFIG_PATH_REL_HOME: &str = ".config/living-bookmarks/config.toml";

/// Tables which must be present in every configuration file.
const REQUIRED_SECTIONS: [&str; 3] = ["model_params", "vectordb", "llm_endpoint"];

/// Chat request fields filled in by the bot, which `model_params` may not override.
const RESERVED_MODEL_PARAMS: [&str; 1] = ["messages"];

/// Bot configuration
#[derive(Debug, serde::Deserialize)]
pub struct Config {
    /// LLM sampling options.  Passed through verbatim in the chat request body.
    pub model_params: serde_json::Map<String, serde_json::Value>,
    pub vectordb: VectorDb,
    pub llm_endpoint: LlmEndpoint,
}

#[derive(Debug, serde::Deserialize)]
pub struct VectorDb {
    pub embedding_model: String,
    #[serde(default = "default_bookmarks_table_name")]
    pub bookmarks_table_name: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct LlmEndpoint {
    pub base_url: String,
    #[serde(default = "default_label")]
    pub label: String,
    pub sysmsg: String,
    pub sys_postscript: String,
    #[serde(default)]
    pub class: EndpointClass,
}

/// Kind of LLM server behind `llm_endpoint.base_url`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum EndpointClass {
    /// llama.cpp server speaking the OpenAI-style chat completions protocol
    #[default]
    LlamaCppHttpChat,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::LlamaCppHttpChat => "llama_cpp_http_chat",
        }
    }
}

impl TryFrom<String> for EndpointClass {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "llama_cpp_http_chat" => Ok(EndpointClass::LlamaCppHttpChat),
            other => Err(format!(
                "Unsupported llm_endpoint class `{}`. \
                 Only class supported for now is llama_cpp_http_chat",
                other
            )),
        }
    }
}

fn default_bookmarks_table_name() -> String {
    "bookmarks".to_owned()
}

fn default_label() -> String {
    "[UNLABELED]".to_owned()
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    /// Load configuration from `path`, or from the default location under the home directory.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_owned(),
            None => Self::config_path()?,
        };

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Self::parse(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })
    }

    /// Parse and validate configuration text.
    pub fn parse(contents: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(contents)?;

        // Check sections up front so the error names the table rather than a serde field.
        for section in REQUIRED_SECTIONS {
            match table.get(section) {
                Some(toml::Value::Table(_)) => {}
                Some(_) => bail!("Config entry {} must be a table (section)", section),
                None => bail!("Config missing required table (section) {}", section),
            }
        }

        let config: Config = toml::Value::Table(table).try_into()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for key in RESERVED_MODEL_PARAMS {
            if self.model_params.contains_key(key) {
                bail!("model_params.{} is set by the bot and cannot be configured", key);
            }
        }

        // Interpolated into DDL, so only plain identifiers are allowed.
        let table_name = &self.vectordb.bookmarks_table_name;
        let mut chars = table_name.chars();
        let valid = match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if !valid {
            bail!(
                "vectordb.bookmarks_table_name `{}` is not a valid table name",
                table_name
            );
        }

        Ok(())
    }
}
