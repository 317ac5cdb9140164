use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::proto::rpc_impl::RpcController;

/// Default call options every stub created by the binary starts from.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i32,
    #[serde(default)]
    pub trace_id: i32,
}

fn default_timeout_ms() -> i32 {
    RpcController::default().timeout_ms
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            trace_id: 0,
        }
    }
}

impl From<&ClientConfig> for RpcController {
    fn from(config: &ClientConfig) -> Self {
        RpcController::default()
            .with_timeout_ms(config.timeout_ms)
            .with_trace_id(config.trace_id)
    }
}

#[auto_impl::auto_impl(Box, &)]
pub trait ConfigLoader: Send + Sync {
    fn get_client_config(&self) -> ClientConfig;
    fn set_client_config(&self, config: ClientConfig);

    fn get_logging_config(&self) -> LoggingConfig;

    fn dump(&self) -> String;
}

pub trait LoggingConfigLoader {
    fn get_file_logger_config(&self) -> FileLoggerConfig;

    fn get_console_logger_config(&self) -> ConsoleLoggerConfig;
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct FileLoggerConfig {
    pub level: Option<String>,
    pub file: Option<String>,
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct ConsoleLoggerConfig {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, derive_builder::Builder)]
pub struct LoggingConfig {
    #[builder(setter(into, strip_option), default = None)]
    file_logger: Option<FileLoggerConfig>,
    #[builder(setter(into, strip_option), default = None)]
    console_logger: Option<ConsoleLoggerConfig>,
}

impl LoggingConfigLoader for &LoggingConfig {
    fn get_file_logger_config(&self) -> FileLoggerConfig {
        self.file_logger.clone().unwrap_or_default()
    }

    fn get_console_logger_config(&self) -> ConsoleLoggerConfig {
        self.console_logger.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
struct Config {
    client: Option<ClientConfig>,
    console_logger: Option<ConsoleLoggerConfig>,
    file_logger: Option<FileLoggerConfig>,
}

#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    config: Arc<Mutex<Config>>,
}

impl Default for TomlConfigLoader {
    fn default() -> Self {
        TomlConfigLoader {
            config: Arc::new(Mutex::new(Config::default())),
        }
    }
}

impl TomlConfigLoader {
    pub fn new_from_str(config_str: &str) -> Result<Self, anyhow::Error> {
        let config = toml::de::from_str::<Config>(config_str)
            .with_context(|| format!("failed to parse config file: {}", config_str))?;

        Ok(TomlConfigLoader {
            config: Arc::new(Mutex::new(config)),
        })
    }

    pub fn new(config_path: &PathBuf) -> Result<Self, anyhow::Error> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file: {:?}", config_path))?;
        let ret = Self::new_from_str(&config_str)?;

        Ok(ret)
    }

    /// Override the console log level, e.g. from a command line flag.
    pub fn set_console_log_level(&self, level: Option<String>) {
        self.config.lock().unwrap().console_logger = Some(ConsoleLoggerConfig { level });
    }
}

impl ConfigLoader for TomlConfigLoader {
    fn get_client_config(&self) -> ClientConfig {
        self.config
            .lock()
            .unwrap()
            .client
            .clone()
            .unwrap_or_default()
    }

    fn set_client_config(&self, config: ClientConfig) {
        self.config.lock().unwrap().client = Some(config);
    }

    fn get_logging_config(&self) -> LoggingConfig {
        let locked = self.config.lock().unwrap();
        LoggingConfig {
            file_logger: locked.file_logger.clone(),
            console_logger: locked.console_logger.clone(),
        }
    }

    fn dump(&self) -> String {
        toml::to_string_pretty(&*self.config.lock().unwrap()).unwrap_or_default()
    }
}

impl LoggingConfigLoader for &TomlConfigLoader {
    fn get_file_logger_config(&self) -> FileLoggerConfig {
        self.config
            .lock()
            .unwrap()
            .file_logger
            .clone()
            .unwrap_or_default()
    }

    fn get_console_logger_config(&self) -> ConsoleLoggerConfig {
        self.config
            .lock()
            .unwrap()
            .console_logger
            .clone()
            .unwrap_or_default()
    }
}
