//! Env-driven configuration for the service and the CLI.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binaries. Defaults match the container layout the engine runs in.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use dotenv;
use thiserror::Error;

use crate::job::PollPolicy;

#[derive(Debug, Error)]
#[error("invalid value '{value}' for {key}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub comfyui_url: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub workflows_dir: PathBuf,
    pub api_host: String,
    pub api_port: String,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub status_retries: u32,
    pub engine_ready_timeout: Duration,
    pub download_timeout: Duration,
    pub video_data_uri: bool,
}

const PRINTED_VARS: &[&str] = &[
    "COMFYUI_URL",
    "COMFYUI_INPUT_DIR",
    "COMFYUI_OUTPUT_DIR",
    "WORKFLOWS_DIR",
    "API_HOST",
    "API_PORT",
    "POLL_INTERVAL_MS",
    "JOB_TIMEOUT_SECS",
    "STATUS_RETRIES",
    "ENGINE_READY_TIMEOUT_SECS",
    "DOWNLOAD_TIMEOUT_SECS",
    "VIDEO_DATA_URI",
];

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> Result<Self, ConfigError> {
        Ok(Config {
            comfyui_url: var_or("COMFYUI_URL", "http://127.0.0.1:8188"),
            input_dir: PathBuf::from(var_or("COMFYUI_INPUT_DIR", "/ComfyUI/input")),
            output_dir: PathBuf::from(var_or("COMFYUI_OUTPUT_DIR", "/ComfyUI/output")),
            workflows_dir: PathBuf::from(var_or("WORKFLOWS_DIR", "/")),
            api_host: var_or("API_HOST", "127.0.0.1"),
            api_port: var_or("API_PORT", "8189"),
            poll_interval: Duration::from_millis(parse_var("POLL_INTERVAL_MS", 1000)?),
            job_timeout: Duration::from_secs(parse_var("JOB_TIMEOUT_SECS", 1800)?),
            status_retries: parse_var("STATUS_RETRIES", 3)?,
            engine_ready_timeout: Duration::from_secs(parse_var("ENGINE_READY_TIMEOUT_SECS", 180)?),
            download_timeout: Duration::from_secs(parse_var("DOWNLOAD_TIMEOUT_SECS", 60)?),
            video_data_uri: parse_bool("VIDEO_DATA_URI", false)?,
        })
    }

    pub fn print_env_vars() {
        for key in PRINTED_VARS {
            println!("{}: {}", key, env::var(key).unwrap_or_else(|_| "<unset>".to_string()));
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval,
            deadline: self.job_timeout,
            max_status_failures: self.status_retries,
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError { key, value: raw }),
        },
        Err(_) => Ok(default),
    }
}
