use std::{fs, path::Path, str::FromStr, time::Duration};

use toml::Value;

use crate::TransferResult;

use super::{parse_char_size, parse_flow_control, parse_parity, parse_stop_bits, Modem};

/// Timing and sizing knobs of a transfer session.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOptions {
    /// Attempts per frame that expects a response.
    pub max_retries: usize,
    /// Pause between two attempts.
    pub retry_delay: Duration,
    /// Pause between a write and polling for the response.
    pub settle_delay: Duration,
    /// Data subpacket payload size.
    pub chunk_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            settle_delay: Duration::from_millis(4),
            chunk_size: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Options {
    pub transfer: TransferOptions,
    pub modem: Modem,
}

impl Options {
    /// Reads `path` or, without one, `options.toml` from the user config directory.
    /// A missing default file yields the defaults.
    pub fn load_options(path: Option<&Path>) -> TransferResult<Self> {
        if let Some(path) = path {
            let content = fs::read_to_string(path)?;
            return content.parse();
        }

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "GitHub", "zsend") {
            let options_file = proj_dirs.config_dir().join("options.toml");
            if options_file.exists() {
                log::debug!("loading {}", options_file.display());
                let content = fs::read_to_string(&options_file)?;
                return content.parse();
            }
        }
        Ok(Options::default())
    }
}

impl FromStr for Options {
    type Err = anyhow::Error;

    fn from_str(input_text: &str) -> TransferResult<Self> {
        let value = Value::Table(input_text.parse::<toml::Table>()?);
        let mut result = Options::default();
        parse_value(&mut result, &value)?;
        Ok(result)
    }
}

fn parse_value(options: &mut Options, value: &Value) -> TransferResult<()> {
    if let Value::Table(table) = value {
        for (k, v) in table {
            match k.as_str() {
                "transfer" => {
                    if let Value::Table(transfer) = v {
                        parse_transfer_settings(&mut options.transfer, transfer)?;
                    }
                }
                "modem" => {
                    if let Value::Table(modem) = v {
                        parse_modem_settings(&mut options.modem, modem)?;
                    }
                }
                _ => log::warn!("unknown option {k}"),
            }
        }
    }
    Ok(())
}

fn positive(k: &str, v: &Value) -> TransferResult<u64> {
    match v {
        Value::Integer(i) if *i >= 0 => Ok(*i as u64),
        _ => Err(anyhow::anyhow!("{k} needs to be a non negative integer, got {v}")),
    }
}

fn parse_transfer_settings(transfer: &mut TransferOptions, settings: &toml::map::Map<String, Value>) -> TransferResult<()> {
    for (k, v) in settings {
        match k.as_str() {
            "max_retries" => transfer.max_retries = positive(k, v)?.max(1) as usize,
            "retry_delay_ms" => transfer.retry_delay = Duration::from_millis(positive(k, v)?),
            "settle_delay_ms" => transfer.settle_delay = Duration::from_millis(positive(k, v)?),
            "chunk_size" => transfer.chunk_size = positive(k, v)?.max(1) as usize,
            _ => log::warn!("unknown transfer option {k}"),
        }
    }
    Ok(())
}

fn parse_modem_settings(modem: &mut Modem, settings: &toml::map::Map<String, Value>) -> TransferResult<()> {
    for (k, v) in settings {
        match (k.as_str(), v) {
            ("device", Value::String(str)) => modem.device = str.clone(),
            ("baud_rate", _) => modem.baud_rate = positive(k, v)? as usize,
            ("data_bits", Value::Integer(i)) => modem.char_size = parse_char_size(*i)?,
            ("stop_bits", Value::Integer(i)) => modem.stop_bits = parse_stop_bits(*i)?,
            ("parity", Value::String(str)) => modem.parity = parse_parity(str)?,
            ("flow_control", Value::String(str)) => modem.flow_control = parse_flow_control(str)?,
            _ => log::warn!("ignoring modem option {k} = {v}"),
        }
    }
    Ok(())
}
