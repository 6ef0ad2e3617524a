use serial::{CharSize, FlowControl, Parity, StopBits};

use crate::TransferResult;

#[derive(Clone, Debug, PartialEq)]
pub struct Modem {
    pub device: String,
    pub baud_rate: usize,

    pub char_size: CharSize,
    pub stop_bits: StopBits,
    pub parity: Parity,

    pub flow_control: FlowControl,
}

impl Default for Modem {
    fn default() -> Self {
        Self {
            #[cfg(target_os = "windows")]
            device: "COM1".to_string(),
            #[cfg(not(target_os = "windows"))]
            device: "/dev/ttyS0".to_string(),
            baud_rate: 9600,
            char_size: CharSize::Bits8,
            stop_bits: StopBits::Stop1,
            parity: Parity::ParityNone,
            flow_control: FlowControl::FlowNone,
        }
    }
}

pub fn parse_char_size(bits: i64) -> TransferResult<CharSize> {
    match bits {
        5 => Ok(CharSize::Bits5),
        6 => Ok(CharSize::Bits6),
        7 => Ok(CharSize::Bits7),
        8 => Ok(CharSize::Bits8),
        _ => Err(anyhow::anyhow!("unsupported data bits {bits}")),
    }
}

pub fn parse_stop_bits(bits: i64) -> TransferResult<StopBits> {
    match bits {
        1 => Ok(StopBits::Stop1),
        2 => Ok(StopBits::Stop2),
        _ => Err(anyhow::anyhow!("unsupported stop bits {bits}")),
    }
}

pub fn parse_parity(parity: &str) -> TransferResult<Parity> {
    match parity.to_ascii_lowercase().as_str() {
        "none" => Ok(Parity::ParityNone),
        "odd" => Ok(Parity::ParityOdd),
        "even" => Ok(Parity::ParityEven),
        _ => Err(anyhow::anyhow!("unknown parity {parity}")),
    }
}

pub fn parse_flow_control(flow_control: &str) -> TransferResult<FlowControl> {
    match flow_control.to_ascii_lowercase().as_str() {
        "none" => Ok(FlowControl::FlowNone),
        "software" | "xon/xoff" => Ok(FlowControl::FlowSoftware),
        "hardware" | "rts/cts" => Ok(FlowControl::FlowHardware),
        _ => Err(anyhow::anyhow!("unknown flow control {flow_control}")),
    }
}
