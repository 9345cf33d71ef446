//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use gondola_core::ControllerConfig;

/// Vision-guided pick-and-place controller
///
/// Drives the microcontroller over a serial link, debounces the classifier
/// output fed by the perception stage, and serves a JSON-lines status
/// endpoint.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "gondola-controller", version)]
#[command(about = "Vision-guided pick-and-place controller", long_about = None)]
pub struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial device path, overrides serial.port
    #[arg(long)]
    pub port: Option<String>,

    /// Serial baud rate, overrides serial.baud_rate
    #[arg(long)]
    pub baud: Option<u32>,

    /// Status endpoint address, overrides status.bind_addr
    #[arg(long)]
    pub status_addr: Option<String>,

    /// Run against an emulated microcontroller instead of the serial port
    #[arg(long)]
    pub mock_device: bool,
}

impl Cli {
    /// Load the configuration file (or defaults) and apply the overrides.
    pub fn load_config(&self) -> gondola_core::Result<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => ControllerConfig::load(path)?,
            None => ControllerConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut ControllerConfig) {
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(addr) = &self.status_addr {
            config.status.bind_addr = addr.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_arguments() {
        let cli = Cli::try_parse_from(["gondola-controller"]).unwrap();
        assert!(!cli.mock_device);

        let config = cli.load_config().unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::try_parse_from([
            "gondola-controller",
            "--port",
            "/dev/ttyACM1",
            "--baud",
            "115200",
            "--status-addr",
            "127.0.0.1:6000",
            "--mock-device",
        ])
        .unwrap();

        let config = cli.load_config().unwrap();
        assert_eq!(config.serial.port, "/dev/ttyACM1");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.status.bind_addr, "127.0.0.1:6000");
        assert!(cli.mock_device);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::try_parse_from(["gondola-controller", "--baud", "0"]).unwrap();
        assert!(cli.load_config().is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let cli =
            Cli::try_parse_from(["gondola-controller", "--config", "/nonexistent/gondola.toml"])
                .unwrap();
        assert!(matches!(cli.load_config(), Err(gondola_core::Error::Io(_))));
    }
}
