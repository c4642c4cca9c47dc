//! Command line parsing

use std::path::PathBuf;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Serve MCP over stdio, optionally with an explicit config file
    Serve { config: Option<PathBuf> },
    Help,
    Version,
}

/// Parse arguments, not including the program name
pub fn parse_args<I>(args: I) -> Result<RunMode, String>
where
    I: IntoIterator<Item = String>,
{
    let mut config = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-V" => return Ok(RunMode::Version),
            "--config" | "-c" => match args.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => return Err(format!("{} requires a path", arg)),
            },
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    config = Some(PathBuf::from(path));
                } else {
                    return Err(format!("Unknown argument: {}", other));
                }
            }
        }
    }

    Ok(RunMode::Serve { config })
}

pub fn print_help() {
    println!("alumnium-mcp - natural-language browser and mobile automation over MCP");
    println!();
    println!("Usage:");
    println!("  alumnium-mcp                  Serve MCP over stdio");
    println!("  alumnium-mcp --config PATH    Load settings from a TOML file");
    println!("  alumnium-mcp --help           Show this help message");
    println!("  alumnium-mcp --version        Show version");
    println!();
    println!("Without --config, alumnium-mcp.toml in the working directory is used if present.");
    println!();
    println!("Environment Variables:");
    println!("  ALUMNIUM_MODEL                provider/model (default: anthropic/claude-haiku-4-5-20251001)");
    println!("  ANTHROPIC_API_KEY, OPENAI_API_KEY, ...  Provider API keys");
    println!("  ALUMNIUM_MODEL_BASE_URL       Custom model endpoint");
    println!("  ALUMNIUM_CHROME_HEADLESS      Run Chromium headless (default: false)");
    println!("  ALUMNIUM_CHROME_PATH          Chromium executable");
    println!("  ALUMNIUM_APPIUM_SERVER        Appium server (default: http://localhost:4723)");
    println!("  ALUMNIUM_IOS_DEVICE_NAME      iOS device (default: iPhone 16)");
    println!("  ALUMNIUM_IOS_PLATFORM_VERSION iOS version (default: 18.4)");
    println!("  ALUMNIUM_CACHE                Enable the instruction cache (default: true)");
    println!("  ALUMNIUM_CACHE_DIR            Instruction cache directory (default: .alumnium/cache)");
    println!("  ALUMNIUM_REQUEST_TIMEOUT      Model request timeout in seconds (default: 120)");
    println!("  RUST_LOG                      Log filter; logs go to stderr (default: info)");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<RunMode, String> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_default_serves() {
        assert_eq!(parse(&[]).unwrap(), RunMode::Serve { config: None });
    }

    #[test]
    fn test_config_path() {
        let expected = RunMode::Serve {
            config: Some(PathBuf::from("custom.toml")),
        };
        assert_eq!(parse(&["--config", "custom.toml"]).unwrap(), expected);
        assert_eq!(parse(&["--config=custom.toml"]).unwrap(), expected);
        assert!(parse(&["--config"]).is_err());
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse(&["--help"]).unwrap(), RunMode::Help);
        assert_eq!(parse(&["-V"]).unwrap(), RunMode::Version);
        assert_eq!(parse(&["--config", "x.toml", "-h"]).unwrap(), RunMode::Help);
    }

    #[test]
    fn test_unknown_argument() {
        assert!(parse(&["--cli"]).unwrap_err().contains("--cli"));
    }
}
