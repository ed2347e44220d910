// Keyseize CLI
// Seizes keyboards and streams their key transitions to stdout

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use keyseize_core::input::DeviceClass;
use keyseize_core::settings::Settings;
use keyseize_core::{EvdevPlatform, KeySink, OutputFormat, PipeSink, TextSink};

/// Exclusive keyboard monitor
#[derive(Parser, Debug)]
#[command(name = "keyseize")]
#[command(version)]
#[command(about = "Seize keyboards and stream their key events", long_about = None)]
struct Args {
    /// Only seize the keyboard with this exact product name
    #[arg(short, long, value_name = "NAME")]
    product: Option<String>,

    /// TOML settings file (default: ~/.config/keyseize/settings.toml)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Output format: binary or text
    #[arg(short, long, value_name = "FORMAT")]
    format: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// List available keyboard devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = match args.config {
        Some(ref path) => Settings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::load_default().context("failed to load default settings")?,
    };

    if let Some(ref product) = args.product {
        settings.set_product(Some(product.clone()))?;
    }
    if let Some(format) = args.format {
        settings.set_output_format(format);
    }
    Ok(settings)
}

fn list_devices() -> anyhow::Result<()> {
    let devices = EvdevPlatform::list_devices(DeviceClass::KEYBOARD)?;
    println!("Found {} keyboard device(s):", devices.len());
    for device in &devices {
        match &device.name {
            Some(name) => println!("  {}: {}", device.path.display(), name),
            None => println!("  {}", device.path.display()),
        }
    }
    Ok(())
}

fn install_signal_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to register signals")?;
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            log::info!("Received signal {}, shutting down", signal);
            running.store(false, Ordering::SeqCst);
        }
    });
    Ok(())
}

fn sink_for(format: OutputFormat) -> Box<dyn KeySink> {
    match format {
        OutputFormat::Binary => Box::new(PipeSink::new(io::stdout())),
        OutputFormat::Text => Box::new(TextSink::new(io::stdout())),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_devices {
        return list_devices();
    }

    let settings = load_settings(&args)?;
    match settings.source_path() {
        Some(path) => log::info!("Loaded settings from {}", path.display()),
        None => log::debug!("No settings file, using defaults"),
    }
    log::info!(
        "Monitoring {} keyboards, {} output",
        settings.product().unwrap_or("all"),
        settings.output_format()
    );

    let running = Arc::new(AtomicBool::new(true));
    install_signal_handler(Arc::clone(&running))?;

    keyseize_core::monitor_kb_with_interval(
        settings.product(),
        sink_for(settings.output_format()),
        running,
        settings.poll_interval(),
    )?;

    log::info!("Monitor stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["keyseize"]);

        assert_eq!(args.product, None);
        assert_eq!(args.config, None);
        assert_eq!(args.format, None);
        assert!(!args.verbose);
        assert!(!args.list_devices);
    }

    #[test]
    fn test_args_with_options() {
        let args = Args::parse_from([
            "keyseize",
            "--product",
            "Acme Keyboard",
            "--config",
            "/tmp/keyseize.toml",
            "--format",
            "text",
            "--verbose",
        ]);

        assert_eq!(args.product.as_deref(), Some("Acme Keyboard"));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/keyseize.toml")));
        assert_eq!(args.format, Some(OutputFormat::Text));
        assert!(args.verbose);
    }

    #[test]
    fn test_args_list_devices() {
        let args = Args::parse_from(["keyseize", "--list-devices"]);
        assert!(args.list_devices);
    }

    #[test]
    fn test_args_rejects_unknown_format() {
        assert!(Args::try_parse_from(["keyseize", "--format", "json"]).is_err());
    }

    #[test]
    fn test_cli_overrides_settings_file() {
        let path = std::env::temp_dir().join(format!("keyseize-cli-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[monitor]\nproduct = \"From File\"\n[output]\nformat = \"binary\"\n",
        )
        .unwrap();

        let args = Args::parse_from([
            "keyseize",
            "--config",
            path.to_str().unwrap(),
            "--product",
            "From Cli",
            "--format",
            "text",
        ]);
        let settings = load_settings(&args).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.product(), Some("From Cli"));
        assert_eq!(settings.output_format(), OutputFormat::Text);
    }

    #[test]
    fn test_empty_product_rejected() {
        let args = Args::parse_from(["keyseize", "--config", "/nonexistent/x.toml"]);
        assert!(load_settings(&args).is_err());

        let path = std::env::temp_dir().join(format!("keyseize-empty-{}.toml", std::process::id()));
        std::fs::write(&path, "").unwrap();
        let args = Args::parse_from(["keyseize", "--config", path.to_str().unwrap(), "-p", ""]);
        let result = load_settings(&args);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
