//! Serve command: parse arguments, load config, run the server.

use std::path::PathBuf;

use ars_config::{CliSettings, Config, Transport};
use ars_server::{Server, server_config_from_config, shutdown_signal};
use clap::Args;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for serving a directory.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Directory to serve and watch [default: .]
    directory: Option<PathBuf>,

    /// Port to listen on [default: 4000]
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Glob of files that trigger a reload [default: **/*]
    #[arg(short, long, value_name = "GLOB")]
    watch: Option<String>,

    /// Glob of files to ignore (repeatable)
    #[arg(short, long, value_name = "GLOB")]
    ignore: Vec<String>,

    /// Host to bind to [default: 127.0.0.1]
    #[arg(long, env = "AUTORELOAD_HOST")]
    host: Option<String>,

    /// Live reload transport: poll, sse or websocket [default: websocket]
    #[arg(short, long)]
    transport: Option<Transport>,

    /// Path to configuration file (default: auto-discover autoreload.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log every change and connection.
    #[arg(long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Start the server and run until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = self.load_config()?;

        let directory = &config.watch_resolved.directory;
        if !directory.is_dir() {
            return Err(CliError::Validation(format!(
                "Directory does not exist: {}",
                directory.display()
            )));
        }

        let server = Server::bind(server_config_from_config(&config)).await?;
        let addr = server.local_addr()?;

        output.highlight(&format!("Serving on http://{addr}"));
        output.info(&format!("Directory: {}", server.root().display()));
        output.info(&format!(
            "Watching: {} ({} live reload)",
            config.watch_resolved.pattern, config.live_reload.transport
        ));
        if !config.watch_resolved.ignore.is_empty() {
            output.info(&format!(
                "Ignoring: {}",
                config.watch_resolved.ignore.join(", ")
            ));
        }

        server.serve(shutdown_signal()).await?;
        Ok(())
    }

    fn load_config(self) -> Result<Config, CliError> {
        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            directory: self.directory,
            pattern: self.watch,
            ignore: self.ignore,
            transport: self.transport,
        };

        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        tracing::debug!(path = ?config.config_path, "Configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        serve: ServeArgs,
    }

    fn parse(args: &[&str]) -> Result<ServeArgs, clap::Error> {
        let argv = std::iter::once("autoreload-web-server").chain(args.iter().copied());
        TestCli::try_parse_from(argv).map(|cli| cli.serve)
    }

    #[test]
    fn test_no_arguments() {
        let args = parse(&[]).unwrap();

        assert_eq!(args.directory, None);
        assert_eq!(args.port, None);
        assert_eq!(args.watch, None);
        assert!(args.ignore.is_empty());
        assert!(!args.verbose);
    }

    #[test]
    fn test_directory_and_port() {
        let args = parse(&["public", "8080"]).unwrap();

        assert_eq!(args.directory, Some(PathBuf::from("public")));
        assert_eq!(args.port, Some(8080));
    }

    #[test]
    fn test_watch_ignore_and_transport() {
        let args = parse(&["-w", "*.html", "-i", "drafts/**", "-i", "*.tmp", "-t", "sse"]).unwrap();

        assert_eq!(args.watch.as_deref(), Some("*.html"));
        assert_eq!(args.ignore, vec!["drafts/**", "*.tmp"]);
        assert_eq!(args.transport, Some(Transport::Sse));
    }

    #[test]
    fn test_port_out_of_range() {
        assert!(parse(&["public", "70000"]).is_err());
        assert!(parse(&["public", "0"]).is_err());
    }

    #[test]
    fn test_too_many_arguments() {
        assert!(parse(&["dir1", "4000", "extra"]).is_err());
    }

    #[test]
    fn test_unknown_transport() {
        assert!(parse(&["-t", "carrier-pigeon"]).is_err());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("autoreload.toml");
        std::fs::write(&config_path, "[server]\nport = 5000\n").unwrap();
        let config_arg = config_path.to_str().unwrap();

        let config = parse(&["-c", config_arg, "-w", "**/*.html"])
            .unwrap()
            .load_config()
            .unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.watch_resolved.pattern, "**/*.html");
        assert_eq!(config.watch_resolved.directory, dir.path().join("."));
    }

    #[tokio::test]
    async fn test_missing_directory_fails_before_starting() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("autoreload.toml");
        std::fs::write(&config_path, "").unwrap();

        let result = parse(&["-c", config_path.to_str().unwrap(), "/nonexistent/site"])
            .unwrap()
            .execute()
            .await;

        assert!(matches!(result, Err(CliError::Validation(_))));
    }
}
