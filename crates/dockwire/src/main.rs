use clap::CommandFactory;
use clap::Parser;
use clap_complete::generate;

use dockwire::color;
use dockwire::color::Colors;
use dockwire::commands::Cli;
use dockwire::commands::Commands;
use dockwire::commands::OutputFormat;
use dockwire::handlers;
use dockwire::handlers::HandlerContext;
use dockwire::handlers::RunArgs;
use dockwire::telemetry::init_tracing;
use dockwire::CliError;
use dockwire::ClientConfig;
use dockwire::DockerClient;

fn main() {
    let cli = Cli::parse();

    color::init(cli.no_color);
    let telemetry = init_tracing(if cli.verbose { "debug" } else { "warn" });
    let json = cli.effective_format() == OutputFormat::Json;

    let code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            report(&e, json);
            e.exit_code()
        }
    };

    drop(telemetry);
    std::process::exit(code);
}

fn report(error: &CliError, json: bool) {
    if matches!(error, CliError::ExitStatus(_)) {
        return;
    }
    if json {
        eprintln!("{}", serde_json::json!({ "error": error.to_json() }));
        return;
    }
    eprintln!("{} {}", Colors::error("Error:"), error);
    if let Some(suggestion) = error.suggestion() {
        eprintln!("{} {}", Colors::dim("Suggestion:"), suggestion);
    }
    if error.is_retryable() {
        eprintln!(
            "{}",
            Colors::dim("(This error may be transient - retry may succeed)")
        );
    }
}

fn client_config(cli: &Cli) -> ClientConfig {
    let mut config = ClientConfig::from_env();
    if let Some(host) = &cli.host {
        config = config.with_host(host.clone());
    }
    if let Some(version) = &cli.api_version {
        config = config.with_api_version(version.trim_start_matches('v'));
    }
    if cli.tls {
        config = config.with_tls_verify(true);
    }
    config
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "dockwire", &mut std::io::stdout());
        return Ok(());
    }

    let mut client = DockerClient::connect(&client_config(&cli))?;
    let format = cli.effective_format();
    let mut ctx = HandlerContext::new(&mut client, format);

    match cli.command {
        Commands::Completions { .. } => Ok(()),

        Commands::Version => handlers::handle_version(&mut ctx),
        Commands::Info => handlers::handle_info(&mut ctx),
        Commands::Ps { all } => handlers::handle_ps(&mut ctx, all),
        Commands::Inspect { container } => handlers::handle_inspect(&mut ctx, &container),
        Commands::Pull { image, tag } => handlers::handle_pull(&mut ctx, &image, tag.as_deref()),

        Commands::Run {
            name,
            rm,
            tty,
            interactive,
            detach,
            image,
            cmd,
        } => handlers::handle_run(
            &mut ctx,
            RunArgs {
                name,
                rm,
                tty,
                interactive,
                detach,
                image,
                cmd,
            },
        ),

        Commands::Exec {
            tty,
            interactive,
            container,
            cmd,
        } => handlers::handle_exec(&mut ctx, &container, cmd, tty, interactive),

        Commands::Logs {
            follow,
            tail,
            container,
        } => handlers::handle_logs(&mut ctx, &container, follow, tail),

        Commands::Start { container } => handlers::handle_start(&mut ctx, &container),
        Commands::Stop { time, container } => handlers::handle_stop(&mut ctx, &container, time),
        Commands::Rm { force, container } => handlers::handle_rm(&mut ctx, &container, force),
        Commands::Stat { container, path } => handlers::handle_stat(&mut ctx, &container, &path),
    }
}
