use std::io;

use chrono::DateTime;
use chrono::Local;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use dockwire_http::WireError;

use crate::client::DockerClient;
use crate::color::Colors;
use crate::commands::OutputFormat;
use crate::error::CliError;
use crate::model::AttachOptions;
use crate::model::ContainerSpec;
use crate::model::ExecConfig;
use crate::model::Filters;
use crate::model::HostConfig;
use crate::model::LogsOptions;
use crate::model::WaitCondition;
use crate::session::AttachSession;
use crate::terminal;
use crate::terminal::RawModeGuard;

pub type HandlerResult = Result<(), CliError>;

const SHORT_ID_LEN: usize = 12;

pub struct HandlerContext<'a> {
    pub client: &'a mut DockerClient,
    pub format: OutputFormat,
}

impl<'a> HandlerContext<'a> {
    pub fn new(client: &'a mut DockerClient, format: OutputFormat) -> Self {
        Self { client, format }
    }

    fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

/// Arguments of `run`, gathered from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub name: Option<String>,
    pub rm: bool,
    pub tty: bool,
    pub interactive: bool,
    pub detach: bool,
    pub image: String,
    pub cmd: Vec<String>,
}

impl RunArgs {
    /// Creation request for these arguments.
    pub fn container_spec(&self) -> ContainerSpec {
        let attached = !self.detach;
        let mut spec = ContainerSpec::new(&self.image);
        if !self.cmd.is_empty() {
            spec.cmd = Some(self.cmd.clone());
        }
        spec.tty = self.tty;
        spec.open_stdin = self.interactive;
        spec.stdin_once = self.interactive;
        spec.attach_stdin = attached && self.interactive;
        spec.attach_stdout = attached;
        spec.attach_stderr = attached;
        if self.rm {
            spec.host_config = Some(HostConfig {
                auto_remove: true,
                ..HostConfig::default()
            });
        }
        spec
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> HandlerResult {
    let text = serde_json::to_string_pretty(value).map_err(WireError::from)?;
    println!("{text}");
    Ok(())
}

fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    match time {
        Some(time) if time.timestamp() > 0 => time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        _ => "-".to_string(),
    }
}

fn print_row(label: &str, value: impl std::fmt::Display) {
    println!("  {:<14}{}", format!("{label}:"), value);
}

pub fn handle_version(ctx: &mut HandlerContext) -> HandlerResult {
    let client_version = env!("CARGO_PKG_VERSION");
    let server = ctx.client.version()?;

    if ctx.is_json() {
        return print_json(&json!({
            "client": {
                "version": client_version,
                "api_version": ctx.client.api_version(),
                "endpoint": ctx.client.endpoint().to_string(),
            },
            "server": server,
        }));
    }

    println!("{}", Colors::bold("Client:"));
    print_row("Version", client_version);
    print_row("API version", ctx.client.api_version());
    print_row("Endpoint", ctx.client.endpoint());
    println!("{}", Colors::bold("Server:"));
    print_row("Version", &server.version);
    match &server.min_api_version {
        Some(min) => print_row("API version", format!("{} (minimum {min})", server.api_version)),
        None => print_row("API version", &server.api_version),
    }
    print_row("OS/Arch", format!("{}/{}", server.os, server.arch));
    if let Some(kernel) = &server.kernel_version {
        print_row("Kernel", kernel);
    }
    Ok(())
}

pub fn handle_info(ctx: &mut HandlerContext) -> HandlerResult {
    let info = ctx.client.info()?;
    if ctx.is_json() {
        return print_json(&info);
    }

    println!("{}", Colors::bold(&info.name));
    print_row("Server", &info.server_version);
    print_row(
        "Containers",
        format!(
            "{} ({} running, {} paused, {} stopped)",
            info.containers,
            info.containers_running,
            info.containers_paused,
            info.containers_stopped
        ),
    );
    print_row("Images", info.images);
    print_row("OS", &info.operating_system);
    print_row("Architecture", &info.architecture);
    print_row("CPUs", info.ncpu);
    print_row("Memory", format!("{:.1} GiB", info.mem_total as f64 / (1u64 << 30) as f64));
    Ok(())
}

pub fn handle_ps(ctx: &mut HandlerContext, all: bool) -> HandlerResult {
    let containers = ctx.client.container_list(all, None, false, &Filters::new())?;
    if ctx.is_json() {
        return print_json(&containers);
    }

    println!(
        "{:<14}{:<24}{:<22}{:<21}{:<24}NAMES",
        "CONTAINER ID", "IMAGE", "COMMAND", "CREATED", "STATUS"
    );
    for container in &containers {
        let mut command: String = container.command.chars().take(19).collect();
        if container.command.chars().count() > 19 {
            command.push('…');
        }
        println!(
            "{:<14}{:<24}{:<22}{:<21}{:<24}{}",
            short_id(&container.id),
            container.image,
            format!("\"{command}\""),
            format_time(container.created_at()),
            container.status,
            container.display_name()
        );
    }
    Ok(())
}

pub fn handle_inspect(ctx: &mut HandlerContext, container: &str) -> HandlerResult {
    let inspect = ctx.client.container_inspect(container)?;
    if ctx.is_json() {
        return print_json(&inspect);
    }

    println!("{}", Colors::id(&inspect.id));
    print_row("Name", inspect.name.trim_start_matches('/'));
    print_row("Image", &inspect.image);
    print_row("Created", format_time(inspect.created));
    let status = if inspect.state.running {
        Colors::success(&inspect.state.status)
    } else {
        inspect.state.status.clone()
    };
    print_row("Status", status);
    if !inspect.state.running {
        print_row("Exit code", inspect.state.exit_code);
    }
    print_row("Started", format_time(inspect.state.started_at));
    print_row("Finished", format_time(inspect.state.finished_at));
    print_row(
        "Command",
        std::iter::once(inspect.path.as_str())
            .chain(inspect.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" "),
    );
    print_row("Tty", inspect.is_tty());
    Ok(())
}

pub fn handle_pull(ctx: &mut HandlerContext, image: &str, tag: Option<&str>) -> HandlerResult {
    let json = ctx.is_json();
    ctx.client.image_pull(image, tag, None, |record| {
        if json {
            if let Ok(line) = serde_json::to_string(record) {
                println!("{line}");
            }
        } else {
            let summary = record.summary();
            if !summary.is_empty() {
                println!("{summary}");
            }
        }
    })?;
    if !json {
        println!(
            "{} {}{}",
            Colors::success("Pulled"),
            image,
            tag.map(|t| format!(":{t}")).unwrap_or_default()
        );
    }
    Ok(())
}

pub fn handle_run(ctx: &mut HandlerContext, args: RunArgs) -> HandlerResult {
    let created = ctx
        .client
        .container_create(&args.container_spec(), args.name.as_deref())?;
    for warning in created.warnings.iter().flatten() {
        eprintln!("{} {}", Colors::warning("Warning:"), warning);
    }
    let id = created.id;

    if args.detach {
        ctx.client.container_start(&id)?;
        if ctx.is_json() {
            return print_json(&json!({ "id": id }));
        }
        println!("{id}");
        return Ok(());
    }

    let options = AttachOptions {
        stdin: args.interactive,
        ..AttachOptions::default()
    };
    let session = ctx.client.container_attach(&id, &options, args.tty)?;
    let condition = if args.rm {
        WaitCondition::Removed
    } else {
        WaitCondition::NextExit
    };
    let wait = ctx.client.begin_wait(&id, condition)?;
    ctx.client.container_start(&id)?;

    if args.tty {
        if let Some((rows, cols)) = terminal::size() {
            if let Err(e) = ctx.client.container_resize(&id, rows, cols) {
                debug!(error = %e, "Failed to resize container tty");
            }
        }
    }

    run_session(session, args.tty && args.interactive)?;

    let exit = wait.finish()?;
    if let Some(error) = exit.error.filter(|error| !error.message.is_empty()) {
        eprintln!("{} {}", Colors::error("Error:"), error.message);
    }
    exit_with(exit.status_code)
}

pub fn handle_exec(
    ctx: &mut HandlerContext,
    container: &str,
    cmd: Vec<String>,
    tty: bool,
    interactive: bool,
) -> HandlerResult {
    let config = ExecConfig {
        attach_stdin: interactive,
        attach_stdout: true,
        attach_stderr: true,
        tty,
        cmd,
        ..ExecConfig::default()
    };
    let exec_id = ctx.client.exec_create(container, &config)?;
    let session = ctx
        .client
        .exec_start(&exec_id, false, tty, interactive)?
        .ok_or_else(|| WireError::ProtocolViolation("exec start returned no session".into()))?;

    if tty {
        if let Some((rows, cols)) = terminal::size() {
            if let Err(e) = ctx.client.exec_resize(&exec_id, rows, cols) {
                debug!(error = %e, "Failed to resize exec tty");
            }
        }
    }

    run_session(session, tty && interactive)?;

    let inspect = ctx.client.exec_inspect(&exec_id)?;
    exit_with(inspect.exit_code.unwrap_or(0))
}

fn run_session(session: AttachSession, raw: bool) -> HandlerResult {
    let guard = RawModeGuard::enable(raw).map_err(CliError::Terminal)?;
    let pumped = session.pump(io::stdin(), &mut io::stdout(), &mut io::stderr());
    drop(guard);
    let stats = pumped?;
    debug!(frames = stats.frames, "Session finished");
    Ok(())
}

fn exit_with(status: i64) -> HandlerResult {
    if status == 0 {
        return Ok(());
    }
    Err(CliError::ExitStatus(i32::try_from(status).unwrap_or(1)))
}

pub fn handle_logs(
    ctx: &mut HandlerContext,
    container: &str,
    follow: bool,
    tail: Option<String>,
) -> HandlerResult {
    let tty = ctx.client.container_inspect(container)?.is_tty();
    let options = LogsOptions {
        follow,
        tail,
        ..LogsOptions::default()
    };
    let mut logs = ctx.client.container_logs(container, &options, tty)?;
    let stdout = io::stdout();
    let stderr = io::stderr();
    logs.copy_to(&mut stdout.lock(), &mut stderr.lock())?;
    Ok(())
}

pub fn handle_start(ctx: &mut HandlerContext, container: &str) -> HandlerResult {
    ctx.client.container_start(container)?;
    report_done(ctx, "started", container)
}

pub fn handle_stop(ctx: &mut HandlerContext, container: &str, time: Option<u32>) -> HandlerResult {
    ctx.client.container_stop(container, time)?;
    report_done(ctx, "stopped", container)
}

pub fn handle_rm(ctx: &mut HandlerContext, container: &str, force: bool) -> HandlerResult {
    ctx.client.container_delete(container, false, false, force)?;
    report_done(ctx, "removed", container)
}

fn report_done(ctx: &HandlerContext, action: &str, container: &str) -> HandlerResult {
    if ctx.is_json() {
        return print_json(&json!({ "container": container, "action": action }));
    }
    println!("{container}");
    Ok(())
}

pub fn handle_stat(ctx: &mut HandlerContext, container: &str, path: &str) -> HandlerResult {
    let stat = ctx.client.container_archive_info(container, path)?;
    if ctx.is_json() {
        return print_json(&stat);
    }

    println!("{}", Colors::bold(&stat.name));
    print_row("Size", stat.size);
    print_row("Mode", format!("{:o}", stat.mode & 0o7777));
    print_row("Type", if stat.is_dir() { "directory" } else { "file" });
    print_row("Modified", &stat.mtime);
    if !stat.link_target.is_empty() {
        print_row("Link target", &stat.link_target);
    }
    Ok(())
}
