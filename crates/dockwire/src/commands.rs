use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
pub use clap_complete::Shell;

const LONG_ABOUT: &str = r#"dockwire talks to a container engine over its HTTP API.

The engine is reached over a unix socket by default, or over TCP with
optional TLS. No HTTP library is involved; requests are framed by hand.

ENVIRONMENT:
    DOCKER_HOST             Engine address (default unix:///var/run/docker.sock)
    DOCKER_API_VERSION      Pin the API version instead of negotiating it
    DOCKER_TLS_VERIFY       Use TLS for tcp:// hosts when set and not 0
    DOCKWIRE_READ_TIMEOUT   Socket read timeout in seconds
    DOCKWIRE_LOG            Write logs to this file instead of stderr

EXAMPLES:
    dockwire version
    dockwire pull alpine --tag 3.19
    dockwire run --rm alpine echo hello
    dockwire run --rm -t -i alpine sh
    dockwire logs -f web
    dockwire stat web /etc/hosts"#;

#[derive(Parser)]
#[command(name = "dockwire")]
#[command(author, version)]
#[command(about = "Minimal container engine client")]
#[command(long_about = LONG_ABOUT)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Engine address: unix://, tcp://, http:// or https://
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// API version to use instead of negotiating one (e.g. 1.43)
    #[arg(long, global = true)]
    pub api_version: Option<String>,

    /// Use TLS with the bundled root certificates
    #[arg(long, global = true)]
    pub tls: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Output as JSON (shorthand for --format json)
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Returns the effective output format, considering --json shorthand.
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show client and engine versions
    Version,

    /// Show engine-wide information
    Info,

    /// List containers
    Ps {
        /// Include stopped containers
        #[arg(short, long)]
        all: bool,
    },

    /// Show low-level information about a container
    Inspect { container: String },

    /// Pull an image from a registry
    Pull {
        image: String,

        /// Tag to pull (default: the engine's default, usually latest)
        #[arg(long)]
        tag: Option<String>,
    },

    /// Create and run a container
    #[command(long_about = r#"Create and run a container.

Without -d the command attaches to the container, forwards stdin when -i is
given, and exits with the container's exit status.

EXAMPLES:
    dockwire run alpine echo hello
    dockwire run --rm -t -i alpine sh
    dockwire run -d --name web nginx"#)]
    Run {
        /// Container name
        #[arg(long)]
        name: Option<String>,

        /// Remove the container when it exits
        #[arg(long)]
        rm: bool,

        /// Allocate a pseudo-terminal
        #[arg(short, long)]
        tty: bool,

        /// Keep stdin open and forward it
        #[arg(short, long)]
        interactive: bool,

        /// Start in the background and print the container id
        #[arg(short, long)]
        detach: bool,

        image: String,

        /// Command and arguments
        #[arg(trailing_var_arg = true)]
        cmd: Vec<String>,
    },

    /// Run a command in a running container
    Exec {
        /// Allocate a pseudo-terminal
        #[arg(short, long)]
        tty: bool,

        /// Keep stdin open and forward it
        #[arg(short, long)]
        interactive: bool,

        container: String,

        /// Command and arguments
        #[arg(trailing_var_arg = true, required = true)]
        cmd: Vec<String>,
    },

    /// Print the logs of a container
    Logs {
        /// Keep streaming new output
        #[arg(short, long)]
        follow: bool,

        /// Number of lines from the end (or "all")
        #[arg(long)]
        tail: Option<String>,

        container: String,
    },

    /// Start a stopped container
    Start { container: String },

    /// Stop a running container
    Stop {
        /// Seconds to wait before killing
        #[arg(short, long)]
        time: Option<u32>,

        container: String,
    },

    /// Remove a container
    Rm {
        /// Kill the container first if it is running
        #[arg(short, long)]
        force: bool,

        container: String,
    },

    /// Show metadata of a path inside a container
    Stat { container: String, path: String },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
