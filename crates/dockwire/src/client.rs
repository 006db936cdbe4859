//! Typed engine operations over one shared exchange.

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;
use tracing::info;

use dockwire_http::Connection;
use dockwire_http::Endpoint;
use dockwire_http::HttpExchange;
use dockwire_http::Request;
use dockwire_http::Response;
use dockwire_http::Result;
use dockwire_http::StreamDemultiplexer;
use dockwire_http::StreamMode;
use dockwire_http::WireError;

use crate::config::ClientConfig;
use crate::model::AttachOptions;
use crate::model::AuthConfig;
use crate::model::BuildOptions;
use crate::model::ContainerChange;
use crate::model::ContainerCreateResponse;
use crate::model::ContainerInspect;
use crate::model::ContainerPruneResponse;
use crate::model::ContainerSpec;
use crate::model::ContainerSummary;
use crate::model::ContainerWaitResponse;
use crate::model::ExecConfig;
use crate::model::ExecInspect;
use crate::model::Filters;
use crate::model::IdResponse;
use crate::model::ImageInspect;
use crate::model::LogsOptions;
use crate::model::PathStat;
use crate::model::ProgressRecord;
use crate::model::SystemInfo;
use crate::model::SystemVersion;
use crate::model::WaitCondition;
use crate::query::Target;
use crate::session::AttachSession;

const TAR_CONTENT_TYPE: &str = "application/x-tar";
const DEFAULT_REGISTRY: &str = "https://index.docker.io/v1/";

/// Client for one engine endpoint.
///
/// Ordinary calls share one connection, reopened whenever the previous
/// response left it unusable. Attach, exec-start and pending waits each get
/// a dedicated connection owned by the returned value.
pub struct DockerClient {
    endpoint: Endpoint,
    api_version: String,
    read_timeout: Option<Duration>,
    exchange: Option<HttpExchange<Connection>>,
}

impl DockerClient {
    /// Connects using `config`, negotiating the API version from
    /// `/version` unless one is pinned.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let mut client = Self::new(endpoint, config.api_version.clone().unwrap_or_default());
        client.read_timeout = config.read_timeout;

        if config.api_version.is_none() {
            let version = client.version()?;
            info!(api_version = %version.api_version, engine = %version.version, "Negotiated API version");
            client.api_version = version.api_version;
        }
        Ok(client)
    }

    /// Client with a fixed API version and no connection yet. An empty
    /// version sends unprefixed paths.
    pub fn new(endpoint: Endpoint, api_version: impl Into<String>) -> Self {
        Self {
            endpoint,
            api_version: api_version.into(),
            read_timeout: None,
            exchange: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    fn path(&self, target: &Target) -> String {
        if self.api_version.is_empty() {
            target.build()
        } else {
            format!("/v{}{}", self.api_version, target.build())
        }
    }

    fn open(&self, read_timeout: Option<Duration>) -> Result<Connection> {
        let conn = Connection::open(&self.endpoint)?;
        conn.set_read_timeout(read_timeout)?;
        Ok(conn)
    }

    fn dedicated(&self) -> Result<HttpExchange<Connection>> {
        // Sessions idle for as long as the process does; no read timeout.
        let conn = self.open(None)?;
        Ok(HttpExchange::new(conn, self.endpoint.host_header()))
    }

    fn exchange(&mut self) -> Result<&mut HttpExchange<Connection>> {
        let exchange = match self.exchange.take() {
            Some(exchange) if exchange.is_reusable() => exchange,
            previous => {
                if previous.is_some() {
                    debug!("Previous connection not reusable, reconnecting");
                }
                let conn = self.open(self.read_timeout)?;
                HttpExchange::new(conn, self.endpoint.host_header())
            }
        };
        Ok(self.exchange.insert(exchange))
    }

    fn call(&mut self, request: Request) -> Result<Response<'_, Connection>> {
        self.exchange()?.request(request)
    }

    fn call_json<T: serde::de::DeserializeOwned>(&mut self, request: Request) -> Result<T> {
        self.call(request)?.json()
    }

    fn call_empty(&mut self, request: Request) -> Result<()> {
        self.call(request)?.discard()?;
        Ok(())
    }

    /// Like [`Self::call_empty`], but 304 (already in the requested state)
    /// counts as success.
    fn call_state_change(&mut self, request: Request) -> Result<()> {
        match self.call_empty(request) {
            Err(WireError::RequestFailed { status: 304, .. }) => {
                debug!("Container already in the requested state");
                Ok(())
            }
            other => other,
        }
    }

    fn container_target(container: &str) -> Result<Target> {
        Target::new("/containers").segment(container)
    }

    // System

    pub fn ping(&mut self) -> Result<String> {
        let path = self.path(&Target::new("/_ping"));
        self.call(Request::get(path))?.text()
    }

    /// Engine version. Always requested without a version prefix so it can
    /// drive negotiation.
    pub fn version(&mut self) -> Result<SystemVersion> {
        let path = Target::new("/version").build();
        self.call_json(Request::get(path))
    }

    pub fn info(&mut self) -> Result<SystemInfo> {
        let path = self.path(&Target::new("/info"));
        self.call_json(Request::get(path))
    }

    // Containers

    pub fn container_list(
        &mut self,
        all: bool,
        limit: Option<u32>,
        size: bool,
        filters: &Filters,
    ) -> Result<Vec<ContainerSummary>> {
        let target = Target::new("/containers/json")
            .flag_if("all", all)
            .param_opt("limit", limit)
            .flag_if("size", size)
            .json_param("filters", filters, filters.is_empty())?;
        let path = self.path(&target);
        self.call_json(Request::get(path))
    }

    pub fn container_create(
        &mut self,
        spec: &ContainerSpec,
        name: Option<&str>,
    ) -> Result<ContainerCreateResponse> {
        let target = Target::new("/containers/create").param_opt("name", name);
        let path = self.path(&target);
        let created: ContainerCreateResponse = self.call_json(Request::post(path).json(spec)?)?;
        debug!(id = %created.id, "Container created");
        Ok(created)
    }

    pub fn container_inspect(&mut self, container: &str) -> Result<ContainerInspect> {
        let path = self.path(&Self::container_target(container)?.then("json"));
        self.call_json(Request::get(path))
    }

    pub fn container_start(&mut self, container: &str) -> Result<()> {
        let path = self.path(&Self::container_target(container)?.then("start"));
        self.call_state_change(Request::post(path))
    }

    pub fn container_stop(&mut self, container: &str, timeout: Option<u32>) -> Result<()> {
        let target = Self::container_target(container)?
            .then("stop")
            .param_opt("t", timeout);
        let path = self.path(&target);
        self.call_state_change(Request::post(path))
    }

    pub fn container_restart(&mut self, container: &str, timeout: Option<u32>) -> Result<()> {
        let target = Self::container_target(container)?
            .then("restart")
            .param_opt("t", timeout);
        let path = self.path(&target);
        self.call_empty(Request::post(path))
    }

    pub fn container_kill(&mut self, container: &str, signal: Option<&str>) -> Result<()> {
        let target = Self::container_target(container)?
            .then("kill")
            .param_opt("signal", signal);
        let path = self.path(&target);
        self.call_empty(Request::post(path))
    }

    pub fn container_rename(&mut self, container: &str, name: &str) -> Result<()> {
        let target = Self::container_target(container)?
            .then("rename")
            .param("name", name);
        let path = self.path(&target);
        self.call_empty(Request::post(path))
    }

    pub fn container_pause(&mut self, container: &str) -> Result<()> {
        let path = self.path(&Self::container_target(container)?.then("pause"));
        self.call_empty(Request::post(path))
    }

    pub fn container_unpause(&mut self, container: &str) -> Result<()> {
        let path = self.path(&Self::container_target(container)?.then("unpause"));
        self.call_empty(Request::post(path))
    }

    /// Resizes the container's terminal.
    pub fn container_resize(&mut self, container: &str, height: u16, width: u16) -> Result<()> {
        let target = Self::container_target(container)?
            .then("resize")
            .param("h", height)
            .param("w", width);
        let path = self.path(&target);
        self.call_empty(Request::post(path))
    }

    /// Blocks until the container meets `condition`.
    pub fn container_wait(
        &mut self,
        container: &str,
        condition: WaitCondition,
    ) -> Result<ContainerWaitResponse> {
        let path = self.path(&Self::wait_target(container, condition)?);
        self.call_json(Request::post(path))
    }

    /// Registers a wait on a dedicated connection and returns without
    /// reading the answer, so the container can be started afterwards
    /// without missing its exit.
    pub fn begin_wait(&self, container: &str, condition: WaitCondition) -> Result<PendingWait> {
        let path = self.path(&Self::wait_target(container, condition)?);
        let mut exchange = self.dedicated()?;
        exchange.send(Request::post(path))?;
        Ok(PendingWait { exchange })
    }

    fn wait_target(container: &str, condition: WaitCondition) -> Result<Target> {
        Ok(Self::container_target(container)?
            .then("wait")
            .param("condition", condition.as_str()))
    }

    pub fn container_delete(
        &mut self,
        container: &str,
        volumes: bool,
        links: bool,
        force: bool,
    ) -> Result<()> {
        let target = Self::container_target(container)?
            .flag_if("v", volumes)
            .flag_if("link", links)
            .flag_if("force", force);
        let path = self.path(&target);
        self.call_empty(Request::delete(path))
    }

    pub fn container_changes(&mut self, container: &str) -> Result<Vec<ContainerChange>> {
        let path = self.path(&Self::container_target(container)?.then("changes"));
        // The engine answers `null` when nothing changed.
        let changes: Option<Vec<ContainerChange>> = self.call_json(Request::get(path))?;
        Ok(changes.unwrap_or_default())
    }

    pub fn container_prune(&mut self, filters: &Filters) -> Result<ContainerPruneResponse> {
        let target = Target::new("/containers/prune").json_param(
            "filters",
            filters,
            filters.is_empty(),
        )?;
        let path = self.path(&target);
        self.call_json(Request::post(path))
    }

    /// Log output of a container. `tty` is the container's own tty setting
    /// and picks the framing unless the response declares one.
    pub fn container_logs(
        &mut self,
        container: &str,
        options: &LogsOptions,
        tty: bool,
    ) -> Result<StreamDemultiplexer<Response<'_, Connection>>> {
        let target = Self::container_target(container)?
            .then("logs")
            .flag("follow", options.follow)
            .flag("stdout", options.stdout)
            .flag("stderr", options.stderr)
            .flag("timestamps", options.timestamps)
            .param("since", options.since)
            .param_opt("tail", options.tail.as_deref());
        let path = self.path(&target);
        let response = self.call(Request::get(path))?;
        let mode = StreamMode::negotiate(response.head().content_type(), tty);
        Ok(StreamDemultiplexer::new(response, mode))
    }

    /// Hijacks a dedicated connection for the container's streams.
    pub fn container_attach(
        &self,
        container: &str,
        options: &AttachOptions,
        tty: bool,
    ) -> Result<AttachSession> {
        let target = Self::container_target(container)?
            .then("attach")
            .flag("stream", options.stream)
            .flag("logs", options.logs)
            .flag("stdin", options.stdin)
            .flag("stdout", options.stdout)
            .flag("stderr", options.stderr)
            .param_opt("detachKeys", options.detach_keys.as_deref());
        let path = self.path(&target);
        let hijacked = self.dedicated()?.hijack(Request::post(path))?;
        AttachSession::new(hijacked, tty, options.stdin)
    }

    // Archives

    /// Stat of a path inside the container.
    pub fn container_archive_info(&mut self, container: &str, path: &str) -> Result<PathStat> {
        let target = Self::container_target(container)?
            .then("archive")
            .param("path", path);
        let target = self.path(&target);
        let response = self.call(Request::head(target))?;
        let header = response
            .headers()
            .get(PathStat::HEADER)
            .map(str::to_string)
            .ok_or_else(|| {
                WireError::ProtocolViolation(format!("response has no {} header", PathStat::HEADER))
            })?;
        response.discard()?;
        PathStat::decode(&header)
    }

    /// Tar archive of a path inside the container.
    pub fn container_archive(&mut self, container: &str, path: &str) -> Result<Vec<u8>> {
        let target = Self::container_target(container)?
            .then("archive")
            .param("path", path);
        let target = self.path(&target);
        self.call(Request::get(target))?.bytes()
    }

    /// Extracts a tar archive into a directory of the container.
    pub fn put_container_archive(
        &mut self,
        container: &str,
        path: &str,
        no_overwrite_dir_non_dir: bool,
        tar: Vec<u8>,
    ) -> Result<()> {
        let target = Self::container_target(container)?
            .then("archive")
            .param("path", path)
            .flag_if("noOverwriteDirNonDir", no_overwrite_dir_non_dir);
        let target = self.path(&target);
        let request = Request::put(target)
            .header("Content-Type", TAR_CONTENT_TYPE)
            .bytes(tar);
        self.call_empty(request)
    }

    // Exec

    pub fn exec_create(&mut self, container: &str, config: &ExecConfig) -> Result<String> {
        let path = self.path(&Self::container_target(container)?.then("exec"));
        let created: IdResponse = self.call_json(Request::post(path).json(config)?)?;
        debug!(id = %created.id, "Exec instance created");
        Ok(created.id)
    }

    /// Starts an exec instance. Detached starts return `None` once the
    /// engine accepted them; otherwise the hijacked session is returned.
    pub fn exec_start(
        &mut self,
        exec_id: &str,
        detach: bool,
        tty: bool,
        with_stdin: bool,
    ) -> Result<Option<AttachSession>> {
        let path = self.path(&Target::new("/exec").segment(exec_id)?.then("start"));
        let body = serde_json::json!({ "Detach": detach, "Tty": tty });
        let request = Request::post(path).json(&body)?;

        if detach {
            self.call_empty(request)?;
            return Ok(None);
        }
        let hijacked = self.dedicated()?.hijack(request)?;
        Ok(Some(AttachSession::new(hijacked, tty, with_stdin)?))
    }

    pub fn exec_resize(&mut self, exec_id: &str, height: u16, width: u16) -> Result<()> {
        let target = Target::new("/exec")
            .segment(exec_id)?
            .then("resize")
            .param("h", height)
            .param("w", width);
        let path = self.path(&target);
        self.call_empty(Request::post(path))
    }

    pub fn exec_inspect(&mut self, exec_id: &str) -> Result<ExecInspect> {
        let path = self.path(&Target::new("/exec").segment(exec_id)?.then("json"));
        self.call_json(Request::get(path))
    }

    // Images

    /// Pulls an image, reporting each progress record.
    pub fn image_pull<F>(
        &mut self,
        image: &str,
        tag: Option<&str>,
        auth: Option<&AuthConfig>,
        on_progress: F,
    ) -> Result<()>
    where
        F: FnMut(&ProgressRecord),
    {
        let target = Target::new("/images/create")
            .param("fromImage", image)
            .param_opt("tag", tag);
        let path = self.path(&target);
        let mut request = Request::post(path);
        if let Some(auth) = auth {
            request = request.header(AuthConfig::HEADER, auth.encode()?);
        }
        let response = self.call(request)?;
        drive_progress(response, on_progress)
    }

    /// Pushes an image. The engine requires the credential header even for
    /// anonymous pushes.
    pub fn image_push<F>(
        &mut self,
        image: &str,
        tag: Option<&str>,
        auth: Option<&AuthConfig>,
        on_progress: F,
    ) -> Result<()>
    where
        F: FnMut(&ProgressRecord),
    {
        let target = Target::new("/images")
            .segment(image)?
            .then("push")
            .param_opt("tag", tag);
        let path = self.path(&target);
        let credentials = match auth {
            Some(auth) => auth.encode()?,
            None => AuthConfig::default().encode()?,
        };
        let response = self.call(Request::post(path).header(AuthConfig::HEADER, credentials))?;
        drive_progress(response, on_progress)
    }

    pub fn image_inspect(&mut self, image: &str) -> Result<ImageInspect> {
        let path = self.path(&Target::new("/images").segment(image)?.then("json"));
        self.call_json(Request::get(path))
    }

    /// Builds an image from a tar build context of unknown length, streamed
    /// with chunked encoding.
    pub fn image_build<R, F>(
        &mut self,
        options: &BuildOptions,
        auth: Option<&AuthConfig>,
        context: R,
        on_progress: F,
    ) -> Result<()>
    where
        R: Read + Send + 'static,
        F: FnMut(&ProgressRecord),
    {
        let target = Target::new("/build")
            .param_opt("t", options.tag.as_deref())
            .param_opt("dockerfile", options.dockerfile.as_deref())
            .flag_if("q", options.quiet)
            .flag_if("nocache", options.no_cache)
            .flag("rm", options.rm)
            .flag_if("forcerm", options.force_rm)
            .flag_if("pull", options.pull)
            .json_param("buildargs", &options.build_args, options.build_args.is_empty())?
            .json_param("labels", &options.labels, options.labels.is_empty())?
            .param_opt("networkmode", options.network_mode.as_deref());
        let path = self.path(&target);

        let mut request = Request::post(path).header("Content-Type", TAR_CONTENT_TYPE);
        if let Some(auth) = auth {
            let registry = auth
                .serveraddress
                .clone()
                .unwrap_or_else(|| DEFAULT_REGISTRY.to_string());
            let mut configs = BTreeMap::new();
            configs.insert(registry, auth.clone());
            let encoded = serde_json::to_vec(&configs)?;
            request = request.header("X-Registry-Config", STANDARD.encode(encoded));
        }

        let response = self.call(request.stream(context))?;
        drive_progress(response, on_progress)
    }
}

/// A wait registered with the engine whose answer has not been read yet.
pub struct PendingWait {
    exchange: HttpExchange<Connection>,
}

impl PendingWait {
    /// Blocks until the engine answers the wait.
    pub fn finish(mut self) -> Result<ContainerWaitResponse> {
        self.exchange.receive()?.json()
    }
}

/// Feeds progress records to `on_progress` until the body ends. A record
/// carrying an error ends the call.
fn drive_progress<F>(response: Response<'_, Connection>, mut on_progress: F) -> Result<()>
where
    F: FnMut(&ProgressRecord),
{
    let status = response.status();
    for record in response.json_stream::<ProgressRecord>() {
        let record = record?;
        if let Some(message) = record.error_message() {
            let status = record
                .error_detail
                .as_ref()
                .and_then(|detail| detail.code)
                .unwrap_or(status);
            return Err(WireError::RequestFailed {
                status,
                message: message.to_string(),
            });
        }
        on_progress(&record);
    }
    Ok(())
}
