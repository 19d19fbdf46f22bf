/*!
bridge.rs - naming client backed by an external bridge process.

The vendor naming libraries are not reachable from Rust directly, so the
protocol exchange is delegated to a helper process (`--bridge "<cmdline>"`)
speaking JSON lines over stdin/stdout:

  -> {"op":"connect","environment":{...},"policy":"..."}
  <- {"ok":true}
  -> {"op":"lookup","name":"jdbc/ds"}
  <- {"ok":true,"binding":{"name":"jdbc/ds","class_name":"...","value":"..."}}
  -> {"op":"list","name":"jdbc"}
  <- {"ok":true,"entries":[{"name":"ds","class_name":"...","is_context":false}]}

Failures: {"ok":false,"kind":"communication|configuration|not_found|naming","message":"..."}

Before spawning, the provider endpoint is probed with a plain TCP connect so an
unreachable server is reported as such without involving the bridge.
*/

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::runtime::Runtime;
use tracing::{debug, trace};

use super::{
    Binding, Environment, NameClassPair, NamingClient, NamingSession, ProviderUrl,
    parse_provider_url,
};
use crate::error::NamingError;

/* ---- Wire Messages ---- */

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Connect {
        environment: &'a Environment,
        #[serde(skip_serializing_if = "Option::is_none")]
        policy: Option<&'a str>,
    },
    Lookup {
        name: &'a str,
    },
    List {
        name: &'a str,
    },
}

#[derive(Debug, Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    binding: Option<Binding>,
    #[serde(default)]
    entries: Option<Vec<NameClassPair>>,
}

impl Response {
    fn into_result(self) -> Result<Self, NamingError> {
        if self.ok {
            return Ok(self);
        }
        let message = self
            .message
            .unwrap_or_else(|| "bridge reported an unspecified failure".to_string());
        Err(match self.kind.as_deref() {
            Some("communication") => NamingError::Communication(message),
            Some("configuration") => NamingError::Configuration(message),
            Some("not_found") => NamingError::NotFound(message),
            _ => NamingError::Naming(message),
        })
    }
}

/* ---- Client ---- */

/// Opens sessions through a bridge process.
#[derive(Debug, Clone, Default)]
pub struct BridgeClient {
    command_line: Option<String>,
    timeout: Option<Duration>,
}

impl BridgeClient {
    /// A zero timeout means no bound.
    pub fn new(command_line: Option<String>, timeout: Option<Duration>) -> Self {
        Self {
            command_line: command_line.filter(|c| !c.trim().is_empty()),
            timeout: timeout.filter(|d| !d.is_zero()),
        }
    }

    fn argv(&self) -> Result<Vec<String>, NamingError> {
        let Some(line) = &self.command_line else {
            return Err(NamingError::Configuration(
                "no naming bridge configured (use --bridge or ASX_BRIDGE)".to_string(),
            ));
        };
        let parts = shell_words::split(line).map_err(|e| {
            NamingError::Configuration(format!("failed to parse bridge command line: {e}"))
        })?;
        if parts.is_empty() {
            return Err(NamingError::Configuration(
                "bridge command line is empty".to_string(),
            ));
        }
        Ok(parts)
    }
}

impl NamingClient for BridgeClient {
    fn open(&self, env: &Environment) -> Result<Box<dyn NamingSession>, NamingError> {
        let raw_url = env.provider_url().ok_or_else(|| {
            NamingError::Configuration("environment has no provider URL".to_string())
        })?;
        let url = parse_provider_url(raw_url)?;
        let argv = self.argv()?;

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| NamingError::Configuration(format!("failed to create runtime: {e}")))?;

        let policy = crate::security::installed_policy().map(|p| p.text.as_str());
        let timeout = self.timeout;
        let io = rt.block_on(async {
            probe(&url, timeout).await?;
            let mut io = BridgeIo::spawn(&argv)?;
            bounded(timeout, "bridge handshake", NamingError::Configuration, async {
                io.call(&Request::Connect {
                    environment: env,
                    policy,
                })
                .await
            })
            .await?;
            Ok::<_, NamingError>(io)
        })?;

        debug!(url = %url, bridge = %argv[0], "Naming bridge session opened");
        Ok(Box::new(BridgeSession {
            io: RefCell::new(io),
            rt,
        }))
    }
}

/// Plain TCP connect to the provider endpoint.
async fn probe(url: &ProviderUrl, timeout: Option<Duration>) -> Result<(), NamingError> {
    let endpoint = url.endpoint();
    trace!(endpoint = %endpoint, "Probing provider endpoint");
    bounded(timeout, "connect", NamingError::Communication, async {
        TcpStream::connect(&endpoint)
            .await
            .map(drop)
            .map_err(|e| NamingError::Communication(format!("{endpoint}: {e}")))
    })
    .await
}

async fn bounded<T>(
    limit: Option<Duration>,
    what: &str,
    on_timeout: fn(String) -> NamingError,
    fut: impl Future<Output = Result<T, NamingError>>,
) -> Result<T, NamingError> {
    match limit {
        Some(d) => tokio::time::timeout(d, fut).await.map_err(|_| {
            on_timeout(format!("{what} timed out after {}s", d.as_secs()))
        })?,
        None => fut.await,
    }
}

/* ---- Session ---- */

struct BridgeIo {
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl BridgeIo {
    fn spawn(argv: &[String]) -> Result<Self, NamingError> {
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // stdout carries the protocol; bridge chatter on stderr is dropped.
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                NamingError::Configuration(format!(
                    "failed to spawn naming bridge '{}': {e}",
                    argv[0]
                ))
            })?;
        let stdin = child.stdin.take().ok_or_else(|| {
            NamingError::Configuration("bridge stdin unavailable".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            NamingError::Configuration("bridge stdout unavailable".to_string())
        })?;
        Ok(Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// One request/reply exchange. Pipe failures mean the bridge itself is
    /// broken (the endpoint was already probed), so they surface as
    /// configuration errors rather than communication errors.
    async fn call(&mut self, req: &Request<'_>) -> Result<Response, NamingError> {
        let mut line = serde_json::to_string(req)
            .map_err(|e| NamingError::Naming(format!("failed to encode bridge request: {e}")))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| NamingError::Configuration(format!("bridge write failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| NamingError::Configuration(format!("bridge write failed: {e}")))?;

        let reply = self
            .stdout
            .next_line()
            .await
            .map_err(|e| NamingError::Configuration(format!("bridge read failed: {e}")))?
            .ok_or_else(|| {
                NamingError::Configuration("bridge exited without replying".to_string())
            })?;
        trace!(reply = %reply, "Bridge reply");
        let resp: Response = serde_json::from_str(&reply)
            .map_err(|e| NamingError::Naming(format!("malformed bridge reply: {e}")))?;
        resp.into_result()
    }
}

struct BridgeSession {
    // Declared before `rt`: the child is dropped while the runtime is still alive.
    io: RefCell<BridgeIo>,
    rt: Runtime,
}

impl NamingSession for BridgeSession {
    fn lookup(&self, name: &str) -> Result<Binding, NamingError> {
        let mut io = self.io.borrow_mut();
        let resp = self.rt.block_on(io.call(&Request::Lookup { name }))?;
        resp.binding
            .ok_or_else(|| NamingError::Naming("bridge reply carried no binding".to_string()))
    }

    fn list(&self, name: &str) -> Result<Vec<NameClassPair>, NamingError> {
        let mut io = self.io.borrow_mut();
        let resp = self.rt.block_on(io.call(&Request::List { name }))?;
        Ok(resp.entries.unwrap_or_default())
    }
}
