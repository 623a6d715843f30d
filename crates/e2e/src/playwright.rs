//! Playwright browser session over a Node bridge process
//!
//! The session writes a small Node script to a temp directory and keeps it
//! running for the lifetime of the run. Requests and responses are one JSON
//! object per line; bridge responses carry a fixed prefix so that whatever
//! Playwright or Stagehand print on stdout is skipped.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::{
    ActionDescriptor, ActionResolver, BrowserDriver, ElementHandle, LoadState, Locator,
    NavigateOptions, PageHandle, WaitState,
};
use crate::config::{Backend, PlaywrightConfig};
use crate::error::{E2eError, E2eResult};

const RESPONSE_PREFIX: &str = "@@pagerun ";
const CONFIG_PLACEHOLDER: &str = "__PAGERUN_CONFIG__";

/// Browser session backed by a long-lived Node bridge
pub struct PlaywrightSession {
    child: Mutex<Child>,
    io: Mutex<BridgeIo>,
    next_id: AtomicU64,
    grace: Duration,
    backend: Backend,
    _script_dir: Option<tempfile::TempDir>,
}

struct BridgeIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

impl BridgeIo {
    /// Read until the response for `id`, skipping log noise and stale replies.
    async fn read_response(&mut self, id: u64) -> E2eResult<BridgeResponse> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| E2eError::BridgeClosed("stdout closed".to_string()))?;

            let Some(body) = line.strip_prefix(RESPONSE_PREFIX) else {
                debug!(target: "pagerun::bridge", "{}", line);
                continue;
            };

            let response: BridgeResponse = serde_json::from_str(body)?;
            if response.id == id {
                return Ok(response);
            }
            warn!(expected = id, got = response.id, "Discarding stale bridge response");
        }
    }
}

impl PlaywrightSession {
    /// Start the bridge and wait until the browser is up
    pub async fn launch(config: &PlaywrightConfig) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("pagerun-bridge.js");
        std::fs::write(&script_path, build_bridge_script(config)?)?;

        info!(
            backend = ?config.backend,
            browser = config.browser.as_str(),
            "Launching browser bridge"
        );

        let mut cmd = TokioCommand::new(&config.node_binary);
        cmd.arg(&script_path);

        let mut session = Self::spawn(
            cmd,
            Duration::from_millis(config.startup_timeout_ms),
            Duration::from_millis(config.request_grace_ms),
        )
        .await
        .map_err(|e| match e {
            E2eError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => E2eError::Config(format!(
                "node binary not found: {}",
                config.node_binary.display()
            )),
            other => other,
        })?;
        session.backend = config.backend;
        session._script_dir = Some(script_dir);
        Ok(session)
    }

    /// Spawn an already-configured bridge command and wait for its ready line
    pub async fn spawn(mut cmd: TokioCommand, startup_timeout: Duration, grace: Duration) -> E2eResult<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::BridgeClosed("stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::BridgeClosed("stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "pagerun::bridge", "{}", line);
                }
            });
        }

        let mut io = BridgeIo {
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        let ready = match tokio::time::timeout(startup_timeout, io.read_response(0)).await {
            Ok(response) => response?,
            Err(_) => return Err(E2eError::timeout("browser bridge startup", startup_timeout)),
        };
        if !ready.ok {
            return Err(E2eError::Playwright(format!(
                "bridge failed to start: {}",
                ready.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        debug!("Browser bridge ready");

        Ok(Self {
            child: Mutex::new(child),
            io: Mutex::new(io),
            next_id: AtomicU64::new(1),
            grace,
            backend: Backend::Stagehand,
            _script_dir: None,
        })
    }

    /// Send one command and wait for its response
    async fn request(&self, cmd: &str, mut params: Value, timeout: Duration) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        params["id"] = json!(id);
        params["cmd"] = json!(cmd);

        let mut line = serde_json::to_string(&params)?;
        line.push('\n');

        let mut io = self.io.lock().await;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let wait = timeout + self.grace;
        let response = match tokio::time::timeout(wait, io.read_response(id)).await {
            Ok(response) => response?,
            Err(_) => return Err(E2eError::timeout(format!("bridge reply to {}", cmd), wait)),
        };

        if response.ok {
            return Ok(response.result);
        }
        let message = response.error.unwrap_or_else(|| "unknown error".to_string());
        if response.timeout {
            Err(E2eError::timeout(format!("{}: {}", cmd, message), timeout))
        } else {
            Err(E2eError::Playwright(message))
        }
    }

    /// Close the browser and wait for the bridge to exit
    pub async fn close(self) -> E2eResult<()> {
        let closed = self
            .request("close", json!({}), Duration::from_secs(10))
            .await;
        if let Err(e) = &closed {
            warn!(error = %e, "Bridge did not close cleanly");
        }

        let mut child = self.child.into_inner();
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(status) => {
                debug!("Bridge exited with {}", status?);
            }
            Err(_) => {
                warn!("Bridge still running, killing it");
                child.kill().await?;
            }
        }
        closed.map(|_| ())
    }
}

/// Playwright treats a zero timeout as "wait forever".
fn timeout_ms(timeout: Duration) -> u64 {
    (timeout.as_millis() as u64).max(1)
}

#[async_trait]
impl PageHandle for PlaywrightSession {
    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> E2eResult<()> {
        self.request(
            "waitForLoadState",
            json!({ "state": state.as_str(), "timeout": timeout_ms(timeout) }),
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn wait_for_function(&self, expression: &str, timeout: Duration) -> E2eResult<()> {
        self.request(
            "waitForFunction",
            json!({ "expression": expression, "timeout": timeout_ms(timeout) }),
            timeout,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightSession {
    async fn navigate(&self, url: &str, options: NavigateOptions) -> E2eResult<()> {
        info!("Navigating to {}", url);
        self.request(
            "goto",
            json!({
                "url": url,
                "waitUntil": options.wait_until.as_str(),
                "timeout": timeout_ms(options.timeout),
            }),
            options.timeout,
        )
        .await
        .map_err(|e| E2eError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn locate_and_wait(
        &self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<ElementHandle> {
        let result = self
            .request(
                "locate",
                json!({
                    "selector": locator.selector,
                    "frame": locator.frame,
                    "state": state.as_str(),
                    "timeout": timeout_ms(timeout),
                }),
                timeout,
            )
            .await?;

        let id = result
            .as_str()
            .ok_or_else(|| E2eError::ElementNotFound(locator.to_string()))?;
        Ok(ElementHandle::new(id, locator.clone()))
    }

    async fn fill_field(&self, locator: &Locator, value: &str, timeout: Duration) -> E2eResult<()> {
        self.request(
            "fill",
            json!({
                "selector": locator.selector,
                "frame": locator.frame,
                "value": value,
                "timeout": timeout_ms(timeout),
            }),
            timeout,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ActionResolver for PlaywrightSession {
    async fn resolve_and_preview(&self, instruction: &str) -> E2eResult<ActionDescriptor> {
        let resolution_error = |reason: String| E2eError::ActionResolution {
            instruction: instruction.to_string(),
            reason,
        };

        if self.backend != Backend::Stagehand {
            return Err(resolution_error("observe requires the stagehand backend".to_string()));
        }

        // Model calls are slow; the bridge applies no timeout of its own here.
        let result = self
            .request("observe", json!({ "instruction": instruction }), Duration::from_secs(120))
            .await
            .map_err(|e| resolution_error(e.to_string()))?;

        serde_json::from_value(result).map_err(|e| resolution_error(e.to_string()))
    }

    async fn perform_action(&self, action: &ActionDescriptor) -> E2eResult<()> {
        info!(method = %action.method, selector = %action.selector, "Performing: {}", action.description);
        self.request("act", json!({ "action": action }), Duration::from_secs(120))
            .await?;
        Ok(())
    }
}

/// Render the Node bridge script for `config`
pub fn build_bridge_script(config: &PlaywrightConfig) -> E2eResult<String> {
    let embedded = json!({
        "backend": config.backend,
        "browser": config.browser.as_str(),
        "headless": config.headless,
        "viewportWidth": config.viewport_width,
        "viewportHeight": config.viewport_height,
        "domSettleTimeoutMs": config.dom_settle_timeout_ms,
        "modelName": config.model_name,
        "apiKeyEnv": config.api_key_env,
    });
    Ok(BRIDGE_SCRIPT.replace(CONFIG_PLACEHOLDER, &serde_json::to_string(&embedded)?))
}

const BRIDGE_SCRIPT: &str = r#"
const path = require('path');
const readline = require('readline');
const { createRequire } = require('module');

const CONFIG = __PAGERUN_CONFIG__;
const PREFIX = '@@pagerun ';
const load = createRequire(path.join(process.cwd(), 'pagerun-bridge.js'));

function reply(message) {
  process.stdout.write(PREFIX + JSON.stringify(message) + '\n');
}

function describe(error) {
  return String((error && error.message) || error);
}

async function launch() {
  const viewport = { width: CONFIG.viewportWidth, height: CONFIG.viewportHeight };
  if (CONFIG.backend === 'stagehand') {
    const { Stagehand } = load('@browserbasehq/stagehand');
    const stagehand = new Stagehand({
      env: 'LOCAL',
      verbose: 1,
      domSettleTimeoutMs: CONFIG.domSettleTimeoutMs,
      modelName: CONFIG.modelName,
      modelClientOptions: { apiKey: process.env[CONFIG.apiKeyEnv] },
      localBrowserLaunchOptions: { headless: CONFIG.headless, viewport },
      logger: (line) => console.error(JSON.stringify(line)),
    });
    await stagehand.init();
    return { page: stagehand.page, canObserve: true, close: () => stagehand.close() };
  }

  const playwright = load('playwright');
  const browser = await playwright[CONFIG.browser].launch({ headless: CONFIG.headless });
  const context = await browser.newContext({ viewport });
  const page = await context.newPage();
  return { page, canObserve: false, close: () => browser.close() };
}

(async () => {
  let session;
  try {
    session = await launch();
  } catch (error) {
    reply({ id: 0, ok: false, error: describe(error) });
    process.exit(1);
  }
  const { page } = session;
  const scope = (frame) => (frame ? page.frameLocator(frame) : page);
  let nextElement = 1;

  const handlers = {
    goto: async (r) => {
      await page.goto(r.url, { waitUntil: r.waitUntil, timeout: r.timeout });
      return null;
    },
    waitForLoadState: async (r) => {
      await page.waitForLoadState(r.state, { timeout: r.timeout });
      return null;
    },
    waitForFunction: async (r) => {
      await page.waitForFunction(r.expression, undefined, { timeout: r.timeout });
      return null;
    },
    locate: async (r) => {
      await scope(r.frame).locator(r.selector).waitFor({ state: r.state, timeout: r.timeout });
      return `element-${nextElement++}`;
    },
    fill: async (r) => {
      await scope(r.frame).locator(r.selector).fill(r.value, { timeout: r.timeout });
      return null;
    },
    observe: async (r) => {
      if (!session.canObserve) throw new Error('observe requires the stagehand backend');
      const [action] = await page.observe(r.instruction);
      if (!action) throw new Error('no element matched the instruction');
      return {
        description: action.description,
        method: action.method || action.action,
        selector: action.selector,
        arguments: action.arguments || [],
      };
    },
    act: async (r) => {
      if (!session.canObserve) throw new Error('act requires the stagehand backend');
      await page.act(r.action);
      return null;
    },
    close: async () => {
      await session.close();
      return null;
    },
  };

  reply({ id: 0, ok: true, result: 'ready' });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let request;
    try {
      request = JSON.parse(line);
    } catch (error) {
      console.error('unparseable request: ' + line);
      continue;
    }
    try {
      const handler = handlers[request.cmd];
      if (!handler) throw new Error('unknown command: ' + request.cmd);
      reply({ id: request.id, ok: true, result: await handler(request) });
    } catch (error) {
      reply({
        id: request.id,
        ok: false,
        error: describe(error),
        timeout: Boolean(error && error.name === 'TimeoutError'),
      });
    }
    if (request.cmd === 'close') break;
  }
  process.exit(0);
})();
"#;
