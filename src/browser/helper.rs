//! Playwright helper integration: the embedded engine script, the stdio
//! wire format, and availability checks for Node.js and Playwright.
//!
//! The helper is a long-lived Node process that launches one headless
//! Chromium instance and then serves newline-delimited JSON commands on
//! stdin. Replies carry the id of the request they answer; unsolicited
//! lines are `event` notifications (`ready`, `fatal`).

use std::io;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{PageshotError, Result};

/// Persistent engine script. One browser instance, one Playwright context
/// per render session; contexts share no cookies, storage, or history.
pub(crate) const ENGINE_SCRIPT: &str = r#"
const [, headlessFlag] = process.argv;

function reply(obj) {
  process.stdout.write(JSON.stringify(obj) + '\n');
}

async function main() {
  let browser;
  try {
    const { chromium } = require('playwright');
    browser = await chromium.launch({ headless: headlessFlag !== '0' });
  } catch (err) {
    reply({ event: 'fatal', message: err && err.message ? err.message : String(err) });
    process.exit(1);
  }
  reply({ event: 'ready' });

  const sessions = new Map();
  let nextSession = 1;

  async function handle(req) {
    if (req.op === 'open') {
      const id = nextSession++;
      sessions.set(id, {});
      return { session: id };
    }
    if (req.op === 'shutdown') {
      reply({ id: req.id, status: 'ok' });
      await browser.close();
      process.exit(0);
    }

    const s = sessions.get(req.session);
    if (!s) {
      throw new Error('unknown session ' + req.session);
    }

    switch (req.op) {
      case 'configure': {
        s.context = await browser.newContext({
          viewport: { width: req.width, height: req.height },
          deviceScaleFactor: 1
        });
        s.page = await s.context.newPage();
        return {};
      }
      case 'navigate': {
        await s.page.goto(req.url, { waitUntil: 'networkidle', timeout: req.timeoutMs });
        return {};
      }
      case 'capture': {
        const buf = await s.page.screenshot({ type: 'jpeg', quality: req.quality, fullPage: false });
        return { data: buf.toString('base64') };
      }
      case 'close': {
        sessions.delete(req.session);
        if (s.context) {
          await s.context.close();
        }
        return {};
      }
      default:
        throw new Error('unknown op ' + req.op);
    }
  }

  const rl = require('readline').createInterface({ input: process.stdin });
  rl.on('line', (line) => {
    let req;
    try {
      req = JSON.parse(line);
    } catch (err) {
      return;
    }
    handle(req).then(
      (extra) => reply(Object.assign({ id: req.id, status: 'ok' }, extra)),
      (err) => {
        const message = err && err.message ? err.message : String(err);
        const kind = err && err.name === 'TimeoutError' ? 'timeout' : 'error';
        reply({ id: req.id, status: 'error', kind, message });
      }
    );
  });
  rl.on('close', async () => {
    await browser.close();
    process.exit(0);
  });
}

main();
"#;

/// Script to check that the Playwright npm package resolves.
const PLAYWRIGHT_CHECK_SCRIPT: &str = "require('playwright'); process.stdout.write('ok');";

/// Timeout for the node/playwright availability checks.
pub(crate) const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// A command sent to the engine helper. Fields irrelevant to an op stay
/// `None` and are omitted from the wire line.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EngineRequest<'a> {
    pub id: u64,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
}

impl<'a> EngineRequest<'a> {
    fn base(id: u64, op: &'static str) -> Self {
        Self {
            id,
            op,
            session: None,
            url: None,
            width: None,
            height: None,
            timeout_ms: None,
            quality: None,
        }
    }

    pub fn open(id: u64) -> Self {
        Self::base(id, "open")
    }

    pub fn configure(id: u64, session: u64, width: u32, height: u32) -> Self {
        Self {
            session: Some(session),
            width: Some(width),
            height: Some(height),
            ..Self::base(id, "configure")
        }
    }

    pub fn navigate(id: u64, session: u64, url: &'a str, timeout: Duration) -> Self {
        Self {
            session: Some(session),
            url: Some(url),
            timeout_ms: Some(timeout.as_millis() as u64),
            ..Self::base(id, "navigate")
        }
    }

    pub fn capture(id: u64, session: u64, quality: u8) -> Self {
        Self {
            session: Some(session),
            quality: Some(quality),
            ..Self::base(id, "capture")
        }
    }

    pub fn close(id: u64, session: u64) -> Self {
        Self {
            session: Some(session),
            ..Self::base(id, "close")
        }
    }

    pub fn shutdown(id: u64) -> Self {
        Self::base(id, "shutdown")
    }
}

/// A line received from the engine helper: either a reply to a request
/// (`id` present) or an event notification.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EngineReply {
    pub id: Option<u64>,
    pub event: Option<String>,
    pub status: Option<String>,
    pub kind: Option<String>,
    pub message: Option<String>,
    pub session: Option<u64>,
    pub data: Option<String>,
}

impl EngineReply {
    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some("ok")
    }

    pub fn is_timeout(&self) -> bool {
        self.kind.as_deref() == Some("timeout")
    }

    pub fn error_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "no additional details".to_string())
    }
}

/// Maps a spawn error to a startup failure with an actionable message.
pub(crate) fn map_spawn_error(err: io::Error, command: &str) -> PageshotError {
    if err.kind() == io::ErrorKind::NotFound {
        PageshotError::Startup(format!(
            "unable to spawn browser engine helper; '{}' was not found on PATH",
            command
        ))
    } else {
        PageshotError::Startup(format!("unable to spawn browser engine helper: {err}"))
    }
}

/// Ensures Node.js is available before attempting an engine launch.
pub(crate) async fn ensure_node_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let status = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.status())
        .await
        .map_err(|_| {
            PageshotError::Startup(format!(
                "timed out checking node availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !status.success() {
        return Err(PageshotError::Startup(format!(
            "node command {:?} is not available (exit {})",
            node_command, status
        )));
    }

    Ok(())
}

/// Ensures the Playwright npm package is installed.
pub(crate) async fn ensure_playwright_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(PLAYWRIGHT_CHECK_SCRIPT)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            PageshotError::Startup(format!(
                "timed out checking Playwright availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr
            .to_ascii_lowercase()
            .contains("cannot find module 'playwright'")
        {
            return Err(PageshotError::Startup(
                "Playwright npm package is missing; install with `npm install playwright` \
                 and `npx playwright install chromium`"
                    .to_string(),
            ));
        }
        return Err(PageshotError::Startup(format!(
            "Playwright availability check failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}
