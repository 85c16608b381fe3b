//! Shared test support: stub engine processes.
//!
//! The stubs are small shell scripts that speak the engine helper wire
//! protocol on stdio, so the full launch/capture/teardown lifecycle can be
//! exercised without Node.js, Playwright, or a browser installed. Each stub
//! appends to log files in its scratch directory so tests can assert how
//! many launches and sessions actually happened.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use pageshot::{CaptureDefaults, EngineOptions, ServiceConfig, Viewport};

/// Bytes every healthy stub returns for a capture ("jpegdata" in base64).
pub const JPEG_BYTES: &[u8] = b"jpegdata";

/// Answers every command successfully.
const HEALTHY_STUB: &str = r#"
dir="$1"
echo started >> "$dir/launches.log"
echo '{"event":"ready"}'
while IFS= read -r line; do
  id=${line#*\"id\":}
  id=${id%%,*}
  id=${id%%\}*}
  case "$line" in
    *'"op":"open"'*)
      echo open >> "$dir/sessions.log"
      echo "{\"id\":$id,\"status\":\"ok\",\"session\":$id}"
      ;;
    *'"op":"configure"'*)
      echo "{\"id\":$id,\"status\":\"ok\"}"
      ;;
    *'"op":"navigate"'*)
      echo "{\"id\":$id,\"status\":\"ok\"}"
      ;;
    *'"op":"capture"'*)
      echo "{\"id\":$id,\"status\":\"ok\",\"data\":\"anBlZ2RhdGE=\"}"
      ;;
    *'"op":"close"'*)
      echo close >> "$dir/sessions.log"
      echo "{\"id\":$id,\"status\":\"ok\"}"
      ;;
    *'"op":"shutdown"'*)
      echo "{\"id\":$id,\"status\":\"ok\"}"
      exit 0
      ;;
  esac
done
exit 0
"#;

/// Like the healthy stub, but every navigation times out.
const NAV_TIMEOUT_STUB: &str = r#"
dir="$1"
echo started >> "$dir/launches.log"
echo '{"event":"ready"}'
while IFS= read -r line; do
  id=${line#*\"id\":}
  id=${id%%,*}
  id=${id%%\}*}
  case "$line" in
    *'"op":"open"'*)
      echo open >> "$dir/sessions.log"
      echo "{\"id\":$id,\"status\":\"ok\",\"session\":$id}"
      ;;
    *'"op":"navigate"'*)
      echo "{\"id\":$id,\"status\":\"error\",\"kind\":\"timeout\",\"message\":\"Timeout 1500ms exceeded\"}"
      ;;
    *'"op":"close"'*)
      echo close >> "$dir/sessions.log"
      echo "{\"id\":$id,\"status\":\"ok\"}"
      ;;
    *'"op":"shutdown"'*)
      echo "{\"id\":$id,\"status\":\"ok\"}"
      exit 0
      ;;
    *)
      echo "{\"id\":$id,\"status\":\"ok\"}"
      ;;
  esac
done
exit 0
"#;

/// Reports a fatal startup error after a short delay. The delay gives
/// concurrent callers time to pile onto the same launch attempt.
const FAILING_LAUNCH_STUB: &str = r#"
dir="$1"
echo started >> "$dir/launches.log"
sleep 0.5
echo '{"event":"fatal","message":"browser executable is missing"}'
exit 1
"#;

/// Exits abruptly on the first navigate ever; behaves like the healthy
/// stub on every later launch.
const CRASH_ON_FIRST_NAVIGATE_STUB: &str = r#"
dir="$1"
echo started >> "$dir/launches.log"
echo '{"event":"ready"}'
while IFS= read -r line; do
  id=${line#*\"id\":}
  id=${id%%,*}
  id=${id%%\}*}
  case "$line" in
    *'"op":"open"'*)
      echo open >> "$dir/sessions.log"
      echo "{\"id\":$id,\"status\":\"ok\",\"session\":$id}"
      ;;
    *'"op":"navigate"'*)
      if [ -f "$dir/crashed" ]; then
        echo "{\"id\":$id,\"status\":\"ok\"}"
      else
        : > "$dir/crashed"
        exit 1
      fi
      ;;
    *'"op":"capture"'*)
      echo "{\"id\":$id,\"status\":\"ok\",\"data\":\"anBlZ2RhdGE=\"}"
      ;;
    *'"op":"close"'*)
      echo close >> "$dir/sessions.log"
      echo "{\"id\":$id,\"status\":\"ok\"}"
      ;;
    *'"op":"shutdown"'*)
      echo "{\"id\":$id,\"status\":\"ok\"}"
      exit 0
      ;;
    *)
      echo "{\"id\":$id,\"status\":\"ok\"}"
      ;;
  esac
done
exit 0
"#;

pub struct StubEngine {
    dir: TempDir,
}

impl StubEngine {
    pub fn healthy() -> Self {
        Self::with_script(HEALTHY_STUB)
    }

    pub fn nav_timeout() -> Self {
        Self::with_script(NAV_TIMEOUT_STUB)
    }

    pub fn failing_launch() -> Self {
        Self::with_script(FAILING_LAUNCH_STUB)
    }

    pub fn crash_on_first_navigate() -> Self {
        Self::with_script(CRASH_ON_FIRST_NAVIGATE_STUB)
    }

    fn with_script(script: &str) -> Self {
        let dir = TempDir::new().expect("create stub scratch dir");
        std::fs::write(dir.path().join("engine.sh"), script).expect("write stub script");
        Self { dir }
    }

    pub fn engine_command(&self) -> Vec<String> {
        vec![
            "sh".to_string(),
            self.dir.path().join("engine.sh").display().to_string(),
            self.dir.path().display().to_string(),
        ]
    }

    /// A service configuration driving this stub, with short timeouts so
    /// failure paths resolve quickly.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            engine: EngineOptions {
                engine_command: Some(self.engine_command()),
                launch_timeout: Duration::from_secs(5),
                shutdown_timeout: Duration::from_secs(2),
                reply_grace: Duration::from_secs(2),
                ..EngineOptions::default()
            },
            defaults: CaptureDefaults {
                viewport: Viewport::default(),
                settle: Duration::from_millis(1),
                navigation_timeout: Duration::from_millis(1500),
                quality: 90,
            },
            idle_window: Duration::from_secs(60),
            max_sessions: 4,
        }
    }

    /// Number of times the stub process was started.
    pub fn launches(&self) -> usize {
        count_lines(self.dir.path().join("launches.log"), "started")
    }

    /// Number of logged session events of the given kind ("open"/"close").
    pub fn session_events(&self, kind: &str) -> usize {
        count_lines(self.dir.path().join("sessions.log"), kind)
    }
}

fn count_lines(path: PathBuf, needle: &str) -> usize {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents.lines().filter(|line| *line == needle).count(),
        Err(_) => 0,
    }
}
