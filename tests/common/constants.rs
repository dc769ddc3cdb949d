//! Shared constants for end-to-end tests

// ============================================================================
// Sync Program
// ============================================================================

/// Interpreter used instead of python, every fixture script is plain sh.
pub const TEST_INTERPRETER: &str = "sh";

/// Entry point file name inside the sync directory
pub const ENTRY_POINT: &str = "index.py";

/// Prints progress lines and the environment it was given, then succeeds.
pub const SUCCEEDING_SCRIPT: &str = r#"echo "Starting sync"
echo "[1/2] url=$RADARR_A_URL"
echo "[2/2] interval=$SYNC_INTERVAL_SECONDS docker=$IS_IN_DOCKER"
echo "warning on stderr" >&2
"#;

/// Number of stdout/stderr line pairs printed by [`INTERLEAVING_SCRIPT`].
pub const INTERLEAVED_PAIRS: usize = 200;

/// Alternates stdout and stderr lines: out0, err0, out1, err1, ...
pub const INTERLEAVING_SCRIPT: &str = r#"i=0
while [ $i -lt 200 ]; do
  echo out$i
  echo err$i 1>&2
  i=$((i+1))
done
"#;

/// Prints one line and fails with exit code 3.
pub const FAILING_SCRIPT: &str = r#"echo "about to fail"
exit 3
"#;

/// Prints one line and then blocks until killed.
pub const HANGING_SCRIPT: &str = r#"echo "working"
exec sleep 30
"#;

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness checks (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Per-request timeout of the test client (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum time to wait for a run to settle (milliseconds)
pub const RUN_SETTLE_TIMEOUT_MS: u64 = 10_000;
