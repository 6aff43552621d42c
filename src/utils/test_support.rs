// mongobackup/src/utils/test_support.rs
//
// Fake mongodump executables for tests. Spawning tests are serialized so a
// script is never executed while another test still holds it open for writing.
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use tempfile::TempDir;

static SPAWN_LOCK: Mutex<()> = Mutex::new(());

const ARGS_FILE: &str = "args.txt";

pub struct FakeDumpTool {
    pub dir: TempDir,
    pub executable: PathBuf,
    _guard: MutexGuard<'static, ()>,
}

impl FakeDumpTool {
    fn with_script(body: &str) -> Result<Self> {
        let guard = SPAWN_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let dir = tempfile::tempdir().context("Failed to create fake tool directory")?;
        let executable = dir.path().join("mongodump");
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > \"$(dirname \"$0\")/{}\"\n{}",
            ARGS_FILE, body
        );
        fs::write(&executable, script).context("Failed to write fake mongodump")?;
        fs::set_permissions(&executable, fs::Permissions::from_mode(0o755))?;
        Ok(FakeDumpTool {
            dir,
            executable,
            _guard: guard,
        })
    }

    /// A tool that writes `content` to the path given by `--archive=` and exits 0.
    /// `content` must not contain single quotes.
    pub fn writing_archive(content: &str) -> Result<Self> {
        Self::with_script(&format!(
            "for arg in \"$@\"; do\n  case \"$arg\" in\n    --archive=*) printf '%s' '{}' > \"${{arg#--archive=}}\" ;;\n  esac\ndone\n",
            content
        ))
    }

    /// A tool that reports an error on stderr and exits with `code`.
    pub fn failing(code: i32) -> Result<Self> {
        Self::with_script(&format!(
            "echo 'Failed: error connecting to db server: no reachable servers' >&2\nexit {}\n",
            code
        ))
    }

    /// Arguments the tool received on its last invocation.
    pub fn recorded_args(&self) -> Result<Vec<String>> {
        let raw = fs::read_to_string(self.dir.path().join(ARGS_FILE))
            .context("Fake mongodump was never invoked")?;
        Ok(raw.lines().map(str::to_string).collect())
    }
}
