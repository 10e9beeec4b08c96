use obi_common::room::{ContextOptions, RoomPlan};
use obi_common::{ExecutionContext, ProjectConfig};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch project with fake `cmake` and `pkill` on the tool path.
///
/// The fakes append their arguments, one invocation per line, to
/// `cmake.calls` / `pkill.calls` in the project directory. The fake
/// `pkill` exits 1 ("no process matched").
pub struct TestProject {
    pub dir: TempDir,
    pub tool_bin: PathBuf,
}

impl TestProject {
    pub fn new(yaml: &str) -> Self {
        crate::test_log!("FIXTURE: Creating test project");

        let dir = TempDir::new().expect("Failed to create temp dir");
        let tool_bin = dir.path().join("fakebin");
        fs::create_dir_all(&tool_bin).expect("Failed to create fakebin");

        let project = Self { dir, tool_bin };
        project.write_config(yaml);
        project.write_tool("cmake", &project.calls_path("cmake"), 0);
        project.write_tool("pkill", &project.calls_path("pkill"), 1);
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_config(&self, yaml: &str) {
        fs::write(self.root().join("project.yaml"), yaml).expect("Failed to write project.yaml");
    }

    fn write_tool(&self, name: &str, log: &Path, exit_code: i32) {
        let path = self.tool_bin.join(name);
        fs::write(
            &path,
            format!(
                "#!/bin/sh\nprintf '%s\\n' \"$*\" >> '{}'\nexit {exit_code}\n",
                log.display()
            ),
        )
        .expect("Failed to write fake tool");
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("Failed to chmod fake tool");
    }

    pub fn calls_path(&self, tool: &str) -> PathBuf {
        self.root().join(format!("{tool}.calls"))
    }

    /// Argument lines recorded by a fake tool; empty when never invoked.
    pub fn calls(&self, tool: &str) -> Vec<String> {
        fs::read_to_string(self.calls_path(tool))
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn options(&self) -> ContextOptions {
        let cwd = std::env::current_dir().expect("Failed to read cwd");
        ContextOptions::new("tester", cwd)
            .tool_bin(Some(self.tool_bin.clone()))
            .echo(false)
    }

    pub fn plan(&self, room: &str, options: ContextOptions) -> RoomPlan {
        RoomPlan::resolve(&self.project(), room, options).expect("Failed to resolve room")
    }

    pub fn local_context(&self) -> ExecutionContext {
        self.plan("localhost", self.options())
            .contexts()
            .remove(0)
    }

    pub fn project(&self) -> ProjectConfig {
        obi_common::config::load_config(&self.root().join("project.yaml"))
            .expect("Failed to load project.yaml")
    }
}
