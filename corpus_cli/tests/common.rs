use std::path::Path;

use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub fn corpus_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("corpus"));
	cmd.env("NO_COLOR", "1").env_remove("CORPUS_LOG").env_remove("NODE_ENV");
	cmd
}

pub fn write_file(root: &Path, relative: &str, content: &str) {
	let path = root.join(relative);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create {}: {e}", parent.display()));
	}
	std::fs::write(&path, content).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));
}

pub fn stdout_json(output: &std::process::Output) -> serde_json::Value {
	serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
		panic!(
			"stdout is not JSON ({e}): {}",
			String::from_utf8_lossy(&output.stdout)
		)
	})
}
