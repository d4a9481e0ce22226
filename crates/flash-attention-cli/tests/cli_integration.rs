use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Helper to get the path to an input fixture.
fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures")
        .join(name)
}

/// Helper to get the fa binary path.
fn fa_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fa"))
}

fn fa(args: &[&str]) -> Output {
    Command::new(fa_bin()).args(args).output().unwrap()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

/// `data` of the YAML printed by `fa run`.
fn run_data(out: &Output) -> Vec<f64> {
    let doc: serde_yaml::Value = serde_yaml::from_str(&stdout(out)).unwrap();
    doc["data"]
        .as_sequence()
        .unwrap()
        .iter()
        .map(|x| x.as_f64().unwrap())
        .collect()
}

// ================================================================
// run command
// ================================================================

mod run {
    use super::*;

    #[test]
    fn concrete_example() {
        let out = fa(&["run", fixture("concrete_example.yaml").to_str().unwrap()]);
        assert!(out.status.success(), "stderr: {}", stderr(&out));
        let text = stdout(&out);
        assert!(text.contains("dtype: f32"), "{text}");
        let data = run_data(&out);
        assert_eq!(data.len(), 2);
        assert!((data[0] - 6.6976).abs() < 1e-3, "{data:?}");
        assert!((data[1] - 6.6048).abs() < 1e-3, "{data:?}");
    }

    #[test]
    fn batched_strided_f64() {
        let out = fa(&["run", fixture("batched_strided.yaml").to_str().unwrap()]);
        assert!(out.status.success(), "stderr: {}", stderr(&out));
        assert!(stdout(&out).contains("dtype: f64"));
        let data = run_data(&out);
        let expected = [6.6976, 6.6048, 3.3024, 13.3952];
        for (a, b) in data.iter().zip(expected) {
            assert!((a - b).abs() < 1e-3, "{data:?}");
        }
    }

    #[test]
    fn zero_keys_fails() {
        let out = fa(&["run", fixture("zero_keys.yaml").to_str().unwrap()]);
        assert_eq!(out.status.code(), Some(1));
        let err = stderr(&out);
        assert!(err.contains("error: invalid shape for 'k'"), "{err}");
    }

    #[test]
    fn mixed_dtype_fails() {
        let out = fa(&["run", fixture("mixed_dtype.yaml").to_str().unwrap()]);
        assert_eq!(out.status.code(), Some(1));
        assert!(stderr(&out).contains("type mismatch for 'k'"));
    }

    #[test]
    fn missing_input_fails() {
        let out = fa(&["run", "/nonexistent/input.yaml"]);
        assert!(!out.status.success());
        assert!(stderr(&out).contains("failed to read"));
    }

    #[test]
    fn naive_backend_from_config_file() {
        let out = fa(&[
            "--config",
            fixture("naive_sequential.yaml").to_str().unwrap(),
            "run",
            fixture("concrete_example.yaml").to_str().unwrap(),
        ]);
        assert!(out.status.success(), "stderr: {}", stderr(&out));
        let data = run_data(&out);
        assert!((data[0] - 6.6976).abs() < 1e-3);
    }
}

// ================================================================
// config command
// ================================================================

mod config {
    use super::*;

    #[test]
    fn prints_defaults() {
        let out = fa(&["config"]);
        assert!(out.status.success());
        let text = stdout(&out);
        assert!(text.contains("backend: flash"), "{text}");
        assert!(text.contains("tile_size: 32"), "{text}");
    }

    #[test]
    fn reflects_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(&path, "tile_size: 4\nbackend: naive\n").unwrap();
        let out = fa(&["config", "--config", path.to_str().unwrap()]);
        assert!(out.status.success(), "stderr: {}", stderr(&out));
        let text = stdout(&out);
        assert!(text.contains("backend: naive"));
        assert!(text.contains("tile_size: 4"));
    }

    #[test]
    fn invalid_config_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(&path, "tile_size: 0\n").unwrap();
        let out = fa(&["--config", path.to_str().unwrap(), "config"]);
        assert_eq!(out.status.code(), Some(1));
        assert!(stderr(&out).contains("tile_size"));
    }

    #[test]
    fn shipped_default_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/default.yaml");
        let out = fa(&["--config", path.to_str().unwrap(), "config"]);
        assert!(out.status.success(), "stderr: {}", stderr(&out));
    }
}

// ================================================================
// bench and check commands
// ================================================================

mod bench {
    use super::*;

    #[test]
    fn small_bench_passes_sanity_check() {
        let out = fa(&["bench", "--batch", "2", "--heads", "3", "--seq", "16", "--dim", "8"]);
        assert!(out.status.success(), "stderr: {}", stderr(&out));
        let text = stdout(&out);
        assert!(text.contains("naive attention:"));
        assert!(text.contains("flash attention:"));
        assert!(text.contains("attn values sanity check: true"), "{text}");
    }

    #[test]
    fn impossible_tolerance_fails() {
        let out = fa(&[
            "bench", "--batch", "1", "--heads", "1", "--seq", "32", "--dim", "16", "--atol=-1",
        ]);
        assert_eq!(out.status.code(), Some(1));
        assert!(stdout(&out).contains("sanity check: false"));
    }

    #[test]
    fn check_passes() {
        let out = fa(&["check", "--trials", "8", "--seed", "11"]);
        assert!(out.status.success(), "stdout: {}", stdout(&out));
        assert!(stdout(&out).contains("8 trial(s), 8 passed, 0 failed"));
    }

    #[test]
    fn unknown_subcommand_fails() {
        let out = fa(&["backward"]);
        assert!(!out.status.success());
    }
}
