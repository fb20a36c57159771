/// Acceptance tests for the bucketcam command line
///
/// Every test gets its own storage directory and an isolated config home so
/// no developer config is picked up.
use assert_cmd::Command;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use predicates::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    fn storage_dir(&self) -> PathBuf {
        self.path().join("images")
    }

    fn bucketcam(&self) -> Command {
        let mut cmd = Command::new(std::env!("CARGO_BIN_EXE_bucketcam"));
        cmd.current_dir(self.path())
            .env("XDG_CONFIG_HOME", self.path().join("xdg"))
            .env("BUCKETCAM_STORAGE_DIR", self.storage_dir())
            .env("BUCKETCAM_LOG_FORMAT", "compact")
            .env_remove("BUCKETCAM_CONFIG")
            .env_remove("BUCKETCAM_NUMBER_OF_IMAGES");
        cmd
    }

    /// Write a PNG split into a dark left half and a light right half
    fn create_image(&self, name: &str, left: u8, right: u8) -> PathBuf {
        let img = RgbImage::from_fn(32, 32, |x, _| {
            let v = if x < 16 { left } else { right };
            Rgb([v, v, v])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();

        let path = self.path().join(name);
        fs::write(&path, buf).unwrap();
        path
    }

    fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_store_creates_leaf_and_log() {
    let ws = TestWorkspace::new();
    let frame = ws.create_image("frame.png", 20, 200);

    ws.bucketcam()
        .args(["store"])
        .arg(&frame)
        .assert()
        .success()
        .stdout(predicate::str::contains("stored"));

    let logs: Vec<_> = fs::read_dir(ws.storage_dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("storage_"))
        .collect();
    assert_eq!(logs.len(), 1);

    let log = fs::read_to_string(logs[0].path()).unwrap();
    let fields: Vec<_> = log.trim_end().split(' ').collect();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[1].len(), 64);
    assert!(ws.storage_dir().join(fields[2]).is_file());
}

#[test]
fn test_store_same_image_twice_branches() {
    let ws = TestWorkspace::new();
    let frame = ws.create_image("frame.png", 90, 90);

    let report = json_output(
        ws.bucketcam()
            .args(["store", "--format", "json"])
            .arg(&frame)
            .arg(&frame),
    );

    let placements = report.as_array().unwrap();
    assert_eq!(placements.len(), 2);
    assert_eq!(placements[0]["action"], "stored");
    assert_eq!(placements[1]["action"], "branched");
    assert_eq!(placements[1]["used"], 1);
    assert_eq!(placements[1]["depth"], 1);
}

#[test]
fn test_store_respects_number_of_images() {
    let ws = TestWorkspace::new();
    let files: Vec<_> = (0..6u8)
        .map(|i| ws.create_image(&format!("f{i}.png"), i * 40, 255 - i * 40))
        .collect();

    ws.bucketcam()
        .args(["store", "--number-of-images", "3"])
        .args(&files)
        .assert()
        .success();

    let stats = json_output(
        ws.bucketcam()
            .args(["stats", "--format", "json"])
            .env("BUCKETCAM_NUMBER_OF_IMAGES", "3"),
    );
    assert!(stats["used"].as_u64().unwrap() <= 3);
    assert_eq!(stats["capacity"], 3);
    assert_eq!(stats["log_files"], 1);
}

#[test]
fn test_store_rejects_non_image() {
    let ws = TestWorkspace::new();
    let bogus = ws.create_file("notes.jpg", "not an image");

    ws.bucketcam()
        .args(["store"])
        .arg(&bogus)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to store"));

    assert!(!ws.storage_dir().join("0.jpg").exists());
}

#[test]
fn test_locate_does_not_store() {
    let ws = TestWorkspace::new();
    let frame = ws.create_image("frame.png", 10, 240);

    let plan = json_output(
        ws.bucketcam()
            .args(["locate", "--format", "json"])
            .arg(&frame),
    );
    assert_eq!(plan["action"], "stored");
    assert_eq!(plan["depth"], 0);
    assert_eq!(plan["occupancy"], "empty");
    assert_eq!(plan["already_stored"], false);
    assert_eq!(plan["features"].as_array().unwrap().len(), 5);

    let target = plan["target"].as_str().unwrap().to_string();
    assert!(!ws.storage_dir().join(&target).exists());

    ws.bucketcam().args(["store"]).arg(&frame).assert().success();

    let plan = json_output(
        ws.bucketcam()
            .args(["locate", "--format", "json"])
            .arg(&frame),
    );
    assert_eq!(plan["action"], "branched");
}

#[test]
fn test_history_reports_replaced_images() {
    let ws = TestWorkspace::new();
    let frame = ws.create_image("frame.png", 128, 128);

    // Second store branches and discards the first leaf
    ws.bucketcam()
        .args(["store"])
        .arg(&frame)
        .arg(&frame)
        .assert()
        .success();

    let history = json_output(ws.bucketcam().args(["history", "--format", "json"]));
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["status"], "missing");
    assert_eq!(entries[1]["status"], "exact");

    ws.bucketcam()
        .args(["history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 records: 1 exact, 0 replaced, 1 missing"));
}

#[test]
fn test_history_date_filter() {
    let ws = TestWorkspace::new();
    let frame = ws.create_image("frame.png", 50, 60);
    ws.bucketcam().args(["store"]).arg(&frame).assert().success();

    ws.bucketcam()
        .args(["history", "--date", "1999-01-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored images logged."));

    ws.bucketcam()
        .args(["history", "--date", "yesterday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid --date"));
}

#[test]
fn test_stats_on_empty_storage() {
    let ws = TestWorkspace::new();

    ws.bucketcam()
        .args(["stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored images: 0 / 1000"));
}

#[test]
fn test_config_file_is_discovered() {
    let ws = TestWorkspace::new();
    ws.create_file(
        "bucketcam.toml",
        r#"
[storage]
dir = "from-config"
numberOfImages = 7
"#,
    );

    ws.bucketcam()
        .args(["config", "show"])
        .env_remove("BUCKETCAM_STORAGE_DIR")
        .assert()
        .success()
        .stdout(predicate::str::contains("dir = \"from-config\""))
        .stdout(predicate::str::contains("number_of_images = 7"));
}

#[test]
fn test_config_generate_and_validate() {
    let ws = TestWorkspace::new();

    let output = ws.bucketcam().args(["config", "generate"]).output().unwrap();
    assert!(output.status.success());
    let path = ws.path().join("generated.toml");
    fs::write(&path, &output.stdout).unwrap();

    ws.bucketcam()
        .args(["config", "validate"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file is valid"));
}

#[test]
fn test_config_validate_rejects_bad_depth() {
    let ws = TestWorkspace::new();
    let path = ws.create_file(
        "bad.toml",
        r#"
[storage]
depth = 40
"#,
    );

    ws.bucketcam()
        .args(["config", "validate"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("storage.depth"));
}

#[test]
fn test_capture_without_url_fails() {
    let ws = TestWorkspace::new();

    ws.bucketcam()
        .args(["capture"])
        .env_remove("BUCKETCAM_URL")
        .assert()
        .failure()
        .stderr(predicate::str::contains("source.url is not configured"));
}
