use std::fs;

use assert_cmd::Command;
use predicates::str::contains;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("upvote-admin").unwrap();
    cmd.env_remove("UPVOTE_ADMIN_CONFIG")
        .env_remove("UPVOTE_ADMIN_API_BASE_URL")
        .env("RUST_LOG", "error");
    cmd
}

#[test]
fn help_lists_page_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("events"))
        .stdout(contains("my-hosts"))
        .stdout(contains("blockable"));
}

#[test]
fn broken_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upvote-admin.toml");
    fs::write(&path, "api_base_url = [").unwrap();

    cmd()
        .arg("--config")
        .arg(&path)
        .args(["blockable", "get", "abc"])
        .assert()
        .failure()
        .stderr(contains("failed parsing config"));
}

#[test]
fn unreachable_backend_fails_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upvote-admin.toml");
    fs::write(
        &path,
        "api_base_url = \"http://127.0.0.1:1\"\nrequest_timeout_seconds = 2\n",
    )
    .unwrap();

    cmd()
        .arg("--config")
        .arg(&path)
        .args(["--json", "blockable", "get", "abc"])
        .assert()
        .failure()
        .stderr(contains("/api/web/blockables/abc"));
}
