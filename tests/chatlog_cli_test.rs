use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// A `chatlog` invocation isolated from the caller's home, config and token.
fn chatlog(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("chatlog");
    cmd.current_dir(home)
        .env("HOME", home)
        .env("CHATLOG_HOME", home.join(".chatlog"))
        .env("CHATLOG_CONFIG_PATH", home.join("absent.toml"))
        .env("CHATLOG_BASE_URL", "http://127.0.0.1:9")
        .env_remove("CHATLOG_TOKEN")
        .env_remove("GROUPME_TOKEN")
        .env_remove("CHATLOG_PAGE_SIZE")
        .env_remove("CHATLOG_FORMAT")
        .env_remove("CHATLOG_TIMEZONE");
    cmd
}

#[test]
fn status_reports_resolved_paths_and_defaults() {
    let tmp = tempdir().expect("tempdir");

    chatlog(tmp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("chatlog_home="))
        .stdout(predicate::str::contains("api.page_size=100"))
        .stdout(predicate::str::contains("token=missing"));
}

#[test]
fn status_json_reads_config_file() {
    let tmp = tempdir().expect("tempdir");
    let config = tmp.path().join("chatlog.toml");
    fs::write(&config, "[output]\nformat = \"markdown\"\ntimezone = \"UTC\"\n").expect("config");

    let out = chatlog(tmp.path())
        .env("CHATLOG_CONFIG_PATH", &config)
        .args(["status", "--json"])
        .output()
        .expect("run");
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json report");
    assert_eq!(report["ok"], true);
    let details = report["details"].as_array().expect("details");
    assert!(details.iter().any(|d| d == "output.format=markdown"));
}

#[test]
fn retrieve_without_token_is_a_configuration_error() {
    let tmp = tempdir().expect("tempdir");

    chatlog(tmp.path())
        .args(["retrieve", "--type", "group", "--id", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"))
        .stderr(predicate::str::contains("access token"));
}

#[test]
fn out_of_range_page_size_fails_before_any_request() {
    let tmp = tempdir().expect("tempdir");

    chatlog(tmp.path())
        .env("CHATLOG_TOKEN", "t")
        .env("CHATLOG_PAGE_SIZE", "250")
        .args(["retrieve", "--type", "direct", "--id", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("page size must be between 1 and 100"));
}

#[test]
fn retry_budget_wider_than_u32_is_rejected() {
    let tmp = tempdir().expect("tempdir");

    chatlog(tmp.path())
        .env("CHATLOG_RETRY_BUDGET", "4294967297")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"))
        .stderr(predicate::str::contains("CHATLOG_RETRY_BUDGET=4294967297"));
}

#[test]
fn unwritable_audit_log_keeps_the_fetch_error() {
    let tmp = tempdir().expect("tempdir");
    let logs = tmp.path().join("logs");
    fs::write(&logs, "not a directory").expect("blocker");

    chatlog(tmp.path())
        .env("CHATLOG_TOKEN", "t")
        .env("CHATLOG_LOGS_DIR", &logs)
        .env("CHATLOG_RETRY_BUDGET", "0")
        .env("CHATLOG_RETRY_BACKOFF_MS", "0")
        .args(["retrieve", "--type", "group", "--id", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("first page fetch failed"))
        .stderr(predicate::str::contains("W006_AUDIT_WRITE"));
}

#[test]
fn repair_refuses_a_document_without_checkpoint() {
    let tmp = tempdir().expect("tempdir");
    let doc = tmp.path().join("42_group_chat_history_20210301-000000.md");
    fs::write(
        &doc,
        "# Chat history: group chat 42\n\n<!-- chatlog:body -->\n## Monday, 01 March 2021\n- **Ada** (00:00:00): hi\n<!-- chatlog:end -->\n",
    )
    .expect("write doc");

    chatlog(tmp.path())
        .env("CHATLOG_TOKEN", "t")
        .args(["repair", "--file"])
        .arg(&doc)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no interruption checkpoint"));
    assert!(doc.exists());
}

#[test]
fn repair_rejects_unknown_document_kinds() {
    let tmp = tempdir().expect("tempdir");
    let doc = tmp.path().join("history.txt");
    fs::write(&doc, "plain text\n").expect("write doc");

    chatlog(tmp.path())
        .args(["repair", "--file"])
        .arg(&doc)
        .assert()
        .failure()
        .stderr(predicate::str::contains("neither an .html nor a .md"));
}
