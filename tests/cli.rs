// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn scenario(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

fn mglock(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mglock").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("MGLOCK_RUNNER__STEP_TIMEOUT_MS")
        .env_remove("MGLOCK_RUNNER__POLL_INTERVAL_MS")
        .env_remove("MGLOCK_REPLAY__RECORD_EVENTS")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    mglock(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("replay"))
        .stdout(predicate::str::contains("matrix"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn matrix_prints_tables() {
    let dir = TempDir::new().unwrap();
    mglock(&dir)
        .arg("matrix")
        .assert()
        .success()
        .stdout(predicate::str::contains("Compatibility"))
        .stdout(predicate::str::contains("Parent needs"));
}

#[test]
fn replay_fifo_scenario() {
    let dir = TempDir::new().unwrap();
    mglock(&dir)
        .arg("replay")
        .arg(scenario("fifo.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("T3 acquire database X"))
        .stdout(predicate::str::contains("blocked"))
        .stdout(predicate::str::contains("T4: S(database)"));
}

#[test]
fn replay_escalation_scenario_as_json() {
    let dir = TempDir::new().unwrap();
    let output = mglock(&dir)
        .args(["replay", "--json"])
        .arg(scenario("escalation.toml"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let locks: Vec<String> = report["locks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|lock| {
            format!(
                "{} {}",
                lock["name"].as_str().unwrap(),
                lock["lock_type"].as_str().unwrap()
            )
        })
        .collect();
    assert_eq!(
        locks,
        vec!["database IX", "database/table1 X", "database/table2 S"]
    );
}

#[test]
fn replay_deadlock_exits_with_runner_code() {
    let dir = TempDir::new().unwrap();
    mglock(&dir)
        .arg("replay")
        .arg(scenario("deadlock.toml"))
        .assert()
        .code(4)
        .stdout(predicate::str::contains("still blocked: T1, T2"))
        .stderr(predicate::str::contains("blocked transactions"));
}

#[test]
fn replay_rejects_invalid_scenario() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(
        &path,
        "transactions = [1]\n\n[[steps]]\ntransaction = 1\nop = \"acquire\"\nresource = \"database\"\n",
    )
    .unwrap();

    mglock(&dir)
        .arg("replay")
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("step 1"));
}

#[test]
fn config_file_is_picked_up_from_working_directory() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("mglock.toml"),
        "[replay]\nrecord_events = false\n",
    )
    .unwrap();

    mglock(&dir)
        .args(["replay", "--json"])
        .arg(scenario("fifo.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"events\"").not());
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    mglock(&dir)
        .args(["--config", "nope.toml", "matrix"])
        .assert()
        .code(2);
}
