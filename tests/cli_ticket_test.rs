//! Integration tests for ticket CLI operations: create, list, show,
//! status/priority/severity, labels, comments, delete.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn create_prints_id_and_filename() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["create", "--title", "Bug A", "--status", "new"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created ticket 1 (1__Bug_A)"));
}

#[test]
fn non_ascii_titles_round_trip_through_show() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["create", "--title", "Bäg report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created ticket 1 (1__Bäg_report)"));

    env.scuttle()
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("title: Bäg report"));

    env.scuttle()
        .args(["status", "1", "open"])
        .assert()
        .success();
}

#[test]
fn titles_with_slashes_create_cleanly() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["create", "--title", "ui/parser glitch"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Created ticket 1 (1__ui_parser_glitch)",
        ));

    env.scuttle()
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("title: ui/parser glitch"));
}

#[test]
fn ticket_ids_increment_per_create() {
    let env = TestEnv::init();

    for (n, title) in [(1, "First bug"), (2, "Second bug"), (3, "Third bug")] {
        env.scuttle()
            .args(["create", "--title", title])
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("Created ticket {}", n)));
    }
}

#[test]
fn each_mutation_is_one_commit_on_the_data_branch() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["create", "--title", "Bug A"])
        .assert()
        .success();
    env.scuttle()
        .args(["status", "1", "open"])
        .assert()
        .success();

    let log = env.git(&["log", "--format=%s", "scuttle"]);
    let subjects: Vec<&str> = log.lines().collect();
    assert_eq!(
        subjects,
        vec![
            "Setting status of ticket 1 to open",
            "Creating ticket 1__Bug_A",
            "Initializing ticket store",
        ]
    );
}

#[test]
fn list_renders_the_ticket_table() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["create", "--title", "Bug A", "--severity", "3", "--status", "open"])
        .assert()
        .success();

    env.scuttle()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("ID"))
        .stdout(predicate::str::contains("Title"))
        .stdout(predicate::str::contains("Severity"))
        .stdout(predicate::str::contains("Status"))
        .stdout(predicate::str::contains("Bug A"))
        .stdout(predicate::str::contains("open"));
}

#[test]
fn show_outputs_yaml_by_default_with_json_and_text_on_request() {
    let env = TestEnv::init();

    env.scuttle()
        .args([
            "create",
            "--title",
            "Bug A",
            "--description",
            "it crashes",
            "--label",
            "crash",
        ])
        .assert()
        .success();

    env.scuttle()
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("title: Bug A"))
        .stdout(predicate::str::contains("description: it crashes"));

    env.scuttle()
        .args(["show", "1", "--output", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\": \"Bug A\""))
        .stdout(predicate::str::contains("\"labels\""));

    env.scuttle()
        .args(["show", "1", "--output", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ID: 1"))
        .stdout(predicate::str::contains("Title: Bug A"))
        .stdout(predicate::str::contains("Labels: crash"));
}

#[test]
fn show_missing_ticket_fails() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["show", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ticket 42"));
}

#[test]
fn status_priority_severity_update_the_record() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["create", "--title", "Bug A"])
        .assert()
        .success();

    env.scuttle().args(["status", "1", "open"]).assert().success();
    env.scuttle().args(["priority", "1", "4"]).assert().success();
    env.scuttle().args(["severity", "1", "5"]).assert().success();

    env.scuttle()
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status: open"))
        .stdout(predicate::str::contains("priority: 4"))
        .stdout(predicate::str::contains("severity: 5"));
}

#[test]
fn labels_add_and_remove() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["create", "--title", "Bug A"])
        .assert()
        .success();

    env.scuttle()
        .args(["label", "add", "1", "ui"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added label ui to ticket 1"));

    env.scuttle()
        .args(["label", "rm", "1", "ui"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed label ui from ticket 1"));

    env.scuttle()
        .args(["label", "rm", "1", "ui"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("label ui"));
}

#[test]
fn comment_ids_are_per_ticket_and_monotonic() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["create", "--title", "Bug A"])
        .assert()
        .success();
    env.scuttle()
        .args(["create", "--title", "Bug B"])
        .assert()
        .success();

    // First two comments on a fresh ticket: "1-0" then "1-1".
    env.scuttle()
        .args(["comment", "add", "1", "first note"])
        .assert()
        .success()
        .stdout(predicate::str::diff("1-0\n"));
    env.scuttle()
        .args(["comment", "add", "1", "second note"])
        .assert()
        .success()
        .stdout(predicate::str::diff("1-1\n"));

    // Comment counters are scoped per ticket.
    env.scuttle()
        .args(["comment", "add", "2", "note on b"])
        .assert()
        .success()
        .stdout(predicate::str::diff("2-0\n"));

    // Deleting a comment never frees its id.
    env.scuttle()
        .args(["comment", "rm", "1", "1"])
        .assert()
        .success()
        .stdout(predicate::str::diff("1-1\n"));
    env.scuttle()
        .args(["comment", "add", "1", "third note"])
        .assert()
        .success()
        .stdout(predicate::str::diff("1-2\n"));
}

#[test]
fn comment_rm_missing_fails() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["create", "--title", "Bug A"])
        .assert()
        .success();

    env.scuttle()
        .args(["comment", "rm", "1", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("comment 1-7"));
}

#[test]
fn delete_removes_the_ticket() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["create", "--title", "Bug A"])
        .assert()
        .success();

    env.scuttle()
        .args(["delete", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted ticket 1"));

    env.scuttle()
        .args(["show", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ticket 1"));
}

#[test]
fn delete_missing_ticket_reports_it_plainly() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["delete", "9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ticket 9 does not exist"));
}

#[test]
fn deleted_ids_are_never_reallocated() {
    let env = TestEnv::init();

    env.scuttle()
        .args(["create", "--title", "Bug A"])
        .assert()
        .success();
    env.scuttle()
        .args(["create", "--title", "Bug B"])
        .assert()
        .success();
    env.scuttle().args(["delete", "2"]).assert().success();

    env.scuttle()
        .args(["create", "--title", "Bug C"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created ticket 3"));
}
