mod support;

use std::path::Path;

use assert_cmd::Command;
use httpmock::Method::POST;
use httpmock::MockServer;
use predicates::str::contains;
use support::{action_log, Fixture, Row};

const ENV_VARS: [&str; 10] = [
    "SLACK_WEBHOOK_URL",
    "SLACK_CHANNEL",
    "GOOGLE_AI_API_KEY",
    "TICKETWATCH_INTERNAL_AUTHORS",
    "TICKETWATCH_CHANNEL_ROUTING",
    "TICKETWATCH_STATE_FILE",
    "TICKETWATCH_SNAPSHOT",
    "TICKETWATCH_CONFIG",
    "LOG_LEVEL",
    "RUST_LOG",
];

/// Binary running in `dir` with a clean environment.
fn ticketwatch(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ticketwatch").expect("binary");
    cmd.current_dir(dir);
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn sample_rows() -> Vec<Row> {
    vec![
        Row::new("100", "Aberto", &action_log(&[(1, "Ana", "Olá")])).customer("ACME"),
        Row::new("101", "Fechado", &action_log(&[(1, "Bruno", "Fim")])),
    ]
}

#[test]
fn ticketwatch_help_works() {
    let fixture = Fixture::new();
    ticketwatch(fixture.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("support ticket change notifications"));
}

#[test]
fn subcommand_help_works() {
    let fixture = Fixture::new();
    for cmd in ["run", "report", "state", "parse"] {
        ticketwatch(fixture.path())
            .arg(cmd)
            .arg("--help")
            .assert()
            .success();
    }
}

#[test]
fn parse_reads_stdin() {
    let fixture = Fixture::new();
    ticketwatch(fixture.path())
        .arg("parse")
        .write_stdin(action_log(&[(1, "Ana", "primeira"), (2, "Carlos", "segunda")]))
        .assert()
        .success()
        .stdout(contains("last action: #2"))
        .stdout(contains("author: Carlos"))
        .stdout(contains("segunda"));
}

#[test]
fn parse_json_envelope() {
    let fixture = Fixture::new();
    ticketwatch(fixture.path())
        .args(["--json", "parse"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(contains("\"schema_version\": \"ticketwatch.v1\""))
        .stdout(contains("\"command\": \"parse\""))
        .stdout(contains("\"found\": false"));
}

#[test]
fn report_counts_active_tickets() {
    let fixture = Fixture::new();
    fixture.write_snapshot(&sample_rows());

    ticketwatch(fixture.path())
        .arg("report")
        .assert()
        .success()
        .stdout(contains("2 ticket(s), 1 active"))
        .stdout(contains("Aberto: 1"))
        .stdout(contains("Fechado: 1"));
}

#[test]
fn run_without_roster_is_a_config_error() {
    let fixture = Fixture::new();
    fixture.write_snapshot(&sample_rows());

    ticketwatch(fixture.path())
        .arg("run")
        .assert()
        .code(2)
        .stderr(contains("roster.internal_authors is empty"));
    assert!(!fixture.state_path().exists());
}

#[test]
fn run_without_webhook_is_a_config_error() {
    let fixture = Fixture::new();
    fixture.write_snapshot(&sample_rows());

    ticketwatch(fixture.path())
        .arg("run")
        .env("TICKETWATCH_INTERNAL_AUTHORS", "Carlos")
        .env("SLACK_CHANNEL", "#tickets")
        .assert()
        .code(2)
        .stderr(contains("webhook_url"));
}

#[test]
fn run_with_missing_snapshot_fails() {
    let fixture = Fixture::new();
    ticketwatch(fixture.path())
        .args(["--json", "run", "--dry-run"])
        .env("TICKETWATCH_INTERNAL_AUTHORS", "Carlos")
        .assert()
        .code(2)
        .stdout(contains("\"status\": \"error\""))
        .stdout(contains("\"kind\": \"user_error\""));
}

#[test]
fn dry_run_reports_without_saving() {
    let fixture = Fixture::new();
    fixture.write_snapshot(&sample_rows());

    ticketwatch(fixture.path())
        .args(["run", "--dry-run"])
        .env("TICKETWATCH_INTERNAL_AUTHORS", "Carlos")
        .assert()
        .success()
        .stdout(contains("dry run"))
        .stdout(contains("#100"));
    assert!(!fixture.state_path().exists());
}

#[test]
fn state_show_before_first_run() {
    let fixture = Fixture::new();
    ticketwatch(fixture.path())
        .args(["--json", "state", "show"])
        .assert()
        .success()
        .stdout(contains("\"command\": \"state show\""))
        .stdout(contains("\"status\": \"missing\""));
}

#[test]
fn run_notifies_once_then_goes_quiet() {
    let fixture = Fixture::new();
    fixture.write_snapshot(&sample_rows());
    fixture.write_config(
        r##"
[roster]
internal_authors = ["Carlos"]

[slack]
routes = { "ACME" = "#acme" }
"##,
    );

    let server = MockServer::start();
    let hook = server.mock(|when, then| {
        when.method(POST).path("/hook").body_includes("#acme");
        then.status(200).body("ok");
    });

    ticketwatch(fixture.path())
        .arg("run")
        .env("SLACK_WEBHOOK_URL", server.url("/hook"))
        .assert()
        .success()
        .stdout(contains("1 notified"));
    hook.assert_calls(1);
    assert!(fixture.read_state().contains_key("100"));

    ticketwatch(fixture.path())
        .arg("run")
        .env("SLACK_WEBHOOK_URL", server.url("/hook"))
        .assert()
        .success()
        .stdout(contains("no changes"));
    hook.assert_calls(1);

    ticketwatch(fixture.path())
        .args(["state", "show"])
        .assert()
        .success()
        .stdout(contains("#100: Aberto"));
}
