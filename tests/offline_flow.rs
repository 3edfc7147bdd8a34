use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::process::Command;
use std::thread;

// Nothing listens on the discard port, so every backend call fails fast.
const OFFLINE_API: &str = "http://127.0.0.1:9/api";

fn finwise_cmd(home: &tempfile::TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("finwise"));
    cmd.env("FINWISE_HOME", home.path());
    cmd.env("FINWISE_API_BASE", OFFLINE_API);
    cmd.env_remove("FINWISE_AI_API_KEY");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn logged_in_home() -> tempfile::TempDir {
    let home = tempfile::tempdir().expect("tempdir");
    finwise_cmd(&home)
        .args(["login", "--email", "an@finwise.vn"])
        .assert()
        .success();
    home
}

fn run_ok_out(home: &tempfile::TempDir, args: &[&str]) -> String {
    let out = finwise_cmd(home)
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8(out).expect("utf8 stdout")
}

#[test]
fn dashboard_falls_back_to_demo_data_and_says_so() {
    let home = logged_in_home();

    let out = finwise_cmd(&home)
        .arg("dashboard")
        .assert()
        .success()
        .stderr(predicate::str::contains("backend offline, showing demo data"))
        .get_output()
        .stdout
        .clone();
    let out = String::from_utf8(out).expect("utf8 stdout");

    assert!(out.contains("income\t0"), "{out}");
    assert!(out.contains("expense\t1650000"), "{out}");
    assert!(out.contains("Th6/24\t-1650000"), "{out}");

    let shopping = out.find("Mua sắm\t1200000").expect("shopping row");
    let food = out.find("Ăn uống\t450000").expect("food row");
    assert!(shopping < food, "largest category first:\n{out}");
}

#[test]
fn no_demo_turns_an_offline_backend_into_an_error() {
    let home = logged_in_home();

    finwise_cmd(&home)
        .args(["--no-demo", "dashboard"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("demo fallback is disabled"));

    finwise_cmd(&home)
        .args(["config", "set", "demo_fallback", "false"])
        .assert()
        .success();
    finwise_cmd(&home).arg("budget").arg("list").assert().failure();
}

#[test]
fn demo_lists_show_budgets_and_bills() {
    let home = logged_in_home();

    let budgets = run_ok_out(&home, &["budget", "list"]);
    assert!(budgets.contains("Ăn uống\t5000000\t3200000\t64%\tok"), "{budgets}");
    assert!(budgets.contains("Mua sắm\t3000000\t2850000\t95%\twarning"), "{budgets}");

    let bills = run_ok_out(&home, &["bill", "list"]);
    assert!(bills.contains("101\tTiền mạng FPT\t2024-06-20\t250000"), "{bills}");

    let found = run_ok_out(&home, &["tx", "list", "--search", "uniqlo"]);
    assert!(found.contains("Mua quần áo Uniqlo"), "{found}");
    assert!(!found.contains("Quán Ngon"), "{found}");
}

#[test]
fn failed_write_is_logged_once_and_log_stays_bounded() {
    let home = logged_in_home();

    for _ in 0..5 {
        finwise_cmd(&home).arg("dashboard").assert().success();
    }

    finwise_cmd(&home)
        .args(["bill", "pay", "101"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Paying bill failed"));

    let log = run_ok_out(&home, &["log"]);
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 8, "{log}");
    assert!(lines[0].contains("Paying bill: FAILED"), "{log}");
    assert_eq!(log.matches("FAILED").count(), 1, "{log}");
    assert!(lines[0].starts_with('['), "{log}");
}

#[test]
fn invalid_input_is_rejected_before_any_request() {
    let home = logged_in_home();

    finwise_cmd(&home)
        .args(["tx", "add", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid amount"));
    finwise_cmd(&home)
        .args(["budget", "set-limit", "5", "12.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid limit: '12.5'"));
    finwise_cmd(&home)
        .args(["tx", "add", "50000", "--category", "pets"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown category"));
    finwise_cmd(&home)
        .args(["bill", "add", "Điện", "850000", "--due", "20/06/2024"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid due date"));

    let log = run_ok_out(&home, &["log"]);
    assert_eq!(log.trim(), "(no activity)");
}

#[test]
fn inject_prepends_simulated_records() {
    let home = logged_in_home();

    let out = run_ok_out(&home, &["inject", "momo"]);
    let first_row = out.lines().nth(1).expect("first data row");
    assert!(first_row.contains("HIGHLANDS COFFEE"), "{out}");
    assert!(out.contains("Mua quần áo Uniqlo"), "{out}");

    let out = run_ok_out(&home, &["inject", "bill"]);
    assert!(out.contains("Hóa đơn Điện tháng"), "{out}");
    assert!(out.contains("Tiền mạng FPT"), "{out}");

    let log = run_ok_out(&home, &["log"]);
    assert!(log.contains("Simulated bill detected"), "{log}");
}

#[test]
fn analytics_degrade_and_ai_needs_a_key() {
    let home = logged_in_home();

    let out = finwise_cmd(&home)
        .arg("risk")
        .assert()
        .success()
        .stderr(predicate::str::contains("risk assessment unavailable"))
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(out).expect("utf8").trim(), "(no data)");

    finwise_cmd(&home)
        .args(["chat", "How am I doing?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key is not configured"));

    let transcript = run_ok_out(&home, &["chat"]);
    assert!(transcript.starts_with("advisor\tHello!"), "{transcript}");
}

/// Loopback backend that answers every request with HTTP 500.
fn failing_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    thread::spawn(move || {
        for mut stream in listener.incoming().flatten() {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let body = r#"{"error":"db down"}"#;
            let response = format!(
                "HTTP/1.1 500 Internal Server Error\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    format!("http://{addr}/api")
}

#[test]
fn server_error_falls_back_like_an_outage() {
    let home = logged_in_home();
    let base = failing_backend();

    let out = finwise_cmd(&home)
        .args(["--api-base", &base, "dashboard"])
        .assert()
        .success()
        .stderr(predicate::str::contains("backend offline, showing demo data"))
        .stderr(predicate::str::contains("HTTP 500"))
        .get_output()
        .stdout
        .clone();
    let out = String::from_utf8(out).expect("utf8 stdout");
    assert!(out.contains("Th6/24\t-1650000"), "{out}");

    finwise_cmd(&home)
        .args(["--api-base", &base, "--no-demo", "tx", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("db down"));
}
