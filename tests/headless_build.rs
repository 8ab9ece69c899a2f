use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

const HOUSE: &str = r#"{"width":2,"length":2,"blocks":[{"x":0,"y":0,"z":0,"b":"stone"},{"x":1,"y":0,"z":0,"b":"not_a_block"}]}"#;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "promptbuild-{name}-{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Answer one HTTP request with `body`, returning the endpoint URL.
fn serve_once(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= end + 4 + content_length {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).unwrap();
    });
    format!("http://{addr}/generate")
}

#[test]
fn headless_build_places_generated_structure() {
    let endpoint = serve_once(HOUSE);
    let dir = temp_dir("headless");
    let config = dir.join("promptbuild.toml");
    fs::write(
        &config,
        format!(
            "endpoint = \"{endpoint}\"\ntick_interval_ms = 1\nmaterials_path = \"{}\"\n",
            concat!(env!("CARGO_MANIFEST_DIR"), "/config/materials.json")
        ),
    )
    .unwrap();
    let log = dir.join("events.jsonl");
    let metrics = dir.join("metrics.json");

    let output = Command::new(env!("CARGO_BIN_EXE_promptbuild"))
        .arg("--config")
        .arg(&config)
        .args(["--command", "build a small house"])
        .arg("--exit-when-idle")
        .args(["--max-ticks", "2000"])
        .arg("--event-log")
        .arg(&log)
        .arg("--metrics")
        .arg(&metrics)
        .output()
        .expect("binary runs");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[Build] Sending request: \"a small house\"..."));
    assert!(stdout.contains("[Build] Placing 1 blocks... (1 skipped: invalid material)"));
    assert!(stdout.contains("[Build] Done!"));

    let events = fs::read_to_string(&log).unwrap();
    let kinds: Vec<String> = events
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["kind"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(kinds.first().map(String::as_str), Some("command"));
    assert!(kinds.iter().any(|k| k == "job_started"));
    assert_eq!(kinds.iter().filter(|k| *k == "job_completed").count(), 1);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&metrics).unwrap()).unwrap();
    assert_eq!(report["builds"]["jobs_completed"], 1);
    assert_eq!(report["builds"]["blocks_placed"], 1);
    assert_eq!(report["result"], "pass");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn unreachable_service_is_reported_and_run_ends() {
    // Bind then drop to get a port nothing listens on.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let dir = temp_dir("unreachable");
    let config = dir.join("promptbuild.toml");
    fs::write(&config, "tick_interval_ms = 1\nrequest_timeout_secs = 5\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_promptbuild"))
        .arg("--config")
        .arg(&config)
        .args(["--endpoint", &format!("http://127.0.0.1:{port}/generate")])
        .args(["--command", "build a tower"])
        .arg("--exit-when-idle")
        .args(["--max-ticks", "20000"])
        .output()
        .expect("binary runs");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[Build] HTTP request failed:"), "{stdout}");
    assert!(!stdout.contains("Placing"));

    fs::remove_dir_all(&dir).ok();
}
