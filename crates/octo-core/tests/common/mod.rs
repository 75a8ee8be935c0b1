// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use octo_core::models::{BackendSettings, HealthSettings, OrchestratorConfig, ProxySettings};

pub const HEALTH_METRIC: &str = "caddy_reverse_proxy_upstreams_healthy";

/// Exposition payload reporting the given upstream health values.
pub fn health_payload(upstreams: &[(&str, u8)]) -> String {
    let mut body = format!(
        "# HELP {HEALTH_METRIC} Health status of reverse proxy upstreams.\n# TYPE {HEALTH_METRIC} gauge\n"
    );
    for (upstream, value) in upstreams {
        body.push_str(&format!("{HEALTH_METRIC}{{upstream=\"{upstream}\"}} {value}\n"));
    }
    body
}

/// Serve `body` as a 200 response on `listener`, counting requests.
pub fn serve_metrics(listener: TcpListener, body: String) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let body = body.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    hits
}

/// Start a metrics endpoint on a fresh loopback port.
pub async fn start_metrics_server(body: String) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (addr, serve_metrics(listener, body))
}

/// A loopback address with nothing listening on it.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
}

/// Whether `pid` is running. Zombies waiting for their reaper count as gone.
#[cfg(unix)]
pub fn running(pid: u32) -> bool {
    if Path::new("/proc/self").exists() {
        return std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .map(|stat| {
                let state = stat.rsplit(')').next().unwrap_or("").trim_start();
                !state.starts_with('Z')
            })
            .unwrap_or(false);
    }
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Pids still running after waiting up to two seconds for them to exit.
#[cfg(unix)]
pub async fn survivors(pids: &[u32]) -> Vec<u32> {
    for _ in 0..40 {
        if !pids.iter().any(|&pid| running(pid)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    pids.iter().copied().filter(|&pid| running(pid)).collect()
}

/// Pids appended one per line to `path`.
pub fn read_pids(path: &Path) -> Vec<u32> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Health settings with intervals short enough for tests.
pub fn fast_health(metrics_addr: SocketAddr) -> HealthSettings {
    HealthSettings {
        metrics_url: Some(format!("http://{metrics_addr}/metrics")),
        poll_interval_ms: 50,
        retry_interval_ms: 20,
        request_timeout_ms: 500,
        ..HealthSettings::default()
    }
}

/// Backend that runs `script` under `sh` and announces with a simple pattern.
pub fn shell_backend(script: &str) -> BackendSettings {
    BackendSettings {
        program: "sh".into(),
        args: vec!["-c".into(), script.into()],
        listening_pattern: r"listening on (\S+) \(version \S+\)".into(),
        ..BackendSettings::default()
    }
}

/// Backend that announces a unique address (its pid as the port) and stays up.
pub fn announcing_backend() -> BackendSettings {
    shell_backend("echo \"listening on 127.0.0.1:$$ (version test)\" >&2; exec sleep 30")
}

/// Proxy that runs `script` under `sh`; the config path is `$1`.
pub fn shell_proxy(script: &str, config_dir: &Path) -> ProxySettings {
    ProxySettings {
        program: "sh".into(),
        args: vec!["-c".into(), script.into(), "sh".into()],
        config_dir: Some(config_dir.to_path_buf()),
        ..ProxySettings::default()
    }
}

pub fn config(
    backend: BackendSettings,
    proxy: ProxySettings,
    health: HealthSettings,
) -> OrchestratorConfig {
    OrchestratorConfig {
        backend,
        proxy,
        health,
        shutdown_grace_ms: 1000,
    }
}
