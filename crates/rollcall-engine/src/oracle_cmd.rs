//! Subprocess embedding oracle.
//!
//! The deployment points `ROLLCALL_ORACLE_CMD` at whatever produces
//! embeddings — a wrapper around a cloud API, an ONNX sidecar, a test stub.
//! Contract: the image arrives on stdin; the oracle prints one JSON object
//! on stdout, either a scan
//! `{"embedding": [...], "face": {"x","y","width","height"}, "image": {"width","height"}}`
//! or an error `{"error": "no_face"}` / `{"error": "multiple_faces", "count": N}`.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;

use rollcall_core::{Embedding, EmbeddingOracle, FaceGeometry, FaceScan, OracleError};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandOracle {
    /// Build from a whitespace-separated command line (no shell quoting).
    pub fn new(command_line: &str, timeout: Duration) -> Result<Self, OracleError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| OracleError::Backend("empty oracle command".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }
}

impl EmbeddingOracle for CommandOracle {
    fn embed(&mut self, image: &[u8]) -> Result<FaceScan, OracleError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OracleError::Backend(format!("spawning {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // An early child exit closes the pipe; the exit status will
            // carry the real error, so a short write is not fatal here.
            if let Err(e) = stdin.write_all(image) {
                tracing::debug!(error = %e, "oracle stdin closed early");
            }
        }

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child
                .try_wait()
                .map_err(|e| OracleError::Backend(e.to_string()))?
            {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OracleError::Timeout(self.timeout));
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        let mut stdout = Vec::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_end(&mut stdout)
                .map_err(|e| OracleError::Backend(format!("reading oracle output: {e}")))?;
        }
        let mut stderr = String::new();
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr);
        }

        parse_scan(&stdout, status, &stderr)
    }
}

#[derive(Deserialize)]
struct WireScan {
    embedding: Vec<f32>,
    face: WireFace,
    image: WireImage,
}

#[derive(Deserialize)]
struct WireFace {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

#[derive(Deserialize)]
struct WireImage {
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct WireError {
    error: String,
    count: Option<usize>,
}

fn parse_scan(stdout: &[u8], status: ExitStatus, stderr: &str) -> Result<FaceScan, OracleError> {
    // A well-behaved oracle reports detection failures as JSON regardless
    // of exit code.
    if let Ok(wire) = serde_json::from_slice::<WireError>(stdout) {
        return Err(match wire.error.as_str() {
            "no_face" => OracleError::NoFace,
            "multiple_faces" => OracleError::MultipleFaces {
                count: wire.count.unwrap_or(2),
            },
            other => OracleError::Backend(format!("oracle error: {other}")),
        });
    }

    if !status.success() {
        return Err(OracleError::Backend(format!(
            "oracle exited with {status}: {}",
            stderr.trim()
        )));
    }

    let wire: WireScan = serde_json::from_slice(stdout)
        .map_err(|e| OracleError::Backend(format!("bad oracle output: {e}")))?;

    Ok(FaceScan {
        embedding: Embedding::new(wire.embedding)
            .map_err(|e| OracleError::Backend(e.to_string()))?,
        geometry: FaceGeometry {
            x: wire.face.x,
            y: wire.face.y,
            width: wire.face.width,
            height: wire.face.height,
            frame_width: wire.image.width,
            frame_height: wire.image.height,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    const SCAN_JSON: &str = r#"{
        "embedding": [1.0, 0.0, 0.5],
        "face": {"x": 270.0, "y": 190.0, "width": 100.0, "height": 100.0},
        "image": {"width": 640, "height": 480}
    }"#;

    #[cfg(unix)]
    #[test]
    fn test_parse_scan_ok() {
        let scan = parse_scan(SCAN_JSON.as_bytes(), exit_status(0), "").unwrap();
        assert_eq!(scan.embedding.as_slice(), &[1.0, 0.0, 0.5]);
        assert_eq!(scan.geometry.frame_width, 640);
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_no_face() {
        let err = parse_scan(br#"{"error": "no_face"}"#, exit_status(0), "").unwrap_err();
        assert!(matches!(err, OracleError::NoFace));
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_multiple_faces_with_count() {
        let err = parse_scan(
            br#"{"error": "multiple_faces", "count": 3}"#,
            exit_status(0),
            "",
        )
        .unwrap_err();
        assert!(matches!(err, OracleError::MultipleFaces { count: 3 }));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_backend_error() {
        let err = parse_scan(b"", exit_status(1), "boom").unwrap_err();
        match err {
            OracleError::Backend(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_garbage_output_is_backend_error() {
        let err = parse_scan(b"not json", exit_status(0), "").unwrap_err();
        assert!(matches!(err, OracleError::Backend(_)));
    }

    #[cfg(unix)]
    fn write_script(name: &str, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = std::env::temp_dir().join(format!("rollcall-{name}-{}.sh", std::process::id()));
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_subprocess_round_trip() {
        let script = write_script(
            "oracle-ok",
            &format!("#!/bin/sh\ncat > /dev/null\necho '{}'\n", SCAN_JSON.replace('\n', " ")),
        );
        let mut oracle =
            CommandOracle::new(script.to_str().unwrap(), Duration::from_secs(5)).unwrap();

        let scan = oracle.embed(b"fake image bytes").unwrap();
        assert_eq!(scan.embedding.len(), 3);

        let _ = std::fs::remove_file(script);
    }

    #[cfg(unix)]
    #[test]
    fn test_stalled_oracle_times_out() {
        let script = write_script("oracle-stall", "#!/bin/sh\ncat > /dev/null\nsleep 10\n");
        let mut oracle =
            CommandOracle::new(script.to_str().unwrap(), Duration::from_millis(200)).unwrap();

        let err = oracle.embed(b"img").unwrap_err();
        assert!(matches!(err, OracleError::Timeout(_)));

        let _ = std::fs::remove_file(script);
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandOracle::new("   ", Duration::from_secs(1)).is_err());
    }
}
