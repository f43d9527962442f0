//! Boundary to the external processing engine (ffprobe / ffmpeg).
//!
//! Every call is an independent child process. Long-running calls stream
//! `-progress` output and check the cancellation signal between progress
//! lines; a cancelled child is killed before the call returns.

use async_trait::async_trait;
use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::error::EngineError;

const STDERR_TAIL_CHARS: usize = 2000;
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// Single still frame to capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameRequest {
    pub timestamp: u64,
    pub width: u32,
    pub height: u32,
}

/// Full re-encode of a source to one target geometry and bitrate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodeRequest {
    pub width: u32,
    pub height: u32,
    pub video_bitrate_kbps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
    pub container: String,
    /// Source duration in seconds, used only for progress reporting
    pub duration_hint: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioRequest {
    pub codec: String,
    pub bitrate_kbps: u32,
    pub format: String,
}

/// Operations the pipeline needs from a media processing engine
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Container and stream table of `input`, as ffprobe-style JSON
    async fn probe(&self, input: &Path) -> Result<String, EngineError>;

    async fn extract_frame(
        &self,
        input: &Path,
        request: &FrameRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError>;

    async fn encode(
        &self,
        input: &Path,
        request: &EncodeRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError>;

    async fn extract_audio(
        &self,
        input: &Path,
        request: &AudioRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError>;
}

/// One line of `ffmpeg -progress` output that we care about
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    OutTime(Duration),
    End,
}

pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // ffmpeg reports microseconds under both keys
        "out_time_us" | "out_time_ms" => value
            .trim()
            .parse::<u64>()
            .ok()
            .map(|us| ProgressEvent::OutTime(Duration::from_micros(us))),
        "progress" if value.trim() == "end" => Some(ProgressEvent::End),
        _ => None,
    }
}

/// Engine backed by the `ffprobe` and `ffmpeg` command line tools
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

fn os(value: impl AsRef<OsStr>) -> OsString {
    value.as_ref().to_os_string()
}

fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if max_chars == 0 {
        return String::new();
    }
    match trimmed.char_indices().rev().nth(max_chars - 1) {
        Some((index, _)) => trimmed[index..].to_string(),
        None => trimmed.to_string(),
    }
}

impl FfmpegEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
        }
    }

    pub fn probe_args(input: &Path) -> Vec<OsString> {
        vec![
            os("-v"), os("quiet"),
            os("-print_format"), os("json"),
            os("-show_format"),
            os("-show_streams"),
            os(input),
        ]
    }

    pub fn frame_args(input: &Path, request: &FrameRequest, output: &Path) -> Vec<OsString> {
        vec![
            // Seek before -i for a fast keyframe seek
            os("-ss"), os(request.timestamp.to_string()),
            os("-i"), os(input),
            os("-frames:v"), os("1"),
            os("-vf"), os(format!("scale={}:{}", request.width, request.height)),
            os("-q:v"), os("2"),
            os("-y"),
            os(output),
        ]
    }

    pub fn encode_args(input: &Path, request: &EncodeRequest, output: &Path) -> Vec<OsString> {
        vec![
            os("-i"), os(input),
            os("-c:v"), os(&request.video_codec),
            os("-b:v"), os(format!("{}k", request.video_bitrate_kbps)),
            os("-vf"), os(format!("scale={}:{}", request.width, request.height)),
            os("-c:a"), os(&request.audio_codec),
            os("-b:a"), os(format!("{}k", request.audio_bitrate_kbps)),
            os("-f"), os(&request.container),
            os("-y"),
            os(output),
        ]
    }

    pub fn audio_args(input: &Path, request: &AudioRequest, output: &Path) -> Vec<OsString> {
        vec![
            os("-i"), os(input),
            os("-vn"),
            os("-c:a"), os(&request.codec),
            os("-b:a"), os(format!("{}k", request.bitrate_kbps)),
            os("-f"), os(&request.format),
            os("-y"),
            os(output),
        ]
    }

    /// Run ffmpeg to completion, streaming progress and honouring cancellation
    async fn run(
        &self,
        args: Vec<OsString>,
        duration_hint: u64,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let program = self.ffmpeg.display().to_string();
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error", "-nostats"])
            .args(["-progress", "pipe:1"])
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!("🎬 Running {} {:?}", program, args);

        let mut child = cmd.spawn().map_err(|e| EngineError::Spawn {
            program: program.clone(),
            message: e.to_string(),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Io("ffmpeg stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Io("ffmpeg stderr was not captured".to_string()))?;

        // Drain stderr concurrently so a chatty child never blocks on a full pipe
        let stderr_task = tokio::spawn(read_lossy(stderr));

        let started = Instant::now();
        let mut last_report = Instant::now();
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("🛑 Cancelling running {}", program);
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return Err(EngineError::Cancelled);
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => match parse_progress_line(&line) {
                            Some(ProgressEvent::OutTime(position)) => {
                                if last_report.elapsed() >= PROGRESS_LOG_INTERVAL {
                                    if duration_hint > 0 {
                                        let percent = (position.as_secs_f64() / duration_hint as f64 * 100.0).min(100.0);
                                        debug!("⏳ {}: {:.1}%", program, percent);
                                    } else {
                                        debug!("⏳ {}: {:.1}s encoded", program, position.as_secs_f64());
                                    }
                                    last_report = Instant::now();
                                }
                            }
                            Some(ProgressEvent::End) => debug!("{} reported end of progress", program),
                            None => {}
                        },
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Error reading {} progress: {}", program, e);
                            break;
                        }
                    }
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("🛑 Cancelling running {}", program);
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(EngineError::Cancelled);
            }
            status = child.wait() => status.map_err(EngineError::from_io)?,
        };

        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(EngineError::Exited {
                program,
                code: status.code(),
                stderr: tail(&stderr, STDERR_TAIL_CHARS),
            });
        }

        debug!("✅ {} finished in {:.2}s", program, started.elapsed().as_secs_f64());
        Ok(())
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe(&self, input: &Path) -> Result<String, EngineError> {
        let program = self.ffprobe.display().to_string();
        let output = Command::new(&self.ffprobe)
            .args(Self::probe_args(input))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::Spawn {
                program: program.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(EngineError::Exited {
                program,
                code: output.status.code(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_CHARS),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn extract_frame(
        &self,
        input: &Path,
        request: &FrameRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        self.run(Self::frame_args(input, request, output), 0, cancel).await
    }

    async fn encode(
        &self,
        input: &Path,
        request: &EncodeRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        self.run(
            Self::encode_args(input, request, output),
            request.duration_hint,
            cancel,
        )
        .await
    }

    async fn extract_audio(
        &self,
        input: &Path,
        request: &AudioRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        self.run(Self::audio_args(input, request, output), 0, cancel).await
    }
}

/// Reads a child's diagnostic stream to the end, replacing invalid UTF-8
async fn read_lossy<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buffer = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buffer).await {
        debug!("⚠️ stderr read stopped early: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains_pair(args: &[OsString], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == *flag && w[1] == *value)
    }

    #[test]
    fn test_progress_parsing() {
        assert_eq!(
            parse_progress_line("out_time_us=1500000"),
            Some(ProgressEvent::OutTime(Duration::from_millis(1500)))
        );
        assert_eq!(
            parse_progress_line("out_time_ms=2000000"),
            Some(ProgressEvent::OutTime(Duration::from_secs(2)))
        );
        assert_eq!(parse_progress_line("progress=end"), Some(ProgressEvent::End));
        assert_eq!(parse_progress_line("progress=continue"), None);
        assert_eq!(parse_progress_line("out_time_us=N/A"), None);
        assert_eq!(parse_progress_line("garbage"), None);
    }

    #[test]
    fn test_encode_args() {
        let request = EncodeRequest {
            width: 1280,
            height: 720,
            video_bitrate_kbps: 2500,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 128,
            container: "mp4".to_string(),
            duration_hint: 60,
        };
        let args = FfmpegEngine::encode_args(Path::new("/in.mov"), &request, Path::new("/out.mp4"));

        assert!(contains_pair(&args, "-i", "/in.mov"));
        assert!(contains_pair(&args, "-c:v", "libx264"));
        assert!(contains_pair(&args, "-b:v", "2500k"));
        assert!(contains_pair(&args, "-vf", "scale=1280:720"));
        assert!(contains_pair(&args, "-b:a", "128k"));
        assert!(contains_pair(&args, "-f", "mp4"));
        assert_eq!(args.last().unwrap(), "/out.mp4");
    }

    #[test]
    fn test_frame_args_seek_before_input() {
        let request = FrameRequest { timestamp: 225, width: 1280, height: 720 };
        let args = FfmpegEngine::frame_args(Path::new("/in.mp4"), &request, Path::new("/t.jpg"));

        assert_eq!(args[0], "-ss");
        assert_eq!(args[1], "225");
        assert_eq!(args[2], "-i");
        assert!(contains_pair(&args, "-frames:v", "1"));
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let long = "x".repeat(5000);
        assert_eq!(tail(&long, 100).chars().count(), 100);
        assert_eq!(tail("  short \n", 100), "short");
    }

    #[tokio::test]
    async fn test_missing_binary_reports_spawn_error() {
        let engine = FfmpegEngine::new(&EngineConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ffprobe_path: PathBuf::from("/nonexistent/ffprobe-binary"),
        });
        let err = engine.probe(Path::new("/tmp/whatever.mp4")).await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_stderr_with_invalid_utf8_is_kept() {
        let mut raw = b"frame=  12 \xff\xfe garbage\n".to_vec();
        raw.extend_from_slice(b"No space left on device\n");

        let text = read_lossy(&raw[..]).await;
        assert!(text.contains('\u{FFFD}'));
        assert!(text.contains("No space left on device"));
        assert!(EngineError::Exited {
            program: "ffmpeg".to_string(),
            code: Some(1),
            stderr: tail(&text, STDERR_TAIL_CHARS),
        }
        .is_disk_full());
    }
}
