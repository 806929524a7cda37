//! Video decode and encode through `ffmpeg`/`ffprobe` child processes
//! exchanging raw RGB24 frames over pipes.

use crate::annotate::{AnnotatedFrame, Frame};
use crate::error::{PipelineError, Result};
use crate::media::{MediaSink, MediaSource};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempPath;
use tracing::{debug, trace, warn};

/// Exact frame rate as a rational, e.g. `30000/1001`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Option<Self> {
        (num > 0 && den > 0).then_some(Self { num, den })
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().split_once('/') {
            Some((n, d)) => Self::new(n.parse().ok()?, d.parse().ok()?),
            None => Self::new(s.trim().parse().ok()?, 1),
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Container-reported count; not every container carries one.
    pub frame_count: Option<u64>,
}

impl VideoInfo {
    fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// Reads resolution and frame rate of the first video stream.
pub fn probe(path: &Path) -> Result<VideoInfo> {
    let uri = path.display().to_string();
    let meta = fs::metadata(path).map_err(|e| PipelineError::source_open(&uri, e))?;
    if meta.len() == 0 {
        return Err(PipelineError::source_open(&uri, "file is empty"));
    }

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0", "-show_entries"])
        .arg("stream=width,height,r_frame_rate,nb_frames")
        .args(["-of", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| PipelineError::source_open(&uri, format!("cannot run ffprobe: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::source_open(&uri, stderr.trim()));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| PipelineError::source_open(&uri, format!("unreadable probe output: {e}")))?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::source_open(&uri, "no video stream"))?;
    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(PipelineError::source_open(&uri, "video stream has no dimensions"));
    };
    if width == 0 || height == 0 {
        return Err(PipelineError::source_open(&uri, "video stream is zero-sized"));
    }
    let frame_rate = stream
        .r_frame_rate
        .as_deref()
        .and_then(FrameRate::parse)
        .ok_or_else(|| PipelineError::source_open(&uri, "video stream has no frame rate"))?;
    let info = VideoInfo {
        width,
        height,
        frame_rate,
        frame_count: stream.nb_frames.and_then(|n| n.parse().ok()),
    };
    debug!(path = %uri, ?info, "probed video");
    Ok(info)
}

/// Decodes a video file frame by frame.
pub struct VideoFileSource {
    info: VideoInfo,
    child: Child,
    stdout: Option<ChildStdout>,
    uri: String,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let info = probe(path)?;
        let uri = path.display().to_string();
        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-vsync", "passthrough"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| PipelineError::source_open(&uri, format!("cannot run ffmpeg: {e}")))?;
        let stdout = child.stdout.take();
        if stdout.is_none() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PipelineError::source_open(&uri, "failed to capture ffmpeg stdout"));
        }
        Ok(Self {
            info,
            child,
            stdout,
            uri,
        })
    }

    pub fn info(&self) -> VideoInfo {
        self.info
    }

    fn finish(&mut self) -> Result<()> {
        self.stdout = None;
        let status = self.child.wait()?;
        if status.success() {
            debug!(path = %self.uri, "decoder finished");
            Ok(())
        } else {
            Err(PipelineError::Decode(format!(
                "decoder for {} exited with {status}",
                self.uri
            )))
        }
    }
}

impl MediaSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let mut buffer = vec![0u8; self.info.frame_bytes()];
        let mut filled = 0;
        while filled < buffer.len() {
            match stdout.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PipelineError::Decode(e.to_string())),
            }
        }
        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < buffer.len() {
            return Err(PipelineError::Decode(format!(
                "truncated frame: {filled} of {} bytes",
                buffer.len()
            )));
        }
        trace!(path = %self.uri, "frame decoded");
        Frame::from_raw(self.info.width, self.info.height, buffer)
            .map(Some)
            .ok_or_else(|| PipelineError::Decode("frame buffer size mismatch".into()))
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        if self.stdout.take().is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// A freshly encoded video in a temporary location, deleted when dropped.
#[derive(Debug)]
pub struct VideoArtifact {
    path: TempPath,
    download_name: String,
    info: VideoInfo,
    frames: u64,
}

impl VideoArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name offered to the user, `processed_<original name>`.
    pub fn download_name(&self) -> &str {
        &self.download_name
    }

    pub fn info(&self) -> VideoInfo {
        self.info
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Copies the video into `dir` under its download name. The temporary
    /// file is removed afterwards.
    pub fn persist_to(self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let dest = dir.join(&self.download_name);
        fs::copy(&self.path, &dest)?;
        Ok(dest)
    }
}

/// Encodes annotated frames into an MP4 (MPEG-4 Part 2, `mp4v`) with the
/// resolution and frame rate fixed at creation.
pub struct EncodedVideoSink {
    info: VideoInfo,
    child: Child,
    stdin: Option<ChildStdin>,
    output: Option<TempPath>,
    frames: u64,
    done: bool,
}

impl EncodedVideoSink {
    pub fn create(width: u32, height: u32, frame_rate: FrameRate) -> Result<Self> {
        let output = tempfile::Builder::new()
            .prefix("visionflow-")
            .suffix(".mp4")
            .tempfile()?
            .into_temp_path();
        let size = format!("{width}x{height}");
        let rate = frame_rate.to_string();
        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s", size.as_str()])
            .args(["-framerate", rate.as_str(), "-i", "pipe:0", "-an"])
            .args(["-c:v", "mpeg4", "-q:v", "3", "-tag:v", "mp4v", "-pix_fmt", "yuv420p"])
            .args(["-r", rate.as_str(), "-f", "mp4"])
            .arg(&*output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| PipelineError::Encode(format!("cannot run ffmpeg: {e}")))?;
        let stdin = child.stdin.take();
        debug!(path = %output.display(), %size, %rate, "encoder started");
        Ok(Self {
            info: VideoInfo {
                width,
                height,
                frame_rate,
                frame_count: None,
            },
            child,
            stdin,
            output: Some(output),
            frames: 0,
            done: false,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Flushes the encoder and hands over the finished file.
    pub fn finish(mut self, download_name: impl Into<String>) -> Result<VideoArtifact> {
        self.stdin = None;
        let status = self.child.wait()?;
        self.done = true;
        if !status.success() {
            return Err(PipelineError::Encode(format!("encoder exited with {status}")));
        }
        let path = self
            .output
            .take()
            .ok_or_else(|| PipelineError::Encode("output already taken".into()))?;
        debug!(path = %path.display(), frames = self.frames, "encoder finished");
        Ok(VideoArtifact {
            path,
            download_name: download_name.into(),
            info: VideoInfo {
                frame_count: Some(self.frames),
                ..self.info
            },
            frames: self.frames,
        })
    }
}

impl MediaSink for EncodedVideoSink {
    fn push(&mut self, frame: AnnotatedFrame) -> Result<()> {
        let expected = (self.info.width, self.info.height);
        if frame.dimensions() != expected {
            return Err(PipelineError::Encode(format!(
                "frame is {:?}, output is fixed at {expected:?}",
                frame.dimensions()
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PipelineError::Encode("encoder input closed".into()))?;
        stdin
            .write_all(frame.image().as_raw())
            .map_err(|e| PipelineError::Encode(e.to_string()))?;
        self.frames += 1;
        Ok(())
    }
}

impl Drop for EncodedVideoSink {
    fn drop(&mut self) {
        if !self.done {
            self.stdin = None;
            if let Err(e) = self.child.kill() {
                warn!("failed to stop encoder: {e}");
            }
            let _ = self.child.wait();
        }
    }
}
