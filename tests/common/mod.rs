//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use go2_voice::agent::LanguageModel;
use go2_voice::config::CommandConfig;
use go2_voice::voice::{Synthesizer, Transcriber};
use go2_voice::{MotionControl, MotionExecutor, MotionPacing, Result};

/// Motion backend that records every call as a string
#[derive(Default)]
pub struct RecordingMotion {
    calls: Mutex<Vec<String>>,
}

impl RecordingMotion {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl MotionControl for RecordingMotion {
    fn move_velocity(&self, vx: f32, vy: f32, yaw_rate: f32) -> Result<()> {
        self.push(format!("move {vx:.2} {vy:.2} {yaw_rate:.2}"))
    }

    fn stand_up(&self) -> Result<()> {
        self.push("stand_up".to_string())
    }

    fn stand_down(&self) -> Result<()> {
        self.push("stand_down".to_string())
    }

    fn balance_stand(&self) -> Result<()> {
        self.push("balance_stand".to_string())
    }

    fn switch_gait(&self, gait: u8) -> Result<()> {
        self.push(format!("gait {gait}"))
    }
}

/// Executor with no pacing over a recording backend
pub fn test_executor() -> (Arc<RecordingMotion>, Arc<MotionExecutor>) {
    let motion = Arc::new(RecordingMotion::default());
    let executor = Arc::new(MotionExecutor::new(
        Arc::clone(&motion) as Arc<dyn MotionControl>,
        MotionPacing::immediate(),
    ));
    (motion, executor)
}

/// Command settings with a single wake word
pub fn command_config(wake_word: &str) -> CommandConfig {
    CommandConfig {
        wake_words: vec![wake_word.to_string()],
        ..CommandConfig::default()
    }
}

/// Transcriber returning queued transcripts in order
#[derive(Default)]
pub struct ScriptedTranscriber {
    transcripts: Mutex<VecDeque<String>>,
    paths: Mutex<Vec<PathBuf>>,
}

impl ScriptedTranscriber {
    pub fn new(transcripts: &[&str]) -> Self {
        Self {
            transcripts: Mutex::new(transcripts.iter().map(ToString::to_string).collect()),
            paths: Mutex::new(Vec::new()),
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        self.paths.lock().unwrap().push(audio_path.to_path_buf());
        self.transcripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| go2_voice::Error::Stt("no transcript queued".to_string()))
    }
}

/// Language model with a fixed answer
pub struct FixedLlm {
    answer: String,
    queries: Mutex<Vec<String>>,
}

impl FixedLlm {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for FixedLlm {
    async fn ask(&self, text: &str) -> String {
        self.queries.lock().unwrap().push(text.to_string());
        self.answer.clone()
    }
}

/// Synthesizer that records what it was asked to say
#[derive(Default)]
pub struct SilentSynthesizer {
    spoken: Mutex<Vec<String>>,
    played: Mutex<Vec<PathBuf>>,
}

impl SilentSynthesizer {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn played(&self) -> Vec<PathBuf> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for SilentSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<PathBuf> {
        let mut spoken = self.spoken.lock().unwrap();
        spoken.push(text.to_string());
        Ok(PathBuf::from(format!("voice_{}.wav", spoken.len())))
    }

    async fn play(&self, audio_path: &Path) -> Result<()> {
        self.played.lock().unwrap().push(audio_path.to_path_buf());
        Ok(())
    }
}

/// Serve one canned HTTP response per connection, forever
///
/// Returns the base URL (`http://127.0.0.1:<port>`) and a log of request
/// bodies.
pub async fn spawn_http_responder(
    status: u16,
    content_type: &'static str,
    body: String,
) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut stream).await;
            log.lock().unwrap().push(request);

            let response = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{addr}"), requests)
}

/// Read headers and a content-length body, returning the body
async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&data);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                return String::from_utf8_lossy(&data[end + 4..end + 4 + length]).to_string();
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}
