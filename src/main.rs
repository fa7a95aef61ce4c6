use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use go2_voice::command::{CommandMode, SessionConfig, parse_utterance};
use go2_voice::telemetry::{BatteryMonitor, SysfsBattery};
use go2_voice::voice::{AudioRecorder, HttpSynthesizer, Synthesizer};
use go2_voice::{Config, Daemon};

/// Go2 Voice - voice command pipeline and cloud link for a quadruped robot
#[derive(Parser)]
#[command(name = "go2-voice", version, about)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, env = "GO2_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run without the cloud server link
    #[arg(long, env = "GO2_DISABLE_NETWORK")]
    disable_network: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show the intents a phrase parses to
    Parse {
        /// Phrase to parse
        text: String,
        /// Parse as a planning mode sequence
        #[arg(long)]
        planning: bool,
    },
    /// Show the microphone volume meter
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Synthesize and play a phrase
    TestTts {
        /// Text to speak
        #[arg(default_value = "你好，我是小狗")]
        text: String,
    },
    /// Print one battery reading
    Battery,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,go2_voice=info",
        1 => "info,go2_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if cli.disable_network {
        config.network.enabled = false;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Parse { text, planning } => {
                parse_phrase(&config, &text, planning);
                Ok(())
            }
            Command::TestMic { duration } => test_mic(&config, duration).await,
            Command::TestTts { text } => test_tts(&config, &text).await,
            Command::Battery => battery(&config),
        };
    }

    tracing::info!(
        wake_words = ?config.command.wake_words,
        network = config.network.enabled,
        "starting go2 voice"
    );
    tracing::debug!(?config, "loaded configuration");

    Daemon::new(config).run().await?;
    Ok(())
}

/// Print parsed intents using the configured session defaults
fn parse_phrase(config: &Config, text: &str, planning: bool) {
    let mut session = SessionConfig::new(&config.command);
    if planning {
        session.mode = CommandMode::Planning;
    }

    let intents = parse_utterance(text, &session);
    if intents.is_empty() {
        println!("no command matched (would be sent to the language model)");
        return;
    }
    for (i, intent) in intents.iter().enumerate() {
        println!("{}. {intent}", i + 1);
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!(
        "Thresholds: low {} / high {}\n",
        config.audio.low_threshold, config.audio.high_threshold
    );

    let (tx, mut rx) = mpsc::channel(config.audio.max_pending_utterances);
    let mut recorder = AudioRecorder::new(&config.audio, tx)?;
    recorder.start_listening()?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let volume = recorder.take_peak_volume();
        let state = if volume >= config.audio.high_threshold {
            "speech"
        } else if volume >= config.audio.low_threshold {
            "activity"
        } else {
            ""
        };

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (volume / 2.0).clamp(0.0, 50.0) as usize;
        let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);
        println!("[{:2}s] volume {volume:6.1} | [{meter}] {state}", i + 1);

        while let Ok(utterance) = rx.try_recv() {
            println!("      utterance: {:.2}s", utterance.duration_secs());
        }
    }

    recorder.stop_listening();

    println!("\n---");
    println!("If the meter crossed the high threshold while you spoke, capture works.");
    Ok(())
}

/// Test TTS output
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let synthesizer = HttpSynthesizer::new(&config.speech)?;

    println!("Synthesizing speech...");
    let path = synthesizer.synthesize(text).await?;
    println!("Saved to {}", path.display());

    println!("Playing audio...");
    synthesizer.play(&path).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");
    Ok(())
}

/// Print one battery reading
fn battery(config: &Config) -> anyhow::Result<()> {
    let info = SysfsBattery::new(&config.battery).read()?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
