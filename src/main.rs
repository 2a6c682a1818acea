use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use marionette::api::{ApiServer, ApiState};
use marionette::audio::frame_energy;
use marionette::{
    ArtifactStore, AudioDeviceArbiter, AudioFrame, BackendClient, Capabilities, CommandRecorder,
    Config, CpalBackend, DeviceBackend, MockActuator, MockBackend, ServoAnimator,
    SessionOrchestrator, SessionSettings, StreamSpec, SysfsPwmActuator, WakeWordListener, decoder,
    servo::Actuator,
};

/// Marionette - voice-interaction controller for animatronic devices
#[derive(Parser)]
#[command(name = "marionette", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input levels
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output with a sine tone
    TestSpeaker,
    /// Test the mouth servo with a move and the canned animation
    TestServo {
        /// Position in degrees
        #[arg(default_value = "45")]
        position: i32,
    },
    /// List audio input devices
    Devices,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,marionette=info",
        1 => "info,marionette=debug",
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

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration),
            Command::TestSpeaker => test_speaker(),
            Command::TestServo { position } => test_servo(position),
            Command::Devices => list_devices(),
        };
    }

    let config = Config::from_env()?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        backend = %config.backend.base_url,
        "starting marionette"
    );

    let capabilities = Capabilities::probe(&config);

    // Composition root: pick real or mock per capability and wire every
    // component explicitly. The arbiter is the single device owner; nothing
    // else touches the hardware.
    let device_backend: Arc<dyn DeviceBackend> = if capabilities.audio {
        Arc::new(CpalBackend::new(config.audio.device.clone()))
    } else {
        Arc::new(MockBackend::new())
    };
    let arbiter = Arc::new(AudioDeviceArbiter::new(device_backend));

    let artifacts = ArtifactStore::new(&config.audio.audio_path)?;

    let actuator: Box<dyn Actuator> = if capabilities.actuator {
        match SysfsPwmActuator::open(config.servo.pwm_chip, config.servo.pwm_channel) {
            Ok(actuator) => Box::new(actuator),
            Err(e) => {
                tracing::warn!(error = %e, "servo init failed, using mock actuator");
                Box::new(MockActuator)
            }
        }
    } else {
        Box::new(MockActuator)
    };
    let servo = Arc::new(ServoAnimator::new(actuator, config.servo.clone()));

    let engine = if capabilities.decoder {
        match decoder::load_engine(&config.decoder.model_path, config.audio.sample_rate) {
            Ok(engine) => Some(engine),
            Err(e) => {
                tracing::warn!(error = %e, "decoder load failed");
                None
            }
        }
    } else {
        None
    };

    let record_spec = StreamSpec {
        channels: config.audio.channels,
        sample_rate: config.audio.sample_rate,
        frame_size: config.audio.frame_size,
    };
    let recorder = CommandRecorder::new(
        Arc::clone(&arbiter),
        artifacts.clone(),
        record_spec,
        config.vad.clone(),
    );

    let backend = BackendClient::new(&config.backend);

    let orchestrator = Arc::new(SessionOrchestrator::new(
        Arc::clone(&arbiter),
        recorder,
        engine.clone(),
        backend.clone(),
        Arc::clone(&servo),
        artifacts,
        SessionSettings::from_config(&config),
    ));

    // The wake callback only holds a weak reference so the listener and
    // orchestrator do not keep each other alive
    let listener = engine.map(|engine| {
        let native_spec = StreamSpec {
            channels: config.audio.native_channels,
            sample_rate: config.audio.native_sample_rate,
            frame_size: config.audio.frame_size,
        };
        let weak = Arc::downgrade(&orchestrator);
        let listener = Arc::new(WakeWordListener::new(
            Arc::clone(&arbiter),
            engine,
            config.wake.clone(),
            native_spec,
            config.decimation_ratio(),
            Box::new(move || {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator.trigger();
                }
            }),
        ));
        orchestrator.attach_listener(Arc::clone(&listener));
        listener
    });

    match &listener {
        Some(listener) => {
            if let Err(e) = listener.start() {
                tracing::warn!(error = %e, "wake word listening unavailable");
            }
        }
        None => tracing::info!("wake word listening disabled, manual /wake trigger only"),
    }

    let state = Arc::new(ApiState {
        orchestrator,
        listener: listener.clone(),
        arbiter: Arc::clone(&arbiter),
        servo: Arc::clone(&servo),
        backend,
        capabilities,
        audio_dir: config.audio.audio_path.clone(),
    });

    let server = ApiServer::new(state, config.server.host.clone(), config.server.port);
    let server_handle = server.spawn();

    tracing::info!(phrases = ?config.wake.phrases, "marionette ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    if let Some(listener) = &listener {
        listener.stop();
    }
    arbiter.reset();
    servo.move_to(config.servo.closed_position);
    server_handle.abort();

    Ok(())
}

/// Test microphone input with a level meter
fn test_mic(duration: u64) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let arbiter = AudioDeviceArbiter::new(Arc::new(CpalBackend::new(config.audio.device.clone())));
    let spec = StreamSpec {
        channels: config.audio.native_channels,
        sample_rate: config.audio.native_sample_rate,
        frame_size: config.audio.frame_size,
    };
    arbiter.open_capture("test_mic", &spec)?;

    println!(
        "Capturing {} ch at {} Hz",
        spec.channels, spec.sample_rate
    );
    println!("---");

    let end = Instant::now() + Duration::from_secs(duration);
    let mut second = 0u64;
    let mut next_report = Instant::now() + Duration::from_secs(1);
    let mut peak_energy = 0.0f32;

    while Instant::now() < end {
        match arbiter.read("test_mic")? {
            Some(frame) => {
                let energy = frame_energy(&frame.samples);
                peak_energy = peak_energy.max(energy);
            }
            None => std::thread::sleep(Duration::from_millis(10)),
        }

        if Instant::now() >= next_report {
            second += 1;
            next_report += Duration::from_secs(1);

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let meter_len = ((peak_energy * 400.0).min(50.0)) as usize;
            let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);
            println!("[{second:2}s] peak RMS: {peak_energy:.4} | [{meter}]");
            peak_energy = 0.0;
        }
    }

    arbiter.close("test_mic");

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If it stayed at 0, check `arecord -l` for the device list.");

    Ok(())
}

/// Test speaker output with a 440 Hz tone
fn test_speaker() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let arbiter = AudioDeviceArbiter::new(Arc::new(CpalBackend::new(config.audio.device.clone())));
    let spec = StreamSpec {
        channels: 1,
        sample_rate: config.audio.sample_rate,
        frame_size: 1024,
    };
    arbiter.open_playback("test_speaker", &spec)?;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let samples: Vec<i16> = (0..spec.sample_rate * 2)
        .map(|i| {
            let t = i as f32 / spec.sample_rate as f32;
            ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3 * 32767.0) as i16
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), spec.sample_rate);
    for chunk in samples.chunks(spec.samples_per_frame()) {
        arbiter.write(
            "test_speaker",
            &AudioFrame {
                samples: chunk.to_vec(),
            },
        )?;
    }

    let deadline = Instant::now() + Duration::from_secs(4);
    while arbiter.pending_playback("test_speaker") > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    std::thread::sleep(Duration::from_millis(100));
    arbiter.close("test_speaker");

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Test the mouth servo
fn test_servo(position: i32) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let capabilities = Capabilities::probe(&config);

    let actuator: Box<dyn Actuator> = if capabilities.actuator {
        Box::new(SysfsPwmActuator::open(
            config.servo.pwm_chip,
            config.servo.pwm_channel,
        )?)
    } else {
        println!("(no PWM channel exported; moves are simulated)");
        Box::new(MockActuator)
    };

    let servo = ServoAnimator::new(actuator, config.servo.clone());

    println!("Moving to {position} degrees...");
    servo.move_to(position);
    std::thread::sleep(Duration::from_millis(500));

    println!("Running the canned talking animation...");
    servo.animate(None);

    println!("Done; resting at {} degrees", servo.position());
    Ok(())
}

/// List audio input devices
fn list_devices() -> anyhow::Result<()> {
    let backend = CpalBackend::new(None);
    let devices = backend.list_devices();

    if devices.is_empty() {
        println!("No audio input devices found");
        return Ok(());
    }

    println!("Audio input devices:");
    for device in devices {
        println!(
            "  [{}] {} ({} ch, {} Hz)",
            device.index, device.name, device.channels, device.sample_rate
        );
    }

    Ok(())
}
