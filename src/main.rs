use anyhow::Result;
use std::io::BufRead;
use voicedesk::audio::{list_input_devices, LiveMeter, Microphone};
use voicedesk::config::AppConfig;
use voicedesk::pipeline::EchoPipeline;
use voicedesk::playback::CpalPlayer;
use voicedesk::state::ConversationState;
use voicedesk::worker::{start_conversation, ConversationHandle, MicSource, TurnParts};
use voicedesk::{init_logging, init_tracing, log_debug, log_panic};

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    init_tracing(&config);

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log_panic(info);
        default_hook(info);
    }));

    if config.list_input_devices {
        for name in list_input_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    // Resolve the microphone up front so a missing device fails at startup
    // instead of on the first "start".
    let probe = Microphone::new(config.input_device.as_deref())?;
    println!("input device: {}", probe.device_name());
    drop(probe);

    let state = ConversationState::new();
    let meter = LiveMeter::new();
    let capture_cfg = config.capture_config();
    let chunk_samples = capture_cfg.chunk_samples(config.echo_chunk_ms);
    let mut handle: Option<ConversationHandle> = None;

    println!("commands: start, stop, mic, speaker, status, devices, quit");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match line.trim() {
            "start" => {
                if state.is_running() {
                    println!("conversation already running");
                    continue;
                }
                // Reap a worker that stopped on its own before starting anew.
                if let Some(old) = handle.take() {
                    if let Err(err) = old.stop() {
                        println!("previous conversation ended with error: {err}");
                    }
                }
                let worker_cfg = capture_cfg.clone();
                let source_cfg = capture_cfg.clone();
                let device = config.input_device.clone();
                let worker_meter = meter.clone();
                let sample_rate = capture_cfg.sample_rate;
                let started = start_conversation(&state, worker_cfg, move || {
                    let mic = Microphone::new(device.as_deref())?;
                    log_debug(&format!("conversation using input '{}'", mic.device_name()));
                    Ok(TurnParts {
                        source: Box::new(MicSource::new(mic, source_cfg, Some(worker_meter))),
                        pipeline: Box::new(EchoPipeline::new(chunk_samples)),
                        sink: Box::new(CpalPlayer::new(sample_rate)?),
                    })
                });
                match started {
                    Some(h) => {
                        handle = Some(h);
                        println!("conversation started");
                    }
                    None => println!("conversation already running"),
                }
            }
            "stop" => match handle.take() {
                Some(h) => match h.stop() {
                    Ok(()) => println!("conversation stopped"),
                    Err(err) => println!("conversation stopped with error: {err}"),
                },
                None => println!("no conversation to stop"),
            },
            "mic" => {
                let muted = state.toggle_mic();
                println!("microphone {}", if muted { "muted" } else { "live" });
            }
            "speaker" => {
                let muted = state.toggle_speaker();
                println!("speaker {}", if muted { "muted" } else { "live" });
            }
            "status" => {
                println!("{}", serde_json::to_string_pretty(&state.snapshot())?);
                println!("input level: {:.4}", meter.level());
            }
            "devices" => {
                for name in list_input_devices()? {
                    println!("{name}");
                }
            }
            "quit" | "exit" => break,
            "" => {}
            other => println!("unknown command '{other}' (try start, stop, mic, speaker, status, devices, quit)"),
        }
    }

    if let Some(h) = handle.take() {
        if let Err(err) = h.stop() {
            println!("conversation stopped with error: {err}");
        }
    }
    Ok(())
}
