use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use log::{error, info};

use cdaudio_emu::config::EmulatorConfig;
use cdaudio_emu::notify::ChannelSink;
use cdaudio_emu::CdEmulator;

/// Virtual CD-audio console: drives the emulator through its string
/// command interface, one command per line.
#[derive(Parser, Debug)]
#[command(name = "vcdplay", version, about)]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Music directory override (TrackNN.* files)
    #[arg(short, long)]
    music_dir: Option<PathBuf>,
}

fn main() {
    if let Err(e) = cdaudio_emu::logging::init() {
        eprintln!("logging init failed: {}", e);
    }

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(EmulatorConfig::default_path);
    let mut config = match EmulatorConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("cannot load {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
    };
    if let Some(dir) = args.music_dir {
        config.music_dir = dir;
    }

    let (sink, notifications) = ChannelSink::new();
    let emulator = Arc::new(
        CdEmulator::builder(config)
            .sink(Arc::new(sink))
            .build(),
    );

    // Notifications print asynchronously, like the message posts they model.
    thread::spawn(move || {
        for (kind, device_id) in notifications {
            println!("[notify] {:?} (device {:#x})", kind, device_id);
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        let emulator = emulator.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            running.store(false, Ordering::Release);
            emulator.shutdown();
            std::process::exit(0);
        }) {
            error!("cannot install interrupt handler: {}", e);
        }
    }

    info!("{} tracks cataloged", emulator.catalog().num_tracks());
    println!("vcdplay console; enter string commands, 'quit' to exit");

    let stdin = io::stdin();
    let mut answer = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!("stdin error: {}", e);
                break;
            }
        }
        if !running.load(Ordering::Acquire) {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        let rc = emulator.send_string(line, &mut answer);
        if rc != 0 {
            println!("error {}", rc);
        } else if !answer.is_empty() {
            println!("{}", answer);
        }
    }

    emulator.shutdown();
}
