use anyhow::{Context, Result, bail};
use auramix::{
    AudioEngine, AuramixEvent, BasicController, EngineDesc, PositionalController, Source, Vec3,
    Wave,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Command-line player for the auramix mixer
#[derive(Parser)]
#[command(name = "auramix-demo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Frames mixed per period
    #[arg(long, default_value_t = 512)]
    pub period: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List output devices
    Devices,

    /// Play an audio file
    Play {
        file: String,

        /// Stream from disk instead of decoding up front
        #[arg(long)]
        stream: bool,

        /// Loop until the time limit
        #[arg(long = "loop")]
        looped: bool,

        /// Place the sound in space, as x,y,z
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        position: Option<Vec3>,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<f64>,

        /// Circle the sound around the listener
        #[arg(long, requires = "position")]
        orbit: bool,
    },
}

fn parse_vec3(s: &str) -> std::result::Result<Vec3, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("{}: {}", p, e)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z, got {}", s)),
    }
}

pub fn execute(cli: Cli) -> Result<()> {
    let desc = EngineDesc::new().period_size(cli.period);
    match cli.command {
        Commands::Devices => list_devices(desc),
        Commands::Play {
            file,
            stream,
            looped,
            position,
            seconds,
            orbit,
        } => play(desc, &file, stream, looped, position, seconds, orbit),
    }
}

fn list_devices(desc: EngineDesc) -> Result<()> {
    let engine = AudioEngine::new(desc)?;
    for device in engine.devices()? {
        println!(
            "{}  {} Hz  {:?}  {:?}{}",
            device.name,
            device.sample_rate,
            device.format,
            device.channels,
            if device.headphones { "  (headphones)" } else { "" }
        );
    }
    Ok(())
}

enum Voice {
    Basic(BasicController),
    Positional(PositionalController),
}

impl Voice {
    fn basic(&self) -> &BasicController {
        match self {
            Voice::Basic(c) => c,
            Voice::Positional(c) => c,
        }
    }
}

fn play(
    desc: EngineDesc,
    file: &str,
    stream: bool,
    looped: bool,
    position: Option<Vec3>,
    seconds: Option<f64>,
    orbit: bool,
) -> Result<()> {
    let mut engine = AudioEngine::new(desc)?;
    engine.start()?;
    if !engine.is_available() {
        bail!("No usable output device");
    }

    let source: Arc<dyn Source> = if stream {
        let stream: Arc<dyn Source> = engine.open_stream(file)?;
        stream
    } else {
        Arc::new(Wave::from_path(file).with_context(|| format!("Failed to load {}", file))?)
    };
    log::info!(
        "Loaded {} ({:.2}s, {} channels, {} Hz)",
        file,
        source.length(),
        source.channel_count(),
        source.sample_rate()
    );

    let voice = match position {
        Some(location) => Voice::Positional(PositionalController::with_source(
            engine.registry(),
            source,
            location,
        )),
        None => Voice::Basic(BasicController::with_source(engine.registry(), source)),
    };

    if looped {
        voice.basic().play_looped();
    } else {
        voice.basic().play();
    }

    let started = Instant::now();
    let limit = seconds.map(Duration::from_secs_f64);
    loop {
        std::thread::sleep(Duration::from_millis(20));

        for event in engine.poll_events() {
            match event {
                AuramixEvent::EngineError { error } => bail!("Engine error: {}", error),
                event if event.is_error() => log::warn!("{:?}", event),
                event => log::debug!("{:?}", event),
            }
        }

        if let (Voice::Positional(controller), true) = (&voice, orbit) {
            let radius = position.map(|p| p.length()).unwrap_or(1.0).max(0.5);
            let angle = started.elapsed().as_secs_f32() * 0.5;
            controller.move_to(Vec3::new(radius * angle.cos(), radius * angle.sin(), 0.0));
        }

        if voice.basic().is_finished() {
            break;
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            voice.basic().pause();
            break;
        }
    }

    engine.stop();
    log::info!("Played {:.2}s", voice.basic().current_time());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vec3() {
        assert_eq!(parse_vec3("1, -2,3.5").unwrap(), Vec3::new(1.0, -2.0, 3.5));
        assert!(parse_vec3("1,2").is_err());
        assert!(parse_vec3("a,b,c").is_err());
    }

    #[test]
    fn test_play_arguments() {
        let cli = Cli::parse_from([
            "auramix-demo",
            "play",
            "song.ogg",
            "--stream",
            "--position",
            "-1,0,0",
            "--orbit",
        ]);
        match cli.command {
            Commands::Play {
                stream,
                position,
                orbit,
                ..
            } => {
                assert!(stream);
                assert!(orbit);
                assert_eq!(position, Some(Vec3::new(-1.0, 0.0, 0.0)));
            }
            Commands::Devices => panic!("expected play"),
        }
    }
}
