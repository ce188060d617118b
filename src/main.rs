use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use precache::cli::Args;
use precache::config::CacheConfig;
use precache::core::frame_store::CacheKey;
use precache::core::scheduler::Scheduler;
use precache::entities::{
    MediaItem, PlaybackSource, Playlist, PlaybackTracker, PlaylistModel, RawYuvFile, TestPattern,
};

/// Wall-clock length of one simulated playback tick
const TICK: Duration = Duration::from_millis(40);

fn init_logging(args: &Args) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let default_level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_timestamp_millis();

    if let Some(path) = &args.log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn build_playlist(args: &Args, playlist: &PlaylistModel) -> Result<()> {
    if !args.files.is_empty() {
        for path in &args.files {
            let file = RawYuvFile::open_guessed(path)?;
            info!("Loaded {} ({} frames)", path.display(), file.frame_count());
            playlist.push(Arc::new(file));
        }
        return Ok(());
    }

    let Some((width, height)) = args.frame_size() else {
        bail!("Invalid --size '{}', expected WIDTHxHEIGHT", args.size);
    };
    for i in 0..args.items {
        let pattern = TestPattern::new(&format!("pattern_{}", i + 1), args.frames, width, height)
            .with_delay(Duration::from_millis(args.decode_ms));
        playlist.push(Arc::new(pattern));
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    debug!("Command-line args: {:?}", args);

    let mut config = CacheConfig::load(args.config.as_deref())?;
    args.apply_overrides(&mut config)?;
    info!("Cache config: {:?}", config);

    let playlist = Arc::new(PlaylistModel::new());
    build_playlist(&args, &playlist)?;
    if playlist.is_empty() {
        bail!("Nothing to play");
    }

    let playback = Arc::new(PlaybackTracker::new());
    let mut scheduler = Scheduler::new(playlist.clone(), playback.clone(), config)?;

    let items = playlist.items();
    playback.seek(items[0].id(), 0);
    playback.play();
    scheduler.notify_playlist_changed();

    let jump_at = args.ticks / 2;
    let delete_at = args.ticks * 3 / 4;
    let (mut hits, mut misses) = (0usize, 0usize);

    for tick in 0..args.ticks {
        std::thread::sleep(TICK);
        scheduler.poll();

        let pos = playback.position();
        if let Some(item) = pos.item {
            // What the display would request this tick
            if scheduler.store().get(CacheKey::new(item, pos.frame)).is_some() {
                hits += 1;
            } else {
                misses += 1;
            }
        }

        if tick == jump_at {
            if let Some(last) = items.last() {
                let target = last.frame_count() / 2;
                info!("Jump to {}:{}", last.name(), target);
                playback.seek(last.id(), target);
            }
        } else if tick == delete_at && items.len() > 1 {
            let victim = &items[items.len() / 2];
            info!("Deleting {}", victim.name());
            if pos.item == Some(victim.id()) {
                playback.clear();
            }
            scheduler.notify_item_about_to_be_deleted(victim.id());
            playlist.remove(victim.id());
            scheduler.notify_playlist_changed();
        } else {
            playback.advance(args.step, playlist.as_ref());
        }
        scheduler.notify_playback_tick();
    }

    playback.stop();
    scheduler.notify_playback_tick();
    if !scheduler.wait_idle(Duration::from_secs(30)) {
        warn!("Cache worker still busy after 30s");
    }

    let status = scheduler.status();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", status);
        println!(
            "playback: {} hits, {} misses; store hit rate {:.1}%",
            hits,
            misses,
            scheduler.store().stats().hit_rate() * 100.0
        );
    }

    scheduler.shutdown();
    Ok(())
}
