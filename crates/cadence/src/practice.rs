//! Interactive front ends for each subcommand.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use cadence_audio::Engine;
use cadence_core::game::harmony::DEFAULT_LEVEL_TIME_LIMIT;
use cadence_core::{
    chord_frequencies, note_for_key, BeatPattern, BeatStrength, EngineEvent, HarmonyLevel,
    HarmonyRound, PatternLibrary, SelectionOutcome, Settings, MAX_BPM, MIN_BPM,
};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::terminal::{say, KeyInput, RawTerminal};

const BPM_STEP: f64 = 5.0;

async fn start_engine(settings: &Settings) -> Result<Engine, anyhow::Error> {
    let engine = Engine::start(settings).await?;
    if let Some(reason) = engine.audio_error() {
        eprintln!("Audio unavailable, running silently: {}", reason);
    }
    Ok(engine)
}

/// Next engine event, or `None` once the engine is gone.
async fn next_event(rx: &mut broadcast::Receiver<EngineEvent>) -> Option<EngineEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("Display fell behind, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

pub async fn metronome(settings: &Settings) -> Result<(), anyhow::Error> {
    let mut engine = start_engine(settings).await?;
    let mut events = engine.subscribe();
    let signature = settings.time_signature();
    let mut bpm = settings.default_bpm.clamp(MIN_BPM, MAX_BPM);
    let mut click = settings.click_enabled;

    let raw = RawTerminal::enter()?;
    let mut keys = raw.keys();
    say(format!("Metronome at {:.0} bpm in {}", bpm, signature));
    say("space: start/stop  [ ]: tempo  m: mute click  q: quit");

    engine.start_clock().await?;
    let mut running = true;

    loop {
        tokio::select! {
            key = keys.recv() => match key {
                Some(KeyInput::Quit) | None => break,
                Some(KeyInput::Space) => {
                    if running {
                        engine.stop_clock().await?;
                    } else {
                        engine.start_clock().await?;
                    }
                    running = !running;
                }
                Some(KeyInput::Press(c @ ('[' | ']'))) => {
                    let step = if c == '[' { -BPM_STEP } else { BPM_STEP };
                    bpm = (bpm + step).clamp(MIN_BPM, MAX_BPM);
                    let pattern = BeatPattern::metronome(bpm, signature)?;
                    engine
                        .configure_pattern(
                            pattern.bpm(),
                            pattern.time_signature_numerator(),
                            pattern.beats().to_vec(),
                        )
                        .await?;
                    say(format!("{:.0} bpm", bpm));
                }
                Some(KeyInput::Press('m')) => {
                    click = !click;
                    engine.set_click_enabled(click).await?;
                    say(if click { "click on" } else { "click off" });
                }
                Some(_) => {}
            },
            event = next_event(&mut events) => match event {
                Some(EngineEvent::Beat { beat_in_measure, strength, .. }) => {
                    let accent = if strength.is_strong() { "*" } else { " " };
                    say(format!("{}{}", accent, beat_in_measure));
                }
                Some(EngineEvent::ClockStopped) => say("stopped"),
                Some(EngineEvent::Error { message }) => say(format!("error: {}", message)),
                Some(_) => {}
                None => break,
            }
        }
    }

    drop(raw);
    engine.shutdown().await?;
    Ok(())
}

pub async fn piano(settings: &Settings) -> Result<(), anyhow::Error> {
    let mut engine = start_engine(settings).await?;
    let mut events = engine.subscribe();

    let raw = RawTerminal::enter()?;
    let mut keys = raw.keys();
    say("a w s e d f t g y h u j: C to B  space: silence  q: quit");
    if !raw.reports_release() {
        say("This terminal does not report key releases: press a key again to stop its note");
    }

    let mut held = HashSet::new();

    loop {
        tokio::select! {
            key = keys.recv() => match key {
                Some(KeyInput::Quit) | None => break,
                Some(KeyInput::Space) => {
                    engine.stop_all().await?;
                    held.clear();
                }
                Some(KeyInput::Press(c)) => {
                    let Some(name) = note_for_key(c) else { continue };
                    if !raw.reports_release() && held.contains(&name) {
                        engine.stop_note(name.as_str()).await?;
                        held.remove(&name);
                    } else {
                        engine.play_note(name.as_str()).await?;
                        held.insert(name);
                    }
                }
                Some(KeyInput::Release(c)) => {
                    if let Some(name) = note_for_key(c) {
                        engine.stop_note(name.as_str()).await?;
                        held.remove(&name);
                    }
                }
                Some(_) => {}
            },
            event = next_event(&mut events) => match event {
                Some(EngineEvent::VoiceStarted { key }) => say(format!("{}", key)),
                Some(EngineEvent::Error { message }) => say(format!("error: {}", message)),
                Some(_) => {}
                None => break,
            }
        }
    }

    drop(raw);
    engine.shutdown().await?;
    Ok(())
}

pub async fn chord(settings: &Settings, symbol: &str, root: &str) -> Result<(), anyhow::Error> {
    let frequencies = chord_frequencies(symbol, root)?;
    let tones: Vec<String> = frequencies.iter().map(|f| format!("{:.2}", f)).collect();
    println!("{}{}: {} Hz", root, symbol, tones.join(", "));

    let mut engine = start_engine(settings).await?;
    engine.play_chord(symbol, root).await?;
    // Chord tones ring out for one second
    tokio::time::sleep(Duration::from_millis(1200)).await;
    engine.shutdown().await?;
    Ok(())
}

pub async fn rhythm(
    settings: &Settings,
    pattern_id: usize,
    seconds: Option<u64>,
) -> Result<(), anyhow::Error> {
    let library = PatternLibrary::builtin();
    let preset = library
        .get(pattern_id)
        .ok_or_else(|| anyhow!("No pattern with id {}", pattern_id))?;
    let pattern = preset.to_pattern()?;

    let mut engine = start_engine(settings).await?;
    let mut events = engine.subscribe();
    engine
        .configure_pattern(
            pattern.bpm(),
            pattern.time_signature_numerator(),
            pattern.beats().to_vec(),
        )
        .await?;

    let raw = RawTerminal::enter()?;
    let mut keys = raw.keys();
    say(format!(
        "{} ({:.0} bpm, {}). Tap space on the strong beats, q to finish",
        preset.name, preset.bpm, preset.time_signature
    ));
    engine.start_round(seconds.map(Duration::from_secs)).await?;

    let mut finishing = false;
    loop {
        tokio::select! {
            key = keys.recv(), if !finishing => match key {
                Some(KeyInput::Space) => engine.tap().await?,
                Some(KeyInput::Quit) | None => {
                    engine.finish_round().await?;
                    finishing = true;
                }
                Some(_) => {}
            },
            event = next_event(&mut events) => match event {
                Some(EngineEvent::Beat { strength, .. }) => {
                    say(match strength {
                        BeatStrength::Strong => "X",
                        BeatStrength::Weak => ".",
                    });
                }
                Some(EngineEvent::TapScored(verdict)) => {
                    say(if verdict.matched { "  hit" } else { "  miss" });
                }
                Some(EngineEvent::SessionFinalized { score, accuracy, mistakes }) => {
                    say(format!(
                        "Score {}  accuracy {:.1}%  mistakes {}",
                        score, accuracy, mistakes
                    ));
                    break;
                }
                Some(EngineEvent::Error { message }) => {
                    say(format!("error: {}", message));
                    if finishing {
                        break;
                    }
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    drop(raw);
    engine.shutdown().await?;
    Ok(())
}

/// Split `"C#m7"` into `("C#", "m7")`.
fn split_chord_name(name: &str) -> (&str, &str) {
    let mut chars = name.char_indices();
    let root_end = match (chars.next(), chars.next()) {
        (Some(_), Some((i, '#'))) => i + 1,
        (Some(_), Some((i, _))) => i,
        (Some((_, c)), None) => c.len_utf8(),
        (None, _) => 0,
    };
    name.split_at(root_end)
}

pub async fn harmony(settings: &Settings, level_id: usize) -> Result<(), anyhow::Error> {
    let mut level = HarmonyLevel::builtin()
        .into_iter()
        .find(|level| level.id == level_id)
        .ok_or_else(|| anyhow!("No harmony level with id {}", level_id))?;
    if level.time_limit == DEFAULT_LEVEL_TIME_LIMIT {
        level.time_limit = settings.harmony_time_limit();
    }

    let mut engine = start_engine(settings).await?;
    let mut events = engine.subscribe();

    let raw = RawTerminal::enter()?;
    let mut keys = raw.keys();
    say(format!("{}: {}", level.name, level.description));
    say(format!("Build: {}", level.target_progression.join(" - ")));
    for (index, chord) in level.chords.iter().enumerate() {
        say(format!("  {}: {} ({})", index + 1, chord.name, chord.roman_numeral));
    }

    let chords = level.chords.clone();
    let mut round = HarmonyRound::start(level, Instant::now());
    let mut countdown = tokio::time::interval(Duration::from_secs(10));

    loop {
        tokio::select! {
            key = keys.recv() => match key {
                Some(KeyInput::Quit) | None => break,
                Some(KeyInput::Press(c)) => {
                    let Some(chord) = c
                        .to_digit(10)
                        .and_then(|d| (d as usize).checked_sub(1))
                        .and_then(|index| chords.get(index))
                    else {
                        continue;
                    };
                    if round.is_expired(Instant::now()) {
                        say(format!("Time is up. Mistakes: {}", round.mistakes()));
                        break;
                    }

                    let (root, symbol) = split_chord_name(&chord.name);
                    engine.play_chord(symbol, root).await?;

                    match round.select(&chord.name, Instant::now())? {
                        SelectionOutcome::Correct => {
                            say(format!("{}  ({})", chord.roman_numeral, round.progression().join(" - ")));
                        }
                        SelectionOutcome::Incorrect => {
                            say(format!("{}  wrong, start over", chord.roman_numeral));
                        }
                        SelectionOutcome::Completed { points } => {
                            say(format!("Complete! {} points", points));
                            break;
                        }
                        SelectionOutcome::Ignored => {}
                    }
                }
                Some(_) => {}
            },
            _ = countdown.tick() => {
                if round.is_expired(Instant::now()) {
                    say(format!("Time is up. Mistakes: {}", round.mistakes()));
                    break;
                }
                say(format!("{}s left", round.seconds_left(Instant::now())));
            },
            event = next_event(&mut events) => match event {
                Some(EngineEvent::Error { message }) => say(format!("error: {}", message)),
                Some(_) => {}
                None => break,
            }
        }
    }

    drop(raw);
    engine.shutdown().await?;
    Ok(())
}
