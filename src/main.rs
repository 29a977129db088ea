// src/main.rs
//
// Offline sanity run: build a synth with no store, play two local voices
// through the effects chain, then hand one voice to an in-memory store.

use std::sync::Arc;

use lunette::{
    Claim, EngineConfig, ManualClock, MemoryStore, RemoteStore, VoiceParams, create_synth,
};

/// ===============================
/// Main
/// ===============================

fn main() {
    let config = EngineConfig::default();
    let block_frames = 256;
    let blocks = (config.sample_rate as usize * 2) / block_frames;

    // --------------------------------
    // Synth + renderer
    // --------------------------------

    let store = Arc::new(MemoryStore::unreachable());
    let clock = Arc::new(ManualClock::new(0));
    let remote: Arc<dyn RemoteStore> = store.clone();

    let (mut synth, mut renderer) = match create_synth(&config, remote, clock.clone()) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("failed to build synth: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = synth.load();
    println!("Bank loaded: {:?}", outcome);

    for (voice, amplitude) in [(0, 40.0), (2, 25.0)] {
        let params = VoiceParams {
            amplitude: Some(amplitude),
            active: Some(true),
            ..VoiceParams::default()
        };
        if let Err(e) = synth.update_voice(voice, params) {
            eprintln!("voice {}: {}", voice, e);
        }
    }
    if let Err(e) = synth.set_reverb_decay(1.5) {
        eprintln!("reverb: {}", e);
    }

    // --------------------------------
    // Render
    // --------------------------------

    println!("Rendering {} blocks of {} frames…", blocks, block_frames);

    let ms_per_block = (block_frames as f64 * 1000.0 / config.sample_rate) as u64;
    let mut peak = 0.0f32;
    for block in 0..blocks {
        let out = renderer.render(block_frames);
        let block_peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        peak = peak.max(block_peak);

        if block % 50 == 0 {
            println!(
                "block {:4} @ sample {:7}: peak {:.4}",
                block,
                renderer.sample_position(),
                block_peak
            );
        }

        clock.advance(ms_per_block);
        synth.poll();
    }
    println!("Overall peak: {:.4}", peak);

    // --------------------------------
    // Hand voice 0 to the store
    // --------------------------------

    store.set_unreachable(false);
    if let Err(e) = synth.set_authority(0, Claim::Remote) {
        eprintln!("voice 0: {}", e);
    }
    clock.advance(config.debounce_delay_ms);
    for (voice, result) in synth.poll() {
        println!("voice {} written to store: {:?}", voice, result);
    }
    println!("Store now holds {} oscillator(s)", store.oscillators().len());

    synth.shutdown();
    println!("Sanity run completed.");
}
