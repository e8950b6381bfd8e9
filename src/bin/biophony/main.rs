//! Playback demo: streams a small built-in metabolic dataset to the
//! default audio device. Build with `--features playback`.

use std::thread;
use std::time::Duration;

use color_eyre::eyre::{eyre, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use biophony::{ControlMessage, Engine, EngineConfig, PathwayRecord};

fn demo_pathways() -> Vec<PathwayRecord> {
    let rows: &[(&str, u32, u32, &str, Option<&str>, f32)] = &[
        ("glycolysis", 1, 1, "carbohydrate", Some("core"), 0.95),
        ("tca_cycle", 3, 2, "carbohydrate", Some("core"), 0.88),
        ("pentose_phosphate", 5, 4, "carbohydrate", None, 0.42),
        ("beta_oxidation", 2, 1, "lipid", Some("fatty_acid"), 0.66),
        ("fatty_acid_synthesis", 9, 8, "lipid", Some("fatty_acid"), 0.35),
        ("sterol_biosynthesis", 15, 8, "lipid", Some("sterol"), 0.18),
        ("bcaa_degradation", 4, 3, "amino", Some("bcaa"), 0.58),
        ("lysine_biosynthesis", 5, 3, "amino", None, 0.31),
        ("tryptophan_metabolism", 16, 9, "amino", Some("aromatic"), 0.22),
        ("methionine_cycle", 6, 5, "amino", None, 0.27),
        ("purine_metabolism", 8, 5, "nucleotide", None, 0.49),
        ("pyrimidine_metabolism", 16, 15, "nucleotide", None, 0.2),
        ("butyrate_production", 7, 4, "scfa", None, 0.73),
        ("propionate_production", 7, 6, "scfa", None, 0.44),
        ("acetate_production", 2, 1, "scfa", None, 0.81),
        ("b12_biosynthesis", 45, 32, "cofactor", None, 0.12),
    ];
    rows.iter()
        .map(|&(id, n, d, cat, sub, abundance)| PathwayRecord {
            id: id.into(),
            numerator: n,
            denominator: d,
            category: cat.into(),
            subcategory: sub.map(Into::into),
            abundance,
        })
        .collect()
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| eyre!("no output device available"))?;
    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate().0 as f32;
    let channels = config.channels() as usize;

    let mut engine_cfg = EngineConfig::default();
    engine_cfg.sample_rate = sample_rate;
    let mut engine = Engine::with_pathways(engine_cfg, &demo_pathways());

    let (mut tx, rx) = rtrb::RingBuffer::new(64);
    engine.set_receiver(rx);

    let mut left = vec![0.0f32; 4096];
    let mut right = vec![0.0f32; 4096];

    let stream = device.build_output_stream(
        &config.into(),
        move |data: &mut [f32], _| {
            let channels = channels.max(1);
            let total = data.len() / channels;
            let mut offset = 0;
            while offset < total {
                let frames = (total - offset).min(left.len());
                engine.render(&mut left[..frames], &mut right[..frames]);
                let chunk = &mut data[offset * channels..(offset + frames) * channels];
                for (i, frame) in chunk.chunks_mut(channels).enumerate() {
                    match frame.len() {
                        1 => frame[0] = 0.5 * (left[i] + right[i]),
                        _ => {
                            frame[0] = left[i];
                            frame[1] = right[i];
                            for extra in frame.iter_mut().skip(2) {
                                *extra = 0.0;
                            }
                        }
                    }
                }
                offset += frames;
            }
        },
        |err| eprintln!("stream error: {err}"),
        None,
    )?;
    stream.play()?;

    println!("playing; focus cycles through the dataset every 20s, ctrl-c to quit");
    let pathway_count = demo_pathways().len();
    let mut focus = 0usize;
    loop {
        thread::sleep(Duration::from_secs(20));
        let _ = tx.push(ControlMessage::SetFocus(Some(focus % pathway_count)));
        focus += 1;
    }
}
