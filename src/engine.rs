//! Block-synchronous render orchestrator.
//!
//! [`Engine::render`] is the single audio-thread entry point: it drains
//! control messages, advances the clock and modulation, runs voice
//! scheduling (layers, grains, ripple cascade), renders everything into
//! the shared buses, applies the effect chain and limits the result.
//! Arbitrary output lengths are handled by chunking into blocks of at
//! most [`crate::MAX_BLOCK_SIZE`] frames; everything the steady state
//! touches is preallocated.

use crate::config::EngineConfig;
use crate::context::SharedContext;
use crate::dsp::Limiter;
use crate::fx::{BusBuffers, MultiTapDelay, Reverb, StereoChorus};
use crate::modulation::ModulationSystem;
use crate::pathway::{PathwayRecord, PathwaySet};
use crate::rng::{RandomSource, SmallRngSource};
use crate::synth::granular::GranularEngine;
use crate::synth::layer::VoiceLayer;
use crate::synth::message::{ControlMessage, MessageReceiver};
use crate::synth::ripple::{PendingRipple, RipplePropagator};
use crate::MAX_BLOCK_SIZE;

/// Periodically refreshed view of engine state for UIs. Reading it
/// costs nothing on the audio thread beyond the refresh itself.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    pub time: f64,
    pub voice_count: usize,
    pub layer_counts: Vec<usize>,
    pub grain_count: usize,
    pub ripple_queue: usize,
    pub cloud_center: f32,
    pub focus_envelope: f32,
    /// (pathway index, envelope level, pan) per active layer voice.
    pub voices: Vec<(usize, f32, f32)>,
}

pub struct Engine {
    cfg: EngineConfig,
    ctx: SharedContext,
    set: PathwaySet,
    modulation: ModulationSystem,
    layers: Vec<VoiceLayer>,
    granular: GranularEngine,
    ripples: RipplePropagator,
    chorus: StereoChorus,
    delay: MultiTapDelay,
    reverb: Reverb,
    limiter: Limiter,
    buses: BusBuffers,
    rng: Box<dyn RandomSource>,
    spawn_scratch: Vec<usize>,
    ripple_scratch: Vec<PendingRipple>,
    snapshot: EngineSnapshot,
    last_report: f64,
    #[cfg(feature = "rtrb")]
    receiver: Option<rtrb::Consumer<ControlMessage>>,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Self {
        let mut rng: Box<dyn RandomSource> = Box::new(SmallRngSource::from_entropy());
        let ctx = SharedContext::new(
            cfg.sample_rate,
            cfg.fundamental,
            cfg.master_volume,
            cfg.focus.clone(),
            cfg.fairness.clone(),
        );
        let mut set = PathwaySet::empty();
        set.set_curve(cfg.consonance);
        let modulation = ModulationSystem::new(cfg.modulation.clone(), 0, rng.as_mut());
        let layers = cfg.layers.iter().cloned().map(VoiceLayer::new).collect();
        let granular = GranularEngine::new(cfg.granular.clone());
        let ripples = RipplePropagator::new(&set, cfg.ripple.clone());
        let chorus = StereoChorus::new(&cfg.chorus, cfg.sample_rate, rng.as_mut());
        let delay = MultiTapDelay::new(&cfg.delay, cfg.sample_rate);
        let reverb = Reverb::new(&cfg.reverb, cfg.sample_rate);
        let limiter = Limiter::new(&cfg.limiter);
        let max_voices: usize = cfg.layers.iter().map(|l| l.max_voices.max(1)).sum();
        let layer_count = cfg.layers.len();

        Self {
            ctx,
            set,
            modulation,
            layers,
            granular,
            ripples,
            chorus,
            delay,
            reverb,
            limiter,
            buses: BusBuffers::new(),
            rng,
            spawn_scratch: Vec::with_capacity(64),
            ripple_scratch: Vec::with_capacity(cfg.ripple.max_queue.max(1)),
            snapshot: EngineSnapshot {
                layer_counts: vec![0; layer_count],
                voices: Vec::with_capacity(max_voices),
                ..EngineSnapshot::default()
            },
            last_report: f64::NEG_INFINITY,
            #[cfg(feature = "rtrb")]
            receiver: None,
            cfg,
        }
    }

    pub fn with_pathways(cfg: EngineConfig, records: &[PathwayRecord]) -> Self {
        let mut engine = Self::new(cfg);
        engine.load_pathways(records);
        engine
    }

    /// Swap in a deterministic random source. Meant for tests and
    /// offline renders; call before the first `render`.
    pub fn with_random_source(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    /// Attach the consumer half of a control-message ring buffer. The
    /// engine drains it at every block start.
    #[cfg(feature = "rtrb")]
    pub fn set_receiver(&mut self, receiver: rtrb::Consumer<ControlMessage>) {
        self.receiver = Some(receiver);
    }

    /// Replace the dataset. Allocates (set compilation, relation graph,
    /// context tables), so hosts should call it from a control path,
    /// not a realtime callback; the engine itself also applies it at a
    /// block boundary when it arrives as a message.
    pub fn load_pathways(&mut self, records: &[PathwayRecord]) {
        self.set = PathwaySet::build(records, &self.cfg.volume, self.set.curve());
        self.ctx.reset_for_set(self.set.len(), self.set.category_count());
        self.modulation.reset_categories(self.set.category_count());
        self.ripples = RipplePropagator::new(&self.set, self.cfg.ripple.clone());
        for layer in &mut self.layers {
            layer.clear();
        }
        self.granular.clear();
    }

    pub fn apply(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::SetFundamental(hz) => {
                self.ctx.set_fundamental(hz);
                for layer in &mut self.layers {
                    layer.refresh_frequencies(&self.ctx, &self.set);
                }
            }
            ControlMessage::SetMasterVolume(gain) => self.ctx.set_master_volume(gain),
            ControlMessage::SetCategoryGain { category, gain } => {
                self.ctx.set_category_gain(category, gain)
            }
            ControlMessage::SetFocus(pathway) => {
                match pathway {
                    Some(idx) if idx < self.set.len() => self.ctx.set_focus(Some(idx)),
                    _ => self.ctx.set_focus(None),
                }
            }
            ControlMessage::SetEmphasis(table) => self.ctx.set_emphasis(&table),
            ControlMessage::SetConsonanceCurve(curve) => {
                self.set.set_curve(curve);
                // Relation strengths depend on consonance.
                self.ripples = RipplePropagator::new(&self.set, self.cfg.ripple.clone());
            }
            ControlMessage::SetGrainDensity { min, max } => self.granular.set_density(min, max),
            ControlMessage::SetReverbDecay(ms) => self.reverb.set_decay(ms),
            ControlMessage::LoadPathways(records) => self.load_pathways(&records),
        }
    }

    /// Render stereo output. `left` and `right` should be equal length;
    /// any length is accepted and chunked internally. On a mismatch the
    /// longer buffer's tail is zeroed rather than left stale.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        let mut offset = 0;
        while offset < frames {
            let chunk = (frames - offset).min(MAX_BLOCK_SIZE);
            self.render_block(
                &mut left[offset..offset + chunk],
                &mut right[offset..offset + chunk],
            );
            offset += chunk;
        }
        left[frames..].fill(0.0);
        right[frames..].fill(0.0);
    }

    fn render_block(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let frames = out_l.len();
        self.drain_messages();

        if self.set.is_empty() {
            out_l.fill(0.0);
            out_r.fill(0.0);
            return;
        }

        self.ctx.advance(frames);
        self.modulation.advance(self.ctx.dt());
        let activity = self.modulation.activity();
        let now = self.ctx.time();

        // Scheduling: organic layer spawns seed the ripple cascade.
        for i in 0..self.layers.len() {
            self.spawn_scratch.clear();
            self.layers[i].update(
                &mut self.ctx,
                &self.set,
                self.rng.as_mut(),
                &mut self.spawn_scratch,
            );
            if self.layers[i].config().ripple_on_spawn {
                for s in 0..self.spawn_scratch.len() {
                    let pathway = self.spawn_scratch[s];
                    self.ripples
                        .on_sounded(pathway, 1.0, 0, activity, now, self.rng.as_mut());
                }
            }
        }
        self.fire_due_ripples(activity, now);
        self.granular
            .update(&mut self.ctx, &self.set, &self.modulation, self.rng.as_mut());

        // Audio: everything renders into the shared buses.
        self.buses.clear(frames);
        for layer in &mut self.layers {
            layer.render(&self.ctx, &self.set, &self.modulation, &mut self.buses, frames);
        }
        self.granular
            .render(&self.ctx, &self.set, &self.modulation, &mut self.buses, frames);

        self.chorus.process(
            &self.buses.dry_l[..frames],
            &self.buses.dry_r[..frames],
            &self.buses.chorus_l[..frames],
            &self.buses.chorus_r[..frames],
            out_l,
            out_r,
            activity,
        );
        self.delay.process(
            &self.buses.delay_l[..frames],
            &self.buses.delay_r[..frames],
            out_l,
            out_r,
        );
        self.reverb.process(
            &self.buses.reverb_l[..frames],
            &self.buses.reverb_r[..frames],
            out_l,
            out_r,
        );
        self.limiter.process_block(out_l, out_r);

        if now - self.last_report >= self.cfg.report_interval {
            self.last_report = now;
            self.refresh_snapshot();
        }
    }

    /// Spawn every ripple whose delay has elapsed into the ripple layer
    /// and let successful spawns propagate the next generation.
    fn fire_due_ripples(&mut self, activity: f32, now: f64) {
        let Some(layer_idx) = self.cfg.ripple_layer else { return };
        if layer_idx >= self.layers.len() {
            return;
        }
        let mut due = std::mem::take(&mut self.ripple_scratch);
        due.clear();
        self.ripples.take_due(now, &mut due);
        for ripple in &due {
            let spawned = self.layers[layer_idx].spawn_pathway(
                ripple.pathway,
                ripple.strength,
                0.0,
                &mut self.ctx,
                &self.set,
                self.rng.as_mut(),
            );
            if spawned {
                self.ripples.on_sounded(
                    ripple.pathway,
                    ripple.strength,
                    ripple.generation,
                    activity,
                    now,
                    self.rng.as_mut(),
                );
            }
        }
        self.ripple_scratch = due;
    }

    fn drain_messages(&mut self) {
        #[cfg(feature = "rtrb")]
        if let Some(mut receiver) = self.receiver.take() {
            while let Some(msg) = receiver.pop_message() {
                self.apply(msg);
            }
            self.receiver = Some(receiver);
        }
    }

    /// Drain an external receiver (tests, offline hosts) instead of the
    /// attached ring buffer.
    pub fn drain_from(&mut self, receiver: &mut impl MessageReceiver) {
        while let Some(msg) = receiver.pop_message() {
            self.apply(msg);
        }
    }

    fn refresh_snapshot(&mut self) {
        let snap = &mut self.snapshot;
        snap.time = self.ctx.time();
        snap.grain_count = self.granular.grain_count();
        snap.ripple_queue = self.ripples.queue_len();
        snap.cloud_center = self.granular.cloud_center();
        snap.focus_envelope = self.ctx.focus_envelope();
        snap.layer_counts.clear();
        snap.voices.clear();
        let mut total = 0;
        for layer in &self.layers {
            snap.layer_counts.push(layer.active_count());
            total += layer.active_count();
            for voice in layer.voices() {
                snap.voices.push((voice.pathway(), voice.envelope_level(), voice.pan()));
            }
        }
        snap.voice_count = total;
    }

    pub fn snapshot(&self) -> &EngineSnapshot {
        &self.snapshot
    }

    pub fn context(&self) -> &SharedContext {
        &self.ctx
    }

    pub fn pathways(&self) -> &PathwaySet {
        &self.set
    }

    pub fn layers(&self) -> &[VoiceLayer] {
        &self.layers
    }

    pub fn sample_rate(&self) -> f32 {
        self.cfg.sample_rate
    }
}
