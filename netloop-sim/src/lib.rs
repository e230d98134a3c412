//! Fake [`Sampler`](netloop_control::Sampler)s, [`Survey`](netloop_control::Survey)s and
//! [`Applier`](netloop_control::Applier)s.
//!
//! The scripted variants make control-loop runs fully reproducible. The random and slow
//! variants exercise the loop under noisy signals and misbehaving collaborators.

mod applier;
pub use applier::{FlakyApplier, PanickingApplier, RecordingApplier, SlowApplier};

mod sampler;
pub use sampler::{FailingSampler, HangingSampler, RandomSampler, ScriptedSampler};

mod survey;
pub use survey::{RandomSurvey, ScriptedSurvey};
