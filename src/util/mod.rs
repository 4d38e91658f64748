//! Debug-only progress tracing, graduated the way the rest of the crate
//! grades its diagnostics: a small ordered enum rather than a tracing
//! framework dependency, gated entirely behind `debug_assertions` so a
//! release build pays nothing for it.
mod trace;

pub use trace::Trace;
