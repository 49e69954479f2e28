//! Lane backends for the multiply and requantize stages.
//!
//! The build script picks one backend per build:
//!
//! - `avx2` / `sse` on x86_64: [`x86::Sse41`], 128-bit SSE4.1 integer lanes.
//! - `neon` on AArch64: [`neon::Neon`], `vmull`/`vpadal` and `vqmovn`/`vqmovun`.
//! - anything else: [`portable::Portable`].
//!
//! The chosen one is re-exported as [`Lanes`]. All backends produce identical
//! bits; [`portable`] is always compiled so the others can be checked
//! against it.

pub mod portable;
pub mod traits;

#[cfg(all(target_arch = "x86_64", any(avx2, sse)))]
pub mod x86;

#[cfg(all(target_arch = "aarch64", neon))]
pub mod neon;

pub use traits::{Chunk, DotLanes, RequantizeLanes, RescaleParams};

#[cfg(all(target_arch = "x86_64", any(avx2, sse)))]
pub use x86::Sse41 as Lanes;

#[cfg(all(target_arch = "aarch64", neon))]
pub use neon::Neon as Lanes;

#[cfg(not(any(
    all(target_arch = "x86_64", any(avx2, sse)),
    all(target_arch = "aarch64", neon)
)))]
pub use portable::Portable as Lanes;
