//! Pipeline stages for PDF freezing.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets the
//! rasteriser be swapped for a test double without touching reassembly.
//!
//! ## Data Flow
//!
//! ```text
//! source.pdf ──▶ rasterize ──▶ page-N.jpg … ──▶ assemble ──▶ output.pdf
//!               (Ghostscript)   (temp dir)      (lopdf)
//!                                                  ▲
//!                                     font ────────┘
//! ```
//!
//! 1. [`rasterize`]: run the engine into a scoped temp directory and return
//!    the page images in numeric order
//! 2. [`font`]: locate and measure the overlay typeface
//! 3. [`assemble`]: one page per image, sized from pixels and DPI, with an
//!    optional label; saved atomically

pub mod assemble;
pub mod font;
pub mod rasterize;
