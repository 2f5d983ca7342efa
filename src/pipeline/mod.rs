//! Pipeline stages for document extraction.
//!
//! Each submodule implements one transformation step and is independently
//! testable; [`crate::extract`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ detect ──▶ render / docx ──┬──▶ text ──▶ analyze ──┐
//! (bytes)   (format)   (page images,   │   (native   (hosted   ├──▶ aggregate
//!                       native text)   │    + OCR)    model)   │
//!                                      └──▶ faces ─────────────┘
//! ```
//!
//! 1. [`input`]     — read the file and build the immutable [`input::Document`]
//! 2. [`detect`]    — classify PDF / DOCX / image by extension and magic bytes
//! 3. [`render`]    — PDF pages and source images to page images; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 4. [`docx`]      — DOCX paragraph text and embedded media
//! 5. [`text`]      — native text, OCR fallback
//! 6. [`faces`]     — detect, pad and crop faces
//! 7. [`analyze`]   — prompt, single model call, strict schema parse
//! 8. [`encode`]    — PNG/JPEG/base64 helpers shared by the stages
//! 9. [`normalize`] — deterministic cleanup of native text and model replies

pub mod analyze;
pub mod detect;
pub mod docx;
pub mod encode;
pub mod faces;
pub mod input;
pub mod normalize;
pub mod render;
pub mod text;
