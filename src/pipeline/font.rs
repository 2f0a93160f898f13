//! Overlay typeface: where it comes from, its metrics, and its PDF objects.
//!
//! The serial label needs a legible face and a way to measure text so it can
//! be right-aligned. Two kinds are supported:
//!
//! - **Courier** (default). One of the PDF standard-14 faces, so every viewer
//!   has it and nothing is embedded. Monospaced: every glyph is 600/1000 em.
//! - **TrueType**. A user-supplied `.ttf`, embedded as `FontFile2` with
//!   simple-font widths for printable ASCII.
//!
//! Labels are prefix + digits, so only codes 32..=126 are encoded; anything
//! else is replaced by `?`.

use crate::error::FreezeError;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

const FIRST_CHAR: u8 = 32;
const LAST_CHAR: u8 = 126;
const REPLACEMENT: u8 = b'?';

// Courier AFM metrics, 1/1000 em.
const COURIER_WIDTH: u16 = 600;
const COURIER_ASCENT: i16 = 629;
const COURIER_DESCENT: i16 = -157;

/// Where the overlay typeface comes from.
#[derive(Debug, Clone, Default)]
pub enum FontSource {
    /// Built-in Courier; nothing to load or embed.
    #[default]
    Courier,
    /// A TrueType file on disk.
    File(PathBuf),
    /// TrueType bytes held in memory (e.g. bundled with `include_bytes!`).
    Bytes(Arc<Vec<u8>>),
}

/// A font resource made available on disk for the duration of one job.
///
/// In-memory fonts are written to a temporary file that is deleted when this
/// value is dropped, on success and failure alike.
#[derive(Debug)]
pub struct MaterializedFont {
    path: PathBuf,
    _temp: Option<NamedTempFile>,
}

impl MaterializedFont {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FontSource {
    /// Put the face on disk if it needs a file. Courier needs none.
    pub fn materialize(&self) -> Result<Option<MaterializedFont>, FreezeError> {
        match self {
            FontSource::Courier => Ok(None),
            FontSource::File(path) => Ok(Some(MaterializedFont {
                path: path.clone(),
                _temp: None,
            })),
            FontSource::Bytes(data) => {
                let mut tmp = tempfile::Builder::new()
                    .prefix("pdf-freezer-font-")
                    .suffix(".ttf")
                    .tempfile()
                    .map_err(font_err)?;
                tmp.write_all(data).map_err(font_err)?;
                tmp.flush().map_err(font_err)?;
                debug!("Font materialised at {}", tmp.path().display());
                Ok(Some(MaterializedFont {
                    path: tmp.path().to_path_buf(),
                    _temp: Some(tmp),
                }))
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Program {
    Courier,
    TrueType { data: Vec<u8>, name: String },
}

/// A loaded face with the metrics needed to place the label.
#[derive(Debug, Clone)]
pub struct OverlayFont {
    program: Program,
    /// Advance widths for codes `FIRST_CHAR..=LAST_CHAR`, 1/1000 em.
    widths: Vec<u16>,
    ascent: i16,
    descent: i16,
    bbox: [i16; 4],
    cap_height: i16,
}

impl OverlayFont {
    pub fn courier() -> Self {
        Self {
            program: Program::Courier,
            widths: vec![COURIER_WIDTH; usize::from(LAST_CHAR - FIRST_CHAR) + 1],
            ascent: COURIER_ASCENT,
            descent: COURIER_DESCENT,
            bbox: [-23, -250, 715, 805],
            cap_height: 562,
        }
    }

    /// Load the face at `path`, or Courier when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, FreezeError> {
        match path {
            None => Ok(Self::courier()),
            Some(p) => {
                let data = std::fs::read(p)
                    .map_err(|e| font_err(format!("{}: {e}", p.display())))?;
                Self::from_truetype(data)
            }
        }
    }

    /// Parse TrueType bytes.
    pub fn from_truetype(data: Vec<u8>) -> Result<Self, FreezeError> {
        let (name, metrics) = {
            let face = ttf_parser::Face::parse(&data, 0).map_err(font_err)?;
            let upem = f32::from(face.units_per_em().max(1));
            let scale = |v: i16| (f32::from(v) * 1000.0 / upem).round() as i16;

            let widths: Vec<u16> = (FIRST_CHAR..=LAST_CHAR)
                .map(|code| {
                    face.glyph_index(char::from(code))
                        .and_then(|gid| face.glyph_hor_advance(gid))
                        .map(|adv| (f32::from(adv) * 1000.0 / upem).round() as u16)
                        .unwrap_or(0)
                })
                .collect();

            let b = face.global_bounding_box();
            let ascent = scale(face.ascender());
            let name = postscript_name(&face).unwrap_or_else(|| "OverlayFont".to_string());
            debug!("Loaded TrueType face {name} ({upem} units/em)");
            (
                name,
                Self {
                    program: Program::Courier,
                    widths,
                    ascent,
                    descent: scale(face.descender()),
                    bbox: [scale(b.x_min), scale(b.y_min), scale(b.x_max), scale(b.y_max)],
                    cap_height: face.capital_height().map(scale).unwrap_or(ascent),
                },
            )
        };

        Ok(Self {
            program: Program::TrueType { data, name },
            ..metrics
        })
    }

    /// The PostScript name written as `/BaseFont`.
    pub fn base_font(&self) -> &str {
        match &self.program {
            Program::Courier => "Courier",
            Program::TrueType { name, .. } => name,
        }
    }

    /// Map `text` to single-byte codes, replacing anything outside 32..=126.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        text.chars()
            .map(|c| match u8::try_from(c) {
                Ok(b) if (FIRST_CHAR..=LAST_CHAR).contains(&b) => b,
                _ => REPLACEMENT,
            })
            .collect()
    }

    /// Width of `text` in points at `size`.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: u32 = self
            .encode(text)
            .iter()
            .map(|&b| u32::from(self.widths[usize::from(b - FIRST_CHAR)]))
            .sum();
        units as f32 * size / 1000.0
    }

    /// Distance from baseline to the top of the tallest glyphs at `size`.
    pub fn ascent(&self, size: f32) -> f32 {
        f32::from(self.ascent) * size / 1000.0
    }

    /// Depth below the baseline at `size`, as a positive number.
    pub fn descent(&self, size: f32) -> f32 {
        f32::from(self.descent).abs() * size / 1000.0
    }

    /// Add the font dictionary (and for TrueType, descriptor and program) to
    /// `doc`, returning the font dictionary id.
    pub fn add_to(&self, doc: &mut Document) -> ObjectId {
        match &self.program {
            Program::Courier => doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Courier",
                "Encoding" => "WinAnsiEncoding",
            }),
            Program::TrueType { data, name } => {
                let bbox: Vec<Object> =
                    self.bbox.iter().map(|&v| Object::Integer(v.into())).collect();
                let widths: Vec<Object> =
                    self.widths.iter().map(|&w| Object::Integer(w.into())).collect();
                let file_id = doc.add_object(Stream::new(
                    dictionary! { "Length1" => data.len() as i64 },
                    data.clone(),
                ));
                let descriptor_id = doc.add_object(dictionary! {
                    "Type" => "FontDescriptor",
                    "FontName" => Object::Name(name.clone().into_bytes()),
                    // Nonsymbolic.
                    "Flags" => 32,
                    "FontBBox" => bbox,
                    "ItalicAngle" => 0,
                    "Ascent" => i64::from(self.ascent),
                    "Descent" => i64::from(self.descent),
                    "CapHeight" => i64::from(self.cap_height),
                    "StemV" => 80,
                    "FontFile2" => file_id,
                });
                doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "TrueType",
                    "BaseFont" => Object::Name(name.clone().into_bytes()),
                    "FirstChar" => i64::from(FIRST_CHAR),
                    "LastChar" => i64::from(LAST_CHAR),
                    "Widths" => widths,
                    "FontDescriptor" => descriptor_id,
                    "Encoding" => "WinAnsiEncoding",
                })
            }
        }
    }
}

fn postscript_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;
    face.names()
        .into_iter()
        .filter(|n| n.name_id == name_id::POST_SCRIPT_NAME)
        .find_map(|n| n.to_string())
        .map(|s| {
            s.chars()
                .filter(|c| c.is_ascii_graphic() && !"/()<>[]{}%#".contains(*c))
                .collect::<String>()
        })
        .filter(|s| !s.is_empty())
}

fn font_err(e: impl ToString) -> FreezeError {
    FreezeError::Font {
        detail: e.to_string(),
    }
}
