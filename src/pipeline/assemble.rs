//! Rebuild a PDF from rasterised page images.
//!
//! Each JPEG becomes one page sized exactly to the image's physical
//! dimensions (`pixels × 72 / dpi` points on both axes) and filled edge to
//! edge by the image. The JPEG bytes are embedded unchanged with the
//! `DCTDecode` filter, so only the header is decoded.
//!
//! An optional text label is drawn in red on top of the image, 12 pt, in one
//! of the four corners with a 1 pt margin.

use crate::config::OverlayCorner;
use crate::error::FreezeError;
use crate::pipeline::font::OverlayFont;
use image::codecs::jpeg::JpegDecoder;
use image::{ExtendedColorType, ImageDecoder};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Overlay font size in points.
pub const LABEL_SIZE: f32 = 12.0;

/// Distance between the label and the page edges, in points.
pub const LABEL_MARGIN: f32 = 1.0;

const IMAGE_NAME: &[u8] = b"Im0";
const FONT_NAME: &[u8] = b"F1";

/// Page size in points for `px` pixels rendered at `dpi`.
pub fn points(px: u32, dpi: u32) -> f64 {
    f64::from(px) * 72.0 / f64::from(dpi)
}

/// Baseline origin of a label of width `text_width` on a `width × height`
/// page. PDF user space has its origin at the bottom-left corner.
pub fn label_origin(
    corner: OverlayCorner,
    width: f32,
    height: f32,
    text_width: f32,
    font: &OverlayFont,
) -> (f32, f32) {
    let x = if corner.is_right() {
        width - text_width - LABEL_MARGIN
    } else {
        LABEL_MARGIN
    };
    let y = if corner.is_top() {
        height - LABEL_MARGIN - font.ascent(LABEL_SIZE)
    } else {
        LABEL_MARGIN + font.descent(LABEL_SIZE)
    };
    (x, y)
}

/// What [`PdfAssembler::add_page`] placed.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedPage {
    pub width_px: u32,
    pub height_px: u32,
    pub width_pt: f32,
    pub height_pt: f32,
    /// Baseline origin of the label, if one was drawn.
    pub label_at: Option<(f32, f32)>,
}

struct JpegPage {
    width: u32,
    height: u32,
    color_space: &'static str,
    data: Vec<u8>,
}

/// Incrementally builds the output document, one page per image.
pub struct PdfAssembler {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    /// A load failure is kept and reported only by pages that need text.
    font: Result<OverlayFont, String>,
    font_id: Option<ObjectId>,
}

impl PdfAssembler {
    /// New empty document. `font` is the overlay face on disk, or `None`
    /// for the built-in Courier.
    pub fn new(font: Option<&Path>) -> Self {
        let font = OverlayFont::load(font).map_err(|e| {
            warn!("Overlay font unavailable, labelled pages will fail: {e}");
            e.to_string()
        });
        Self::with_font_result(font)
    }

    /// New empty document using an already loaded face.
    pub fn with_font(font: OverlayFont) -> Self {
        Self::with_font_result(Ok(font))
    }

    fn with_font_result(font: Result<OverlayFont, String>) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            font,
            font_id: None,
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append `image` as the next page.
    ///
    /// `overlay` is drawn when present and non-empty. Nothing is added to the
    /// document if this returns an error.
    pub fn add_page(
        &mut self,
        image: &Path,
        overlay: Option<&str>,
        corner: OverlayCorner,
        dpi: u32,
    ) -> Result<PlacedPage, FreezeError> {
        if dpi == 0 {
            return Err(FreezeError::InvalidConfig("dpi must be > 0".into()));
        }
        let overlay = overlay.filter(|t| !t.is_empty());
        let font = match (overlay, &self.font) {
            (Some(_), Err(detail)) => {
                return Err(FreezeError::Font {
                    detail: detail.clone(),
                })
            }
            (Some(_), Ok(f)) => Some(f.clone()),
            (None, _) => None,
        };

        let jpeg = read_jpeg(image)?;
        let width_pt = points(jpeg.width, dpi) as f32;
        let height_pt = points(jpeg.height, dpi) as f32;

        let image_id = self.doc.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => i64::from(jpeg.width),
                    "Height" => i64::from(jpeg.height),
                    "ColorSpace" => jpeg.color_space,
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                jpeg.data,
            )
            .with_compression(false),
        );

        let mut ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width_pt.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                    height_pt.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.to_vec())]),
            Operation::new("Q", vec![]),
        ];

        let mut resources = dictionary! {
            "XObject" => dictionary! { IMAGE_NAME => image_id },
        };

        let mut label_at = None;
        if let (Some(text), Some(font)) = (overlay, font) {
            let text_width = font.text_width(text, LABEL_SIZE);
            let (x, y) = label_origin(corner, width_pt, height_pt, text_width, &font);
            ops.extend([
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(FONT_NAME.to_vec()), Object::Integer(LABEL_SIZE as i64)],
                ),
                Operation::new(
                    "rg",
                    vec![Object::Integer(1), Object::Integer(0), Object::Integer(0)],
                ),
                Operation::new("Td", vec![x.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(font.encode(text))]),
                Operation::new("ET", vec![]),
            ]);
            let font_id = match self.font_id {
                Some(id) => id,
                None => {
                    let id = font.add_to(&mut self.doc);
                    self.font_id = Some(id);
                    id
                }
            };
            resources.set("Font", dictionary! { FONT_NAME => font_id });
            label_at = Some((x, y));
        }

        let content = Content { operations: ops }
            .encode()
            .map_err(|e| FreezeError::Internal(format!("content stream: {e}")))?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content));

        let media_box: Vec<Object> = vec![
            Object::Integer(0),
            Object::Integer(0),
            width_pt.into(),
            height_pt.into(),
        ];
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box,
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.kids.push(page_id.into());

        debug!(
            "Page {} ← {} ({}x{} px → {:.1}x{:.1} pt{})",
            self.kids.len(),
            image.display(),
            jpeg.width,
            jpeg.height,
            width_pt,
            height_pt,
            if label_at.is_some() { ", labelled" } else { "" }
        );

        Ok(PlacedPage {
            width_px: jpeg.width,
            height_px: jpeg.height,
            width_pt,
            height_pt,
            label_at,
        })
    }

    /// Serialise the whole document to `output`.
    ///
    /// The bytes go to a temporary file next to `output` which is then
    /// renamed over it, so `output` is never left half written and may be the
    /// file the pages were rasterised from.
    pub fn save(mut self, output: &Path) -> Result<(), FreezeError> {
        let page_count = self.kids.len();
        self.finish();

        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| FreezeError::write_failed(output, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| FreezeError::write_failed(output, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            self.doc
                .save_to(&mut writer)
                .map_err(|e| FreezeError::write_failed(output, e))?;
            writer
                .flush()
                .map_err(|e| FreezeError::write_failed(output, e))?;
        }
        tmp.persist(output)
            .map_err(|e| FreezeError::write_failed(output, e.error))?;

        info!("Wrote {} pages to {}", page_count, output.display());
        Ok(())
    }

    /// Serialise the whole document to memory.
    pub fn to_bytes(mut self) -> Result<Vec<u8>, FreezeError> {
        self.finish();
        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| FreezeError::Internal(format!("serialise PDF: {e}")))?;
        Ok(buf)
    }

    fn finish(&mut self) {
        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => std::mem::take(&mut self.kids),
            "Count" => count,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Producer" => Object::string_literal(
                concat!("pdf-freezer ", env!("CARGO_PKG_VERSION")),
            ),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);
        self.doc.compress();
    }
}

/// Read `path` and decode only its JPEG header.
fn read_jpeg(path: &Path) -> Result<JpegPage, FreezeError> {
    let decode_err = |detail: String| FreezeError::ImageDecode {
        path: path.to_path_buf(),
        detail,
    };

    let data = std::fs::read(path).map_err(|e| decode_err(e.to_string()))?;
    let decoder = JpegDecoder::new(Cursor::new(&data)).map_err(|e| decode_err(e.to_string()))?;
    let (width, height) = decoder.dimensions();
    if width == 0 || height == 0 {
        return Err(decode_err(format!("image has zero size ({width}x{height})")));
    }
    let color_space = match decoder.original_color_type() {
        ExtendedColorType::L8 | ExtendedColorType::La8 => "DeviceGray",
        ExtendedColorType::Cmyk8 => "DeviceCMYK",
        _ => "DeviceRGB",
    };
    drop(decoder);

    Ok(JpegPage {
        width,
        height,
        color_space,
        data,
    })
}
