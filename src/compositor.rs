//! Image Compositor - Template + Code + Text
//!
//! Renders the credential: a fixed background template, the scannable code
//! centered in the upper region, and the record's fields stacked in the
//! lower region. Geometry is configuration, not business logic.

use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Luma, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use qrcode::QrCode;
use serde::{Deserialize, Serialize};

use crate::hashing::sha256_hex;
use crate::pipeline::PipelineError;
use crate::record::RegistrationRecord;

/// Edge length of the scannable code, pixels.
pub const DEFAULT_CODE_SIZE: u32 = 1000;
/// How far the code is lifted above the center of the upper half, pixels.
pub const DEFAULT_CODE_LIFT: i64 = 100;
/// Offset of the first text line below the vertical center, pixels.
pub const DEFAULT_TEXT_OFFSET: i64 = 50;
/// Vertical distance between consecutive text lines, pixels.
pub const DEFAULT_LINE_SPACING: u32 = 60;
/// Text height, pixels.
pub const DEFAULT_FONT_SCALE: f32 = 70.0;

/// Placement of the code and text block on the template canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderGeometry {
    #[serde(default = "default_code_size")]
    pub code_size: u32,
    #[serde(default = "default_code_lift")]
    pub code_lift: i64,
    #[serde(default = "default_text_offset")]
    pub text_offset: i64,
    #[serde(default = "default_line_spacing")]
    pub line_spacing: u32,
    #[serde(default = "default_font_scale")]
    pub font_scale: f32,
}

fn default_code_size() -> u32 { DEFAULT_CODE_SIZE }
fn default_code_lift() -> i64 { DEFAULT_CODE_LIFT }
fn default_text_offset() -> i64 { DEFAULT_TEXT_OFFSET }
fn default_line_spacing() -> u32 { DEFAULT_LINE_SPACING }
fn default_font_scale() -> f32 { DEFAULT_FONT_SCALE }

impl Default for RenderGeometry {
    fn default() -> Self {
        Self {
            code_size: DEFAULT_CODE_SIZE,
            code_lift: DEFAULT_CODE_LIFT,
            text_offset: DEFAULT_TEXT_OFFSET,
            line_spacing: DEFAULT_LINE_SPACING,
            font_scale: DEFAULT_FONT_SCALE,
        }
    }
}

/// A rendered credential, not yet persisted anywhere.
#[derive(Debug, Clone)]
pub struct CredentialArtifact {
    /// Owning registration ID.
    pub id: String,
    /// PNG-encoded composite image.
    pub png: Vec<u8>,
    /// SHA-256 of the PNG bytes, for logs and determinism checks.
    pub hash: String,
}

impl CredentialArtifact {
    /// Transient filename, keyed by the unique ID so concurrent submissions
    /// sharing an email address can never collide.
    pub fn filename(&self) -> String {
        format!("composite_{}.png", self.id)
    }
}

/// Rendering seam. The production implementation composites onto a template
/// image; tests may substitute a cheaper renderer.
pub trait CredentialRenderer: Send + Sync {
    fn render(
        &self,
        record: &RegistrationRecord,
        payload: &str,
    ) -> Result<CredentialArtifact, PipelineError>;
}

/// Renders credentials onto a fixed background template.
pub struct ImageCompositor {
    template_path: PathBuf,
    font_path: PathBuf,
    geometry: RenderGeometry,
}

impl ImageCompositor {
    pub fn new(template_path: PathBuf, font_path: PathBuf, geometry: RenderGeometry) -> Self {
        Self {
            template_path,
            font_path,
            geometry,
        }
    }

    fn load_template(&self) -> Result<RgbaImage, PipelineError> {
        if !self.template_path.exists() {
            return Err(PipelineError::TemplateNotFound(self.template_path.clone()));
        }
        let template = image::open(&self.template_path)
            .map_err(|e| PipelineError::EncodingFailed(format!("template decode: {e}")))?;
        Ok(template.to_rgba8())
    }

    fn load_font(&self) -> Result<FontVec, PipelineError> {
        if !self.font_path.exists() {
            return Err(PipelineError::FontNotFound(self.font_path.clone()));
        }
        let bytes = fs::read(&self.font_path)
            .map_err(|e| PipelineError::EncodingFailed(format!("font read: {e}")))?;
        FontVec::try_from_vec(bytes)
            .map_err(|e| PipelineError::EncodingFailed(format!("font parse: {e}")))
    }

    /// Render the scannable code for `payload` at the configured size.
    fn render_code(&self, payload: &str, canvas_width: u32) -> Result<RgbaImage, PipelineError> {
        let code = QrCode::new(payload.as_bytes())
            .map_err(|e| PipelineError::EncodingFailed(format!("code capacity: {e}")))?;
        let modules = code
            .render::<Luma<u8>>()
            .quiet_zone(true)
            .module_dimensions(1, 1)
            .build();

        // Never let the code spill past the canvas.
        let size = self.geometry.code_size.min(canvas_width.max(1));
        let resized = imageops::resize(&modules, size, size, FilterType::Nearest);
        Ok(DynamicImage::ImageLuma8(resized).to_rgba8())
    }

    fn draw_text_block(
        &self,
        canvas: &mut RgbaImage,
        font: &FontVec,
        record: &RegistrationRecord,
    ) {
        let scale = PxScale::from(self.geometry.font_scale);
        let black = Rgba([0u8, 0u8, 0u8, 255u8]);
        let width = canvas.width() as i64;
        let mut y = canvas.height() as i64 / 2 + self.geometry.text_offset;

        let lines = [
            format!("Name: {}", record.name),
            format!("Email: {}", record.email),
            format!("Phone: {}", record.phone),
            format!("Year of Pass Out: {}", record.passout_year),
            format!("ID: {}", record.id),
        ];

        for line in &lines {
            let (text_w, _) = text_size(scale, font, line);
            let x = ((width - i64::from(text_w)) / 2).max(0);
            draw_text_mut(canvas, black, x as i32, y.max(0) as i32, scale, font, line);
            y += i64::from(self.geometry.line_spacing);
        }
    }
}

impl CredentialRenderer for ImageCompositor {
    fn render(
        &self,
        record: &RegistrationRecord,
        payload: &str,
    ) -> Result<CredentialArtifact, PipelineError> {
        let mut canvas = self.load_template()?;
        let font = self.load_font()?;
        let code = self.render_code(payload, canvas.width())?;

        let code_x = (i64::from(canvas.width()) - i64::from(code.width())) / 2;
        let code_y =
            (i64::from(canvas.height()) / 2 - i64::from(code.height())) / 2 - self.geometry.code_lift;
        imageops::overlay(&mut canvas, &code, code_x.max(0), code_y.max(0));

        self.draw_text_block(&mut canvas, &font, record);

        let mut png = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| PipelineError::EncodingFailed(format!("png encode: {e}")))?;

        let hash = sha256_hex(&png);
        Ok(CredentialArtifact {
            id: record.id.clone(),
            png,
            hash,
        })
    }
}
