use std::path::Path;
use std::sync::Mutex;

use ab_glyph::{FontVec, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::error::RenderError;
use crate::model::payroll_batch::{BatchEmployeeRecord, PayrollBatch};
use crate::payroll::payslip::{
    FOOTER_NOTE, GeneratedPayslip, PayslipDocument, PayslipRenderer, format_money, payslip_filename,
};

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 1400;
const MARGIN: i32 = 60;
const LINE_GAP: i32 = 34;
const LOGO_HEIGHT: u32 = 48;
const JPEG_QUALITY: u8 = 85;

const WHITE: Rgb<u8> = Rgb([0xff, 0xff, 0xff]);
const INK: Rgb<u8> = Rgb([0x11, 0x18, 0x27]);
const SUBTLE: Rgb<u8> = Rgb([0x37, 0x41, 0x51]);
const MUTED: Rgb<u8> = Rgb([0x6b, 0x72, 0x80]);
const RULE: Rgb<u8> = Rgb([0xe5, 0xe7, 0xeb]);
const SIGNATURE_RULE: Rgb<u8> = Rgb([0x9c, 0xa3, 0xaf]);
const NET_PAY: Rgb<u8> = Rgb([0x06, 0x5f, 0x46]);

struct Fonts {
    regular: FontVec,
    bold: Option<FontVec>,
}

/// Raster backend: draws the fixed payslip layout on one reusable surface and
/// encodes it as JPEG.
pub struct CanvasRenderer {
    company: String,
    fonts: Option<Fonts>,
    logo: Option<RgbImage>,
    surface: Mutex<RgbImage>,
}

impl CanvasRenderer {
    /// A missing font leaves the renderer without a backend: every render then
    /// fails with [`RenderError::BackendUnavailable`]. A missing logo is ignored.
    pub fn new(
        company: impl Into<String>,
        font_path: &Path,
        bold_font_path: Option<&Path>,
        logo_path: Option<&Path>,
    ) -> Self {
        let fonts = match load_font(font_path) {
            Ok(regular) => {
                let bold = bold_font_path.and_then(|p| {
                    load_font(p)
                        .map_err(|e| warn!(error = %e, path = %p.display(), "Bold font unavailable, using regular"))
                        .ok()
                });
                Some(Fonts { regular, bold })
            }
            Err(e) => {
                warn!(error = %e, path = %font_path.display(), "Payslip font unavailable");
                None
            }
        };

        let logo = logo_path.and_then(|p| match image::open(p) {
            Ok(img) => {
                let ratio = img.width() as f32 / img.height().max(1) as f32;
                let width = ((LOGO_HEIGHT as f32) * ratio).round().max(1.0) as u32;
                Some(img.resize_exact(width, LOGO_HEIGHT, FilterType::Triangle).to_rgb8())
            }
            Err(e) => {
                warn!(error = %e, path = %p.display(), "Logo failed to load, rendering without it");
                None
            }
        });

        Self {
            company: company.into(),
            fonts,
            logo,
            surface: Mutex::new(RgbImage::new(WIDTH, HEIGHT)),
        }
    }

    pub fn is_available(&self) -> bool {
        self.fonts.is_some()
    }
}

fn load_font(path: &Path) -> Result<FontVec, RenderError> {
    let bytes = std::fs::read(path)
        .map_err(|e| RenderError::BackendUnavailable(format!("{}: {}", path.display(), e)))?;
    FontVec::try_from_vec(bytes)
        .map_err(|e| RenderError::BackendUnavailable(format!("{}: {}", path.display(), e)))
}

impl PayslipRenderer for CanvasRenderer {
    fn render(
        &self,
        employee: &BatchEmployeeRecord,
        batch: &PayrollBatch,
    ) -> Result<GeneratedPayslip, RenderError> {
        let fonts = self
            .fonts
            .as_ref()
            .ok_or_else(|| RenderError::BackendUnavailable("no font loaded".into()))?;

        let doc = PayslipDocument::compose(&self.company, employee, batch);

        let mut surface = self
            .surface
            .lock()
            .map_err(|_| RenderError::Surface("surface lock poisoned".into()))?;

        let mut pen = Pen {
            img: &mut *surface,
            fonts,
        };
        pen.clear();
        draw_document(&mut pen, &doc, self.logo.as_ref());

        let mut content = Vec::with_capacity(256 * 1024);
        JpegEncoder::new_with_quality(&mut content, JPEG_QUALITY)
            .encode_image(&*surface)?;

        let filename = payslip_filename(employee, batch);
        debug!(employee_id = employee.employee_id, %filename, bytes = content.len(), "Payslip rendered");

        Ok(GeneratedPayslip {
            employee_id: employee.employee_id,
            filename,
            content,
        })
    }
}

#[derive(Clone, Copy)]
enum Weight {
    Regular,
    Bold,
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
}

struct Pen<'a> {
    img: &'a mut RgbImage,
    fonts: &'a Fonts,
}

impl Pen<'_> {
    fn clear(&mut self) {
        for px in self.img.pixels_mut() {
            *px = WHITE;
        }
    }

    /// `y` is the text baseline.
    fn text(&mut self, s: &str, x: i32, y: i32, size: f32, weight: Weight, color: Rgb<u8>, align: Align) {
        let font = match weight {
            Weight::Regular => &self.fonts.regular,
            Weight::Bold => self.fonts.bold.as_ref().unwrap_or(&self.fonts.regular),
        };
        let scale = PxScale::from(size);
        let (w, _) = text_size(scale, font, s);
        let left = match align {
            Align::Left => x,
            Align::Right => x - w as i32,
        };
        let top = y - (size * 0.8).round() as i32;
        draw_text_mut(&mut *self.img, color, left, top, scale, font, s);
    }

    fn rule(&mut self, x0: i32, x1: i32, y: i32, color: Rgb<u8>) {
        draw_line_segment_mut(&mut *self.img, (x0 as f32, y as f32), (x1 as f32, y as f32), color);
    }
}

fn draw_document(pen: &mut Pen<'_>, doc: &PayslipDocument, logo: Option<&RgbImage>) {
    let width = WIDTH as i32;
    let right = width - MARGIN;

    let half = MARGIN / 2;
    draw_hollow_rect_mut(
        &mut *pen.img,
        Rect::at(half, half).of_size(WIDTH - MARGIN as u32, HEIGHT - MARGIN as u32),
        RULE,
    );

    // header
    let mut company_x = MARGIN;
    if let Some(logo) = logo {
        imageops::overlay(&mut *pen.img, logo, MARGIN as i64, (MARGIN - 24) as i64);
        company_x += logo.width() as i32 + 16;
    }
    pen.text(&doc.company, company_x, MARGIN + 10, 36.0, Weight::Bold, INK, Align::Left);
    pen.text(doc.title, right, MARGIN + 10, 28.0, Weight::Bold, INK, Align::Right);
    pen.text(
        &format!("Pay Period: {}", doc.pay_period),
        MARGIN,
        MARGIN + 50,
        18.0,
        Weight::Regular,
        SUBTLE,
        Align::Left,
    );
    pen.rule(MARGIN, right, MARGIN + 72, RULE);

    // employee block
    let mut y = MARGIN + 110;
    pen.text("Employee Information", MARGIN, y, 18.0, Weight::Bold, INK, Align::Left);
    y += 20;
    for (label, value) in &doc.employee_info {
        y += LINE_GAP;
        pen.text(&format!("{label}:"), MARGIN, y, 18.0, Weight::Regular, MUTED, Align::Left);
        pen.text(value, MARGIN + 220, y, 18.0, Weight::Regular, INK, Align::Left);
    }
    y += 20;
    pen.rule(MARGIN, right, y, RULE);

    // earnings | deductions
    y += 40;
    let col_left = MARGIN;
    let col_right = width / 2 + 20;
    pen.text("Earnings", col_left, y, 20.0, Weight::Bold, INK, Align::Left);
    pen.text("Deductions", col_right, y, 20.0, Weight::Bold, INK, Align::Left);
    y += 30;

    let mut left_y = y;
    for (label, amount) in &doc.earnings {
        pen.text(label, col_left, left_y, 18.0, Weight::Regular, INK, Align::Left);
        pen.text(&format_money(*amount), col_right - 40, left_y, 18.0, Weight::Regular, INK, Align::Right);
        left_y += LINE_GAP;
    }
    let mut right_y = y;
    for (label, amount) in &doc.deductions {
        pen.text(label, col_right, right_y, 18.0, Weight::Regular, INK, Align::Left);
        pen.text(&format_money(*amount), right, right_y, 18.0, Weight::Regular, INK, Align::Right);
        right_y += LINE_GAP;
    }

    // totals
    let mut totals_y = left_y.max(right_y) + 20;
    pen.rule(MARGIN, right, totals_y, RULE);
    totals_y += 40;
    for (label, amount) in [("Gross Pay", doc.gross_pay), ("Total Deductions", doc.total_deductions)] {
        pen.text(label, MARGIN, totals_y, 20.0, Weight::Bold, INK, Align::Left);
        pen.text(&format_money(amount), right, totals_y, 20.0, Weight::Bold, INK, Align::Right);
        totals_y += LINE_GAP;
    }
    totals_y += 10;
    pen.rule(MARGIN, right, totals_y, RULE);
    totals_y += 40;
    pen.text("NET PAY", MARGIN, totals_y, 26.0, Weight::Bold, NET_PAY, Align::Left);
    pen.text(&format_money(doc.net_pay), right, totals_y, 26.0, Weight::Bold, NET_PAY, Align::Right);

    // signatures
    let mut foot_y = totals_y + 80;
    pen.text(FOOTER_NOTE, MARGIN, foot_y, 16.0, Weight::Regular, MUTED, Align::Left);
    foot_y += 80;
    pen.rule(MARGIN, MARGIN + 260, foot_y, SIGNATURE_RULE);
    pen.rule(right - 260, right, foot_y, SIGNATURE_RULE);
    pen.text("Prepared By", MARGIN, foot_y + 24, 16.0, Weight::Regular, SUBTLE, Align::Left);
    pen.text("Received By", right, foot_y + 24, 16.0, Weight::Regular, SUBTLE, Align::Right);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::payroll_batch::BatchStatus;
    use crate::test_utils::{sample_batch, sample_employee};

    fn asset(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/fonts").join(name)
    }

    fn renderer(logo: Option<&Path>) -> CanvasRenderer {
        CanvasRenderer::new(
            "Unitop",
            &asset("DejaVuSans.ttf"),
            Some(&asset("DejaVuSans-Bold.ttf")),
            logo,
        )
    }

    #[test]
    fn renders_a_full_page_jpeg() {
        let renderer = renderer(None);
        assert!(renderer.is_available());

        let batch = sample_batch(1, BatchStatus::Completed);
        let emp = sample_employee(7, "Ana", "Reyes");
        let payslip = renderer.render(&emp, &batch).unwrap();

        assert_eq!(payslip.filename, "payslip_reyes_2024-05-31.jpg");
        assert_eq!(&payslip.content[..3], &[0xff, 0xd8, 0xff]);
        let decoded = image::load_from_memory(&payslip.content).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (WIDTH, HEIGHT));
    }

    #[test]
    fn surface_is_cleared_between_renders() {
        let renderer = renderer(None);
        let batch = sample_batch(1, BatchStatus::Completed);

        let first = renderer.render(&sample_employee(1, "Ana", "Reyes"), &batch).unwrap();
        let again = renderer.render(&sample_employee(1, "Ana", "Reyes"), &batch).unwrap();
        assert_eq!(first.content, again.content);
    }

    #[test]
    fn unloadable_logo_still_renders() {
        // a font file is not an image
        let renderer = renderer(Some(&asset("DejaVuSans.ttf")));
        assert!(renderer.is_available());
        assert!(renderer.logo.is_none());

        let batch = sample_batch(1, BatchStatus::Completed);
        let payslip = renderer
            .render(&sample_employee(2, "Maria", "Santos"), &batch)
            .unwrap();
        let decoded = image::load_from_memory(&payslip.content).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (WIDTH, HEIGHT));
    }

    #[test]
    fn missing_font_makes_every_render_fail() {
        let renderer = CanvasRenderer::new(
            "Unitop",
            Path::new("does/not/exist.ttf"),
            None,
            Some(Path::new("does/not/exist.png")),
        );
        assert!(!renderer.is_available());

        let batch = sample_batch(1, BatchStatus::Completed);
        let emp = sample_employee(1, "Ana", "Reyes");
        let err = renderer.render(&emp, &batch).unwrap_err();
        assert!(matches!(err, RenderError::BackendUnavailable(_)));
    }
}
