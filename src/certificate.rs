//! Certificate layout over a pluggable drawing surface
//!
//! [`render_certificate`] only decides what goes where. Drawing is left to a
//! [`PdfCanvas`], so a PDF backend, a preview or a test recorder can sit
//! behind the same layout.
use super::auth::{Action, Module, Session, authorize};
use super::document::{DocumentRequest, DocumentStatus, DocumentType};
use super::error::RecordError;
use super::official::{self, Official};
use super::resident::Resident;
use super::store::Store;
use super::utils::format_centavos;
use chrono::Datelike;
use tracing::info;

pub const PAGE_WIDTH: f32 = 595.0; // A4 in points
pub const PAGE_HEIGHT: f32 = 842.0;
pub const MARGIN: f32 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
    Italic,
}

pub trait PdfCanvas {
    fn new_page(&mut self, width: f32, height: f32);
    /// `y` grows downward from the top edge.
    fn draw_text(&mut self, x: f32, y: f32, font: Font, size: f32, text: &str);
    fn text_width(&self, font: Font, size: f32, text: &str) -> f32;
    fn finish(&mut self) -> anyhow::Result<Vec<u8>>;
}

/// Heading lines naming the issuing barangay.
#[derive(Debug, Clone)]
pub struct Letterhead {
    pub barangay: String,
    pub municipality: String,
    pub province: Option<String>,
}

/// Monospace approximation that writes each drawn string on its own line.
#[derive(Debug, Default)]
pub struct TextCanvas {
    pages: Vec<Vec<(f32, f32, String)>>,
}

impl PdfCanvas for TextCanvas {
    fn new_page(&mut self, _width: f32, _height: f32) {
        self.pages.push(Vec::new());
    }

    fn draw_text(&mut self, x: f32, y: f32, _font: Font, _size: f32, text: &str) {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        if let Some(page) = self.pages.last_mut() {
            page.push((y, x, text.to_string()));
        }
    }

    fn text_width(&self, _font: Font, size: f32, text: &str) -> f32 {
        text.chars().count() as f32 * size * 0.5
    }

    fn finish(&mut self) -> anyhow::Result<Vec<u8>> {
        let mut out = String::new();
        for (index, page) in self.pages.iter_mut().enumerate() {
            if index > 0 {
                out.push('\u{c}');
            }
            page.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
            for (_, _, text) in page.iter() {
                out.push_str(text);
                out.push('\n');
            }
        }
        Ok(out.into_bytes())
    }
}

fn ordinal(day: u32) -> String {
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{day}{suffix}")
}

fn certification(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::BarangayClearance => {
            "has no derogatory record on file in this office as of this date"
        }
        DocumentType::CertificateOfResidency => "is a bona fide resident of this barangay",
        DocumentType::CertificateOfIndigency => {
            "belongs to an indigent family of this barangay whose income is not sufficient for their daily needs"
        }
        DocumentType::BusinessClearance => {
            "is granted clearance to operate a business within the territorial jurisdiction of this barangay"
        }
        DocumentType::FirstTimeJobseeker => {
            "is a first time jobseeker qualified to avail of the benefits of Republic Act No. 11261"
        }
    }
}

/// Greedy word wrap against the canvas metrics.
fn wrap(canvas: &impl PdfCanvas, font: Font, size: f32, width: f32, text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{line} {word}")
        };
        if !line.is_empty() && canvas.text_width(font, size, &candidate) > width {
            lines.push(std::mem::replace(&mut line, word.to_string()));
        } else {
            line = candidate;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

struct Cursor<'c, C: PdfCanvas> {
    canvas: &'c mut C,
    y: f32,
}

impl<C: PdfCanvas> Cursor<'_, C> {
    fn centered(&mut self, font: Font, size: f32, text: &str) {
        let x = (PAGE_WIDTH - self.canvas.text_width(font, size, text)) / 2.0;
        self.canvas.draw_text(x.max(MARGIN), self.y, font, size, text);
        self.y += size * 1.5;
    }

    fn left(&mut self, font: Font, size: f32, text: &str) {
        self.canvas.draw_text(MARGIN, self.y, font, size, text);
        self.y += size * 1.5;
    }

    fn paragraph(&mut self, size: f32, text: &str) {
        let width = PAGE_WIDTH - 2.0 * MARGIN;
        for line in wrap(&*self.canvas, Font::Regular, size, width, text) {
            self.left(Font::Regular, size, &line);
        }
        self.gap(size);
    }

    fn gap(&mut self, amount: f32) {
        self.y += amount;
    }
}

/// Lay out the certificate for `document` and return the finished bytes.
///
/// Only READY and RELEASED requests print. `issuer` is the signing
/// official; without one the signature block names the office only.
pub fn render_certificate<C: PdfCanvas>(
    document: &DocumentRequest,
    resident: &Resident,
    issuer: Option<&Official>,
    canvas: &mut C,
    letterhead: &Letterhead,
) -> anyhow::Result<Vec<u8>> {
    if !matches!(
        document.status,
        DocumentStatus::Ready | DocumentStatus::Released
    ) {
        return Err(RecordError::Conflict(format!(
            "document {} is {} and cannot be printed",
            document.control_number, document.status
        ))
        .into());
    }

    let issued = document.issued_at.clone().unwrap_or_default();
    let issued_on = issued.date_naive();
    let age = resident.age_on(issued_on);

    canvas.new_page(PAGE_WIDTH, PAGE_HEIGHT);
    let mut cursor = Cursor {
        canvas: &mut *canvas,
        y: MARGIN,
    };

    cursor.centered(Font::Regular, 11.0, "Republic of the Philippines");
    if let Some(province) = &letterhead.province {
        cursor.centered(Font::Regular, 11.0, &format!("Province of {province}"));
    }
    cursor.centered(
        Font::Regular,
        11.0,
        &format!("Municipality of {}", letterhead.municipality),
    );
    cursor.centered(
        Font::Bold,
        14.0,
        &format!("BARANGAY {}", letterhead.barangay.to_uppercase()),
    );
    cursor.centered(Font::Bold, 12.0, "OFFICE OF THE PUNONG BARANGAY");
    cursor.gap(24.0);
    cursor.centered(Font::Bold, 18.0, document.document_type.title());
    cursor.gap(24.0);
    cursor.left(Font::Bold, 11.0, "TO WHOM IT MAY CONCERN:");
    cursor.gap(8.0);

    cursor.paragraph(
        11.0,
        &format!(
            "This is to certify that {}, {age} years of age, {}, residing at Purok {}, \
             Barangay {}, {}, {}.",
            resident.full_name().to_uppercase(),
            resident.civil_status.as_str().to_lowercase(),
            resident.purok,
            letterhead.barangay,
            letterhead.municipality,
            certification(document.document_type),
        ),
    );
    cursor.paragraph(
        11.0,
        &format!(
            "This certification is issued upon the request of the above-named person for {}.",
            document.purpose
        ),
    );
    cursor.paragraph(
        11.0,
        &format!(
            "Issued this {} day of {} at Barangay {}, {}.",
            ordinal(issued_on.day()),
            issued_on.format("%B %Y"),
            letterhead.barangay,
            letterhead.municipality,
        ),
    );

    cursor.gap(36.0);
    match issuer {
        Some(official) => {
            cursor.centered(Font::Bold, 12.0, &official.full_name.to_uppercase());
            cursor.centered(Font::Italic, 11.0, official.position.title());
        }
        None => cursor.centered(Font::Bold, 12.0, "PUNONG BARANGAY"),
    }

    cursor.gap(36.0);
    cursor.left(
        Font::Regular,
        9.0,
        &format!("Control No.: {}", document.control_number),
    );
    if let Some(or_number) = &document.or_number {
        cursor.left(Font::Regular, 9.0, &format!("O.R. No.: {or_number}"));
    }
    cursor.left(
        Font::Regular,
        9.0,
        &format!("Fee paid: PHP {}", format_centavos(document.fee)),
    );

    canvas.finish()
}

/// Load a request with its resident and sitting captain, then render it.
pub fn print<C: PdfCanvas>(
    store: &Store,
    session: &Session,
    document_id: &str,
    canvas: &mut C,
    letterhead: &Letterhead,
) -> anyhow::Result<Vec<u8>> {
    let actor = authorize(session, Module::Documents, Action::View)?;
    let document: DocumentRequest = store.require(document_id)?;
    let resident: Resident = store.require(&document.resident_id)?;
    let captain = official::active_captain(store)?;

    let bytes = render_certificate(&document, &resident, captain.as_ref(), canvas, letterhead)?;
    info!(
        document = %document.id,
        control_number = %document.control_number,
        actor = %actor.id,
        "certificate printed"
    );

    Ok(bytes)
}
