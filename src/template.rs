//! Fills `.docx` contract templates with worker fields.
//!
//! A template is a Word archive whose text carries `{tag}` placeholders.
//! Word often splits a typed tag over several runs, so every paragraph is
//! treated as one string: a resolved value lands in the run where its tag
//! opened and the rest of the tag is cut from the following runs.
//!
//! `{%signature}` is an image placeholder. Without a signature it renders
//! empty; with one, the picture is embedded as `word/media/signature.*` and
//! drawn inline where the tag stood.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::models::Worker;

pub const SIGNATURE_TAG: &str = "%signature";
pub const DATE_FORMAT: &str = "%d.%m.%Y";

const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const SIGNATURE_REL_ID: &str = "rIdCrewSignature";
const SIGNATURE_MAX_WIDTH_PX: u32 = 200;
const EMU_PER_PX: u64 = 9525;

static TEXT_NODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").expect("valid regex"));

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template is not a valid docx archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to read template: {0}")]
    Io(#[from] std::io::Error),
    #[error("template is missing {0}")]
    MissingPart(&'static str),
    #[error("template part {0} is not valid UTF-8")]
    Encoding(String),
    #[error("unclosed tag '{{{0}' in {1}")]
    UnclosedTag(String, String),
    #[error("unopened tag '{0}}}' in {1}")]
    UnopenedTag(String, String),
    #[error("empty tag '{{}}' in {0}")]
    EmptyTag(String),
    #[error("signature image could not be read: {0}")]
    SignatureImage(#[from] image::ImageError),
    #[error("signature image must be PNG or JPEG")]
    UnsupportedImage,
}

/// Dates rendered into `{date}` and `{signingDate}`.
///
/// Passed in rather than read from the clock so identical inputs give
/// byte-identical documents.
#[derive(Debug, Clone, Copy)]
pub struct FillDates {
    pub today: NaiveDate,
    pub signed_on: Option<NaiveDate>,
}

impl FillDates {
    pub fn unsigned(today: NaiveDate) -> Self {
        Self { today, signed_on: None }
    }

    pub fn signed(today: NaiveDate) -> Self {
        Self { today, signed_on: Some(today) }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub name: String,
    pub content: Vec<u8>,
}

impl GeneratedDocument {
    pub fn content_base64(&self) -> String {
        BASE64.encode(&self.content)
    }
}

/// Fill `template` with the fields of `worker`.
///
/// Missing worker fields render as empty strings. Any malformed archive or
/// tag aborts the whole fill; no partial document is returned.
pub fn fill(
    template: &[u8],
    worker: &Worker,
    template_name: &str,
    signature: Option<&[u8]>,
    dates: &FillDates,
) -> Result<GeneratedDocument, TemplateError> {
    let values = placeholder_values(worker, dates);
    let signature = signature.map(SignatureImage::load).transpose()?;

    let mut parts = read_parts(template)?;
    if !parts.iter().any(|(name, _)| name == DOCUMENT_PART) {
        return Err(TemplateError::MissingPart(DOCUMENT_PART));
    }

    let mut signature_used = false;
    for (name, data) in parts.iter_mut() {
        let name = name.as_str();
        if !is_text_part(name) {
            continue;
        }
        let xml = std::str::from_utf8(data).map_err(|_| TemplateError::Encoding(name.to_string()))?;
        // Headers and footers have their own relationship parts; the
        // signature is only drawn in the body.
        let image = if name == DOCUMENT_PART { signature.as_ref() } else { None };
        let rendered = render_part(xml, name, &values, image)?;
        signature_used |= rendered.signature_used;
        *data = rendered.xml.into_bytes();
    }

    if let (Some(image), true) = (&signature, signature_used) {
        embed_signature(&mut parts, image)?;
    }

    Ok(GeneratedDocument {
        name: output_name(template_name, worker),
        content: write_parts(&parts)?,
    })
}

/// `<template stem>_<name>_<surname>.docx`
pub fn output_name(template_name: &str, worker: &Worker) -> String {
    let trimmed = template_name.trim();
    let stem = trimmed
        .strip_suffix(".docx")
        .or_else(|| trimmed.strip_suffix(".DOCX"))
        .unwrap_or(trimmed);
    format!(
        "{}_{}_{}.docx",
        file_part(stem),
        file_part(&worker.name),
        file_part(&worker.surname)
    )
}

/// Keeps a name piece inside a single path component.
fn file_part(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

pub fn placeholder_values(worker: &Worker, dates: &FillDates) -> BTreeMap<&'static str, String> {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let admin = &worker.admin_data;

    BTreeMap::from([
        ("name", worker.name.clone()),
        ("surname", worker.surname.clone()),
        ("nationality", text(&worker.nationality)),
        ("personalId", text(&worker.personal_id)),
        ("finnishId", text(&worker.finnish_id)),
        ("taxNumber", text(&worker.tax_number)),
        ("email", worker.email.clone()),
        ("phone", text(&worker.phone)),
        ("address", text(&worker.address)),
        ("bankAccount", text(&worker.bank_account)),
        ("bicCode", text(&worker.bic_code)),
        ("experienceType", text(&worker.experience_type)),
        ("experienceDuration", text(&worker.experience_duration)),
        ("jacketSize", text(&worker.jacket_size)),
        ("pantsSize", text(&worker.pants_size)),
        ("waistSize", text(&worker.waist_size)),
        ("bootsSize", text(&worker.boots_size)),
        ("emergencyContact", text(&worker.emergency_contact)),
        ("project", text(&admin.project)),
        ("hourlyRate", text(&admin.hourly_rate)),
        ("contractStart", text(&admin.contract_start)),
        ("contractEnd", text(&admin.contract_end)),
        ("rentAddress", text(&admin.rent_address)),
        ("rentPrice", text(&admin.rent_price)),
        ("date", dates.today.format(DATE_FORMAT).to_string()),
        (
            "signingDate",
            dates
                .signed_on
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
        ),
    ])
}

/// Visible text of a docx body, one line per paragraph.
pub fn document_text(docx: &[u8]) -> Result<String, TemplateError> {
    let mut archive = ZipArchive::new(Cursor::new(docx))?;
    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| TemplateError::MissingPart(DOCUMENT_PART))?
        .read_to_string(&mut xml)
        .map_err(|_| TemplateError::Encoding(DOCUMENT_PART.to_string()))?;

    let mut lines = Vec::new();
    for paragraph in xml.split("</w:p>") {
        let line: String = TEXT_NODE
            .captures_iter(paragraph)
            .map(|cap| unescape_xml(&cap[1]))
            .collect();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok(lines.join("\n"))
}

fn is_text_part(name: &str) -> bool {
    name == DOCUMENT_PART
        || (name.starts_with("word/header") && name.ends_with(".xml"))
        || (name.starts_with("word/footer") && name.ends_with(".xml"))
}

// --- Archive plumbing ---

fn read_parts(template: &[u8]) -> Result<Vec<(String, Vec<u8>)>, TemplateError> {
    let mut archive = ZipArchive::new(Cursor::new(template))?;
    let mut parts = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        parts.push((file.name().to_string(), data));
    }
    Ok(parts)
}

fn write_parts(parts: &[(String, Vec<u8>)]) -> Result<Vec<u8>, TemplateError> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buf);
        // Fixed timestamp keeps output byte-identical across runs.
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        for (name, data) in parts {
            if name.ends_with('/') {
                zip.add_directory(name.as_str(), options)?;
                continue;
            }
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        zip.finish()?;
    }
    Ok(buf.into_inner())
}

// --- Placeholder substitution ---

struct RenderedPart {
    xml: String,
    signature_used: bool,
}

struct TextNode {
    start: usize,
    end: usize,
    text: String,
}

fn render_part(
    xml: &str,
    part_name: &str,
    values: &BTreeMap<&'static str, String>,
    signature: Option<&SignatureImage>,
) -> Result<RenderedPart, TemplateError> {
    let paragraph_ends: Vec<usize> = xml.match_indices("</w:p>").map(|(i, _)| i).collect();

    // Text nodes grouped by the paragraph they sit in.
    let mut groups: Vec<Vec<TextNode>> = Vec::new();
    let mut current_paragraph = usize::MAX;
    for cap in TEXT_NODE.captures_iter(xml) {
        let Some(whole) = cap.get(0) else { continue };
        let paragraph = paragraph_ends.partition_point(|&end| end < whole.start());
        if paragraph != current_paragraph {
            groups.push(Vec::new());
            current_paragraph = paragraph;
        }
        if let Some(group) = groups.last_mut() {
            group.push(TextNode {
                start: whole.start(),
                end: whole.end(),
                text: unescape_xml(&cap[1]),
            });
        }
    }

    let mut replacements: Vec<(usize, usize, String)> = Vec::new();
    let mut signature_used = false;
    let mut drawing_id = 9000;

    for group in &groups {
        let joined: String = group.iter().map(|n| n.text.as_str()).collect();
        if !joined.contains('{') && !joined.contains('}') {
            continue;
        }

        // Byte offset in `joined` where each node starts.
        let mut offsets = Vec::with_capacity(group.len());
        let mut acc = 0;
        for node in group {
            offsets.push(acc);
            acc += node.text.len();
        }
        let node_at = |pos: usize| offsets.partition_point(|&o| o <= pos).saturating_sub(1);

        let mut outputs = vec![String::new(); group.len()];
        let mut open: Option<usize> = None;

        for (pos, ch) in joined.char_indices() {
            match (ch, open) {
                ('{', Some(start)) => {
                    return Err(TemplateError::UnclosedTag(
                        joined[start + 1..pos].to_string(),
                        part_name.to_string(),
                    ));
                }
                ('{', None) => open = Some(pos),
                ('}', None) => {
                    return Err(TemplateError::UnopenedTag(
                        joined[..pos].to_string(),
                        part_name.to_string(),
                    ));
                }
                ('}', Some(start)) => {
                    let tag = joined[start + 1..pos].trim();
                    if tag.is_empty() {
                        return Err(TemplateError::EmptyTag(part_name.to_string()));
                    }
                    let out = &mut outputs[node_at(start)];
                    if tag == SIGNATURE_TAG {
                        if let Some(image) = signature {
                            drawing_id += 1;
                            out.push_str(&image.inline_run(drawing_id));
                            signature_used = true;
                        }
                    } else if let Some(value) = values.get(tag) {
                        out.push_str(&escape_xml(value));
                    } else {
                        tracing::debug!(tag, part = part_name, "unknown placeholder rendered empty");
                    }
                    open = None;
                }
                (_, Some(_)) => {}
                (c, None) => {
                    let mut utf8 = [0u8; 4];
                    outputs[node_at(pos)].push_str(&escape_xml(c.encode_utf8(&mut utf8)));
                }
            }
        }

        if let Some(start) = open {
            return Err(TemplateError::UnclosedTag(
                joined[start + 1..].to_string(),
                part_name.to_string(),
            ));
        }

        for (node, out) in group.iter().zip(outputs) {
            replacements.push((node.start, node.end, format!("<w:t xml:space=\"preserve\">{}</w:t>", out)));
        }
    }

    let mut rendered = String::with_capacity(xml.len());
    let mut cursor = 0;
    for (start, end, text) in replacements {
        rendered.push_str(&xml[cursor..start]);
        rendered.push_str(&text);
        cursor = end;
    }
    rendered.push_str(&xml[cursor..]);

    Ok(RenderedPart { xml: rendered, signature_used })
}

pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let Some(semi) = after.find(';') else {
            out.push_str(after);
            return out;
        };
        let entity = &after[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&after[..=semi]),
        }
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    out
}

// --- Signature image ---

struct SignatureImage {
    data: Vec<u8>,
    extension: &'static str,
    mime: &'static str,
    width_emu: u64,
    height_emu: u64,
}

impl SignatureImage {
    fn load(bytes: &[u8]) -> Result<Self, TemplateError> {
        let reader = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let (extension, mime) = match reader.format() {
            Some(image::ImageFormat::Png) => ("png", "image/png"),
            Some(image::ImageFormat::Jpeg) => ("jpeg", "image/jpeg"),
            _ => return Err(TemplateError::UnsupportedImage),
        };
        let (width, height) = reader.into_dimensions()?;
        if width == 0 || height == 0 {
            return Err(TemplateError::UnsupportedImage);
        }

        let width_px = width.min(SIGNATURE_MAX_WIDTH_PX) as u64;
        let height_px = (height as u64 * width_px / width as u64).max(1);

        Ok(Self {
            data: bytes.to_vec(),
            extension,
            mime,
            width_emu: width_px * EMU_PER_PX,
            height_emu: height_px * EMU_PER_PX,
        })
    }

    fn media_name(&self) -> String {
        format!("word/media/signature.{}", self.extension)
    }

    /// Closes the surrounding text run, draws the picture in a run of its
    /// own and reopens a text run for whatever follows the tag.
    fn inline_run(&self, drawing_id: u32) -> String {
        let (cx, cy) = (self.width_emu, self.height_emu);
        format!(
            concat!(
                "</w:t></w:r><w:r><w:drawing>",
                "<wp:inline xmlns:wp=\"http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing\" distT=\"0\" distB=\"0\" distL=\"0\" distR=\"0\">",
                "<wp:extent cx=\"{cx}\" cy=\"{cy}\"/>",
                "<wp:docPr id=\"{id}\" name=\"Signature {id}\"/>",
                "<a:graphic xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\">",
                "<a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">",
                "<pic:pic xmlns:pic=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">",
                "<pic:nvPicPr><pic:cNvPr id=\"0\" name=\"signature.{ext}\"/><pic:cNvPicPr/></pic:nvPicPr>",
                "<pic:blipFill><a:blip xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" r:embed=\"{rel}\"/>",
                "<a:stretch><a:fillRect/></a:stretch></pic:blipFill>",
                "<pic:spPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>",
                "<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></pic:spPr>",
                "</pic:pic></a:graphicData></a:graphic></wp:inline>",
                "</w:drawing></w:r><w:r><w:t xml:space=\"preserve\">"
            ),
            cx = cx,
            cy = cy,
            id = drawing_id,
            ext = self.extension,
            rel = SIGNATURE_REL_ID,
        )
    }
}

fn embed_signature(parts: &mut Vec<(String, Vec<u8>)>, image: &SignatureImage) -> Result<(), TemplateError> {
    let media = image.media_name();
    parts.retain(|(name, _)| name != &media);
    parts.push((media, image.data.clone()));

    let relationship = format!(
        "<Relationship Id=\"{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/image\" Target=\"media/signature.{}\"/>",
        SIGNATURE_REL_ID, image.extension
    );
    match parts.iter().position(|(name, _)| name == DOCUMENT_RELS_PART) {
        Some(idx) => {
            let data = &mut parts[idx].1;
            let rels = std::str::from_utf8(data)
                .map_err(|_| TemplateError::Encoding(DOCUMENT_RELS_PART.to_string()))?;
            if !rels.contains(SIGNATURE_REL_ID) {
                *data = insert_before(rels, "</Relationships>", &relationship).into_bytes();
            }
        }
        None => parts.push((
            DOCUMENT_RELS_PART.to_string(),
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">{}</Relationships>",
                relationship
            )
            .into_bytes(),
        )),
    }

    let (_, types) = parts
        .iter_mut()
        .find(|(name, _)| name == CONTENT_TYPES_PART)
        .ok_or(TemplateError::MissingPart(CONTENT_TYPES_PART))?;
    let xml = std::str::from_utf8(types)
        .map_err(|_| TemplateError::Encoding(CONTENT_TYPES_PART.to_string()))?;
    let extension_attr = format!("Extension=\"{}\"", image.extension);
    if !xml.to_lowercase().contains(&extension_attr.to_lowercase()) {
        let default = format!("<Default {} ContentType=\"{}\"/>", extension_attr, image.mime);
        *types = insert_before(xml, "</Types>", &default).into_bytes();
    }

    Ok(())
}

fn insert_before(haystack: &str, marker: &str, insert: &str) -> String {
    match haystack.rfind(marker) {
        Some(idx) => format!("{}{}{}", &haystack[..idx], insert, &haystack[idx..]),
        None => format!("{}{}", haystack, insert),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{AdminData, WorkerStatus};

    pub(crate) fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p>{}</w:p>", p))
            .collect();
        docx_with_body(&body)
    }

    pub(crate) fn docx_with_body(body: &str) -> Vec<u8> {
        docx_with_extra_parts(body, &[])
    }

    /// Body plus extra parts such as `word/header1.xml`, given as raw XML.
    pub(crate) fn docx_with_extra_parts(body: &str, extra: &[(&str, &str)]) -> Vec<u8> {
        let document = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{}</w:body></w:document>",
            body
        );
        let content_types = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
            <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
            <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
            <Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
            </Types>";
        let rels = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
            <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"></Relationships>";

        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buf);
            let options = SimpleFileOptions::default();
            zip.start_file(CONTENT_TYPES_PART, options).unwrap();
            zip.write_all(content_types.as_bytes()).unwrap();
            zip.start_file(DOCUMENT_RELS_PART, options).unwrap();
            zip.write_all(rels.as_bytes()).unwrap();
            zip.start_file(DOCUMENT_PART, options).unwrap();
            zip.write_all(document.as_bytes()).unwrap();
            for (name, xml) in extra {
                zip.start_file(*name, options).unwrap();
                zip.write_all(xml.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    pub(crate) fn run(text: &str) -> String {
        format!("<w:r><w:t>{}</w:t></w:r>", text)
    }

    pub(crate) fn signature_png() -> Vec<u8> {
        let img = image::RgbaImage::new(400, 100);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    pub(crate) fn sample_worker() -> Worker {
        Worker {
            id: 1,
            name: "Jānis".to_string(),
            surname: "Bērziņš".to_string(),
            email: "janis@example.com".to_string(),
            phone: None,
            address: None,
            nationality: Some("Latvian".to_string()),
            personal_id: Some("123456-12345".to_string()),
            finnish_id: None,
            tax_number: None,
            bank_account: None,
            bic_code: None,
            experience_type: None,
            experience_duration: None,
            jacket_size: None,
            pants_size: None,
            waist_size: None,
            boots_size: None,
            emergency_contact: None,
            status: WorkerStatus::Active,
            admin_data: AdminData {
                hourly_rate: Some("15.50".to_string()),
                ..Default::default()
            },
            password_hash: None,
            created_at: "2026-01-01 00:00:00".to_string(),
            updated_at: "2026-01-01 00:00:00".to_string(),
        }
    }

    fn dates() -> FillDates {
        FillDates::unsigned(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap())
    }

    fn part(docx: &[u8], name: &str) -> Option<Vec<u8>> {
        let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
        let mut file = archive.by_name(name).ok()?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        Some(data)
    }

    fn header(paragraphs: &[&str]) -> String {
        let body: String = paragraphs.iter().map(|p| format!("<w:p>{}</w:p>", p)).collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:hdr xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">{}</w:hdr>",
            body
        )
    }

    fn part_text(docx: &[u8], name: &str) -> String {
        let xml = String::from_utf8(part(docx, name).unwrap()).unwrap();
        TEXT_NODE
            .captures_iter(&xml)
            .map(|cap| unescape_xml(&cap[1]))
            .collect()
    }

    #[test]
    fn test_fill_substitutes_name_and_rate() {
        let template = docx_with_paragraphs(&[&run("Worker: {name}"), &run("Rate: {hourlyRate} EUR")]);
        let doc = fill(&template, &sample_worker(), "Contract.docx", None, &dates()).unwrap();

        let text = document_text(&doc.content).unwrap();
        assert!(text.contains("Jānis"));
        assert!(text.contains("15.50"));
        assert!(!text.contains("{name}"));
        assert!(!text.contains("{hourlyRate}"));
        assert_eq!(text, "Worker: Jānis\nRate: 15.50 EUR");
    }

    #[test]
    fn test_fill_missing_fields_render_empty() {
        let template = docx_with_paragraphs(&[&run("[{phone}][{project}][{bootsSize}][{unknownField}]")]);
        let doc = fill(&template, &sample_worker(), "Contract", None, &dates()).unwrap();
        assert_eq!(document_text(&doc.content).unwrap(), "[][][][]");
    }

    #[test]
    fn test_fill_without_signature_leaves_signature_empty() {
        let template = docx_with_paragraphs(&[&run("Signed: {%signature} on {signingDate}")]);
        let doc = fill(&template, &sample_worker(), "Contract", None, &dates()).unwrap();

        assert_eq!(document_text(&doc.content).unwrap(), "Signed:  on ");
        assert!(part(&doc.content, "word/media/signature.png").is_none());
    }

    #[test]
    fn test_fill_tag_split_across_runs() {
        let body = format!("{}{}{}", run("Hello {na"), run("m"), run("e}!"));
        let template = docx_with_paragraphs(&[&body]);
        let doc = fill(&template, &sample_worker(), "Contract", None, &dates()).unwrap();
        assert_eq!(document_text(&doc.content).unwrap(), "Hello Jānis!");
    }

    #[test]
    fn test_fill_escapes_values() {
        let mut worker = sample_worker();
        worker.address = Some("Main St <5> & Co".to_string());
        let template = docx_with_paragraphs(&[&run("{address}")]);
        let doc = fill(&template, &worker, "Contract", None, &dates()).unwrap();

        let xml = String::from_utf8(part(&doc.content, DOCUMENT_PART).unwrap()).unwrap();
        assert!(xml.contains("Main St &lt;5&gt; &amp; Co"));
        assert_eq!(document_text(&doc.content).unwrap(), "Main St <5> & Co");
    }

    #[test]
    fn test_fill_renders_dates() {
        let template = docx_with_paragraphs(&[&run("{date}|{signingDate}")]);
        let today = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();

        let unsigned = fill(&template, &sample_worker(), "C", None, &FillDates::unsigned(today)).unwrap();
        assert_eq!(document_text(&unsigned.content).unwrap(), "14.03.2026|");

        let signed = fill(&template, &sample_worker(), "C", None, &FillDates::signed(today)).unwrap();
        assert_eq!(document_text(&signed.content).unwrap(), "14.03.2026|14.03.2026");
    }

    #[test]
    fn test_fill_is_deterministic() {
        let template = docx_with_paragraphs(&[&run("{name} {surname} {date}")]);
        let a = fill(&template, &sample_worker(), "C", None, &dates()).unwrap();
        let b = fill(&template, &sample_worker(), "C", None, &dates()).unwrap();
        assert_eq!(a.content, b.content);
    }

    #[test]
    fn test_output_name() {
        let worker = sample_worker();
        assert_eq!(output_name("Employment.docx", &worker), "Employment_Jānis_Bērziņš.docx");
        assert_eq!(output_name("Employment", &worker), "Employment_Jānis_Bērziņš.docx");
    }

    #[test]
    fn test_output_name_stays_one_path_component() {
        let mut worker = sample_worker();
        worker.name = "x/../../../escaped".to_string();
        worker.surname = "a\\b\tc".to_string();

        let name = output_name("HR/Employment.docx", &worker);
        assert_eq!(name, "HR_Employment_x_.._.._.._escaped_a_b_c.docx");
        assert_eq!(std::path::Path::new(&name).components().count(), 1);
    }

    #[test]
    fn test_fill_substitutes_in_headers_and_footers() {
        let hdr = header(&[&run("Hdr {surname}")]);
        let ftr = header(&[&run("Page of {name} {date}")]).replace("w:hdr", "w:ftr");
        let template = docx_with_extra_parts(
            &format!("<w:p>{}</w:p>", run("Body {name}")),
            &[("word/header1.xml", hdr.as_str()), ("word/footer2.xml", ftr.as_str())],
        );
        let doc = fill(&template, &sample_worker(), "C", None, &dates()).unwrap();

        assert_eq!(part_text(&doc.content, "word/header1.xml"), "Hdr Bērziņš");
        assert_eq!(part_text(&doc.content, "word/footer2.xml"), "Page of Jānis 14.03.2026");
        assert_eq!(document_text(&doc.content).unwrap(), "Body Jānis");
    }

    #[test]
    fn test_signature_in_header_renders_empty() {
        let hdr = header(&[&run("Hdr [{%signature}]")]);
        let template = docx_with_extra_parts(
            &format!("<w:p>{}</w:p>", run("Body {%signature}")),
            &[("word/header1.xml", hdr.as_str())],
        );
        let png = signature_png();
        let doc = fill(&template, &sample_worker(), "C", Some(&png), &dates()).unwrap();

        let header_xml = String::from_utf8(part(&doc.content, "word/header1.xml").unwrap()).unwrap();
        assert_eq!(part_text(&doc.content, "word/header1.xml"), "Hdr []");
        assert!(!header_xml.contains("<w:drawing>"));

        let body_xml = String::from_utf8(part(&doc.content, DOCUMENT_PART).unwrap()).unwrap();
        assert!(body_xml.contains("<w:drawing>"));
        assert_eq!(part(&doc.content, "word/media/signature.png").unwrap(), png);
    }

    #[test]
    fn test_fill_rejects_invalid_archive() {
        let err = fill(b"not a zip", &sample_worker(), "C", None, &dates()).unwrap_err();
        assert!(matches!(err, TemplateError::Archive(_)));
    }

    #[test]
    fn test_fill_rejects_unclosed_tag() {
        let template = docx_with_paragraphs(&[&run("Hello {name")]);
        let err = fill(&template, &sample_worker(), "C", None, &dates()).unwrap_err();
        assert!(matches!(err, TemplateError::UnclosedTag(..)));
    }

    #[test]
    fn test_fill_rejects_unopened_and_empty_tags() {
        let template = docx_with_paragraphs(&[&run("Hello name}")]);
        let err = fill(&template, &sample_worker(), "C", None, &dates()).unwrap_err();
        assert!(matches!(err, TemplateError::UnopenedTag(..)));

        let template = docx_with_paragraphs(&[&run("Hello { }")]);
        let err = fill(&template, &sample_worker(), "C", None, &dates()).unwrap_err();
        assert!(matches!(err, TemplateError::EmptyTag(_)));
    }

    #[test]
    fn test_tag_cannot_span_paragraphs() {
        let template = docx_with_paragraphs(&[&run("{na"), &run("me}")]);
        assert!(fill(&template, &sample_worker(), "C", None, &dates()).is_err());
    }

    #[test]
    fn test_fill_embeds_signature() {
        let template = docx_with_paragraphs(&[&run("Signature: {%signature}")]);
        let png = signature_png();
        let doc = fill(&template, &sample_worker(), "C", Some(&png), &dates()).unwrap();

        assert_eq!(part(&doc.content, "word/media/signature.png").unwrap(), png);

        let xml = String::from_utf8(part(&doc.content, DOCUMENT_PART).unwrap()).unwrap();
        assert!(xml.contains("<w:drawing>"));
        assert!(xml.contains(SIGNATURE_REL_ID));
        // 400x100 scaled to 200x50 px
        assert!(xml.contains(&format!("cx=\"{}\" cy=\"{}\"", 200 * EMU_PER_PX, 50 * EMU_PER_PX)));

        let rels = String::from_utf8(part(&doc.content, DOCUMENT_RELS_PART).unwrap()).unwrap();
        assert!(rels.contains("media/signature.png"));
        let types = String::from_utf8(part(&doc.content, CONTENT_TYPES_PART).unwrap()).unwrap();
        assert!(types.contains("Extension=\"png\""));
    }

    #[test]
    fn test_signature_without_tag_adds_no_media() {
        let template = docx_with_paragraphs(&[&run("No image here")]);
        let doc = fill(&template, &sample_worker(), "C", Some(&signature_png()), &dates()).unwrap();
        assert!(part(&doc.content, "word/media/signature.png").is_none());
    }

    #[test]
    fn test_fill_rejects_non_image_signature() {
        let template = docx_with_paragraphs(&[&run("{%signature}")]);
        assert!(fill(&template, &sample_worker(), "C", Some(b"garbage"), &dates()).is_err());
    }

    #[test]
    fn test_unescape_xml() {
        assert_eq!(unescape_xml("a &amp; b &lt;c&gt; &#65;&#x42;"), "a & b <c> AB");
        assert_eq!(unescape_xml("&bogus; & tail"), "&bogus; & tail");
    }
}
