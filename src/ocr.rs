use anyhow::{anyhow, Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::config::Config;

pub const DEFAULT_OCR_API_URL: &str = "https://api.ocr.space/parse/image";

static PERSONAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{6})\s?-\s?(\d{5})\b").expect("valid regex"));
static TAX_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{11}\b").expect("valid regex"));

// --- Engine trait ---

pub trait OcrEngine {
    fn recognize(&self, image: &[u8]) -> Result<String>;
}

pub fn create_engine(config: &Config) -> Option<Box<dyn OcrEngine>> {
    let api_key = config.ocr_api_key.clone()?;
    Some(Box::new(OcrSpaceEngine::new(
        config.ocr_api_url.clone(),
        api_key,
    )))
}

// --- OCR.space ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    parsed_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrSpaceResponse {
    #[serde(default)]
    parsed_results: Vec<ParsedResult>,
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    error_message: Option<serde_json::Value>,
}

pub struct OcrSpaceEngine {
    api_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl OcrSpaceEngine {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            api_url,
            api_key,
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl OcrEngine for OcrSpaceEngine {
    fn recognize(&self, image: &[u8]) -> Result<String> {
        let mime = image::guess_format(image)
            .map(|f| f.to_mime_type())
            .unwrap_or("image/png");
        let data_url = format!("data:{};base64,{}", mime, BASE64.encode(image));

        let response = self
            .client
            .post(&self.api_url)
            .form(&[
                ("apikey", self.api_key.as_str()),
                ("base64Image", data_url.as_str()),
                ("language", "eng"),
                ("OCREngine", "2"),
            ])
            .send()
            .context("Failed to send request to OCR API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!("OCR API request failed with status {}: {}", status, error_text));
        }

        let parsed: OcrSpaceResponse = response.json().context("Failed to parse OCR API response")?;
        if parsed.is_errored_on_processing {
            let message = parsed
                .error_message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(anyhow!("OCR processing failed: {}", message));
        }

        Ok(parsed
            .parsed_results
            .into_iter()
            .map(|r| r.parsed_text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

// --- Field extraction ---

/// Result of scanning an ID document. Every field is a hint; a miss is
/// never an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdScan {
    pub text: String,
    pub personal_id: Option<String>,
    pub tax_number: Option<String>,
}

impl IdScan {
    pub fn is_empty(&self) -> bool {
        self.personal_id.is_none() && self.tax_number.is_none()
    }
}

/// First `NNNNNN-NNNNN` personal code in `text`, normalized without spaces.
pub fn find_personal_id(text: &str) -> Option<String> {
    PERSONAL_ID
        .captures(text)
        .map(|cap| format!("{}-{}", &cap[1], &cap[2]))
}

/// First standalone run of exactly eleven digits.
pub fn find_tax_number(text: &str) -> Option<String> {
    TAX_NUMBER.find(text).map(|m| m.as_str().to_string())
}

pub fn extract_fields(text: &str) -> IdScan {
    IdScan {
        text: text.to_string(),
        personal_id: find_personal_id(text),
        tax_number: find_tax_number(text),
    }
}

/// Runs OCR once and pattern-matches the result. OCR failures are logged
/// and yield an empty scan.
pub fn scan_id(engine: &dyn OcrEngine, image: &[u8]) -> IdScan {
    match engine.recognize(image) {
        Ok(text) => {
            let scan = extract_fields(&text);
            tracing::debug!(
                found_personal_id = scan.personal_id.is_some(),
                found_tax_number = scan.tax_number.is_some(),
                "ID scan finished"
            );
            scan
        }
        Err(e) => {
            tracing::warn!("OCR failed, continuing without ID hints: {:#}", e);
            IdScan::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEngine(Result<String, String>);

    impl OcrEngine for FixedEngine {
        fn recognize(&self, _image: &[u8]) -> Result<String> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    #[test]
    fn test_find_personal_id() {
        assert_eq!(
            find_personal_id("Some text 123456-12345 more text"),
            Some("123456-12345".to_string())
        );
        assert_eq!(find_personal_id("code: 010190 - 11111"), Some("010190-11111".to_string()));
        assert_eq!(find_personal_id("no id here"), None);
        assert_eq!(find_personal_id("1234567-12345"), None);
        assert_eq!(find_personal_id("123456-123456"), None);
    }

    #[test]
    fn test_find_tax_number() {
        assert_eq!(find_tax_number("Tax no. 12345678901."), Some("12345678901".to_string()));
        assert_eq!(find_tax_number("1234567890"), None);
        assert_eq!(find_tax_number("123456789012"), None);
        assert_eq!(find_tax_number("123456-12345"), None);
    }

    #[test]
    fn test_scan_id_extracts_both() {
        let engine = FixedEngine(Ok("ID CARD\n123456-12345\nTIN 98765432101".to_string()));
        let scan = scan_id(&engine, b"image");
        assert_eq!(scan.personal_id.as_deref(), Some("123456-12345"));
        assert_eq!(scan.tax_number.as_deref(), Some("98765432101"));
        assert!(!scan.is_empty());
    }

    #[test]
    fn test_scan_id_failure_is_not_found() {
        let engine = FixedEngine(Err("timeout".to_string()));
        let scan = scan_id(&engine, b"image");
        assert!(scan.is_empty());
        assert!(scan.text.is_empty());
    }

    #[test]
    fn test_ocr_response_parsing() {
        let json = r#"{"ParsedResults":[{"ParsedText":"123456-12345"}],"IsErroredOnProcessing":false}"#;
        let parsed: OcrSpaceResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.parsed_results[0].parsed_text, "123456-12345");

        let json = r#"{"IsErroredOnProcessing":true,"ErrorMessage":["File too large"]}"#;
        let parsed: OcrSpaceResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.is_errored_on_processing);
        assert!(parsed.parsed_results.is_empty());
    }
}
