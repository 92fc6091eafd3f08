// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Turning a pending file into something the classifier can read

use base64::{engine::general_purpose, Engine as _};
use image::GenericImageView;
use std::fs::File;
use std::io::Read;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use tracing::{debug, warn};

use crate::processor::PendingFile;
use crate::{DocuflowError, Result};

/// Extensions sent to the vision model as pictures
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// Longest side of an image after downscaling
const MAX_IMAGE_SIDE: u32 = 1024;

/// Document content as sent to the classification service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierInput {
    /// A text excerpt
    Text(String),
    /// A base64-encoded image
    Image(String),
}

impl ClassifierInput {
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }
}

/// Read the file into a text excerpt or an encoded image
pub fn prepare_input(file: &PendingFile, max_chars: usize) -> Result<ClassifierInput> {
    if IMAGE_EXTENSIONS.contains(&file.extension.as_str()) {
        let encoded = match prepare_image(&file.path) {
            Ok(data) => general_purpose::STANDARD.encode(&data),
            Err(e) => {
                debug!("Image decode failed for {:?} ({}), sending raw bytes", file.path, e);
                general_purpose::STANDARD.encode(std::fs::read(&file.path)?)
            }
        };
        return Ok(ClassifierInput::Image(encoded));
    }

    if file.extension == ".pdf" {
        match extract_pdf_text(&file.path) {
            Ok(text) if !text.trim().is_empty() => {
                return Ok(ClassifierInput::Text(truncate_chars(&text, max_chars)));
            }
            Ok(_) => debug!("PDF {:?} has no text layer", file.path),
            Err(e) => warn!("{}", e),
        }
    }

    Ok(ClassifierInput::Text(read_excerpt(&file.path, max_chars)?))
}

/// Read at most `max_chars` characters, replacing invalid UTF-8
pub fn read_excerpt(path: &Path, max_chars: usize) -> Result<String> {
    // A char is at most four bytes
    let limit = max_chars.saturating_mul(4) as u64;
    let mut buffer = Vec::new();
    File::open(path)?.take(limit).read_to_end(&mut buffer)?;
    Ok(truncate_chars(&String::from_utf8_lossy(&buffer), max_chars))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Text layer of a PDF; malformed fonts or operators make pdf-extract panic
fn extract_pdf_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    match std::panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(&bytes))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(DocuflowError::Pdf(format!("Text extraction failed: {}", e))),
        Err(_) => Err(DocuflowError::Pdf(format!("Text extraction panicked on malformed PDF {:?}", path))),
    }
}

/// Decode, downscale if too large, and re-encode as JPEG
fn prepare_image(path: &Path) -> Result<Vec<u8>> {
    let img = image::open(path)?;

    let (width, height) = img.dimensions();
    let img = if width > MAX_IMAGE_SIDE || height > MAX_IMAGE_SIDE {
        img.resize(MAX_IMAGE_SIDE, MAX_IMAGE_SIDE, image::imageops::FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel
    let img = image::DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    img.write_to(&mut cursor, image::ImageFormat::Jpeg)?;

    Ok(buffer)
}
