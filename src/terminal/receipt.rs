//! Receipt text recovery and formatting.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use lazy_static::lazy_static;
use regex::Regex;

use super::types::EmbeddedReceipt;
use crate::models::ReceiptData;

/// Terminal line separators, each replaced by a newline.
const LINE_BREAKS: [&str; 5] = ["\r\n", "\r", "\x1c", "\x1e", "\x1f"];

const CURRENCY_SYMBOLS: [char; 3] = ['€', '$', '£'];

const MERCHANT_HEADERS: [&str; 3] = ["CÓPIA COMERCIANTE", "Cópia Comerciante", "cópia comerciante"];
const CLIENT_HEADERS: [&str; 3] = ["CÓPIA CLIENTE", "Cópia Cliente", "cópia cliente"];

/// Separates the merchant and client segments of an embedded receipt.
const SEGMENT_SEPARATOR: char = '\x01';

lazy_static! {
    static ref DATE_TOKEN: Regex = Regex::new(r"(\S)[ \t]*(\b\d{2}-\d{2}-\d{2}\b)").unwrap();
}

/// Normalise raw receipt text and split it into merchant and client copies.
///
/// Text before the first copy header is dropped. Without any header the
/// whole text is the merchant copy.
pub fn format_receipt(raw: &str) -> ReceiptData {
    let mut text = raw.to_string();
    for separator in LINE_BREAKS {
        text = text.replace(separator, "\n");
    }
    let text = DATE_TOKEN.replace_all(&text, "$1\n$2");
    let text: String = text.chars().filter(|c| !CURRENCY_SYMBOLS.contains(c)).collect();

    let merchant = find_header(&text, &MERCHANT_HEADERS);
    let client = find_header(&text, &CLIENT_HEADERS);

    let (merchant_copy, client_copy) = match (merchant, client) {
        (Some(m), Some(c)) if m.0 < c.0 => (&text[m.1..c.0], &text[c.1..]),
        (Some(m), Some(c)) => (&text[m.1..], &text[c.1..m.0]),
        (Some(m), None) => (&text[m.1..], ""),
        (None, Some(c)) => (&text[..c.0], &text[c.1..]),
        (None, None) => (text.as_str(), ""),
    };

    ReceiptData {
        merchant_copy: clean_copy(merchant_copy),
        client_copy: clean_copy(client_copy),
    }
}

/// Earliest occurrence of any header variant, as a byte range.
fn find_header(text: &str, variants: &[&str]) -> Option<(usize, usize)> {
    variants
        .iter()
        .filter_map(|header| text.find(header).map(|start| (start, start + header.len())))
        .min_by_key(|&(start, _)| start)
}

fn clean_copy(copy: &str) -> String {
    strip_accents(copy).trim().to_string()
}

/// Replace Portuguese accented letters with their base letter.
pub fn strip_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

/// Recover the base64 receipt block of a reply.
///
/// Returns `None` when the reply is too short to hold the block or nothing in
/// it decodes.
pub(crate) fn extract_embedded_receipt(message: &str, layout: EmbeddedReceipt) -> Option<ReceiptData> {
    let end = message.len().checked_sub(layout.trailer)?;
    let block = message.get(layout.offset..end)?;

    match decode_segments(block).as_slice() {
        [] => None,
        [single] => Some(format_receipt(single)),
        [merchant, client, ..] => {
            let merchant = format_receipt(merchant);
            let client = format_receipt(client);
            Some(ReceiptData {
                merchant_copy: first_non_empty(merchant.merchant_copy, merchant.client_copy),
                client_copy: first_non_empty(client.client_copy, client.merchant_copy),
            })
        }
    }
}

fn first_non_empty(preferred: String, fallback: String) -> String {
    if preferred.is_empty() { fallback } else { preferred }
}

/// Split a receipt block into decoded text segments.
fn decode_segments(block: &str) -> Vec<String> {
    if block.contains(SEGMENT_SEPARATOR) {
        return block.split(SEGMENT_SEPARATOR).filter_map(decode_base64_text).collect();
    }

    if let Some(segments) = decode_length_prefixed(block) {
        return segments;
    }

    decode_base64_text(block).into_iter().collect()
}

/// Segments laid out as 4 hex digits of length followed by that many base64 characters.
///
/// Only accepted when the prefixes consume the whole block and every segment decodes.
fn decode_length_prefixed(block: &str) -> Option<Vec<String>> {
    let block = block.trim_end();
    let mut segments = Vec::new();
    let mut pos = 0;

    while pos < block.len() {
        let len = usize::from_str_radix(block.get(pos..pos + 4)?, 16).ok()?;
        let blob = block.get(pos + 4..pos + 4 + len)?;
        segments.push(decode_base64_text(blob)?);
        pos += 4 + len;
    }

    if segments.is_empty() { None } else { Some(segments) }
}

fn decode_base64_text(part: &str) -> Option<String> {
    let trimmed = part.trim_matches(|c: char| !is_base64_char(c));
    if trimmed.is_empty() {
        return None;
    }

    let bytes = BASE64_STANDARD.decode(trimmed).ok()?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        // Older firmware sends Latin-1 receipts
        Err(e) => e.into_bytes().iter().map(|&b| char::from(b)).collect(),
    };

    if text.trim().is_empty() { None } else { Some(text) }
}

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')
}
