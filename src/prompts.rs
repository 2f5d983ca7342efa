//! Prompts for the hosted model.
//!
//! Every prompt the crate sends lives here so the wording can be inspected
//! and tested without a model. Callers can override the analysis system
//! prompt via [`crate::config::ExtractionConfig::system_prompt`]; the
//! constants are used only when no override is provided.

use crate::schema::FieldSchema;

/// Default system prompt for structured-field extraction.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a meticulous document analyst. You read the text of an identity or personal document (passport, national ID card, driving licence, certificate, marksheet, income statement) and extract personal-identification fields.

Follow these rules precisely:

1. SOURCE
   - Use ONLY information present in the document
   - Never guess, infer or invent a value
   - If a field is absent or illegible, its value is null

2. VALUES
   - Copy names, numbers and dates exactly as printed (keep the original date format)
   - Fix obvious OCR spacing inside a single value only when certain
   - Every value is a JSON string or null

3. OUTPUT FORMAT
   - Output ONLY one JSON object
   - Use exactly the keys you are given, no more and no fewer
   - Do NOT wrap the JSON in ``` fences
   - Do NOT add commentary or explanations"#;

/// System prompt for the face-location request.
pub const FACE_LOCATION_SYSTEM_PROMPT: &str = r#"You locate photographs of human faces in document images (passport photos, ID card portraits, profile pictures).

Output ONLY a JSON array. Each element is an object with numeric keys "x", "y", "width", "height" (pixels, origin at the top-left corner) and "confidence" (0.0 to 1.0). The box must cover the whole portrait photo. Output [] when there is no face. No commentary, no code fences."#;

/// Marker appended to document text that was cut to fit the prompt budget.
pub const TRUNCATION_MARKER: &str = "\n[… document text truncated …]";

/// Render the schema as the bullet list embedded in prompts.
pub fn schema_block(schema: &FieldSchema) -> String {
    let mut out = String::new();
    for f in schema.fields() {
        if f.description.is_empty() {
            out.push_str(&format!("- \"{}\"\n", f.name));
        } else {
            out.push_str(&format!("- \"{}\": {}\n", f.name, f.description));
        }
    }
    out
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
///
/// Returns the kept slice and whether anything was dropped.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Build the user prompt for text analysis.
pub fn analysis_prompt(schema: &FieldSchema, text: &str, max_chars: usize) -> String {
    let (kept, truncated) = truncate_chars(text, max_chars);
    format!(
        "Extract the following fields:\n{}\nReturn a JSON object with exactly these keys: {}.\n\nDocument text:\n\"\"\"\n{}{}\n\"\"\"",
        schema_block(schema),
        key_list(schema),
        kept,
        if truncated { TRUNCATION_MARKER } else { "" }
    )
}

/// Build the user prompt for analysing a page image directly.
pub fn vision_analysis_prompt(schema: &FieldSchema) -> String {
    format!(
        "The attached image is a page of the document. Read it and extract the following fields:\n{}\nReturn a JSON object with exactly these keys: {}.",
        schema_block(schema),
        key_list(schema)
    )
}

/// Build the user prompt for face location in an image of `width`×`height` px.
pub fn face_location_prompt(width: u32, height: u32) -> String {
    format!(
        "The attached image is {width}x{height} pixels. Return the bounding box of every human face photograph in it."
    )
}

fn key_list(schema: &FieldSchema) -> String {
    schema
        .names()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;

    #[test]
    fn analysis_prompt_embeds_schema_and_text() {
        let schema = FieldSchema::new(vec![
            FieldSpec::new("name", "Holder name"),
            FieldSpec::new("id_number", ""),
        ])
        .unwrap();
        let p = analysis_prompt(&schema, "NAME: JANE DOE", 1000);
        assert!(p.contains("- \"name\": Holder name"));
        assert!(p.contains("- \"id_number\"\n"));
        assert!(p.contains(r#"exactly these keys: "name", "id_number""#));
        assert!(p.contains("NAME: JANE DOE"));
        assert!(!p.contains("truncated"));
    }

    #[test]
    fn analysis_prompt_truncates_long_text() {
        let schema = FieldSchema::from_names(["name"]).unwrap();
        let p = analysis_prompt(&schema, "abcdefghij", 4);
        assert!(p.contains("abcd\n[… document text truncated …]"));
        assert!(!p.contains("abcde"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let (kept, cut) = truncate_chars("ÄÖÜß", 2);
        assert_eq!(kept, "ÄÖ");
        assert!(cut);
        let (kept, cut) = truncate_chars("abc", 3);
        assert_eq!(kept, "abc");
        assert!(!cut);
    }

    #[test]
    fn face_prompt_mentions_dimensions() {
        assert!(face_location_prompt(640, 480).contains("640x480"));
    }
}
