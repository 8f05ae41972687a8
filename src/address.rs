use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

/// Street-suffix tokens that mark the end of the street portion of an address.
pub const STREET_SUFFIXES: &[&str] = &["Ave", "St", "Blvd", "Rd", "Way", "Ln", "Dr", "Ct"];

// House number, street words, a whole-word suffix, then the locality words
// ("Chicago, IL"). The locality stops at the first digit so a ZIP is left out.
static ADDRESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"(?i)(\d+\s+[A-Za-z0-9\s,]+?\b(?:{})\b[A-Za-z\s,]*)",
        STREET_SUFFIXES.join("|")
    );
    Regex::new(&pattern).expect("address pattern is a valid regex")
});

pub struct AddressExtractor;

impl AddressExtractor {
    /// Finds the first thing in `text` that looks like a street address.
    ///
    /// Returns `None` when nothing matches. No attempt is made to check the
    /// address is real; the warehouse lookup decides that.
    pub fn extract(text: &str) -> Option<String> {
        let captures = ADDRESS_PATTERN.captures(text)?;
        let address = captures
            .get(1)?
            .as_str()
            .trim_matches(|c: char| c.is_whitespace() || c == ',')
            .to_string();

        if address.is_empty() {
            return None;
        }

        debug!("Extracted address candidate: {}", address);
        Some(address)
    }
}

pub fn extract_address(text: &str) -> Option<String> {
    AddressExtractor::extract(text)
}
