use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Whitelist-based sanitization: safe tags (<b>, <p>, lists) survive while
/// dangerous tags (<script>, <iframe>) and attributes (onclick) are stripped.
/// Applied to everything rich-text that clients store and other clients later
/// render: course descriptions, assignment descriptions, bios, reviews.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
