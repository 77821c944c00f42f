//! Template rendering
//!
//! Binds listing attributes into `{placeholder}` tokens. A missing or
//! unknown attribute renders as a sentinel instead of aborting the dispatch.

use crate::domain::Listing;

/// Sentinel rendered for missing or unknown placeholders
pub const MISSING_VALUE: &str = "N/A";

/// Fallback body when the named template is absent from the store
pub const DEFAULT_TEMPLATE: &str = "\
{title}

{description}

Ціна: {price}
Адреса: {location}
Кімнат: {rooms}
Площа: {area} м²
Поверх: {floor}

{url}";

/// Render a template body against one listing
pub fn render(body: &str, listing: &Listing) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }

        let mut name = String::new();
        let mut closed = false;
        for inner in chars.by_ref() {
            if inner == '}' {
                closed = true;
                break;
            }
            name.push(inner);
        }

        if closed {
            match listing.attribute(&name) {
                Some(value) if !value.trim().is_empty() => out.push_str(&value),
                _ => out.push_str(MISSING_VALUE),
            }
        } else {
            // Unterminated brace: keep the literal text
            out.push('{');
            out.push_str(&name);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::tests::listing;

    #[test]
    fn test_renders_attributes() {
        let l = listing(1);
        let rendered = render("{title} — {price} ({location})", &l);
        assert_eq!(rendered, "Listing 1 — $500 (Львів, вул. Зелена 5)");
    }

    #[test]
    fn test_missing_attribute_renders_sentinel() {
        let l = listing(1); // description is None
        assert_eq!(render("{description}", &l), MISSING_VALUE);
    }

    #[test]
    fn test_unknown_placeholder_renders_sentinel() {
        let l = listing(1);
        assert_eq!(render("{owner_phone}", &l), MISSING_VALUE);
    }

    #[test]
    fn test_unterminated_brace_kept_literal() {
        let l = listing(1);
        assert_eq!(render("price {price", &l), "price {price");
    }

    #[test]
    fn test_default_template_renders_without_panics() {
        let rendered = render(DEFAULT_TEMPLATE, &listing(1));
        assert!(rendered.contains("Listing 1"));
        assert!(rendered.contains(MISSING_VALUE)); // description
    }
}
