/// Turns header text into a URL-safe anchor.
///
/// Lowercases, drops everything outside `[a-z0-9\s-]`, collapses runs of
/// whitespace and hyphens into one hyphen and trims hyphens from both ends.
/// Two titles may produce the same slug; nothing here prevents that.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for ch in text.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '-' {
            pending_separator = true;
        }
    }

    slug
}

/// Output filename for a subsection without a manifest entry. Leading
/// numbering such as `1.1 ` or `3. ` is dropped first.
pub fn fallback_filename(title: &str) -> String {
    let trimmed = title.trim_start();
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    let rest = &trimmed[digits..];

    let unnumbered = match rest.strip_prefix('.') {
        Some(after_dot) if digits > 0 => after_dot
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .trim_start(),
        _ => trimmed,
    };

    format!("{}.md", slugify(unnumbered))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Memory and Pointer Patterns"), "memory-and-pointer-patterns");
        assert_eq!(slugify("1.1 C-to-Rust Syntax Mapping"), "11-c-to-rust-syntax-mapping");
        assert_eq!(slugify("  --Hello,   World!--  "), "hello-world");
        assert_eq!(slugify("Side-Channel -- Mitigations"), "side-channel-mitigations");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_is_idempotent() {
        let inputs = [
            "Ownership & Borrowing",
            "  leading and trailing  ",
            "UPPER_case with_underscores",
            "Ünïcödé Tïtle 42",
            "a - - b",
            "",
            "---",
            "5.2 Constant-Time Implementations {#ct}",
        ];
        for input in inputs {
            let once = slugify(input);
            assert_eq!(slugify(&once), once, "not idempotent for {:?}", input);
            assert_eq!(slugify(input), once, "not deterministic for {:?}", input);
        }
    }

    #[test]
    fn test_slugify_drops_inline_markup() {
        assert_eq!(slugify("The `no_std` *attribute*"), "the-nostd-attribute");
        assert_eq!(slugify("__Bold__ and _italic_"), "bold-and-italic");
    }

    #[test]
    fn test_fallback_filename() {
        assert_eq!(fallback_filename("1.1 Sub"), "sub.md");
        assert_eq!(fallback_filename("3. Core Language Concepts"), "core-language-concepts.md");
        assert_eq!(fallback_filename("12.10 Big Numbers"), "big-numbers.md");
        assert_eq!(fallback_filename("Plain Title"), "plain-title.md");
        assert_eq!(fallback_filename("2024 Roadmap"), "2024-roadmap.md");
    }
}
