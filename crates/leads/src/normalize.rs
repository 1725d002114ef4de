//! Normalization helpers for emails, domains, and business names.

use url::Url;

/// Canonical form of an email address used as a unique key.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Extract the bare domain (`example.com`) from a URL or domain string.
///
/// Adds `https://` when no scheme is present, lowercases, and strips a
/// leading `www.`. Returns `None` for input without a dotted host.
#[must_use]
pub fn normalize_domain(website_or_domain: &str) -> Option<String> {
    let trimmed = website_or_domain.trim();
    if trimmed.is_empty() {
        return None;
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let host = match Url::parse(&with_scheme) {
        Ok(url) => url.host_str()?.to_lowercase(),
        Err(e) => {
            tracing::debug!(input = trimmed, error = %e, "Domain input failed URL parsing");
            if trimmed.contains('/') {
                return None;
            }
            trimmed.to_lowercase()
        }
    };

    let domain = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return None;
    }
    Some(domain)
}

/// Domain part of an email address, if present.
#[must_use]
pub fn email_domain(email: &str) -> Option<String> {
    let (_, domain) = email.trim().rsplit_once('@')?;
    normalize_domain(domain)
}

/// Lowercase and collapse whitespace in a business name.
#[must_use]
pub fn normalize_business_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Reduce a name to lowercase words for whole-word keyword matching.
///
/// Apostrophes are removed so "McDonald's" becomes "mcdonalds"; any other
/// non-alphanumeric character separates words. The result is padded with
/// single spaces so `contains(" word ")` matches whole words.
#[must_use]
pub fn keyword_haystack(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for ch in text.chars() {
        if ch == '\'' || ch == '\u{2019}' {
            continue;
        }
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}
