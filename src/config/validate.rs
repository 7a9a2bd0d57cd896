//! Validity predicates for the string-shaped item kinds.

use url::{Host, Url};

/// Longest permitted local part of an address.
const MAX_LOCAL_PART: usize = 64;
/// Longest permitted domain of an address.
const MAX_DOMAIN: usize = 255;
/// URL schemes an item may point at.
const URL_SCHEMES: [&str; 4] = ["http", "https", "ftp", "ftps"];
/// Punctuation permitted inside CSV tokens.
const CSV_PUNCTUATION: &str = " !-+#.";
/// Highest permission value (rwx for user, group and other).
pub const MAX_PERMISSION: i64 = 0o777;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Empty, or a comma-separated list of addresses.
pub fn is_valid_email_list(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    value.split(',').all(|addr| is_valid_email(addr.trim()))
}

fn is_valid_email(addr: &str) -> bool {
    let Some((local, domain)) = addr.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > MAX_LOCAL_PART || domain.len() > MAX_DOMAIN {
        return false;
    }
    if !local.chars().all(|c| is_word_char(c) || matches!(c, '.' | '-' | '+')) {
        return false;
    }
    // Domain must end in ".<word>" and contain no second '@'.
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty()
        && host.chars().all(|c| is_word_char(c) || matches!(c, '.' | '-'))
        && !tld.is_empty()
        && tld.chars().all(is_word_char)
}

/// Empty, or comma-separated non-empty tokens of alphanumerics and a small
/// punctuation set.
pub fn is_valid_csv(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    value
        .chars()
        .all(|c| c.is_alphanumeric() || c == ',' || CSV_PUNCTUATION.contains(c))
        && value.split(',').all(|part| !part.trim().is_empty())
}

/// Split a CSV value into trimmed, non-empty parts.
pub fn csv_parts(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Empty, or an http/https/ftp/ftps URL on a domain, `localhost` or IPv4
/// address with optional port and path.
pub fn is_valid_url(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    let Ok(url) = Url::parse(value) else {
        return false;
    };
    if !URL_SCHEMES.contains(&url.scheme()) {
        return false;
    }
    match url.host() {
        Some(Host::Ipv4(_)) => true,
        Some(Host::Domain(domain)) => is_valid_domain(domain),
        Some(Host::Ipv6(_)) | None => false,
    }
}

fn is_valid_domain(domain: &str) -> bool {
    if domain.eq_ignore_ascii_case("localhost") {
        return true;
    }
    let labels: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    })
}

/// Parse `0oNNN` or a bare three-digit octal string.
pub fn parse_permission(value: &str) -> Option<i64> {
    let value = value.trim();
    let digits = match value.strip_prefix("0o").or_else(|| value.strip_prefix("0O")) {
        Some(rest) => rest,
        None if value.len() == 3 => value,
        None => return None,
    };
    if digits.is_empty() {
        return None;
    }
    i64::from_str_radix(digits, 8).ok()
}

pub fn is_valid_permission(value: i64) -> bool {
    (0..=MAX_PERMISSION).contains(&value)
}

/// Render a permission the way it is stored in documents.
pub fn format_permission(value: i64) -> String {
    format!("0o{value:o}")
}

/// Convert every path separator to the platform's.
pub fn to_native_separators(path: &str) -> String {
    path.chars()
        .map(|c| {
            if c == '/' || c == '\\' {
                std::path::MAIN_SEPARATOR
            } else {
                c
            }
        })
        .collect()
}

/// Convert the platform's separators to `/`.
pub fn to_portable_separators(path: &str) -> String {
    path.replace(std::path::MAIN_SEPARATOR, "/")
}
