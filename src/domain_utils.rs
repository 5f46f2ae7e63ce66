use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9\-]{0,62}[a-z0-9])?(\.[a-z0-9]([a-z0-9\-]{0,62}[a-z0-9])?)+$")
        .expect("domain regex is valid")
});

/// Reduce user input ("https://www.Example.com/about") to a bare hostname.
pub fn clean_domain_input(input: &str) -> String {
    let trimmed = input.trim().to_lowercase();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(&trimmed);
    let host = without_scheme
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or(without_scheme);
    host.strip_prefix("www.").unwrap_or(host).trim_end_matches('.').to_string()
}

/// Check that a string is a syntactically valid hostname with at least one dot.
pub fn is_valid_domain(domain: &str) -> bool {
    domain.len() <= 253 && DOMAIN_RE.is_match(domain)
}

/// Hostname of a URL, lower-cased and without a leading `www.`.
/// Returns an empty string when the URL cannot be parsed.
pub fn get_domain_name(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .host_str()
            .map(|h| h.strip_prefix("www.").unwrap_or(h).to_lowercase())
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// True when the URL's host equals one of `domains` or is a subdomain of one.
/// `avoid.com` matches `avoid.com` and `sub.avoid.com` but not `notavoid.com`.
pub fn domain_matches_list(url: &str, domains: &[String]) -> bool {
    let host = get_domain_name(url);
    if host.is_empty() {
        return false;
    }

    domains.iter().any(|item| {
        let item = item.trim().to_lowercase();
        !item.is_empty() && (host == item || host.ends_with(&format!(".{}", item)))
    })
}

/// The label a company name is most likely compressed into:
/// `www.acmewidgets.co.uk` -> `acmewidgets`.
pub fn domain_stem(domain: &str) -> &str {
    let host = domain.strip_prefix("www.").unwrap_or(domain);
    host.split('.').next().unwrap_or(host)
}

/// Heuristic for "this text is a bare hostname" (no whitespace, has a dot).
pub fn looks_like_domain(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && text.contains('.') && !text.contains(char::is_whitespace)
}

/// Whether `url` is a registry company page rather than one of its sub-pages:
/// the path must be `<prefix><id>` with nothing after the identifier.
pub fn is_canonical_company_page(url: &str, path_prefix: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };

    match parsed.path().strip_prefix(path_prefix) {
        Some(rest) => {
            let rest = rest.trim_end_matches('/');
            !rest.is_empty() && !rest.contains('/')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_domain_input() {
        assert_eq!(clean_domain_input("https://www.Example.com/about"), "example.com");
        assert_eq!(clean_domain_input("  acme.co.uk  "), "acme.co.uk");
        assert_eq!(clean_domain_input("http://shop.acme.com?x=1"), "shop.acme.com");
    }

    #[test]
    fn test_is_valid_domain() {
        assert!(is_valid_domain("example.com"));
        assert!(is_valid_domain("heaven-scent.co.uk"));
        assert!(!is_valid_domain("localhost"));
        assert!(!is_valid_domain("-bad.com"));
        assert!(!is_valid_domain("has space.com"));
    }

    #[test]
    fn test_get_domain_name() {
        assert_eq!(get_domain_name("https://www.google.com/search?q=a"), "google.com");
        assert_eq!(get_domain_name("http://sub.avoid.com/x"), "sub.avoid.com");
        assert_eq!(get_domain_name("/url?q=foo"), "");
    }

    #[test]
    fn test_domain_matches_list() {
        let list = vec!["avoid.com".to_string()];
        assert!(domain_matches_list("https://avoid.com/page", &list));
        assert!(domain_matches_list("https://sub.avoid.com/page", &list));
        assert!(!domain_matches_list("https://notavoid.com/page", &list));
        assert!(!domain_matches_list("not a url", &list));
    }

    #[test]
    fn test_domain_stem() {
        assert_eq!(domain_stem("acmewidgets.com"), "acmewidgets");
        assert_eq!(domain_stem("www.heavenscent.co.uk"), "heavenscent");
        assert_eq!(domain_stem("nodots"), "nodots");
    }

    #[test]
    fn test_is_canonical_company_page() {
        let prefix = "/company/";
        assert!(is_canonical_company_page("https://beta.companieshouse.gov.uk/company/01234567", prefix));
        assert!(is_canonical_company_page("https://beta.companieshouse.gov.uk/company/01234567/", prefix));
        assert!(!is_canonical_company_page(
            "https://beta.companieshouse.gov.uk/company/01234567/officers",
            prefix
        ));
        assert!(!is_canonical_company_page("https://beta.companieshouse.gov.uk/search?q=x", prefix));
    }
}
