//! URL screening for browse actions (SSRF prevention).

/// Check if a URL targets a private/internal address.
pub fn is_private_url(url: &str) -> bool {
    let lower = url.trim().to_lowercase();

    let rest = lower
        .strip_prefix("http://")
        .or_else(|| lower.strip_prefix("https://"))
        .unwrap_or(&lower);

    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    // Drop userinfo: http://user@host
    let authority = authority.rsplit('@').next().unwrap_or(authority);

    let host = if authority.starts_with('[') {
        // IPv6 literal keeps its brackets
        authority.split(']').next().map(|h| format!("{h}]")).unwrap_or_default()
    } else {
        authority.split(':').next().unwrap_or(authority).to_string()
    };

    host == "localhost"
        || host.ends_with(".localhost")
        || host.starts_with("127.")
        || host.starts_with("10.")
        || host.starts_with("192.168.")
        || is_private_172(&host)
        || host.starts_with("169.254.")
        || host == "[::1]"
        || host == "0.0.0.0"
        || host == "metadata.google.internal"
}

/// 172.16.0.0/12
fn is_private_172(host: &str) -> bool {
    let mut octets = host.split('.');
    if octets.next() != Some("172") {
        return false;
    }
    octets
        .next()
        .and_then(|o| o.parse::<u8>().ok())
        .is_some_and(|second| (16..=31).contains(&second))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_url_detection() {
        assert!(is_private_url("http://localhost:3000"));
        assert!(is_private_url("http://127.0.0.1/api"));
        assert!(is_private_url("http://192.168.1.1/admin"));
        assert!(is_private_url("http://10.0.0.1/internal"));
        assert!(is_private_url("http://169.254.169.254/meta"));
        assert!(is_private_url("http://[::1]:8080/"));
        assert!(is_private_url("http://user@127.0.0.1/"));
        assert!(!is_private_url("https://api.example.com/v1"));
        assert!(!is_private_url("https://google.com"));
    }

    #[test]
    fn only_the_172_16_block_is_private() {
        assert!(is_private_url("http://172.16.0.1"));
        assert!(is_private_url("http://172.31.255.1"));
        assert!(!is_private_url("http://172.32.0.1"));
        assert!(!is_private_url("http://172.200.0.1"));
    }
}
