//! Hostname → tenant candidate resolution.
//!
//! # Responsibilities
//! - Normalize the Host header (strip port, lower-case, trailing dot)
//! - Extract the subdomain left of the base domain
//! - Use public-suffix rules when no base domain is configured
//!
//! # Design Decisions
//! - Pure function, no allocation beyond the returned candidate
//! - IP literals never name a tenant
//! - The bare base domain is the control plane, never a tenant

use std::net::IpAddr;

/// Resolve the tenant candidate named by a Host header.
///
/// With `base_domain` set, only strict subdomains of it produce a candidate.
/// Without it the registrable domain (eTLD+1) is found with the public suffix
/// list and everything left of it is the candidate, so `a.b.example.co.uk`
/// yields `a.b`.
pub fn resolve(host_header: &str, base_domain: Option<&str>) -> Option<String> {
    let hostname = normalize_host(host_header)?;
    if hostname.parse::<IpAddr>().is_ok() {
        return None;
    }

    let domain_len = match base_domain {
        Some(base) => {
            let base = base.trim_end_matches('.').to_ascii_lowercase();
            let prefix_len = hostname.len().checked_sub(base.len() + 1)?;
            if !hostname.ends_with(base.as_str()) || hostname.as_bytes()[prefix_len] != b'.' {
                return None;
            }
            base.len()
        }
        None => psl::domain_str(&hostname)?.len(),
    };

    let subdomain = hostname
        .len()
        .checked_sub(domain_len + 1)
        .map(|end| &hostname[..end])?;

    if subdomain.is_empty() || subdomain.split('.').any(str::is_empty) {
        return None;
    }
    Some(subdomain.to_string())
}

/// Lower-cased hostname without port or trailing dot.
///
/// Bracketed IPv6 literals come back without brackets.
pub fn normalize_host(host_header: &str) -> Option<String> {
    let host = host_header.trim();
    let hostname = match host.strip_prefix('[') {
        Some(rest) => rest.split(']').next()?,
        None => host.split(':').next()?,
    };

    let hostname = hostname.strip_suffix('.').unwrap_or(hostname);
    if hostname.is_empty() {
        return None;
    }
    Some(hostname.to_ascii_lowercase())
}
