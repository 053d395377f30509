//! Rendering of a [`Profile`] into the INI-style file frpc reads with `-c`.
//!
//! The output is one-directional: it is regenerated from the profile before
//! every start and never parsed back.

use std::fmt::Write;

use super::profile::Profile;

pub fn render(profile: &Profile) -> String {
    let mut out = String::new();

    // `write!` into a String cannot fail.
    let _ = writeln!(out, "[common]");
    let _ = writeln!(out, "server_addr = {}", profile.server_address);
    let _ = writeln!(out, "server_port = {}", profile.server_port);
    if let Some(token) = profile.token.as_deref().filter(|t| !t.is_empty()) {
        let _ = writeln!(out, "token = {token}");
    }
    if profile.tls_enabled {
        let _ = writeln!(out, "tls_enable = true");
    }
    out.push('\n');

    for proxy in &profile.proxies {
        let _ = writeln!(out, "[{}]", proxy.name);
        let _ = writeln!(out, "type = {}", proxy.kind);
        let _ = writeln!(out, "local_ip = {}", proxy.local_address);
        let _ = writeln!(out, "local_port = {}", proxy.local_port);
        if proxy.kind.uses_remote_port() {
            let _ = writeln!(out, "remote_port = {}", proxy.remote_port);
        } else if proxy.kind.uses_custom_domains() {
            let _ = writeln!(out, "custom_domains = {}", proxy.custom_domains);
        }
        // stcp and future kinds only carry the common fields.
        out.push('\n');
    }

    out
}
