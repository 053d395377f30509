use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::ConfigError;

/// Characters that are not allowed in a profile name, because the name
/// doubles as the file stem of the persisted profile on every platform.
const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// A user-named frpc connection profile.
///
/// Persisted as camelCase JSON. Every field has a default so files written by
/// older versions (or edited by hand) still load:
/// `{ "name":"office", "serverAddress":"1.2.3.4", "proxies":[{"name":"web"}] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    /// Empty means "resolve when needed".
    pub tool_path: String,
    pub server_address: String,
    pub server_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub tls_enabled: bool,
    pub proxies: Vec<ProxyRule>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: "default".into(),
            tool_path: String::new(),
            server_address: "127.0.0.1".into(),
            server_port: 7000,
            token: None,
            tls_enabled: false,
            proxies: Vec::new(),
        }
    }
}

/// One forwarding rule inside a profile. Rendered as its own `[name]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyRule {
    pub name: String,
    pub kind: ProxyKind,
    pub local_address: String,
    pub local_port: u16,
    /// Only meaningful for tcp / udp.
    pub remote_port: u16,
    /// Only meaningful for http / https.
    pub custom_domains: String,
}

impl Default for ProxyRule {
    fn default() -> Self {
        Self {
            name: "proxy".into(),
            kind: ProxyKind::Tcp,
            local_address: "127.0.0.1".into(),
            local_port: 80,
            remote_port: 0,
            custom_domains: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    #[default]
    Tcp,
    Udp,
    Http,
    Https,
    Stcp,
}

impl ProxyKind {
    pub const ALL: [ProxyKind; 5] = [
        ProxyKind::Tcp,
        ProxyKind::Udp,
        ProxyKind::Http,
        ProxyKind::Https,
        ProxyKind::Stcp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProxyKind::Tcp => "tcp",
            ProxyKind::Udp => "udp",
            ProxyKind::Http => "http",
            ProxyKind::Https => "https",
            ProxyKind::Stcp => "stcp",
        }
    }

    pub fn uses_remote_port(self) -> bool {
        matches!(self, ProxyKind::Tcp | ProxyKind::Udp)
    }

    pub fn uses_custom_domains(self) -> bool {
        matches!(self, ProxyKind::Http | ProxyKind::Https)
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProxyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProxyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::Invalid(format!("unknown proxy type '{s}'")))
    }
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a new tcp rule named `proxy{n+1}` forwarding 127.0.0.1:80 to
    /// remote port 8080, the way the editor seeds a fresh row.
    pub fn add_proxy(&mut self) -> &mut ProxyRule {
        let mut n = self.proxies.len() + 1;
        while self.proxy(&format!("proxy{n}")).is_some() {
            n += 1;
        }
        self.proxies.push(ProxyRule {
            name: format!("proxy{n}"),
            remote_port: 8080,
            ..ProxyRule::default()
        });
        let last = self.proxies.len() - 1;
        &mut self.proxies[last]
    }

    /// Returns `true` if a rule with that name was removed.
    pub fn remove_proxy(&mut self, name: &str) -> bool {
        let before = self.proxies.len();
        self.proxies.retain(|p| p.name != name);
        self.proxies.len() != before
    }

    pub fn proxy(&self, name: &str) -> Option<&ProxyRule> {
        self.proxies.iter().find(|p| p.name == name)
    }

    /// Structural checks performed before a profile is persisted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_name(&self.name)?;
        if self.server_port == 0 {
            return Err(ConfigError::Invalid("server port must be 1-65535".into()));
        }
        single_line("server address", &self.server_address)?;
        if let Some(token) = &self.token {
            single_line("token", token)?;
        }
        let mut seen = HashSet::new();
        for proxy in &self.proxies {
            if proxy.name.trim().is_empty() {
                return Err(ConfigError::Invalid("proxy name must not be empty".into()));
            }
            // The name becomes an INI section header.
            single_line("proxy name", &proxy.name)?;
            if proxy.name.contains(['[', ']']) {
                return Err(ConfigError::Invalid(format!(
                    "proxy name '{}' must not contain '[' or ']'",
                    proxy.name
                )));
            }
            single_line("local address", &proxy.local_address)?;
            single_line("custom domains", &proxy.custom_domains)?;
            if !seen.insert(proxy.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate proxy name '{}'",
                    proxy.name
                )));
            }
        }
        Ok(())
    }
}

/// A profile name must be usable as a file stem on every platform.
pub fn validate_name(name: &str) -> Result<(), ConfigError> {
    let trimmed = name.trim();
    let unsafe_name = trimmed.is_empty()
        || trimmed != name
        || name == "."
        || name == ".."
        || name.contains("..")
        || name.ends_with('.')
        || name
            .chars()
            .any(|c| c.is_control() || FORBIDDEN_NAME_CHARS.contains(&c));
    if unsafe_name {
        Err(ConfigError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Values written verbatim into the tool config must stay on one line.
fn single_line(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.chars().any(char::is_control) {
        return Err(ConfigError::Invalid(format!(
            "{field} must not contain control characters: {value:?}"
        )));
    }
    Ok(())
}

/// Serialize a profile into its persisted form.
pub fn encode(profile: &Profile) -> Result<Vec<u8>, ConfigError> {
    Ok(serde_json::to_vec_pretty(profile)?)
}

/// Parse a persisted profile. Missing fields take their defaults; anything
/// that is not a JSON object of the right shape is `Malformed`.
pub fn decode(bytes: &[u8]) -> Result<Profile, ConfigError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Profile {
        let mut profile = Profile::new("office");
        profile.tool_path = "/opt/frp/frpc".into();
        profile.server_address = "frp.example.com".into();
        profile.server_port = 7443;
        profile.token = Some("s3cret".into());
        profile.tls_enabled = true;
        profile.proxies = vec![
            ProxyRule {
                name: "ssh".into(),
                kind: ProxyKind::Tcp,
                local_port: 22,
                remote_port: 6000,
                ..ProxyRule::default()
            },
            ProxyRule {
                name: "site".into(),
                kind: ProxyKind::Https,
                local_port: 443,
                custom_domains: "a.example.com,b.example.com".into(),
                ..ProxyRule::default()
            },
            ProxyRule {
                name: "private".into(),
                kind: ProxyKind::Stcp,
                ..ProxyRule::default()
            },
        ];
        profile
    }

    #[test]
    fn decode_inverts_encode() {
        for profile in [sample(), Profile::default(), Profile::new("x")] {
            let bytes = encode(&profile).unwrap();
            assert_eq!(decode(&bytes).unwrap(), profile);
        }
    }

    #[test]
    fn empty_token_survives_a_round_trip() {
        let mut profile = sample();
        profile.token = Some(String::new());
        assert_eq!(decode(&encode(&profile).unwrap()).unwrap(), profile);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let profile =
            decode(br#"{ "name": "lab", "proxies": [ { "name": "web", "kind": "http" } ] }"#)
                .unwrap();
        assert_eq!(profile.name, "lab");
        assert_eq!(profile.server_address, "127.0.0.1");
        assert_eq!(profile.server_port, 7000);
        assert_eq!(profile.token, None);
        assert!(!profile.tls_enabled);
        assert_eq!(profile.proxies[0].kind, ProxyKind::Http);
        assert_eq!(profile.proxies[0].local_port, 80);
    }

    #[test]
    fn structurally_invalid_input_is_malformed() {
        let inputs: [&[u8]; 4] = [
            b"not json",
            b"[1,2]",
            br#"{"serverPort":"high"}"#,
            br#"{"proxies":[{"kind":"quic"}]}"#,
        ];
        for input in inputs {
            assert!(
                matches!(decode(input), Err(ConfigError::Malformed(_))),
                "{:?} should be rejected",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn add_proxy_picks_the_next_free_name() {
        let mut profile = Profile::new("p");
        profile.add_proxy();
        profile.add_proxy();
        assert!(profile.remove_proxy("proxy1"));
        let added = profile.add_proxy();
        assert_eq!(added.name, "proxy3");
        assert_eq!(added.remote_port, 8080);
        assert!(!profile.remove_proxy("missing"));
        profile.validate().unwrap();
    }

    #[test]
    fn validate_rejects_duplicate_proxy_names() {
        let mut profile = sample();
        profile.proxies[1].name = "ssh".into();
        assert!(matches!(profile.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn values_that_would_break_the_tool_config_are_rejected() {
        let breakers: [fn(&mut Profile); 6] = [
            |p| p.proxies[0].name = "ssh]\n[evil".into(),
            |p| p.proxies[0].name = "[ssh".into(),
            |p| p.proxies[0].local_address = "127.0.0.1\nremote_port = 1".into(),
            |p| p.proxies[1].custom_domains = "a.example.com\r\n[x]".into(),
            |p| p.server_address = "1.2.3.4\nserver_port = 1".into(),
            |p| p.token = Some("s3cret\ntls_enable = true".into()),
        ];
        for (i, breaker) in breakers.into_iter().enumerate() {
            let mut profile = sample();
            breaker(&mut profile);
            assert!(
                matches!(profile.validate(), Err(ConfigError::Invalid(_))),
                "case {i} should be rejected"
            );
        }
        sample().validate().unwrap();
    }

    #[test]
    fn unsafe_names_are_rejected() {
        for name in ["", " ", "../etc", "a/b", "a\\b", "con:1", "x\u{7}", "trailing.", " padded"] {
            assert!(
                matches!(validate_name(name), Err(ConfigError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
        for name in ["office", "默认配置", "home-lab_2", "v1.2"] {
            validate_name(name).unwrap();
        }
    }

    #[test]
    fn proxy_kind_parses_case_insensitively() {
        assert_eq!("HTTPS".parse::<ProxyKind>().unwrap(), ProxyKind::Https);
        assert!("quic".parse::<ProxyKind>().is_err());
    }
}
