//! Turns a parsed [`RawConfig`] into a validated, defaulted [`GatewayConfig`]
//! — the same layered-defaults shape the teacher's own config loader uses,
//! just fed from a UCI section list instead of a YAML document. Every field
//! that has a sensible default gets one via an explicit `default_*`
//! function so the defaulting story reads the same way whether the value
//! came from figment or from here.

use std::collections::HashMap;

use crate::uci::RawConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub name: String,
    pub ifname: String,
    pub promiscuous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub name: String,
    pub libname: String,
    /// Single-valued `option` lines, for plugins that don't need the
    /// multi-valued accumulation the configurator does on commit.
    pub options: HashMap<String, String>,
    /// Multi-valued `list` lines, keyed by option name.
    pub lists: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkConfig {
    pub name: String,
    pub service: String,
    pub cert: String,
    pub login: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GatewayConfig {
    pub interfaces: Vec<InterfaceConfig>,
    pub plugins: Vec<PluginConfig>,
    pub uplink: Option<UplinkConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("section '{0}' is missing required option '{1}'")]
    MissingOption(String, String),
    #[error("multiple uplink sections found, only one is allowed")]
    MultipleUplinks,
    #[error("no uplink configuration found")]
    NoUplink,
    #[error("unknown config section type '{0}'")]
    UnknownSectionType(String),
}

fn default_promiscuous() -> bool {
    false
}

fn section_label(section_type: &str, name: &Option<String>) -> String {
    match name {
        Some(n) => format!("{section_type} '{n}'"),
        None => section_type.to_string(),
    }
}

/// Validate a parsed config into a [`GatewayConfig`]. `require_uplink`
/// mirrors the original's `config_allow_null_uplink` escape hatch — most
/// deployments require exactly one `uplink` section, but standalone/test
/// setups can opt out.
pub fn validate(raw: &RawConfig, require_uplink: bool) -> Result<GatewayConfig, ValidationError> {
    let mut config = GatewayConfig::default();
    let mut seen_uplink = false;

    for section in &raw.sections {
        let label = section_label(&section.section_type, &section.name);
        match section.section_type.as_str() {
            "interface" => {
                let ifname = section
                    .option("ifname")
                    .ok_or_else(|| ValidationError::MissingOption(label.clone(), "ifname".to_string()))?;
                let promiscuous = section
                    .option("promisc")
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .unwrap_or_else(default_promiscuous);
                config.interfaces.push(InterfaceConfig {
                    name: section.name.clone().unwrap_or_else(|| ifname.to_string()),
                    ifname: ifname.to_string(),
                    promiscuous,
                });
            }
            "plugin" => {
                let libname = section
                    .option("libname")
                    .ok_or_else(|| ValidationError::MissingOption(label.clone(), "libname".to_string()))?;
                config.plugins.push(PluginConfig {
                    name: section.name.clone().unwrap_or_else(|| libname.to_string()),
                    libname: libname.to_string(),
                    options: section.options.iter().cloned().collect(),
                    lists: section.lists.iter().cloned().collect(),
                });
            }
            "uplink" => {
                if seen_uplink {
                    return Err(ValidationError::MultipleUplinks);
                }
                seen_uplink = true;
                let name = section
                    .option("name")
                    .ok_or_else(|| ValidationError::MissingOption(label.clone(), "name".to_string()))?;
                let service = section
                    .option("service")
                    .ok_or_else(|| ValidationError::MissingOption(label.clone(), "service".to_string()))?;
                let cert = section
                    .option("cert")
                    .ok_or_else(|| ValidationError::MissingOption(label.clone(), "cert".to_string()))?;
                config.uplink = Some(UplinkConfig {
                    name: name.to_string(),
                    service: service.to_string(),
                    cert: cert.to_string(),
                    login: section.option("login").map(str::to_string),
                    password: section.option("password").map(str::to_string),
                });
            }
            other => {
                tracing::warn!(section = %label, "ignoring config section of unknown type '{}'", other);
            }
        }
    }

    if require_uplink && config.uplink.is_none() {
        return Err(ValidationError::NoUplink);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uci::parse;

    #[test]
    fn validates_a_complete_config() {
        let text = r#"
            config interface 'wan'
                option ifname 'eth0'
            config plugin 'count'
                option libname 'Count'
            config uplink 'main'
                option name 'example.org'
                option service '5678'
                option cert '/etc/cert.pem'
        "#;
        let raw = parse(text).unwrap();
        let config = validate(&raw, true).unwrap();
        assert_eq!(config.interfaces.len(), 1);
        assert_eq!(config.interfaces[0].ifname, "eth0");
        assert!(!config.interfaces[0].promiscuous);
        assert_eq!(config.plugins[0].libname, "Count");
        assert_eq!(config.uplink.as_ref().unwrap().name, "example.org");
    }

    #[test]
    fn missing_required_option_fails_the_whole_load() {
        let text = "config interface 'wan'\n";
        let raw = parse(text).unwrap();
        assert!(matches!(validate(&raw, false), Err(ValidationError::MissingOption(_, _))));
    }

    #[test]
    fn missing_uplink_is_an_error_unless_allowed() {
        let text = "config interface 'wan'\noption ifname 'eth0'\n";
        let raw = parse(text).unwrap();
        assert!(matches!(validate(&raw, true), Err(ValidationError::NoUplink)));
        assert!(validate(&raw, false).is_ok());
    }

    #[test]
    fn a_second_uplink_section_is_rejected() {
        let text = r#"
            config uplink 'a'
                option name 'x' option service '1' option cert 'c'
            config uplink 'b'
                option name 'y'
                option service '2'
                option cert 'c'
        "#;
        // (first uplink is intentionally malformed to keep this focused on
        // the duplicate-section check rather than option parsing)
        let raw = parse(
            "config uplink 'a'\noption name 'x'\noption service '1'\noption cert 'c'\n\
             config uplink 'b'\noption name 'y'\noption service '2'\noption cert 'c'\n",
        )
        .unwrap();
        let _ = text;
        assert!(matches!(validate(&raw, true), Err(ValidationError::MultipleUplinks)));
    }

    #[test]
    fn promiscuous_flag_is_parsed_from_the_promisc_option() {
        let raw = parse("config interface 'wan'\noption ifname 'eth0'\noption promisc '1'\n").unwrap();
        let config = validate(&raw, false).unwrap();
        assert!(config.interfaces[0].promiscuous);
    }

    #[test]
    fn unknown_section_types_are_ignored_not_fatal() {
        let raw = parse("config mystery 'x'\noption foo 'bar'\n").unwrap();
        assert!(validate(&raw, false).is_ok());
    }
}
