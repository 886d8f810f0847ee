use config::{Config, ConfigError, File, FileFormat};
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use dns_responder::answer::DEFAULT_MX_PREFERENCE;
use dns_types::protocol::types::DomainName;

/// The records to serve, read from a YAML or TOML file.
///
/// ```yaml
/// records:
///   - name: "example.com."
///     a: ["93.184.216.34"]
///     mx: { preference: 10, host: "mail.example.com." }
///     ns: { nameserver: "ns1.example.com.", addresses: ["192.0.2.53"] }
/// refuse_unknown: true
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub records: Vec<Record>,
    /// Refuse questions about names with no records, rather than
    /// answering NXDOMAIN.
    #[serde(default)]
    pub refuse_unknown: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct Record {
    pub name: Name,
    #[serde(default)]
    pub a: Vec<Ipv4Addr>,
    #[serde(default)]
    pub aaaa: Vec<Ipv6Addr>,
    pub mx: Option<MailExchange>,
    pub ns: Option<Nameserver>,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct MailExchange {
    #[serde(default = "default_mx_preference")]
    pub preference: u16,
    pub host: Name,
}

fn default_mx_preference() -> u16 {
    DEFAULT_MX_PREFERENCE
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct Nameserver {
    pub nameserver: Name,
    /// Glue addresses for the nameserver.
    #[serde(default)]
    pub addresses: Vec<IpAddr>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Name {
    pub domain: DomainName,
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NameVisitor;

        impl Visitor<'_> for NameVisitor {
            type Value = Name;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a domain name")
            }

            fn visit_str<E>(self, v: &str) -> Result<Name, E>
            where
                E: de::Error,
            {
                match DomainName::from_dotted_string(v) {
                    Some(domain) => Ok(Name { domain }),
                    None => Err(de::Error::invalid_value(
                        Unexpected::Str(v),
                        &"a valid domain name",
                    )),
                }
            }
        }

        deserializer.deserialize_str(NameVisitor)
    }
}

impl Settings {
    pub fn new(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }
}
