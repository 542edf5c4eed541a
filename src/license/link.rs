// LCP Core - Licensed Content Protection engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Links of License and Status Documents
//!
//! # Link relations
//! A link's `rel` is either a single string or an array of strings on the
//! wire. Both forms are accepted; a single relation is written back as a
//! plain string.
//!
//! # Templated links
//! Status Document links such as `register`, `renew` and `return` are URI
//! templates (RFC 6570), e.g.
//! `https://lsd.example.com/licenses/1/register{?id,name}`. The engine
//! expands the two forms used by LCP servers:
//! - simple string expansion: `{var}`
//! - form-style query expansion: `{?a,b}` and `{&a,b}`
//!
//! Non-templated links are used as-is; parameters are ignored.

use crate::error::{LcpError, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

/// Link relations the engine looks for
pub mod rel {
    pub const HINT: &str = "hint";
    pub const PUBLICATION: &str = "publication";
    pub const STATUS: &str = "status";
    pub const SUPPORT: &str = "support";
    pub const SELF: &str = "self";
    pub const LICENSE: &str = "license";
    pub const REGISTER: &str = "register";
    pub const RENEW: &str = "renew";
    pub const RETURN: &str = "return";
}

/// A link to a remote resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Link relations
    #[serde(
        serialize_with = "serialize_rels",
        deserialize_with = "deserialize_rels"
    )]
    pub rel: Vec<String>,

    /// Target URL, or URI template when `templated` is true
    pub href: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Media type of the target
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub templated: bool,

    /// Expected size of the target in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,

    /// Base64 SHA-256 digest of the target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Link {
    /// Create a non-templated link with a single relation
    pub fn new<R: Into<String>, H: Into<String>>(rel: R, href: H) -> Self {
        Self {
            rel: vec![rel.into()],
            href: href.into(),
            title: None,
            media_type: None,
            templated: false,
            length: None,
            hash: None,
        }
    }

    /// Check whether this link has the relation `rel`
    pub fn has_rel(&self, rel: &str) -> bool {
        self.rel.iter().any(|r| r == rel)
    }

    /// Check whether the target is an HTML page meant to be shown to the user
    pub fn is_html(&self) -> bool {
        self.media_type
            .as_deref()
            .map(|t| t.starts_with("text/html") || t.starts_with("application/xhtml+xml"))
            .unwrap_or(false)
    }

    /// Target URL without template parameters
    pub fn url(&self) -> Result<Url> {
        self.url_with(&HashMap::new())
    }

    /// Target URL with the template expanded from `parameters`
    ///
    /// Variables missing from `parameters` are dropped from the expansion.
    ///
    /// # Errors
    /// Returns `InvalidLicenseDocument` if the resulting URL is not absolute
    pub fn url_with(&self, parameters: &HashMap<&str, String>) -> Result<Url> {
        let href = if self.templated {
            expand_template(&self.href, parameters)
        } else {
            self.href.clone()
        };

        Url::parse(&href).map_err(|e| {
            LcpError::InvalidLicenseDocument(format!("Invalid link href '{}': {}", href, e))
        })
    }
}

/// Expand the RFC 6570 subset used by LCP servers
fn expand_template(template: &str, parameters: &HashMap<&str, String>) -> String {
    static EXPRESSION: OnceLock<Regex> = OnceLock::new();
    let expression =
        EXPRESSION.get_or_init(|| Regex::new(r"\{([?&]?)([^}]*)\}").expect("template pattern is valid"));

    expression
        .replace_all(template, |caps: &Captures| {
            let operator = &caps[1];
            let values: Vec<(&str, &String)> = caps[2]
                .split(',')
                .map(str::trim)
                .filter_map(|name| parameters.get(name).map(|value| (name, value)))
                .collect();

            match operator {
                "?" | "&" => {
                    if values.is_empty() {
                        return String::new();
                    }
                    let query = values
                        .iter()
                        .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
                        .collect::<Vec<_>>()
                        .join("&");
                    format!("{}{}", operator, query)
                }
                _ => values
                    .iter()
                    .map(|(_, value)| urlencoding::encode(value).into_owned())
                    .collect::<Vec<_>>()
                    .join(","),
            }
        })
        .into_owned()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Rels {
    One(String),
    Many(Vec<String>),
}

fn deserialize_rels<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Rels::deserialize(deserializer)? {
        Rels::One(rel) => vec![rel],
        Rels::Many(rels) => rels,
    })
}

fn serialize_rels<S>(rels: &[String], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match rels {
        [single] => serializer.serialize_str(single),
        _ => rels.serialize(serializer),
    }
}

/// Lookup helpers shared by License and Status Documents
pub trait Links {
    fn links(&self) -> &[Link];

    /// First link with the relation `rel`
    fn link(&self, rel: &str) -> Option<&Link> {
        self.links().iter().find(|l| l.has_rel(rel))
    }

    /// All links with the relation `rel`
    fn links_with_rel(&self, rel: &str) -> Vec<&Link> {
        self.links().iter().filter(|l| l.has_rel(rel)).collect()
    }

    /// First link with the relation `rel`, or `MissingRequiredLink`
    fn required_link(&self, rel: &str) -> Result<&Link> {
        self.link(rel).ok_or_else(|| LcpError::missing_link(rel))
    }
}
